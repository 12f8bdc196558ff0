use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use playback_clock::{Ticks, PLAYSPEED_NORMAL};

use crate::pacer::OutputStatus;

const NO_PTS: i64 = i64::MIN;

/// Values the owner adjusts while the decode thread runs.
#[derive(Debug)]
pub struct PlaybackControl {
    speed: AtomicI32,
    video_delay: AtomicI64,
}

impl PlaybackControl {
    pub fn new(video_delay: Ticks) -> Self {
        Self { speed: AtomicI32::new(PLAYSPEED_NORMAL), video_delay: AtomicI64::new(video_delay) }
    }

    pub fn speed(&self) -> i32 { self.speed.load(Ordering::Acquire) }

    pub fn set_speed(&self, speed: i32) { self.speed.store(speed, Ordering::Release); }

    pub fn video_delay(&self) -> Ticks { self.video_delay.load(Ordering::Acquire) }

    pub fn set_video_delay(&self, delay: Ticks) { self.video_delay.store(delay, Ordering::Release); }
}

#[derive(Debug)]
struct StatsInner {
    current_pts: AtomicI64,
    dropped_frames: AtomicU64,
    output_initialized: AtomicBool,
    still_frame: AtomicBool,
}

/// Read side of the decode thread's progress, for UI and codec info.
#[derive(Debug, Clone)]
pub struct PlayerStats(Arc<StatsInner>);

impl PlayerStats {
    pub fn new() -> Self {
        Self(Arc::new(StatsInner {
            current_pts: AtomicI64::new(NO_PTS),
            dropped_frames: AtomicU64::new(0),
            output_initialized: AtomicBool::new(false),
            still_frame: AtomicBool::new(false),
        }))
    }

    pub fn current_pts(&self) -> Option<Ticks> {
        match self.0.current_pts.load(Ordering::Acquire) {
            NO_PTS => None,
            pts => Some(pts),
        }
    }

    pub(crate) fn set_current_pts(&self, pts: Option<Ticks>) {
        self.0.current_pts.store(pts.unwrap_or(NO_PTS), Ordering::Release);
    }

    pub fn dropped_frames(&self) -> u64 { self.0.dropped_frames.load(Ordering::Relaxed) }

    pub(crate) fn add_dropped(&self) { self.0.dropped_frames.fetch_add(1, Ordering::Relaxed); }

    pub fn output_initialized(&self) -> bool { self.0.output_initialized.load(Ordering::Acquire) }

    pub(crate) fn set_output_initialized(&self, v: bool) { self.0.output_initialized.store(v, Ordering::Release); }

    pub fn is_still_frame(&self) -> bool { self.0.still_frame.load(Ordering::Acquire) }

    pub(crate) fn set_still_frame(&self, v: bool) { self.0.still_frame.store(v, Ordering::Release); }

    pub(crate) fn reset(&self) {
        self.set_current_pts(None);
        self.0.dropped_frames.store(0, Ordering::Relaxed);
        self.set_still_frame(false);
    }
}

impl Default for PlayerStats {
    fn default() -> Self { Self::new() }
}

/// Notifications from the decode thread.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    StillFrameDetected,
    StillFrameLeft,
    ClockSet { pts: Ticks, delay: Ticks },
    Resynced { pts: Ticks },
    Synchronized,
    PictureOutput { pts: Ticks, status: OutputStatus, noskip: bool },
    DecoderReset,
}
