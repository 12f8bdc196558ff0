//! Presentation clock shared by the decode and presentation threads.
//!
//! All times are [`Ticks`] (microseconds). The absolute clock is a monotonic
//! time source; the playback clock is derived from it and re-anchored on every
//! discontinuity (seek, resync).

use serde::{Deserialize, Serialize};
use std::time::Duration;

mod playback;
mod source;

pub use playback::{ManualClock, PlaybackClock, SystemClock};
pub use source::{ManualTime, MonotonicTime, TimeSource};

pub type Ticks = i64; // microseconds, signed so pacing math can go negative

pub const TIME_BASE: Ticks = 1_000_000;

pub const PLAYSPEED_PAUSE: i32 = 0;
pub const PLAYSPEED_NORMAL: i32 = 1000;

pub const fn msec_to_time(ms: i64) -> Ticks { ms * (TIME_BASE / 1000) }

pub const fn time_to_msec(t: Ticks) -> i64 { t / (TIME_BASE / 1000) }

/// Negative tick counts become a zero duration.
pub fn ticks_to_duration(t: Ticks) -> Duration {
    Duration::from_micros(t.max(0) as u64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscontinuityKind {
    /// Re-anchor the playback clock, keep speed.
    Normal,
    /// Re-anchor and reset speed to normal.
    Full,
}

/// Clock contract consumed by the pacer and the presentation thread.
///
/// Only the decode thread calls [`Clock::discontinuity`]; every method must be
/// callable concurrently from any thread.
pub trait Clock: Send + Sync {
    /// Monotonic time, unaffected by pause, speed or discontinuities.
    fn absolute_clock(&self) -> Ticks;

    /// Disciplined playback time.
    fn clock(&self) -> Ticks;

    /// Re-anchor the playback clock so that it reads `pts` once `delay` ticks
    /// of absolute time have passed.
    fn discontinuity(&self, kind: DiscontinuityKind, pts: Ticks, delay: Ticks);

    /// Playback time elapsed since the last discontinuity point. Negative while
    /// the clock has not yet reached it.
    fn distance_to_disc(&self) -> Ticks;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fps {
    pub num: u32,
    pub den: u32,
}

impl Fps {
    pub const fn new(num: u32, den: u32) -> Self { Self { num, den } }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 { 0.0 } else { self.num as f64 / self.den as f64 }
    }
}

/// Duration of one frame at `fps`, in ticks.
pub fn frame_ticks(fps: f64) -> Ticks {
    (TIME_BASE as f64 / fps) as Ticks
}
