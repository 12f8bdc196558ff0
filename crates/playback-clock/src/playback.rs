use parking_lot::RwLock;
use tracing::debug;

use crate::source::{ManualTime, MonotonicTime, TimeSource};
use crate::{Clock, DiscontinuityKind, Ticks, PLAYSPEED_NORMAL};

pub type SystemClock = PlaybackClock<MonotonicTime>;
pub type ManualClock = PlaybackClock<ManualTime>;

#[derive(Debug, Clone, Copy)]
struct Anchor {
    start_abs: Ticks,    // absolute time at which the clock reads `base`
    base: Ticks,
    speed: i32,          // PLAYSPEED_NORMAL = 1x
    paused_at: Option<Ticks>,
    disc_pts: Ticks,
}

/// Playback clock derived from a [`TimeSource`].
///
/// `clock() = base + (abs - start_abs) * speed / normal`, frozen while paused.
pub struct PlaybackClock<S: TimeSource> {
    source: S,
    anchor: RwLock<Anchor>,
}

impl SystemClock {
    pub fn new() -> Self { Self::with_source(MonotonicTime::new()) }
}

impl Default for SystemClock {
    fn default() -> Self { Self::new() }
}

impl<S: TimeSource> PlaybackClock<S> {
    pub fn with_source(source: S) -> Self {
        let now = source.now();
        Self {
            source,
            anchor: RwLock::new(Anchor { start_abs: now, base: 0, speed: PLAYSPEED_NORMAL, paused_at: None, disc_pts: 0 }),
        }
    }

    fn clock_at(a: &Anchor, abs: Ticks) -> Ticks {
        let abs = a.paused_at.unwrap_or(abs);
        a.base + (abs - a.start_abs) * a.speed as i64 / PLAYSPEED_NORMAL as i64
    }

    pub fn pause(&self) {
        let now = self.source.now();
        let mut a = self.anchor.write();
        if a.paused_at.is_none() { a.paused_at = Some(now); }
    }

    pub fn resume(&self) {
        let now = self.source.now();
        let mut a = self.anchor.write();
        if let Some(p) = a.paused_at.take() { a.start_abs += now - p; }
    }

    pub fn is_paused(&self) -> bool { self.anchor.read().paused_at.is_some() }

    /// Change speed, re-anchoring so the clock does not jump.
    pub fn set_speed(&self, speed: i32) {
        let now = self.source.now();
        let mut a = self.anchor.write();
        let current = Self::clock_at(&a, now);
        a.base = current;
        a.start_abs = a.paused_at.unwrap_or(now);
        a.speed = speed;
    }

    pub fn speed(&self) -> i32 { self.anchor.read().speed }
}

impl<S: TimeSource> Clock for PlaybackClock<S> {
    fn absolute_clock(&self) -> Ticks { self.source.now() }

    fn clock(&self) -> Ticks {
        let now = self.source.now();
        Self::clock_at(&self.anchor.read(), now)
    }

    fn discontinuity(&self, kind: DiscontinuityKind, pts: Ticks, delay: Ticks) {
        let now = self.source.now();
        let mut a = self.anchor.write();
        let from = a.paused_at.unwrap_or(now);
        a.base = pts;
        a.start_abs = from + delay;
        a.disc_pts = pts;
        if a.paused_at.is_some() { a.paused_at = Some(from); }
        if kind == DiscontinuityKind::Full { a.speed = PLAYSPEED_NORMAL; }
        debug!(?kind, pts, delay, "clock discontinuity");
    }

    fn distance_to_disc(&self) -> Ticks {
        let now = self.source.now();
        let a = self.anchor.read();
        Self::clock_at(&a, now) - a.disc_pts
    }
}
