use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::Ticks;

/// Absolute time base for a [`crate::PlaybackClock`].
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Ticks;
}

/// Wall-clock source backed by [`Instant`]; starts at zero.
#[derive(Debug, Clone)]
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self { Self { origin: Instant::now() } }
}

impl Default for MonotonicTime {
    fn default() -> Self { Self::new() }
}

impl TimeSource for MonotonicTime {
    fn now(&self) -> Ticks { self.origin.elapsed().as_micros() as Ticks }
}

/// Hand-driven source for deterministic pacing tests and simulations.
#[derive(Debug, Clone, Default)]
pub struct ManualTime(Arc<AtomicI64>);

impl ManualTime {
    pub fn new(start: Ticks) -> Self { Self(Arc::new(AtomicI64::new(start))) }

    pub fn set(&self, t: Ticks) { self.0.store(t, Ordering::SeqCst); }

    pub fn advance(&self, dt: Ticks) { self.0.fetch_add(dt, Ordering::SeqCst); }
}

impl TimeSource for ManualTime {
    fn now(&self) -> Ticks { self.0.load(Ordering::SeqCst) }
}
