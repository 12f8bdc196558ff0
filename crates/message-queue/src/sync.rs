use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::stop::StopToken;

const STOP_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSource {
    Audio,
    Video,
    Subtitle,
}

impl SyncSource {
    pub const fn bit(self) -> u32 {
        match self {
            SyncSource::Audio => 0x1,
            SyncSource::Video => 0x2,
            SyncSource::Subtitle => 0x4,
        }
    }
}

/// Rendezvous shared (through one message per stream queue) by every stream
/// that must reach the same point before playback continues.
#[derive(Debug)]
pub struct SyncBarrier {
    sources: u32,
    reached: Mutex<u32>,
    cond: Condvar,
}

impl SyncBarrier {
    pub fn new(sources: &[SyncSource]) -> Self {
        let sources = sources.iter().fold(0, |acc, s| acc | s.bit());
        Self { sources, reached: Mutex::new(0), cond: Condvar::new() }
    }

    /// Mark `source` as arrived and block until all parties have, or `stop` is
    /// raised. Returns true when the barrier was released normally.
    pub fn wait(&self, stop: &StopToken, source: SyncSource) -> bool {
        let mut reached = self.reached.lock();
        *reached |= source.bit() & self.sources;
        self.cond.notify_all();
        while *reached & self.sources != self.sources {
            if stop.is_stopped() { return false; }
            self.cond.wait_for(&mut reached, STOP_POLL);
        }
        true
    }

    pub fn is_released(&self) -> bool {
        *self.reached.lock() & self.sources == self.sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_single_party_passes_immediately() {
        let barrier = SyncBarrier::new(&[SyncSource::Video]);
        assert!(barrier.wait(&StopToken::new(), SyncSource::Video));
        assert!(barrier.is_released());
    }

    #[test]
    fn test_waits_for_all_parties() {
        let barrier = Arc::new(SyncBarrier::new(&[SyncSource::Audio, SyncSource::Video]));
        let b = barrier.clone();
        let audio = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            b.wait(&StopToken::new(), SyncSource::Audio)
        });
        assert!(barrier.wait(&StopToken::new(), SyncSource::Video));
        assert!(audio.join().unwrap());
    }

    #[test]
    fn test_stop_releases_waiter() {
        let barrier = Arc::new(SyncBarrier::new(&[SyncSource::Audio, SyncSource::Video]));
        let stop = StopToken::new();
        let (b, s) = (barrier.clone(), stop.clone());
        let video = thread::spawn(move || b.wait(&s, SyncSource::Video));
        thread::sleep(Duration::from_millis(20));
        stop.stop();
        assert!(!video.join().unwrap());
        assert!(!barrier.is_released());
    }
}
