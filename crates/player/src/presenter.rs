use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use message_queue::StopToken;
use parking_lot::{Condvar, Mutex};
use playback_clock::{msec_to_time, ticks_to_duration, Clock, Ticks};
use renderer::RenderManager;
use tracing::{debug, warn};

/// Flip durations outside (0, 80ms) are ignored by the delay filter.
const MAX_SANE_FLIP: Ticks = msec_to_time(80);
/// Weight of one flip in the smoothed delay (~4s at typical rates).
const DELAY_FILTER_LEN: i64 = 120;
const IDLE_POLL: Duration = Duration::from_millis(50);
const BUSY_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
struct Slot {
    pending: Option<Ticks>,
    busy: bool,
}

struct Shared {
    slot: Mutex<Slot>,
    cond: Condvar,
    delay: AtomicI64,
    stop: StopToken,
}

/// Decode-thread side of the handoff to the presentation thread.
#[derive(Clone)]
pub struct PresentHandle {
    shared: Arc<Shared>,
    renderer: Arc<dyn RenderManager>,
}

impl PresentHandle {
    /// Handle with no thread behind it; presentations just accumulate in the
    /// slot. Used when pacing is driven synchronously.
    pub fn detached(renderer: Arc<dyn RenderManager>, initial_delay: Ticks) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot::default()),
                cond: Condvar::new(),
                delay: AtomicI64::new(initial_delay),
                stop: StopToken::new(),
            }),
            renderer,
        }
    }

    /// Schedule the most recently released image for display at `timestamp`
    /// (absolute clock). Waits while the previous picture is still being
    /// presented; a picture not yet picked up is superseded.
    pub fn present(&self, timestamp: Ticks) {
        {
            let mut slot = self.shared.slot.lock();
            while slot.busy && !self.shared.stop.is_stopped() {
                self.shared.cond.wait_for(&mut slot, BUSY_POLL);
            }
        }
        self.renderer.prepare_display();
        let mut slot = self.shared.slot.lock();
        if let Some(old) = slot.pending.replace(timestamp) {
            debug!(old, new = timestamp, "superseded undisplayed picture");
        }
        self.shared.cond.notify_all();
    }

    /// Smoothed time a flip takes to reach the screen.
    pub fn delay(&self) -> Ticks { self.shared.delay.load(Ordering::Acquire) }

    /// Target of the picture waiting for the presentation thread, if any.
    pub fn pending(&self) -> Option<Ticks> { self.shared.slot.lock().pending }
}

/// Thread that sleeps until each picture's target time and flips it.
pub struct PresentThread {
    handle: Option<JoinHandle<()>>,
    present: PresentHandle,
}

impl PresentThread {
    pub fn spawn(
        clock: Arc<dyn Clock>,
        renderer: Arc<dyn RenderManager>,
        initial_delay: Ticks,
        max_wait: Ticks,
    ) -> std::io::Result<Self> {
        let present = PresentHandle::detached(renderer.clone(), initial_delay);
        let shared = present.shared.clone();
        let handle = thread::Builder::new()
            .name("video-present".into())
            .spawn(move || present_loop(&shared, clock.as_ref(), renderer.as_ref(), max_wait))?;
        Ok(Self { handle: Some(handle), present })
    }

    pub fn handle(&self) -> PresentHandle { self.present.clone() }

    pub fn delay(&self) -> Ticks { self.present.delay() }

    pub fn stop(&mut self) {
        let shared = &self.present.shared;
        shared.stop.stop();
        {
            let _slot = shared.slot.lock();
            shared.cond.notify_all();
        }
        if let Some(h) = self.handle.take() {
            if h.join().is_err() { warn!("presentation thread panicked"); }
        }
    }
}

impl Drop for PresentThread {
    fn drop(&mut self) { self.stop(); }
}

fn present_loop(shared: &Shared, clock: &dyn Clock, renderer: &dyn RenderManager, max_wait: Ticks) {
    debug!("presentation thread starting");
    loop {
        let target = {
            let mut slot = shared.slot.lock();
            loop {
                if shared.stop.is_stopped() {
                    debug!("presentation thread stopping");
                    return;
                }
                if let Some(t) = slot.pending.take() {
                    slot.busy = true;
                    break t;
                }
                shared.cond.wait_for(&mut slot, IDLE_POLL);
            }
        };

        let mut remaining = target - clock.absolute_clock();
        if remaining > max_wait {
            warn!(remaining, "presentation target too far ahead, capping wait");
            remaining = max_wait;
        }
        if !sleep_unless_stopped(shared, ticks_to_duration(remaining)) { return; }

        let flip_start = clock.absolute_clock();
        if let Err(e) = renderer.flip_page() {
            warn!(error = %e, "flip failed");
        }
        let flip_time = clock.absolute_clock() - flip_start;
        if 0 < flip_time && flip_time < MAX_SANE_FLIP {
            let delay = shared.delay.load(Ordering::Acquire);
            let smoothed = ((DELAY_FILTER_LEN - 1) * delay + flip_time) / DELAY_FILTER_LEN;
            shared.delay.store(smoothed, Ordering::Release);
        }

        let mut slot = shared.slot.lock();
        slot.busy = false;
        shared.cond.notify_all();
    }
}

/// Returns false if the stop token was raised during the wait.
fn sleep_unless_stopped(shared: &Shared, wait: Duration) -> bool {
    let deadline = Instant::now() + wait;
    let mut slot = shared.slot.lock();
    loop {
        if shared.stop.is_stopped() { return false; }
        if Instant::now() >= deadline { return true; }
        shared.cond.wait_until(&mut slot, deadline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playback_clock::SystemClock;
    use renderer::HeadlessRenderer;

    fn upload(r: &HeadlessRenderer) {
        r.release_image(r.get_image().unwrap());
    }

    fn wait_picked_up(handle: &PresentHandle) {
        while handle.pending().is_some() {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_detached_present_supersedes() {
        let r = Arc::new(HeadlessRenderer::new());
        r.configure(4, 4).unwrap();
        let handle = PresentHandle::detached(r.clone(), 0);
        handle.present(100);
        handle.present(200);
        assert_eq!(handle.pending(), Some(200));
        assert_eq!(r.stats().prepares, 2);
    }

    #[test]
    fn test_flips_at_target_time() {
        let clock = Arc::new(SystemClock::new());
        let r = Arc::new(HeadlessRenderer::new());
        r.configure(4, 4).unwrap();
        let mut thread = PresentThread::spawn(clock.clone(), r.clone(), msec_to_time(20), msec_to_time(500)).unwrap();
        let handle = thread.handle();

        upload(&r);
        let start = Instant::now();
        handle.present(clock.absolute_clock() + msec_to_time(30));
        wait_picked_up(&handle);
        // Second present waits for the first flip
        upload(&r);
        handle.present(clock.absolute_clock());
        assert!(start.elapsed() >= Duration::from_millis(25));
        thread.stop();
        assert!(r.stats().flips >= 1);
    }

    #[test]
    fn test_far_target_is_capped() {
        let clock = Arc::new(SystemClock::new());
        let r = Arc::new(HeadlessRenderer::new());
        r.configure(4, 4).unwrap();
        let mut thread = PresentThread::spawn(clock.clone(), r.clone(), 0, msec_to_time(50)).unwrap();
        upload(&r);
        thread.handle().present(clock.absolute_clock() + msec_to_time(10_000));
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(r.stats().flips, 1);
        thread.stop();
    }

    #[test]
    fn test_delay_converges_slowly_toward_flip_cost() {
        let clock = Arc::new(SystemClock::new());
        let r = Arc::new(HeadlessRenderer::new().with_flip_cost(Duration::from_millis(10)));
        r.configure(4, 4).unwrap();
        let mut thread = PresentThread::spawn(clock.clone(), r.clone(), msec_to_time(20), msec_to_time(500)).unwrap();
        let handle = thread.handle();
        for _ in 0..5 {
            upload(&r);
            handle.present(clock.absolute_clock());
            wait_picked_up(&handle);
        }
        std::thread::sleep(Duration::from_millis(30));
        thread.stop();
        let delay = thread.delay();
        // Five ~10ms flips barely move a 20ms estimate
        assert!(delay < msec_to_time(20));
        assert!(delay > msec_to_time(18));
    }

    #[test]
    fn test_stop_interrupts_wait() {
        let clock = Arc::new(SystemClock::new());
        let r = Arc::new(HeadlessRenderer::new());
        r.configure(4, 4).unwrap();
        let mut thread = PresentThread::spawn(clock.clone(), r.clone(), 0, msec_to_time(500)).unwrap();
        thread.handle().present(clock.absolute_clock() + msec_to_time(400));
        std::thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        thread.stop();
        assert!(start.elapsed() < Duration::from_millis(200));
        assert_eq!(r.stats().flips, 0);
    }
}
