use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{ImageBuffer, RenderError, RenderManager};

const DEFAULT_BUFFERS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub configured: Option<(u32, u32)>,
    pub pre_inits: u32,
    pub uploads: u64,
    pub refused: u64,
    pub prepares: u64,
    pub flips: u64,
    /// Buffer currently on screen.
    pub shown: Option<usize>,
}

struct Ring {
    buffers: Vec<Option<ImageBuffer>>, // None while leased
    last_written: Option<usize>,
    pending: Option<usize>,
    stats: RenderStats,
}

/// Renderer without a display. Buffers rotate like a swap chain: the one on
/// screen and the one queued for the next flip are never handed out.
pub struct HeadlessRenderer {
    ring: Mutex<Ring>,
    flip_cost: Duration,
}

impl HeadlessRenderer {
    pub fn new() -> Self { Self::with_buffers(DEFAULT_BUFFERS) }

    pub fn with_buffers(n: usize) -> Self {
        let n = n.max(1);
        Self {
            ring: Mutex::new(Ring {
                buffers: (0..n).map(|i| Some(ImageBuffer::new(i, 0, 0))).collect(),
                last_written: None,
                pending: None,
                stats: RenderStats::default(),
            }),
            flip_cost: Duration::ZERO,
        }
    }

    /// Make every flip block for `cost`, emulating a wait for vertical blank.
    pub fn with_flip_cost(mut self, cost: Duration) -> Self {
        self.flip_cost = cost;
        self
    }

    pub fn stats(&self) -> RenderStats { self.ring.lock().stats.clone() }
}

impl Default for HeadlessRenderer {
    fn default() -> Self { Self::new() }
}

impl RenderManager for HeadlessRenderer {
    fn pre_init(&self) {
        self.ring.lock().stats.pre_inits += 1;
    }

    fn configure(&self, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 { return Err(RenderError::InvalidSize(width, height)); }
        let mut ring = self.ring.lock();
        for img in ring.buffers.iter_mut().flatten() {
            img.width = width;
            img.height = height;
        }
        ring.stats.configured = Some((width, height));
        info!(width, height, buffers = ring.buffers.len(), "headless renderer configured");
        Ok(())
    }

    fn get_image(&self) -> Option<ImageBuffer> {
        let mut ring = self.ring.lock();
        ring.stats.configured?;
        let (shown, pending) = (ring.stats.shown, ring.pending);
        let free = (0..ring.buffers.len())
            .find(|&i| Some(i) != shown && Some(i) != pending && ring.buffers[i].is_some());
        match free {
            Some(i) => ring.buffers[i].take(),
            None => {
                ring.stats.refused += 1;
                debug!(?shown, ?pending, "no free render buffer");
                None
            }
        }
    }

    fn release_image(&self, image: ImageBuffer) {
        let mut ring = self.ring.lock();
        let idx = image.index;
        if idx >= ring.buffers.len() || ring.buffers[idx].is_some() {
            warn!(idx, "released image that was not leased");
            return;
        }
        ring.buffers[idx] = Some(image);
        ring.last_written = Some(idx);
        ring.stats.uploads += 1;
    }

    fn prepare_display(&self) {
        let mut ring = self.ring.lock();
        if let Some(idx) = ring.last_written.take() { ring.pending = Some(idx); }
        ring.stats.prepares += 1;
    }

    fn flip_page(&self) -> Result<(), RenderError> {
        {
            let mut ring = self.ring.lock();
            if ring.stats.configured.is_none() { return Err(RenderError::NotConfigured); }
            if let Some(idx) = ring.pending.take() { ring.stats.shown = Some(idx); }
            ring.stats.flips += 1;
        }
        if !self.flip_cost.is_zero() { thread::sleep(self.flip_cost); }
        Ok(())
    }

    fn uninit(&self) {
        let mut ring = self.ring.lock();
        ring.stats.configured = None;
        ring.stats.shown = None;
        ring.pending = None;
        ring.last_written = None;
        debug!("headless renderer uninitialized");
    }
}
