//! Render manager contract used by the video pipeline, plus a headless
//! implementation backed by a small ring of CPU image buffers.

use thiserror::Error;

mod headless;

pub use headless::{HeadlessRenderer, RenderStats};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer not configured")]
    NotConfigured,
    #[error("invalid output size {0}x{1}")]
    InvalidSize(u32, u32),
    #[error("render device error: {0}")]
    Device(String),
}

/// Display-owned image leased to the decode thread for one picture copy.
#[derive(Debug)]
pub struct ImageBuffer {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl ImageBuffer {
    pub fn new(index: usize, width: u32, height: u32) -> Self {
        Self { index, width, height, data: Vec::new() }
    }

    /// Copy a decoded picture's pixels into this buffer.
    pub fn copy_from(&mut self, pixels: &[u8], width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.data.clear();
        self.data.extend_from_slice(pixels);
    }
}

/// Output device as seen by the pacer (decode thread) and the presentation
/// thread. Implementations must be callable from both threads.
pub trait RenderManager: Send + Sync {
    fn pre_init(&self);

    fn configure(&self, width: u32, height: u32) -> Result<(), RenderError>;

    /// Lease a free buffer; `None` when every buffer is busy.
    fn get_image(&self) -> Option<ImageBuffer>;

    /// Return a leased buffer once the picture has been copied into it.
    fn release_image(&self, image: ImageBuffer);

    /// Queue the most recently released image for the next flip.
    fn prepare_display(&self);

    /// Put the prepared image on screen.
    fn flip_page(&self) -> Result<(), RenderError>;

    fn uninit(&self);
}
