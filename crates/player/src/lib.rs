//! Video decode and presentation pipeline.
//!
//! A [`VideoPlayer`] owns a byte-capped message queue, a decode thread that
//! paces decoded pictures against a shared [`playback_clock::Clock`], and a
//! presentation thread that flips each picture at its target time.

mod config;
mod decode_loop;
mod error;
mod pacer;
mod player;
mod presenter;
mod stats;
mod stream;

pub use config::{PlayerConfig, SyncMethod};
pub use decode_loop::{DecodeLoop, LoopHandles, SharedCodec};
pub use error::PlayerError;
pub use pacer::{OutputStatus, Pacer, FIXED_RENDER_CORRECTION, MAX_CLOCK_SLEEP};
pub use player::VideoPlayer;
pub use presenter::{PresentHandle, PresentThread};
pub use stats::{PlaybackControl, PlayerEvent, PlayerStats};
pub use stream::StreamTiming;
