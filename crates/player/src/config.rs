use std::fs;
use std::path::Path;
use std::time::Duration;

use message_queue::DEFAULT_MAX_DATA_SIZE;
use playback_clock::{msec_to_time, Ticks};
use serde::{Deserialize, Serialize};

use crate::error::PlayerError;

/// How decoded pictures are locked to the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMethod {
    /// Pace every picture against its timestamp.
    #[default]
    Pts,
    /// Blend frame-duration pacing with the clock by the stream's autosync factor.
    FrameDuration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Byte cap of the packet queue.
    pub max_queue_bytes: usize,
    /// User A/V offset added to every picture's timestamp.
    pub video_delay_ms: i64,
    /// Display aspect override, 0 to keep the stream's.
    pub forced_aspect_ratio: f32,
    pub sync_method: SyncMethod,
    /// Used when the stream does not report a usable frame rate.
    pub default_frame_rate: f64,
    /// Upper bound on one presentation wait.
    pub present_max_wait_ms: u64,
    /// Starting value of the smoothed flip latency.
    pub initial_present_delay_ms: i64,
    /// How long `send_message` waits for queue space.
    pub send_timeout_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            max_queue_bytes: DEFAULT_MAX_DATA_SIZE,
            video_delay_ms: 0,
            forced_aspect_ratio: 0.0,
            sync_method: SyncMethod::Pts,
            default_frame_rate: 25.0,
            present_max_wait_ms: 500,
            initial_present_delay_ms: 20,
            send_timeout_ms: 1000,
        }
    }
}

impl PlayerConfig {
    pub fn load(path: &Path) -> Result<Self, PlayerError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn video_delay(&self) -> Ticks { msec_to_time(self.video_delay_ms) }

    pub fn present_max_wait(&self) -> Ticks { msec_to_time(self.present_max_wait_ms as i64) }

    pub fn initial_present_delay(&self) -> Ticks { msec_to_time(self.initial_present_delay_ms) }

    pub fn send_timeout(&self) -> Duration { Duration::from_millis(self.send_timeout_ms) }
}
