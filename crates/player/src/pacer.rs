use std::sync::Arc;

use message_queue::MessageQueue;
use native_decoder::{DecodedPicture, PictureFlags};
use playback_clock::{msec_to_time, Clock, Ticks, PLAYSPEED_NORMAL};
use renderer::{RenderError, RenderManager};
use tracing::{debug, info, trace};

use crate::presenter::PresentHandle;
use crate::stats::{PlaybackControl, PlayerStats};

/// Known latency between handing a picture over and it reaching the screen.
pub const FIXED_RENDER_CORRECTION: Ticks = 5_000;
/// Never sleep longer than this on the clock's word alone.
pub const MAX_CLOCK_SLEEP: Ticks = msec_to_time(500);

/// Result of pacing one picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    Ok,
    Dropped,
    /// Dropped and late enough that the decoder should start skipping.
    DroppedVeryLate,
    Abort,
}

/// Per-picture pacing against the clock. Owned by the decode thread.
pub struct Pacer {
    clock: Arc<dyn Clock>,
    renderer: Arc<dyn RenderManager>,
    presenter: PresentHandle,
    queue: Arc<MessageQueue>,
    stats: PlayerStats,
    control: Arc<PlaybackControl>,
    autosync: i64,
    /// Absolute time at which the previous picture's display window ends.
    flip_timestamp: Ticks,
    output_initialized: bool,
}

impl Pacer {
    pub fn new(
        clock: Arc<dyn Clock>,
        renderer: Arc<dyn RenderManager>,
        presenter: PresentHandle,
        queue: Arc<MessageQueue>,
        stats: PlayerStats,
        control: Arc<PlaybackControl>,
        autosync: i64,
    ) -> Self {
        let flip_timestamp = clock.absolute_clock();
        Self {
            clock,
            renderer,
            presenter,
            queue,
            stats,
            control,
            autosync: autosync.max(1),
            flip_timestamp,
            output_initialized: false,
        }
    }

    pub fn flip_timestamp(&self) -> Ticks { self.flip_timestamp }

    pub fn set_flip_timestamp(&mut self, ts: Ticks) { self.flip_timestamp = ts; }

    pub fn clock(&self) -> &dyn Clock { self.clock.as_ref() }

    /// Hand `picture` to the renderer and schedule it for display at `pts`.
    ///
    /// Pictures flagged NOSKIP, and every picture during reverse playback, are
    /// always shown: if the renderer has no free buffer the previous image is
    /// presented again in their slot.
    pub fn output_picture(&mut self, picture: &mut DecodedPicture, pts: Ticks) -> Result<OutputStatus, RenderError> {
        if self.queue.received_abort_request() {
            return Ok(OutputStatus::Abort);
        }

        if !self.output_initialized {
            self.renderer.pre_init();
            self.renderer.configure(picture.width, picture.height)?;
            self.output_initialized = true;
            self.stats.set_output_initialized(true);
            info!(width = picture.width, height = picture.height, "video output initialized");
        }

        let speed = self.control.speed();
        let must_show = picture.flags.contains(PictureFlags::NOSKIP) || speed < 0;
        if must_show {
            picture.flags.remove(PictureFlags::DROPPED);
        }

        if !picture.flags.contains(PictureFlags::DROPPED) {
            match self.renderer.get_image() {
                Some(mut image) => {
                    image.copy_from(&picture.data, picture.width, picture.height);
                    self.renderer.release_image(image);
                }
                None if must_show => debug!(pts, "no free image, showing previous picture again"),
                None => picture.flags.insert(PictureFlags::DROPPED),
            }
        }

        let pts = pts + self.control.video_delay();
        let duration = picture.duration;
        let now = self.clock.absolute_clock();

        let clock_sleep = (pts - self.clock.clock() - FIXED_RENDER_CORRECTION).min(MAX_CLOCK_SLEEP);
        let frame_sleep = (self.flip_timestamp - now).max(0);

        let mut sleep = if speed < 0 {
            0
        } else if self.clock.distance_to_disc().abs() < 3 * duration {
            frame_sleep
        } else if picture.flags.contains(PictureFlags::NOAUTOSYNC) {
            clock_sleep
        } else {
            frame_sleep + (clock_sleep - frame_sleep) / self.autosync
        };

        if speed > PLAYSPEED_NORMAL {
            sleep = sleep * PLAYSPEED_NORMAL as i64 / speed as i64;
        }

        self.stats.set_current_pts(Some(pts - sleep.max(0) - FIXED_RENDER_CORRECTION + self.presenter.delay()));
        self.flip_timestamp = now + sleep.max(0) + duration;

        if sleep < 0 {
            if !picture.flags.contains(PictureFlags::NOSKIP) {
                let late = -sleep;
                if late > 4 * duration {
                    picture.flags.insert(PictureFlags::DROPPED);
                    trace!(pts, late, "picture very late");
                    return Ok(OutputStatus::DroppedVeryLate);
                }
                if late > 2 * duration {
                    picture.flags.insert(PictureFlags::DROPPED);
                    trace!(pts, late, "picture late");
                    return Ok(OutputStatus::Dropped);
                }
            }
            sleep = 0;
        }

        if picture.flags.contains(PictureFlags::DROPPED) {
            return Ok(OutputStatus::Dropped);
        }

        self.presenter.present(now + sleep);
        Ok(OutputStatus::Ok)
    }
}
