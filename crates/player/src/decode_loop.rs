use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use message_queue::{DemuxPacket, Message, MessageQueue, QueueError, StopToken, SyncSource};
use native_decoder::{DecodedPicture, FrameType, PictureFlags, VideoCodec};
use parking_lot::Mutex;
use playback_clock::{ticks_to_duration, DiscontinuityKind, Ticks, PLAYSPEED_PAUSE};
use tracing::{debug, error, info, trace, warn};

use crate::config::SyncMethod;
use crate::pacer::{OutputStatus, Pacer};
use crate::stats::{PlaybackControl, PlayerEvent, PlayerStats};
use crate::stream::StreamTiming;

/// Pictures protected from dropping after a barrier, a no-skip request or a
/// still frame.
const NOSKIP_CREDITS: u32 = 5;
/// Past this many consecutive drops one picture is shown regardless.
const MAX_DROPS_IN_ROW: u32 = 30;
const PAUSE_POLL: Duration = Duration::from_millis(5);

pub type SharedCodec = Arc<Mutex<Box<dyn VideoCodec>>>;

/// Handles the decode thread shares with its owner.
#[derive(Clone)]
pub struct LoopHandles {
    pub queue: Arc<MessageQueue>,
    pub stats: PlayerStats,
    pub control: Arc<PlaybackControl>,
    pub stop: StopToken,
    pub events: Sender<PlayerEvent>,
}

/// Message-driven decode state machine. Runs on the decode thread and owns
/// all pacing state.
pub struct DecodeLoop {
    codec: SharedCodec,
    pacer: Pacer,
    handles: LoopHandles,
    timing: StreamTiming,
    sync_method: SyncMethod,
    forced_aspect: f32,

    pts: Ticks,
    drop_requested: bool,
    no_skip_credits: u32,
    dropped_in_row: u32,
    still_frame: bool,
    last_picture: Option<DecodedPicture>,
}

impl DecodeLoop {
    pub fn new(
        codec: SharedCodec,
        pacer: Pacer,
        handles: LoopHandles,
        timing: StreamTiming,
        sync_method: SyncMethod,
        forced_aspect: f32,
    ) -> Self {
        Self {
            codec,
            pacer,
            handles,
            timing,
            sync_method,
            forced_aspect,
            pts: 0,
            drop_requested: false,
            no_skip_credits: 0,
            dropped_in_row: 0,
            still_frame: false,
            last_picture: None,
        }
    }

    pub fn run(&mut self) {
        info!(frame_rate = self.timing.frame_rate, autosync = self.timing.autosync, "video decode thread started");
        while !self.handles.stop.is_stopped() {
            while self.handles.control.speed() == PLAYSPEED_PAUSE
                && !self.handles.queue.received_abort_request()
                && !self.handles.stop.is_stopped()
            {
                thread::sleep(PAUSE_POLL);
            }

            let timeout = if self.still_frame { self.timing.frame_time / 4 } else { self.timing.frame_time * 4 };
            match self.handles.queue.get(ticks_to_duration(timeout)) {
                Ok(msg) => self.handle_message(&msg),
                Err(QueueError::Timeout) => self.on_queue_timeout(),
                Err(e) => {
                    debug!(error = %e, "leaving decode loop");
                    break;
                }
            }
        }
        info!(dropped = self.handles.stats.dropped_frames(), "video decode thread finished");
    }

    /// No message within the timeout: the source may be showing a still.
    pub fn on_queue_timeout(&mut self) {
        if !self.still_frame {
            self.still_frame = true;
            self.handles.stats.set_still_frame(true);
            self.pts += self.timing.frame_time * 4;
            info!(pts = self.pts, "still frame detected");
            self.emit(PlayerEvent::StillFrameDetected);
        }

        let Some(mut picture) = self.last_picture.take() else { return };
        if picture.is_allocated() {
            picture.flags.remove(PictureFlags::INTERLACED);
            picture.flags.insert(PictureFlags::NOSKIP);
            let status = self.output(&mut picture);
            self.emit(PlayerEvent::PictureOutput { pts: self.pts, status, noskip: true });
            self.pts += self.timing.frame_time;
        }
        self.last_picture = Some(picture);
    }

    pub fn handle_message(&mut self, msg: &Message) {
        match msg {
            Message::GeneralSynchronize(barrier) => {
                if !barrier.wait(&self.handles.stop, SyncSource::Video) {
                    return;
                }
                debug!("synchronized with other streams");
                self.no_skip_credits = NOSKIP_CREDITS;
                self.emit(PlayerEvent::Synchronized);
            }
            Message::GeneralSetClock { pts, dts } => {
                if let Some(ts) = pts.or(*dts) {
                    self.pts = ts;
                }
                let clock = self.pacer.clock();
                let delay = (self.pacer.flip_timestamp() - clock.absolute_clock()).clamp(0, self.timing.frame_time);
                clock.discontinuity(DiscontinuityKind::Normal, self.pts, delay);
                info!(pts = self.pts, delay, "clock set");
                self.emit(PlayerEvent::ClockSet { pts: self.pts, delay });
            }
            Message::GeneralResync { pts, dts } => {
                if let Some(ts) = pts.or(*dts) {
                    self.pts = ts;
                }
                debug!(pts = self.pts, "resync");
                self.emit(PlayerEvent::Resynced { pts: self.pts });
            }
            Message::VideoNoSkip => {
                self.no_skip_credits = NOSKIP_CREDITS;
                self.decode_message(msg);
            }
            Message::VideoSetAspect(aspect) => {
                debug!(aspect, "forced aspect ratio");
                self.forced_aspect = *aspect;
            }
            Message::GeneralFlush | Message::DemuxerPacket(_) => self.decode_message(msg),
        }
    }

    fn decode_message(&mut self, msg: &Message) {
        if self.still_frame {
            self.still_frame = false;
            self.handles.stats.set_still_frame(false);
            self.no_skip_credits = NOSKIP_CREDITS;
            info!("still frame left");
            self.emit(PlayerEvent::StillFrameLeft);
        }

        // Held for the whole decode, fetch and pace so a flush cannot interleave.
        let codec = self.codec.clone();
        let mut codec = codec.lock();

        if self.dropped_in_row > MAX_DROPS_IN_ROW {
            warn!(dropped = self.dropped_in_row, "too many consecutive drops, forcing a picture out");
            self.no_skip_credits += 1;
            self.dropped_in_row = 0;
        }
        if self.handles.control.speed() < 0 {
            self.no_skip_credits = NOSKIP_CREDITS;
        }
        if self.no_skip_credits > 0 {
            self.drop_requested = false;
        }
        codec.set_drop_state(self.drop_requested);

        match msg {
            Message::GeneralFlush => {
                debug!("flushing decoder");
                codec.reset();
                self.emit(PlayerEvent::DecoderReset);
            }
            Message::DemuxerPacket(packet) => self.decode_packet(&mut **codec, packet),
            _ => {}
        }
    }

    fn decode_packet(&mut self, codec: &mut dyn VideoCodec, packet: &DemuxPacket) {
        let mut status = codec.decode(Some(packet.data.as_ref()), packet.pts, packet.dts);
        while !self.handles.stop.is_stopped() && !status.has_error() {
            if status.has_picture() {
                match codec.get_picture() {
                    Ok(picture) => {
                        if self.process_picture(picture, packet.dts) == OutputStatus::Abort {
                            codec.decode(None, None, None);
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(codec = codec.name(), error = %e, "failed to get picture, resetting decoder");
                        codec.reset();
                        self.emit(PlayerEvent::DecoderReset);
                        break;
                    }
                }
            }
            if status.needs_buffer() {
                break;
            }
            status = codec.decode(None, None, None);
        }

        if status.has_error() {
            warn!(codec = codec.name(), "decoder error, resetting");
            codec.reset();
            self.emit(PlayerEvent::DecoderReset);
        }
    }

    /// `packet_dts` re-anchors pts on I and undefined frames unless the codec
    /// reported its own decode timestamp for the picture.
    fn process_picture(&mut self, mut picture: DecodedPicture, packet_dts: Option<Ticks>) -> OutputStatus {
        if picture.duration <= 0 {
            picture.duration = self.timing.frame_time;
        }
        if self.no_skip_credits > 0 {
            picture.flags.insert(PictureFlags::NOSKIP);
            self.no_skip_credits -= 1;
        }
        if self.sync_method == SyncMethod::Pts {
            picture.flags.insert(PictureFlags::NOAUTOSYNC);
        }
        if matches!(picture.frame_type, FrameType::I | FrameType::Undefined) {
            if let Some(dts) = picture.dts.or(packet_dts) {
                self.pts = dts;
            }
        }
        if self.forced_aspect > 0.0 {
            apply_forced_aspect(&mut picture, self.forced_aspect);
        }

        let noskip = picture.flags.contains(PictureFlags::NOSKIP);
        let mut status = OutputStatus::Ok;
        for _ in 0..=picture.repeat {
            status = self.output(&mut picture);
            self.emit(PlayerEvent::PictureOutput { pts: self.pts, status, noskip });
            if status == OutputStatus::Abort {
                break;
            }
            self.pts += picture.duration;
        }

        self.drop_requested = false;
        match status {
            OutputStatus::Ok => self.dropped_in_row = 0,
            OutputStatus::Dropped | OutputStatus::DroppedVeryLate => {
                self.handles.stats.add_dropped();
                self.dropped_in_row += 1;
                if status == OutputStatus::DroppedVeryLate {
                    self.drop_requested = true;
                }
            }
            OutputStatus::Abort => {}
        }

        self.last_picture = Some(picture);
        status
    }

    fn output(&mut self, picture: &mut DecodedPicture) -> OutputStatus {
        match self.pacer.output_picture(picture, self.pts) {
            Ok(status) => {
                trace!(pts = self.pts, ?status, "picture paced");
                status
            }
            Err(e) => {
                error!(error = %e, pts = self.pts, "failed to output picture");
                OutputStatus::Abort
            }
        }
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.handles.events.try_send(event);
    }

    pub fn pts(&self) -> Ticks { self.pts }

    pub fn is_still_frame(&self) -> bool { self.still_frame }
}

/// Narrow the display width to the forced ratio, or shorten the display
/// height when that would exceed the coded width.
fn apply_forced_aspect(picture: &mut DecodedPicture, aspect: f32) {
    let mut width = (picture.display_height as f32 * aspect) as u32;
    let mut height = picture.display_height;
    if width > picture.width {
        width = picture.width;
        height = (width as f32 / aspect) as u32;
    }
    picture.display_width = width;
    picture.display_height = height;
}
