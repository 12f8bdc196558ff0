use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use message_queue::{Message, MessageQueue, StopToken};
use native_decoder::{CodecFactory, StreamHint};
use parking_lot::Mutex;
use playback_clock::{Clock, Ticks};
use renderer::RenderManager;
use tracing::{debug, info, warn};

use crate::config::PlayerConfig;
use crate::decode_loop::{DecodeLoop, LoopHandles, SharedCodec};
use crate::error::PlayerError;
use crate::pacer::Pacer;
use crate::presenter::PresentThread;
use crate::stats::{PlaybackControl, PlayerEvent, PlayerStats};
use crate::stream::StreamTiming;

const EVENT_CAPACITY: usize = 1024;

struct OpenStream {
    codec: SharedCodec,
    timing: StreamTiming,
    stop: StopToken,
    decode: Option<JoinHandle<()>>,
    presenter: PresentThread,
}

/// Video half of a player: owns the packet queue, the decode thread and the
/// presentation thread for one stream at a time.
pub struct VideoPlayer {
    config: PlayerConfig,
    clock: Arc<dyn Clock>,
    renderer: Arc<dyn RenderManager>,
    factory: Arc<CodecFactory>,
    queue: Arc<MessageQueue>,
    stats: PlayerStats,
    control: Arc<PlaybackControl>,
    events_tx: Sender<PlayerEvent>,
    events_rx: Receiver<PlayerEvent>,
    stream: Option<OpenStream>,
}

impl VideoPlayer {
    pub fn new(
        config: PlayerConfig,
        clock: Arc<dyn Clock>,
        renderer: Arc<dyn RenderManager>,
        factory: Arc<CodecFactory>,
    ) -> Self {
        let queue = Arc::new(MessageQueue::new(config.max_queue_bytes));
        let control = Arc::new(PlaybackControl::new(config.video_delay()));
        let (events_tx, events_rx) = bounded(EVENT_CAPACITY);
        Self {
            config,
            clock,
            renderer,
            factory,
            queue,
            stats: PlayerStats::new(),
            control,
            events_tx,
            events_rx,
            stream: None,
        }
    }

    /// Open a codec for `hint` and start the decode and presentation threads.
    /// On failure nothing is left running.
    pub fn open_stream(&mut self, hint: &StreamHint) -> Result<(), PlayerError> {
        if self.stream.is_some() {
            return Err(PlayerError::AlreadyOpen);
        }

        let timing = StreamTiming::from_hint(hint, self.config.default_frame_rate);
        let codec = self.factory.create_decoder(hint)?;
        let codec: SharedCodec = Arc::new(Mutex::new(codec));

        self.queue.set_max_data_size(self.config.max_queue_bytes);
        self.queue.init();
        self.stats.reset();
        self.stats.set_output_initialized(false);

        let mut presenter = match PresentThread::spawn(
            self.clock.clone(),
            self.renderer.clone(),
            self.config.initial_present_delay(),
            self.config.present_max_wait(),
        ) {
            Ok(p) => p,
            Err(source) => {
                codec.lock().dispose();
                return Err(PlayerError::Thread { name: "video-present", source });
            }
        };

        let stop = StopToken::new();
        let handles = LoopHandles {
            queue: self.queue.clone(),
            stats: self.stats.clone(),
            control: self.control.clone(),
            stop: stop.clone(),
            events: self.events_tx.clone(),
        };
        let pacer = Pacer::new(
            self.clock.clone(),
            self.renderer.clone(),
            presenter.handle(),
            self.queue.clone(),
            self.stats.clone(),
            self.control.clone(),
            timing.autosync,
        );
        let mut decode = DecodeLoop::new(
            codec.clone(),
            pacer,
            handles,
            timing,
            self.config.sync_method,
            self.config.forced_aspect_ratio,
        );

        let decode = match thread::Builder::new().name("video-decode".into()).spawn(move || decode.run()) {
            Ok(h) => h,
            Err(source) => {
                presenter.stop();
                codec.lock().dispose();
                return Err(PlayerError::Thread { name: "video-decode", source });
            }
        };

        info!(
            codec = ?hint.codec,
            width = hint.width,
            height = hint.height,
            frame_rate = timing.frame_rate,
            "video stream opened"
        );
        self.stream = Some(OpenStream { codec, timing, stop, decode: Some(decode), presenter });
        Ok(())
    }

    /// Stop both threads and release the codec. Idempotent.
    pub fn close_stream(&mut self) {
        let Some(mut stream) = self.stream.take() else { return };
        debug!("closing video stream");

        self.queue.abort();
        stream.stop.stop();
        if let Some(h) = stream.decode.take() {
            if h.join().is_err() {
                warn!("decode thread panicked");
            }
        }
        self.queue.end();
        stream.presenter.stop();
        stream.codec.lock().dispose();
        self.renderer.uninit();
        self.stats.set_output_initialized(false);
        info!(dropped = self.stats.dropped_frames(), "video stream closed");
    }

    pub fn is_open(&self) -> bool { self.stream.is_some() }

    /// Queue a message for the decode thread, waiting up to the configured
    /// send timeout for space.
    pub fn send_message(&self, msg: Message) -> Result<(), PlayerError> {
        if self.stream.is_none() {
            return Err(PlayerError::NotOpen);
        }
        self.queue.put_timeout(msg.into_ref(), self.config.send_timeout())?;
        Ok(())
    }

    pub fn queue(&self) -> &Arc<MessageQueue> { &self.queue }

    /// Drop everything queued and reset the decoder. Waits for any picture in
    /// flight on the decode thread.
    pub fn flush(&self) {
        match &self.stream {
            Some(stream) => {
                let mut codec = stream.codec.lock();
                self.queue.flush();
                codec.reset();
            }
            None => self.queue.flush(),
        }
        self.stats.set_current_pts(None);
        debug!("video player flushed");
    }

    pub fn set_speed(&self, speed: i32) { self.control.set_speed(speed); }

    pub fn speed(&self) -> i32 { self.control.speed() }

    /// A/V offset added to every picture's pts.
    pub fn set_delay(&self, delay: Ticks) { self.control.set_video_delay(delay); }

    pub fn delay(&self) -> Ticks { self.control.video_delay() }

    pub fn current_pts(&self) -> Option<Ticks> { self.stats.current_pts() }

    pub fn dropped_frames(&self) -> u64 { self.stats.dropped_frames() }

    pub fn initialized_output_device(&self) -> bool { self.stats.output_initialized() }

    pub fn is_still_frame(&self) -> bool { self.stats.is_still_frame() }

    pub fn frame_rate(&self) -> Option<f64> { self.stream.as_ref().map(|s| s.timing.frame_rate) }

    /// Smoothed flip latency measured by the presentation thread.
    pub fn presenter_delay(&self) -> Option<Ticks> { self.stream.as_ref().map(|s| s.presenter.delay()) }

    /// One-line status: queue level, frame rate, dropped pictures.
    pub fn video_info(&self) -> String {
        format!(
            "vq:{:2}% fr:{:.3} dr:{}",
            self.queue.level(),
            self.frame_rate().unwrap_or(0.0),
            self.dropped_frames()
        )
    }

    pub fn events(&self) -> Receiver<PlayerEvent> { self.events_rx.clone() }

    pub fn stats(&self) -> PlayerStats { self.stats.clone() }

    pub fn config(&self) -> &PlayerConfig { &self.config }
}

impl Drop for VideoPlayer {
    fn drop(&mut self) { self.close_stream(); }
}
