use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use message_queue::{DemuxPacket, Message, QueueError};
use native_decoder::{
    CodecError, CodecFactory, CodecId, DecodeStatus, DecodedPicture, DecoderConfig, FrameType, StreamHint, VideoCodec,
};
use player::{OutputStatus, PlayerConfig, PlayerError, PlayerEvent, VideoPlayer};
use playback_clock::{Ticks, SystemClock, PLAYSPEED_PAUSE};
use renderer::HeadlessRenderer;

const FT: Ticks = 40_000;

#[derive(Default)]
struct CodecState {
    resets: AtomicU32,
    disposed: AtomicBool,
}

/// One I-frame per packet, timestamped with the packet's dts.
struct FrameCodec {
    state: Arc<CodecState>,
    ready: Option<DecodedPicture>,
}

impl VideoCodec for FrameCodec {
    fn open(&mut self, _hint: &StreamHint) -> Result<(), CodecError> { Ok(()) }

    fn decode(&mut self, data: Option<&[u8]>, _pts: Option<Ticks>, dts: Option<Ticks>) -> DecodeStatus {
        if data.is_none() {
            return DecodeStatus::BUFFER;
        }
        self.ready = Some(DecodedPicture::new(64, 36, FrameType::I, vec![0u8; 64]).with_dts(dts));
        DecodeStatus::PICTURE | DecodeStatus::BUFFER
    }

    fn get_picture(&mut self) -> Result<DecodedPicture, CodecError> {
        self.ready.take().ok_or(CodecError::NoPicture)
    }

    fn set_drop_state(&mut self, _drop: bool) {}

    fn reset(&mut self) {
        self.ready = None;
        self.state.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn dispose(&mut self) { self.state.disposed.store(true, Ordering::SeqCst); }

    fn name(&self) -> &str { "frames" }
}

struct Rig {
    player: VideoPlayer,
    renderer: Arc<HeadlessRenderer>,
    state: Arc<CodecState>,
}

fn rig() -> Rig { rig_with(HeadlessRenderer::new()) }

fn rig_with(renderer: HeadlessRenderer) -> Rig { rig_config(PlayerConfig::default(), renderer) }

fn rig_config(config: PlayerConfig, renderer: HeadlessRenderer) -> Rig {
    let state = Arc::new(CodecState::default());
    let codec_state = state.clone();
    let mut factory = CodecFactory::new(DecoderConfig::default());
    factory.register(CodecId::Mpeg2Video, move |_| {
        Box::new(FrameCodec { state: codec_state.clone(), ready: None }) as Box<dyn VideoCodec>
    });
    let renderer = Arc::new(renderer);
    let player = VideoPlayer::new(
        config,
        Arc::new(SystemClock::new()),
        renderer.clone(),
        Arc::new(factory),
    );
    Rig { player, renderer, state }
}

fn hint() -> StreamHint { StreamHint::new(CodecId::Mpeg2Video, 64, 36).with_fps(25, 1) }

fn packet(pts: Ticks) -> Message {
    Message::DemuxerPacket(DemuxPacket::new(vec![0u8; 512], Some(pts), Some(pts)))
}

#[test]
fn test_realtime_stream_plays_without_drops() {
    // A flip cost near the initial delay estimate keeps that estimate steady
    let mut r = rig_with(HeadlessRenderer::new().with_flip_cost(Duration::from_millis(20)));
    r.player.open_stream(&hint()).unwrap();
    let events = r.player.events();

    r.player.send_message(Message::GeneralSetClock { pts: Some(0), dts: None }).unwrap();
    for i in 0..25 {
        r.player.send_message(packet(i * FT)).unwrap();
    }

    let mut outputs = Vec::new();
    let mut published: Vec<Ticks> = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while outputs.len() < 25 && Instant::now() < deadline {
        while let Ok(e) = events.try_recv() {
            if let PlayerEvent::PictureOutput { pts, status, .. } = e {
                outputs.push((pts, status));
            }
        }
        if let Some(pts) = r.player.current_pts() {
            published.push(pts);
        }
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(outputs.len(), 25);
    assert!(outputs.iter().all(|o| o.1 == OutputStatus::Ok));
    assert!(outputs.windows(2).all(|w| w[0].0 < w[1].0));
    assert!(published.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(r.player.dropped_frames(), 0);
    assert!(r.player.initialized_output_device());
    assert_eq!(r.player.frame_rate(), Some(25.0));

    r.player.close_stream();
    assert!(r.renderer.stats().flips >= 20);
}

#[test]
fn test_still_frame_reemits_last_picture() {
    let mut r = rig();
    r.player.open_stream(&hint()).unwrap();
    let events = r.player.events();
    r.player.send_message(Message::GeneralSetClock { pts: Some(0), dts: None }).unwrap();
    for i in 0..3 {
        r.player.send_message(packet(i * FT)).unwrap();
    }

    // Five still timeouts' worth of silence
    thread::sleep(Duration::from_millis(5 * 4 * 40 + 200));
    assert!(r.player.is_still_frame());
    let seen: Vec<PlayerEvent> = events.try_iter().collect();
    assert!(seen.contains(&PlayerEvent::StillFrameDetected));
    // Re-emits start four frames past the last picture and step one frame each,
    // paced by the clock across the ~1s of silence
    let reemitted: Vec<Ticks> = seen
        .iter()
        .filter_map(|e| match e {
            PlayerEvent::PictureOutput { pts, noskip: true, status: OutputStatus::Ok } if *pts >= 7 * FT => Some(*pts),
            _ => None,
        })
        .collect();
    assert_eq!(reemitted.first(), Some(&(7 * FT)));
    assert!(reemitted.windows(2).all(|w| w[1] - w[0] == FT), "{reemitted:?}");
    assert!((10..=25).contains(&reemitted.len()), "{} re-emits", reemitted.len());

    r.player.send_message(packet(40 * FT)).unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut left = false;
    while !left && Instant::now() < deadline {
        left = events.try_iter().any(|e| e == PlayerEvent::StillFrameLeft);
        thread::sleep(Duration::from_millis(5));
    }
    assert!(left);
    assert!(!r.player.is_still_frame());
}

#[test]
fn test_unusable_default_frame_rate_falls_back() {
    let config = PlayerConfig { default_frame_rate: 0.0, ..PlayerConfig::default() };
    let mut r = rig_config(config, HeadlessRenderer::new());
    r.player.open_stream(&StreamHint::new(CodecId::Mpeg2Video, 64, 36)).unwrap();
    assert_eq!(r.player.frame_rate(), Some(25.0));

    // The decode thread survives its still-frame timeout
    thread::sleep(Duration::from_millis(300));
    assert!(r.player.is_still_frame());
    r.player.send_message(packet(0)).unwrap();
    r.player.close_stream();
    assert!(r.state.disposed.load(Ordering::SeqCst));
}

#[test]
fn test_unsupported_codec_leaves_nothing_running() {
    let mut r = rig();
    let err = r.player.open_stream(&StreamHint::new(CodecId::Vc1, 64, 36)).unwrap_err();
    assert!(matches!(err, PlayerError::Codec(CodecError::UnsupportedCodec(CodecId::Vc1))));
    assert!(!r.player.is_open());
    assert!(matches!(r.player.send_message(Message::VideoNoSkip), Err(PlayerError::NotOpen)));
    assert_eq!(r.renderer.stats().pre_inits, 0);

    // The player is still usable afterwards
    r.player.open_stream(&hint()).unwrap();
    assert!(r.player.is_open());
}

#[test]
fn test_second_open_is_rejected() {
    let mut r = rig();
    r.player.open_stream(&hint()).unwrap();
    assert!(matches!(r.player.open_stream(&hint()), Err(PlayerError::AlreadyOpen)));
}

#[test]
fn test_close_releases_everything() {
    let mut r = rig();
    r.player.open_stream(&hint()).unwrap();
    r.player.send_message(Message::GeneralSetClock { pts: Some(0), dts: None }).unwrap();
    r.player.send_message(packet(0)).unwrap();
    thread::sleep(Duration::from_millis(50));

    r.player.close_stream();
    assert!(r.state.disposed.load(Ordering::SeqCst));
    assert_eq!(r.renderer.stats().configured, None);
    assert!(!r.player.initialized_output_device());
    assert_eq!(r.player.queue().put_message(Message::VideoNoSkip), Err(QueueError::Aborted));

    // Closing twice is harmless, and the stream can be reopened
    r.player.close_stream();
    r.player.open_stream(&hint()).unwrap();
    r.player.send_message(Message::VideoNoSkip).unwrap();
}

#[test]
fn test_close_is_prompt_while_decode_thread_waits() {
    let mut r = rig();
    r.player.open_stream(&hint()).unwrap();
    thread::sleep(Duration::from_millis(30));
    let start = Instant::now();
    r.player.close_stream();
    assert!(start.elapsed() < Duration::from_millis(150), "close took {:?}", start.elapsed());
}

#[test]
fn test_flush_discards_queued_packets() {
    let mut r = rig();
    r.player.set_speed(PLAYSPEED_PAUSE);
    r.player.open_stream(&hint()).unwrap();
    for i in 0..3 {
        r.player.send_message(packet(i * FT)).unwrap();
    }
    thread::sleep(Duration::from_millis(20));
    assert_eq!(r.player.queue().len(), 3);
    assert_eq!(r.player.video_info(), "vq: 0% fr:25.000 dr:0");

    r.player.flush();
    assert!(r.player.queue().is_empty());
    assert_eq!(r.state.resets.load(Ordering::SeqCst), 1);
    assert_eq!(r.player.current_pts(), None);
}
