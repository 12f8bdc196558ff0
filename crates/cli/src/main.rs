use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use message_queue::{DemuxPacket, Message, MessageQueue, QueueError};
use native_decoder::{
    CodecError, CodecFactory, CodecId, DecodeStatus, DecodedPicture, DecoderConfig, FrameType, StreamHint, VideoCodec,
};
use player::{OutputStatus, PlayerConfig, PlayerEvent, StreamTiming, VideoPlayer};
use playback_clock::{Clock, SystemClock, Ticks};
use renderer::HeadlessRenderer;
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dvdplay-cli")]
#[command(about = "Drive a synthetic video stream through the decode and presentation pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a synthetic stream on a headless renderer
    Play {
        /// Player configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stream frame rate; 0 leaves it unknown
        #[arg(long, default_value = "25")]
        fps: u32,

        /// Number of pictures to send
        #[arg(long, default_value = "250")]
        frames: u32,

        /// Playback speed, 1000 is normal
        #[arg(long, default_value = "1000")]
        speed: i32,

        /// Pictures per group, the first of each is an I-frame
        #[arg(long, default_value = "12")]
        gop: u32,

        /// Decode cost per picture in milliseconds, to provoke late pictures
        #[arg(long, default_value = "0")]
        decode_ms: u64,

        /// Stop sending after this many pictures to simulate a still frame
        #[arg(long)]
        still_after: Option<u32>,

        /// Length of the simulated still frame
        #[arg(long, default_value = "1000")]
        still_ms: u64,

        /// Flip cost of the headless renderer in milliseconds
        #[arg(long, default_value = "2")]
        flip_ms: u64,

        /// Decoder threads; the decode cost is split across them
        #[arg(long, default_value = "0")]
        decoder_threads: u32,

        /// Disable hardware acceleration
        #[arg(long)]
        software: bool,
    },

    /// Print the default player configuration as JSON
    DefaultConfig,
}

/// Stands in for a real codec: one picture per packet, typed by the first
/// payload byte.
struct SyntheticCodec {
    config: DecoderConfig,
    width: u32,
    height: u32,
    decode_cost: Duration,
    ready: Option<DecodedPicture>,
    dropping: bool,
}

impl VideoCodec for SyntheticCodec {
    fn open(&mut self, hint: &StreamHint) -> Result<(), CodecError> {
        if hint.width == 0 || hint.height == 0 {
            return Err(CodecError::Open(format!("bad size {}x{}", hint.width, hint.height)));
        }
        self.width = hint.width;
        self.height = hint.height;
        if self.config.hardware_acceleration {
            info!("no hardware decode path, decoding in software");
        }
        // 0 threads lets the codec decide: one
        let threads = self.config.threads.max(1);
        self.decode_cost /= threads;
        debug!(threads, cost_us = self.decode_cost.as_micros() as u64, "synthetic codec opened");
        Ok(())
    }

    fn decode(&mut self, data: Option<&[u8]>, _pts: Option<Ticks>, dts: Option<Ticks>) -> DecodeStatus {
        let Some(data) = data else { return DecodeStatus::BUFFER };
        let frame_type = match data.first() {
            Some(b'I') => FrameType::I,
            Some(b'B') => FrameType::B,
            Some(_) => FrameType::P,
            None => return DecodeStatus::ERROR,
        };
        if !self.dropping && !self.decode_cost.is_zero() {
            thread::sleep(self.decode_cost);
        }
        let pixels = vec![0x80u8; (self.width * self.height) as usize];
        self.ready = Some(DecodedPicture::new(self.width, self.height, frame_type, pixels).with_dts(dts));
        DecodeStatus::PICTURE | DecodeStatus::BUFFER
    }

    fn get_picture(&mut self) -> Result<DecodedPicture, CodecError> {
        self.ready.take().ok_or(CodecError::NoPicture)
    }

    fn set_drop_state(&mut self, drop: bool) {
        if drop != self.dropping {
            debug!(drop, "synthetic codec drop state");
        }
        self.dropping = drop;
    }

    fn reset(&mut self) { self.ready = None; }

    fn name(&self) -> &str { "synthetic" }
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    frames_sent: u32,
    shown: u64,
    dropped: u64,
    very_late: u64,
    still_frames: u64,
    flips: u64,
    presenter_delay_us: Option<Ticks>,
    elapsed_ms: u128,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Play {
            config,
            fps,
            frames,
            speed,
            gop,
            decode_ms,
            still_after,
            still_ms,
            flip_ms,
            decoder_threads,
            software,
        } => {
            let config = match config {
                Some(path) => PlayerConfig::load(&path).with_context(|| format!("loading {}", path.display()))?,
                None => PlayerConfig::default(),
            };
            let opts = PlayOptions {
                fps,
                frames,
                speed,
                gop: gop.max(1),
                decode_cost: Duration::from_millis(decode_ms),
                still_after,
                still: Duration::from_millis(still_ms),
                flip_cost: Duration::from_millis(flip_ms),
                decoder: DecoderConfig { hardware_acceleration: !software, threads: decoder_threads },
            };
            let summary = play(config, &opts)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::DefaultConfig => {
            println!("{}", serde_json::to_string_pretty(&PlayerConfig::default())?);
        }
    }

    Ok(())
}

struct PlayOptions {
    fps: u32,
    frames: u32,
    speed: i32,
    gop: u32,
    decode_cost: Duration,
    still_after: Option<u32>,
    still: Duration,
    flip_cost: Duration,
    decoder: DecoderConfig,
}

fn play(config: PlayerConfig, opts: &PlayOptions) -> Result<Summary> {
    let clock = Arc::new(SystemClock::new());
    let renderer = Arc::new(HeadlessRenderer::new().with_flip_cost(opts.flip_cost));

    let decode_cost = opts.decode_cost;
    let mut factory = CodecFactory::new(opts.decoder.clone());
    factory.register(CodecId::Mpeg2Video, move |decoder| {
        Box::new(SyntheticCodec {
            config: decoder.clone(),
            width: 0,
            height: 0,
            decode_cost,
            ready: None,
            dropping: false,
        }) as Box<dyn VideoCodec>
    });

    let default_rate = config.default_frame_rate;
    let mut player = VideoPlayer::new(config, clock.clone(), renderer.clone(), Arc::new(factory));
    let events = player.events();
    player.set_speed(opts.speed);
    clock.set_speed(opts.speed);

    let hint = StreamHint::new(CodecId::Mpeg2Video, 320, 240).with_fps(opts.fps, 1);
    player.open_stream(&hint).context("opening synthetic stream")?;

    let frame_time = StreamTiming::from_hint(&hint, default_rate).frame_time;
    let queue = player.queue().clone();
    let (frames, gop, still_after, still) = (opts.frames, opts.gop, opts.still_after, opts.still);
    let producer = thread::Builder::new().name("demux".into()).spawn(move || -> Result<u32, QueueError> {
        send(&queue, Message::GeneralSetClock { pts: Some(0), dts: None })?;
        for i in 0..frames {
            if still_after == Some(i) {
                info!(after = i, ms = still.as_millis() as u64, "holding back packets");
                thread::sleep(still);
            }
            let pts = i as Ticks * frame_time;
            let kind = if i % gop == 0 { b'I' } else { b'P' };
            send(&queue, Message::DemuxerPacket(DemuxPacket::new(vec![kind; 1024], Some(pts), Some(pts))))?;
        }
        Ok(frames)
    })?;

    let start = Instant::now();
    let mut summary = Summary::default();
    let mut last_report = Instant::now();
    loop {
        for event in events.try_iter() {
            match event {
                PlayerEvent::PictureOutput { status: OutputStatus::Ok, .. } => summary.shown += 1,
                PlayerEvent::PictureOutput { status: OutputStatus::Dropped, .. } => summary.dropped += 1,
                PlayerEvent::PictureOutput { status: OutputStatus::DroppedVeryLate, .. } => {
                    summary.dropped += 1;
                    summary.very_late += 1;
                }
                PlayerEvent::StillFrameDetected => summary.still_frames += 1,
                _ => {}
            }
        }
        if last_report.elapsed() >= Duration::from_millis(500) {
            info!(info = %player.video_info(), pts = ?player.current_pts(), "playing");
            last_report = Instant::now();
        }
        if producer.is_finished() && player.queue().is_empty() {
            // Let the last picture reach the screen
            thread::sleep(Duration::from_micros((frame_time * 2) as u64));
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    summary.frames_sent = match producer.join() {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            warn!(error = %e, "producer stopped early");
            0
        }
        Err(_) => anyhow::bail!("producer thread panicked"),
    };
    summary.presenter_delay_us = player.presenter_delay();
    player.close_stream();
    summary.flips = renderer.stats().flips;
    summary.elapsed_ms = start.elapsed().as_millis();
    info!(clock = clock.clock(), "done");
    Ok(summary)
}

/// Put with retry while the queue applies backpressure.
fn send(queue: &MessageQueue, msg: Message) -> Result<(), QueueError> {
    let msg = msg.into_ref();
    loop {
        match queue.put_timeout(msg.clone(), Duration::from_millis(200)) {
            Err(QueueError::Full) => continue,
            other => return other,
        }
    }
}
