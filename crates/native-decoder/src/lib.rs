//! Video decoder adapter interface
//!
//! Concrete codecs live outside the pipeline. They implement [`VideoCodec`] and
//! are registered in a [`CodecFactory`] under the [`CodecId`] they handle; the
//! player asks the factory for a decoder when a stream is opened.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::BitOr;
use thiserror::Error;
use tracing::info;

use playback_clock::Ticks;

mod picture;

pub use picture::{DecodedPicture, FrameType, PictureFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodecId {
    Mpeg1Video,
    Mpeg2Video,
    Mpeg4,
    H264,
    Vc1,
    Wmv3,
    Other(u32),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unsupported video codec {0:?}")]
    UnsupportedCodec(CodecId),
    #[error("codec open failed: {0}")]
    Open(String),
    #[error("no picture available")]
    NoPicture,
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Stream parameters reported by the demuxer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamHint {
    pub codec: CodecId,
    /// `fps_rate / fps_scale`, e.g. 30000/1001. Zero when unknown.
    pub fps_rate: u32,
    pub fps_scale: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub extradata: Vec<u8>,
}

impl StreamHint {
    pub fn new(codec: CodecId, width: u32, height: u32) -> Self {
        Self { codec, fps_rate: 0, fps_scale: 0, width, height, extradata: Vec::new() }
    }

    pub fn with_fps(mut self, rate: u32, scale: u32) -> Self {
        self.fps_rate = rate;
        self.fps_scale = scale;
        self
    }
}

/// Result of one [`VideoCodec::decode`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeStatus(u8);

impl DecodeStatus {
    /// Decoder consumed its input and wants more.
    pub const BUFFER: Self = Self(0x1);
    /// A picture can be fetched with [`VideoCodec::get_picture`].
    pub const PICTURE: Self = Self(0x2);
    pub const ERROR: Self = Self(0x4);

    pub const fn empty() -> Self { Self(0) }

    pub const fn contains(self, other: Self) -> bool { self.0 & other.0 == other.0 }

    pub const fn needs_buffer(self) -> bool { self.contains(Self::BUFFER) }

    pub const fn has_picture(self) -> bool { self.contains(Self::PICTURE) }

    pub const fn has_error(self) -> bool { self.contains(Self::ERROR) }
}

impl BitOr for DecodeStatus {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self { Self(self.0 | rhs.0) }
}

/// Stateful video decoder.
pub trait VideoCodec: Send {
    fn open(&mut self, hint: &StreamHint) -> Result<(), CodecError>;

    /// Feed compressed data; `None` drains pictures buffered inside the codec.
    fn decode(&mut self, data: Option<&[u8]>, pts: Option<Ticks>, dts: Option<Ticks>) -> DecodeStatus;

    fn get_picture(&mut self) -> Result<DecodedPicture, CodecError>;

    /// When set, the codec may skip work for the next picture. It still reports
    /// the picture so timing stays intact.
    fn set_drop_state(&mut self, drop: bool);

    fn reset(&mut self);

    fn dispose(&mut self) {}

    fn name(&self) -> &str;
}

/// Decoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Enable hardware acceleration
    pub hardware_acceleration: bool,
    /// Decoder threads; 0 lets the codec decide
    pub threads: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            hardware_acceleration: true,
            threads: 0,
        }
    }
}

type CodecCtor = Box<dyn Fn(&DecoderConfig) -> Box<dyn VideoCodec> + Send + Sync>;

/// Registry of codec constructors keyed on [`CodecId`].
#[derive(Default)]
pub struct CodecFactory {
    ctors: HashMap<CodecId, CodecCtor>,
    config: DecoderConfig,
}

impl CodecFactory {
    pub fn new(config: DecoderConfig) -> Self { Self { ctors: HashMap::new(), config } }

    pub fn register<F>(&mut self, codec: CodecId, ctor: F) -> &mut Self
    where
        F: Fn(&DecoderConfig) -> Box<dyn VideoCodec> + Send + Sync + 'static,
    {
        self.ctors.insert(codec, Box::new(ctor));
        self
    }

    pub fn supports(&self, codec: CodecId) -> bool { self.ctors.contains_key(&codec) }

    /// Create and open a decoder for the stream.
    pub fn create_decoder(&self, hint: &StreamHint) -> Result<Box<dyn VideoCodec>, CodecError> {
        let ctor = self.ctors.get(&hint.codec).ok_or(CodecError::UnsupportedCodec(hint.codec))?;
        let mut codec = ctor(&self.config);
        codec.open(hint)?;
        info!(codec = codec.name(), id = ?hint.codec, width = hint.width, height = hint.height, "opened video codec");
        Ok(codec)
    }
}
