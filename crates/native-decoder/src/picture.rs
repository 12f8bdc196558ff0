use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use playback_clock::Ticks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameType {
    I,
    P,
    B,
    #[default]
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PictureFlags(u32);

impl PictureFlags {
    pub const ALLOCATED: Self = Self(0x01);
    pub const INTERLACED: Self = Self(0x02);
    pub const TOP_FIELD_FIRST: Self = Self(0x04);
    /// Exempt from every drop decision.
    pub const NOSKIP: Self = Self(0x08);
    /// Pace against the clock only, never by frame duration.
    pub const NOAUTOSYNC: Self = Self(0x10);
    pub const DROPPED: Self = Self(0x20);

    pub const fn empty() -> Self { Self(0) }

    pub const fn bits(self) -> u32 { self.0 }

    pub const fn contains(self, other: Self) -> bool { self.0 & other.0 == other.0 }

    pub fn insert(&mut self, other: Self) { self.0 |= other.0; }

    pub fn remove(&mut self, other: Self) { self.0 &= !other.0; }
}

impl BitOr for PictureFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self { Self(self.0 | rhs.0) }
}

impl BitOrAssign for PictureFlags {
    fn bitor_assign(&mut self, rhs: Self) { self.0 |= rhs.0; }
}

/// Picture handed out by a decoder. The pixel payload is opaque to the
/// pipeline; the renderer copies it into its own buffer.
#[derive(Debug, Clone)]
pub struct DecodedPicture {
    pub width: u32,
    pub height: u32,
    pub display_width: u32,
    pub display_height: u32,
    /// Display duration; 0 means unknown.
    pub duration: Ticks,
    /// Extra times the picture must be shown (soft telecine).
    pub repeat: u32,
    /// Decode timestamp of the packet this picture came from.
    pub dts: Option<Ticks>,
    pub frame_type: FrameType,
    pub flags: PictureFlags,
    pub data: Arc<[u8]>,
}

impl DecodedPicture {
    pub fn new(width: u32, height: u32, frame_type: FrameType, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            display_width: width,
            display_height: height,
            duration: 0,
            repeat: 0,
            dts: None,
            frame_type,
            flags: PictureFlags::ALLOCATED,
            data: data.into(),
        }
    }

    pub fn with_duration(mut self, duration: Ticks) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_dts(mut self, dts: Option<Ticks>) -> Self {
        self.dts = dts;
        self
    }

    pub fn is_allocated(&self) -> bool { self.flags.contains(PictureFlags::ALLOCATED) }
}
