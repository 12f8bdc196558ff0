use std::sync::Arc;

use bytes::Bytes;
use playback_clock::Ticks;

use crate::sync::SyncBarrier;

/// Compressed data for one stream as cut by the demuxer.
#[derive(Debug, Clone, Default)]
pub struct DemuxPacket {
    pub data: Bytes,
    pub pts: Option<Ticks>,
    pub dts: Option<Ticks>,
    pub stream_id: u32,
}

impl DemuxPacket {
    pub fn new(data: impl Into<Bytes>, pts: Option<Ticks>, dts: Option<Ticks>) -> Self {
        Self { data: data.into(), pts, dts, stream_id: 0 }
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    DemuxerPacket(DemuxPacket),
    /// Reset the decoder; sent by the player's flush path.
    GeneralFlush,
    /// Rendezvous with the other streams before continuing.
    GeneralSynchronize(Arc<SyncBarrier>),
    /// Adopt the timestamp and discipline the shared clock to it.
    GeneralSetClock { pts: Option<Ticks>, dts: Option<Ticks> },
    /// Adopt the timestamp without touching the clock.
    GeneralResync { pts: Option<Ticks>, dts: Option<Ticks> },
    /// Next pictures are transitional; never drop them.
    VideoNoSkip,
    /// Force a display aspect ratio (0 restores the stream's own).
    VideoSetAspect(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    DemuxerPacket,
    GeneralFlush,
    GeneralSynchronize,
    GeneralSetClock,
    GeneralResync,
    VideoNoSkip,
    VideoSetAspect,
}

/// Messages are shared by reference count; the last drop releases the payload.
pub type MessageRef = Arc<Message>;

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::DemuxerPacket(_) => MessageKind::DemuxerPacket,
            Message::GeneralFlush => MessageKind::GeneralFlush,
            Message::GeneralSynchronize(_) => MessageKind::GeneralSynchronize,
            Message::GeneralSetClock { .. } => MessageKind::GeneralSetClock,
            Message::GeneralResync { .. } => MessageKind::GeneralResync,
            Message::VideoNoSkip => MessageKind::VideoNoSkip,
            Message::VideoSetAspect(_) => MessageKind::VideoSetAspect,
        }
    }

    pub fn is_type(&self, kind: MessageKind) -> bool { self.kind() == kind }

    /// Bytes charged against the queue's cap. Control messages are free.
    pub fn data_size(&self) -> usize {
        match self {
            Message::DemuxerPacket(p) => p.data.len(),
            _ => 0,
        }
    }

    /// Timestamp carried by clock messages, presentation time preferred.
    pub fn timestamp(&self) -> Option<Ticks> {
        match self {
            Message::GeneralSetClock { pts, dts } | Message::GeneralResync { pts, dts } => pts.or(*dts),
            _ => None,
        }
    }

    pub fn into_ref(self) -> MessageRef { Arc::new(self) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_size_counts_packets_only() {
        let pkt = Message::DemuxerPacket(DemuxPacket::new(vec![0u8; 1234], None, None));
        assert_eq!(pkt.data_size(), 1234);
        assert_eq!(Message::GeneralFlush.data_size(), 0);
        assert!(pkt.is_type(MessageKind::DemuxerPacket));
    }

    #[test]
    fn test_timestamp_prefers_pts() {
        let m = Message::GeneralSetClock { pts: Some(10), dts: Some(5) };
        assert_eq!(m.timestamp(), Some(10));
        let m = Message::GeneralResync { pts: None, dts: Some(5) };
        assert_eq!(m.timestamp(), Some(5));
        assert_eq!(Message::VideoNoSkip.timestamp(), None);
    }
}
