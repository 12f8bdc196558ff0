//! Control-message protocol and the bounded queue that carries it from the
//! demuxer/control thread to a stream's decode thread.

mod message;
mod queue;
mod stop;
mod sync;

pub use message::{DemuxPacket, Message, MessageKind, MessageRef};
pub use queue::{MessageQueue, QueueError, DEFAULT_MAX_DATA_SIZE};
pub use stop::StopToken;
pub use sync::{SyncBarrier, SyncSource};
