use message_queue::QueueError;
use native_decoder::CodecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("a stream is already open")]
    AlreadyOpen,
    #[error("no stream open")]
    NotOpen,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("failed to spawn {name} thread: {source}")]
    Thread { name: &'static str, source: std::io::Error },
    #[error("config read failed: {0}")]
    ConfigIo(#[from] std::io::Error),
    #[error("config parse failed: {0}")]
    ConfigParse(#[from] serde_json::Error),
}
