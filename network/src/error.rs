use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("{queue} queue full ({capacity} messages)")]
    QueueFull { queue: &'static str, capacity: usize },

    #[error("channel closed")]
    ChannelClosed,

    #[error("protocol error: {0}")]
    Protocol(#[from] quorum_protocol::ProtocolError),

    #[error("IO error: {0}")]
    Io(String),
}
