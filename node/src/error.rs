use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("message error: {0}")]
    Message(#[from] quorum_messages::MessageError),

    #[error("protocol error: {0}")]
    Protocol(#[from] quorum_protocol::ProtocolError),

    #[error("network error: {0}")]
    Network(#[from] quorum_network::NetworkError),

    #[error("consensus error: {0}")]
    Consensus(#[from] quorum_consensus::ConsensusError),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pipeline worker failed: {0}")]
    Worker(String),

    #[error("node is not running")]
    NotRunning,

    #[error("shutdown timeout")]
    ShutdownTimeout,
}
