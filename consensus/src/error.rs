use thiserror::Error;

use quorum_messages::MessageError;
use quorum_types::Hash;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("no audit server available to replace a leader at height {db_height}")]
    NoAuditServer { db_height: u32 },

    #[error("server {0} is not a federated server")]
    UnknownServer(Hash),

    #[error("{0}")]
    Message(#[from] MessageError),
}
