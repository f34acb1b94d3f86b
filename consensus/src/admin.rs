//! Admin-block entries produced by ordered messages.

use serde::Serialize;

use quorum_messages::{AddServer, ChangeServerKey, FaultCore, RemoveServer, ServerType};
use quorum_types::{FullSignature, Hash};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum AdminEntry {
    AddFederatedServer { identity: Hash, db_height: u32 },
    AddAuditServer { identity: Hash, db_height: u32 },
    RemoveFederatedServer { identity: Hash, db_height: u32 },
    RemoveAuditServer { identity: Hash, db_height: u32 },
    AddKey {
        identity: Hash,
        priority: u8,
        key_type: u8,
        key: Hash,
    },
    /// A leader replaced by its nominated audit server.
    ServerFault {
        core: FaultCore,
        signatures: Vec<FullSignature>,
    },
    DirectoryBlockSignature {
        identity: Hash,
        signature: FullSignature,
    },
}

impl AdminEntry {
    pub fn add_server(msg: &AddServer, db_height: u32) -> Self {
        match msg.server_type {
            ServerType::Federated => Self::AddFederatedServer {
                identity: msg.server_chain_id,
                db_height,
            },
            ServerType::Audit => Self::AddAuditServer {
                identity: msg.server_chain_id,
                db_height,
            },
        }
    }

    pub fn remove_server(msg: &RemoveServer, db_height: u32) -> Self {
        match msg.server_type {
            ServerType::Federated => Self::RemoveFederatedServer {
                identity: msg.server_chain_id,
                db_height,
            },
            ServerType::Audit => Self::RemoveAuditServer {
                identity: msg.server_chain_id,
                db_height,
            },
        }
    }

    pub fn change_key(msg: &ChangeServerKey) -> Self {
        Self::AddKey {
            identity: msg.identity_chain_id,
            priority: msg.key_priority,
            key_type: msg.key_type,
            key: msg.key,
        }
    }
}
