//! Authority-set changes, signed by the network skeleton key.

use serde::Serialize;
use std::fmt;

use quorum_types::{FullSignature, Hash, Timestamp};

use crate::buffer::{Reader, Writer};
use crate::envelope::MessageBase;
use crate::error::MessageError;
use crate::kind::MessageType;
use crate::payload::{base_accessors, signature_accessors, tagged_preimage, Payload, Signable};

/// Role an identity holds in the authority set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum ServerType {
    #[default]
    Federated,
    Audit,
}

impl ServerType {
    fn to_byte(self) -> u8 {
        match self {
            Self::Federated => 0,
            Self::Audit => 1,
        }
    }

    fn from_byte(b: u8) -> Result<Self, MessageError> {
        match b {
            0 => Ok(Self::Federated),
            1 => Ok(Self::Audit),
            other => Err(MessageError::Malformed(format!("unknown server type {other}"))),
        }
    }
}

/// Promote an identity into the authority set.
#[derive(Clone, Debug, Default, Serialize)]
pub struct AddServer {
    #[serde(flatten)]
    pub base: MessageBase,
    pub timestamp: Timestamp,
    pub server_chain_id: Hash,
    pub server_type: ServerType,
    pub signature: Option<FullSignature>,
}

/// Remove an identity from the authority set.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RemoveServer {
    #[serde(flatten)]
    pub base: MessageBase,
    pub timestamp: Timestamp,
    pub server_chain_id: Hash,
    pub server_type: ServerType,
    pub signature: Option<FullSignature>,
}

/// Rotate one of an authority's keys.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ChangeServerKey {
    #[serde(flatten)]
    pub base: MessageBase,
    pub timestamp: Timestamp,
    pub identity_chain_id: Hash,
    pub admin_block_change: u8,
    pub key_priority: u8,
    pub key_type: u8,
    pub key: Hash,
    pub signature: Option<FullSignature>,
}

impl AddServer {
    pub fn new(server_chain_id: Hash, server_type: ServerType, timestamp: Timestamp) -> Self {
        Self {
            base: MessageBase::new(),
            timestamp,
            server_chain_id,
            server_type,
            signature: None,
        }
    }

    fn write_fields(&self, w: &mut Writer) {
        w.push_timestamp(self.timestamp);
        w.push_hash(&self.server_chain_id);
        w.push_u8(self.server_type.to_byte());
    }
}

impl RemoveServer {
    pub fn new(server_chain_id: Hash, server_type: ServerType, timestamp: Timestamp) -> Self {
        Self {
            base: MessageBase::new(),
            timestamp,
            server_chain_id,
            server_type,
            signature: None,
        }
    }

    fn write_fields(&self, w: &mut Writer) {
        w.push_timestamp(self.timestamp);
        w.push_hash(&self.server_chain_id);
        w.push_u8(self.server_type.to_byte());
    }
}

impl ChangeServerKey {
    fn write_fields(&self, w: &mut Writer) {
        w.push_timestamp(self.timestamp);
        w.push_hash(&self.identity_chain_id);
        w.push_u8(self.admin_block_change);
        w.push_u8(self.key_priority);
        w.push_u8(self.key_type);
        w.push_hash(&self.key);
    }
}

impl Payload for AddServer {
    const KIND: MessageType = MessageType::AddServer;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        self.write_fields(w);
        w.push_signature_block(self.signature.as_ref());
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        let timestamp = r.read_timestamp()?;
        let server_chain_id = r.read_hash()?;
        let server_type = ServerType::from_byte(r.read_u8()?)?;
        let mut msg = Self::new(server_chain_id, server_type, timestamp);
        msg.signature = r.read_signature_block()?;
        Ok(msg)
    }
}

impl Payload for RemoveServer {
    const KIND: MessageType = MessageType::RemoveServer;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        self.write_fields(w);
        w.push_signature_block(self.signature.as_ref());
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        let timestamp = r.read_timestamp()?;
        let server_chain_id = r.read_hash()?;
        let server_type = ServerType::from_byte(r.read_u8()?)?;
        let mut msg = Self::new(server_chain_id, server_type, timestamp);
        msg.signature = r.read_signature_block()?;
        Ok(msg)
    }
}

impl Payload for ChangeServerKey {
    const KIND: MessageType = MessageType::ChangeServerKey;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        self.write_fields(w);
        w.push_signature_block(self.signature.as_ref());
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        Ok(Self {
            base: MessageBase::new(),
            timestamp: r.read_timestamp()?,
            identity_chain_id: r.read_hash()?,
            admin_block_change: r.read_u8()?,
            key_priority: r.read_u8()?,
            key_type: r.read_u8()?,
            key: r.read_hash()?,
            signature: r.read_signature_block()?,
        })
    }
}

impl Signable for AddServer {
    fn marshal_for_signature(&self) -> Vec<u8> {
        tagged_preimage(Self::KIND, |w| self.write_fields(w))
    }

    signature_accessors!();
}

impl Signable for RemoveServer {
    fn marshal_for_signature(&self) -> Vec<u8> {
        tagged_preimage(Self::KIND, |w| self.write_fields(w))
    }

    signature_accessors!();
}

impl Signable for ChangeServerKey {
    fn marshal_for_signature(&self) -> Vec<u8> {
        tagged_preimage(Self::KIND, |w| self.write_fields(w))
    }

    signature_accessors!();
}

impl fmt::Display for AddServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AddServer {:?} server={}",
            self.server_type,
            &self.server_chain_id.to_hex()[..8]
        )
    }
}

impl fmt::Display for RemoveServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RemoveServer {:?} server={}",
            self.server_type,
            &self.server_chain_id.to_hex()[..8]
        )
    }
}

impl fmt::Display for ChangeServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChangeServerKey identity={} priority={} type={}",
            &self.identity_chain_id.to_hex()[..8],
            self.key_priority,
            self.key_type
        )
    }
}
