//! A federated server's signature over the directory block it just closed.

use serde::Serialize;
use std::fmt;

use quorum_types::{FullSignature, Hash, Timestamp};

use crate::buffer::{Reader, Writer};
use crate::envelope::MessageBase;
use crate::error::MessageError;
use crate::kind::MessageType;
use crate::payload::{base_accessors, signature_accessors, tagged_preimage, Payload, Signable};

#[derive(Clone, Debug, Default, Serialize)]
pub struct DirectoryBlockSignature {
    #[serde(flatten)]
    pub base: MessageBase,
    pub timestamp: Timestamp,
    pub sys_height: u32,
    pub sys_hash: Hash,
    pub db_height: u32,
    /// Hash of the directory block header being signed.
    pub dblock_hash: Hash,
    pub server_identity_chain_id: Hash,
    /// Signature over `dblock_hash` alone; lands in the next admin block.
    pub dblock_signature: Option<FullSignature>,
    pub signature: Option<FullSignature>,
}

impl DirectoryBlockSignature {
    fn write_fields(&self, w: &mut Writer) {
        w.push_u8(self.base.vm_index);
        w.push_timestamp(self.timestamp);
        w.push_u32(self.sys_height);
        w.push_hash(&self.sys_hash);
        w.push_u32(self.db_height);
        w.push_hash(&self.dblock_hash);
        w.push_hash(&self.server_identity_chain_id);
        w.push_signature_block(self.dblock_signature.as_ref());
    }
}

impl Payload for DirectoryBlockSignature {
    const KIND: MessageType = MessageType::DirectoryBlockSignature;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        self.write_fields(w);
        w.push_signature_block(self.signature.as_ref());
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        let vm_index = r.read_u8()?;
        let mut base = MessageBase::new();
        base.place(vm_index, 0);
        let timestamp = r.read_timestamp()?;
        let sys_height = r.read_u32()?;
        let sys_hash = r.read_hash()?;
        let db_height = r.read_u32()?;
        let dblock_hash = r.read_hash()?;
        let server_identity_chain_id = r.read_hash()?;
        base.leader_chain_id = server_identity_chain_id;
        Ok(Self {
            base,
            timestamp,
            sys_height,
            sys_hash,
            db_height,
            dblock_hash,
            server_identity_chain_id,
            dblock_signature: r.read_signature_block()?,
            signature: r.read_signature_block()?,
        })
    }
}

impl Signable for DirectoryBlockSignature {
    fn marshal_for_signature(&self) -> Vec<u8> {
        tagged_preimage(Self::KIND, |w| self.write_fields(w))
    }

    signature_accessors!();
}

impl fmt::Display for DirectoryBlockSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DBSig vm={} dbht={} dblock={} server={}",
            self.base.vm_index,
            self.db_height,
            &self.dblock_hash.to_hex()[..8],
            &self.server_identity_chain_id.to_hex()[..8]
        )
    }
}
