//! Liveness beacon sent by every authority once per minute.

use serde::Serialize;
use std::fmt;

use quorum_types::{FullSignature, Hash, Timestamp};

use crate::buffer::{Reader, Writer};
use crate::envelope::MessageBase;
use crate::error::MessageError;
use crate::kind::MessageType;
use crate::payload::{base_accessors, signature_accessors, tagged_preimage, Payload, Signable};

#[derive(Clone, Debug, Default, Serialize)]
pub struct Heartbeat {
    #[serde(flatten)]
    pub base: MessageBase,
    pub timestamp: Timestamp,
    /// Random per-process value; two processes with one identity disagree here.
    pub secret_number: u32,
    pub db_height: u32,
    pub dblock_hash: Hash,
    pub identity_chain_id: Hash,
    pub signature: Option<FullSignature>,
}

impl Heartbeat {
    fn write_fields(&self, w: &mut Writer) {
        w.push_timestamp(self.timestamp);
        w.push_u32(self.secret_number);
        w.push_u32(self.db_height);
        w.push_hash(&self.dblock_hash);
        w.push_hash(&self.identity_chain_id);
    }
}

impl Payload for Heartbeat {
    const KIND: MessageType = MessageType::Heartbeat;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        self.write_fields(w);
        w.push_signature_block(self.signature.as_ref());
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        Ok(Self {
            base: MessageBase::new(),
            timestamp: r.read_timestamp()?,
            secret_number: r.read_u32()?,
            db_height: r.read_u32()?,
            dblock_hash: r.read_hash()?,
            identity_chain_id: r.read_hash()?,
            signature: r.read_signature_block()?,
        })
    }
}

impl Signable for Heartbeat {
    fn marshal_for_signature(&self) -> Vec<u8> {
        tagged_preimage(Self::KIND, |w| self.write_fields(w))
    }

    signature_accessors!();
}

impl fmt::Display for Heartbeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Heartbeat dbht={} from={}",
            self.db_height,
            &self.identity_chain_id.to_hex()[..8]
        )
    }
}
