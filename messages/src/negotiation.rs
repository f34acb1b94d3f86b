//! Federation-signed proposal to take over a VM at a given slot.

use serde::Serialize;
use std::fmt;

use quorum_crypto::sha256;
use quorum_types::{FullSignature, Hash, Timestamp};

use crate::buffer::{Reader, Writer};
use crate::envelope::MessageBase;
use crate::error::MessageError;
use crate::kind::MessageType;
use crate::payload::{base_accessors, signature_accessors, tagged_preimage, Payload, Signable};

#[derive(Clone, Debug, Default, Serialize)]
pub struct Negotiation {
    #[serde(flatten)]
    pub base: MessageBase,
    /// The leader whose VM is being negotiated.
    pub server_id: Hash,
    pub db_height: u32,
    pub height: u32,
    pub timestamp: Timestamp,
    pub signature: Option<FullSignature>,
}

impl Negotiation {
    pub fn new(server_id: Hash, vm_index: u8, db_height: u32, height: u32, timestamp: Timestamp) -> Self {
        let mut base = MessageBase::new();
        base.place(vm_index, 0);
        Self {
            base,
            server_id,
            db_height,
            height,
            timestamp,
            signature: None,
        }
    }

    pub fn vm_index(&self) -> u8 {
        self.base.vm_index
    }

    /// Hash of `{server_id, vm_index, db_height, height}`.
    pub fn core_hash(&self) -> Hash {
        let mut w = Writer::new();
        self.write_core(&mut w);
        sha256(&w.into_bytes())
    }

    fn write_core(&self, w: &mut Writer) {
        w.push_hash(&self.server_id);
        w.push_u8(self.base.vm_index);
        w.push_u32(self.db_height);
        w.push_u32(self.height);
    }

    fn write_fields(&self, w: &mut Writer) {
        self.write_core(w);
        w.push_timestamp(self.timestamp);
    }
}

impl Payload for Negotiation {
    const KIND: MessageType = MessageType::Negotiation;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        self.write_fields(w);
        w.push_signature_block(self.signature.as_ref());
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        let server_id = r.read_hash()?;
        let vm_index = r.read_u8()?;
        let db_height = r.read_u32()?;
        let height = r.read_u32()?;
        let mut msg = Self::new(server_id, vm_index, db_height, height, r.read_timestamp()?);
        msg.signature = r.read_signature_block()?;
        Ok(msg)
    }
}

impl Signable for Negotiation {
    fn marshal_for_signature(&self) -> Vec<u8> {
        tagged_preimage(Self::KIND, |w| self.write_fields(w))
    }

    signature_accessors!();
}

impl fmt::Display for Negotiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Negotiation vm={} dbht={} ht={} server={}",
            self.base.vm_index,
            self.db_height,
            self.height,
            &self.server_id.to_hex()[..8]
        )
    }
}
