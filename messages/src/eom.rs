//! End-of-minute marker issued by a VM leader.

use serde::Serialize;
use std::fmt;

use quorum_types::{FullSignature, Hash, Timestamp};

use crate::buffer::{Reader, Writer};
use crate::envelope::MessageBase;
use crate::error::MessageError;
use crate::kind::MessageType;
use crate::payload::{base_accessors, signature_accessors, tagged_preimage, Payload, Signable};

/// Closes minute `base.minute` of VM `base.vm_index` at `db_height`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Eom {
    #[serde(flatten)]
    pub base: MessageBase,
    pub timestamp: Timestamp,
    /// Identity chain of the leader closing the minute.
    pub chain_id: Hash,
    pub db_height: u32,
    pub sys_height: u32,
    pub sys_hash: Hash,
    /// Set by the VM that also closes the factoid block.
    pub factoid_vm: bool,
    pub signature: Option<FullSignature>,
}

impl Eom {
    pub fn new(chain_id: Hash, vm_index: u8, minute: u8, db_height: u32, timestamp: Timestamp) -> Self {
        let mut base = MessageBase::new();
        base.place(vm_index, minute);
        base.leader_chain_id = chain_id;
        Self {
            base,
            timestamp,
            chain_id,
            db_height,
            ..Self::default()
        }
    }

    fn write_fields(&self, w: &mut Writer) {
        w.push_u8(self.base.vm_index);
        w.push_hash(&self.chain_id);
        w.push_timestamp(self.timestamp);
        w.push_u8(self.base.minute);
        w.push_u32(self.db_height);
        w.push_u32(self.sys_height);
        w.push_hash(&self.sys_hash);
        w.push_bool(self.factoid_vm);
    }
}

impl Payload for Eom {
    const KIND: MessageType = MessageType::Eom;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        self.write_fields(w);
        w.push_signature_block(self.signature.as_ref());
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        let vm_index = r.read_u8()?;
        let chain_id = r.read_hash()?;
        let timestamp = r.read_timestamp()?;
        let minute = r.read_u8()?;
        let mut base = MessageBase::new();
        base.place(vm_index, minute);
        base.leader_chain_id = chain_id;
        Ok(Self {
            base,
            chain_id,
            timestamp,
            db_height: r.read_u32()?,
            sys_height: r.read_u32()?,
            sys_hash: r.read_hash()?,
            factoid_vm: r.read_bool()?,
            signature: r.read_signature_block()?,
        })
    }
}

impl Signable for Eom {
    fn marshal_for_signature(&self) -> Vec<u8> {
        tagged_preimage(Self::KIND, |w| self.write_fields(w))
    }

    signature_accessors!();
}

impl fmt::Display for Eom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EOM vm={} minute={} dbht={} leader={}",
            self.base.vm_index,
            self.base.minute,
            self.db_height,
            &self.chain_id.to_hex()[..8]
        )
    }
}
