//! Leader-issued acknowledgment fixing a message's position in its VM.

use serde::Serialize;
use std::fmt;

use quorum_types::{FullSignature, Hash, Timestamp};

use crate::buffer::{Reader, Writer};
use crate::envelope::MessageBase;
use crate::error::MessageError;
use crate::kind::MessageType;
use crate::payload::{base_accessors, signature_accessors, tagged_preimage, Payload, Signable};

/// TLV tag of the balance-hash commitment in the ack data area.
pub const DATA_AREA_BALANCE_HASH: u8 = 1;

/// Acknowledges `message_hash` at slot `height` of VM `base.vm_index` in
/// block `db_height`.
///
/// `serial_hash` chains this ack onto the previous ack of the same VM.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Ack {
    #[serde(flatten)]
    pub base: MessageBase,
    pub timestamp: Timestamp,
    /// First bytes of the leader's secret salt; two servers running the same
    /// identity disagree here.
    pub salt: [u8; 8],
    pub salt_number: u32,
    pub message_hash: Hash,
    pub db_height: u32,
    pub height: u32,
    pub serial_hash: Hash,
    #[serde(with = "hex_bytes")]
    pub data_area: Vec<u8>,
    pub signature: Option<FullSignature>,
}

impl Ack {
    fn write_fields(&self, w: &mut Writer) {
        w.push_u8(self.base.vm_index);
        w.push_timestamp(self.timestamp);
        w.push_raw(&self.salt);
        w.push_u32(self.salt_number);
        w.push_hash(&self.message_hash);
        w.push_hash(&self.base.leader_chain_id);
        w.push_u32(self.db_height);
        w.push_u32(self.height);
        w.push_hash(&self.serial_hash);
        w.push_bytes(&self.data_area);
        w.push_u8(self.base.minute);
    }

    /// Replace the data area with a single balance-hash entry.
    pub fn set_balance_hash(&mut self, balance_hash: &Hash) {
        let mut w = Writer::new();
        w.push_u8(DATA_AREA_BALANCE_HASH);
        w.push_bytes(balance_hash.as_bytes());
        self.data_area = w.into_bytes();
    }

    /// The balance-hash commitment, when the data area carries one.
    pub fn balance_hash(&self) -> Option<Hash> {
        let mut r = Reader::new(&self.data_area);
        while r.remaining() > 0 {
            let tag = r.read_u8().ok()?;
            let value = r.read_bytes().ok()?;
            if tag == DATA_AREA_BALANCE_HASH {
                let arr: [u8; 32] = value.try_into().ok()?;
                return Some(Hash::new(arr));
            }
        }
        None
    }
}

impl Payload for Ack {
    const KIND: MessageType = MessageType::Ack;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        self.write_fields(w);
        w.push_signature_block(self.signature.as_ref());
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        let vm_index = r.read_u8()?;
        let timestamp = r.read_timestamp()?;
        let salt = r.read_array::<8>()?;
        let salt_number = r.read_u32()?;
        let message_hash = r.read_hash()?;
        let leader_chain_id = r.read_hash()?;
        let db_height = r.read_u32()?;
        let height = r.read_u32()?;
        let serial_hash = r.read_hash()?;
        let data_area = r.read_bytes()?;
        let minute = r.read_u8()?;
        let mut base = MessageBase::new();
        base.place(vm_index, minute);
        base.leader_chain_id = leader_chain_id;
        Ok(Self {
            base,
            timestamp,
            salt,
            salt_number,
            message_hash,
            db_height,
            height,
            serial_hash,
            data_area,
            signature: r.read_signature_block()?,
        })
    }
}

impl Signable for Ack {
    fn marshal_for_signature(&self) -> Vec<u8> {
        tagged_preimage(Self::KIND, |w| self.write_fields(w))
    }

    signature_accessors!();
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ack vm={} dbht={} ht={} minute={} msg={} serial={}",
            self.base.vm_index,
            self.db_height,
            self.height,
            self.base.minute,
            &self.message_hash.to_hex()[..8],
            &self.serial_hash.to_hex()[..8]
        )
    }
}

pub(crate) mod hex_bytes {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }
}
