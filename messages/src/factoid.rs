//! Value-transfer transaction, carried as opaque bytes.
//!
//! Transaction semantics live with the chain state; this layer only orders
//! the bytes.

use serde::Serialize;
use std::fmt;

use quorum_types::Timestamp;

use crate::ack::hex_bytes;
use crate::buffer::{Reader, Writer};
use crate::envelope::MessageBase;
use crate::error::MessageError;
use crate::kind::MessageType;
use crate::payload::{base_accessors, Payload};

#[derive(Clone, Debug, Default, Serialize)]
pub struct FactoidTransaction {
    #[serde(flatten)]
    pub base: MessageBase,
    pub timestamp: Timestamp,
    #[serde(with = "hex_bytes")]
    pub transaction: Vec<u8>,
}

impl FactoidTransaction {
    pub fn new(transaction: Vec<u8>, timestamp: Timestamp) -> Self {
        Self {
            base: MessageBase::new(),
            timestamp,
            transaction,
        }
    }
}

impl Payload for FactoidTransaction {
    const KIND: MessageType = MessageType::FactoidTransaction;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        w.push_timestamp(self.timestamp);
        w.push_bytes(&self.transaction);
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        let timestamp = r.read_timestamp()?;
        Ok(Self::new(r.read_bytes()?, timestamp))
    }
}

impl fmt::Display for FactoidTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FactoidTransaction size={}", self.transaction.len())
    }
}
