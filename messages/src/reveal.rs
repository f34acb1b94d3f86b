//! Reveals the content of a previously committed entry.

use serde::Serialize;
use std::fmt;

use quorum_crypto::sha256_multi;
use quorum_types::{Hash, Timestamp};

use crate::ack::hex_bytes;
use crate::buffer::{Reader, Writer};
use crate::envelope::MessageBase;
use crate::error::MessageError;
use crate::kind::MessageType;
use crate::payload::{base_accessors, Payload};

/// Largest entry content accepted, in bytes.
pub const MAX_ENTRY_SIZE: usize = 10_240;

#[derive(Clone, Debug, Default, Serialize)]
pub struct RevealEntry {
    #[serde(flatten)]
    pub base: MessageBase,
    pub timestamp: Timestamp,
    pub chain_id: Hash,
    #[serde(with = "hex_bytes")]
    pub content: Vec<u8>,
}

impl RevealEntry {
    pub fn new(chain_id: Hash, content: Vec<u8>, timestamp: Timestamp) -> Self {
        Self {
            base: MessageBase::new(),
            timestamp,
            chain_id,
            content,
        }
    }

    /// The hash a matching commit must name.
    pub fn entry_hash(&self) -> Hash {
        sha256_multi(&[self.chain_id.as_bytes(), &self.content])
    }

    /// Credits needed to pay for this entry.
    pub fn credits_required(&self) -> u8 {
        let kib = self.content.len().div_ceil(1024).max(1);
        u8::try_from(kib).unwrap_or(u8::MAX)
    }
}

impl Payload for RevealEntry {
    const KIND: MessageType = MessageType::RevealEntry;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        w.push_timestamp(self.timestamp);
        w.push_hash(&self.chain_id);
        w.push_bytes(&self.content);
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        let timestamp = r.read_timestamp()?;
        let chain_id = r.read_hash()?;
        Ok(Self::new(chain_id, r.read_bytes()?, timestamp))
    }
}

impl fmt::Display for RevealEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RevealEntry chain={} entry={} size={}",
            &self.chain_id.to_hex()[..8],
            &self.entry_hash().to_hex()[..8],
            self.content.len()
        )
    }
}
