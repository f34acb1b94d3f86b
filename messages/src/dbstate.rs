//! Complete saved blocks exchanged for catch-up, and the request for them.

use serde::Serialize;
use std::fmt;

use quorum_crypto::sha256;
use quorum_types::{FullSignature, Hash, Timestamp};

use crate::ack::hex_bytes;
use crate::buffer::{Reader, Writer};
use crate::envelope::MessageBase;
use crate::error::MessageError;
use crate::kind::MessageType;
use crate::payload::{base_accessors, Payload};

/// Directory block header plus its opaque body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryBlock {
    pub height: u32,
    pub prev_hash: Hash,
    pub timestamp: Timestamp,
    #[serde(with = "hex_bytes")]
    pub body: Vec<u8>,
}

impl DirectoryBlock {
    fn write(&self, w: &mut Writer) {
        w.push_u32(self.height);
        w.push_hash(&self.prev_hash);
        w.push_timestamp(self.timestamp);
        w.push_bytes(&self.body);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        Ok(Self {
            height: r.read_u32()?,
            prev_hash: r.read_hash()?,
            timestamp: r.read_timestamp()?,
            body: r.read_bytes()?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.write(&mut w);
        w.into_bytes()
    }

    /// Key of the block; the next block's `prev_hash` names it.
    pub fn hash(&self) -> Hash {
        sha256(&self.to_bytes())
    }
}

/// A saved directory block with everything needed to replay it.
///
/// Never mutated after creation. A decoded instance keeps the bytes it was
/// decoded from and re-encodes to exactly those bytes.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DbState {
    #[serde(flatten)]
    pub base: MessageBase,
    pub timestamp: Timestamp,
    pub dblock: DirectoryBlock,
    #[serde(with = "hex_bytes")]
    pub admin_block: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub factoid_block: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub ec_block: Vec<u8>,
    #[serde(skip)]
    pub entry_blocks: Vec<Vec<u8>>,
    #[serde(skip)]
    pub entries: Vec<Vec<u8>>,
    /// Bootstrap signatures over the directory block hash.
    pub signatures: Vec<FullSignature>,
    /// Already in the local database; replay without saving again.
    #[serde(skip)]
    pub is_in_db: bool,
    /// Last block of a catch-up burst.
    #[serde(skip)]
    pub is_last: bool,
    #[serde(skip)]
    raw: Option<Vec<u8>>,
}

impl DbState {
    pub fn new(dblock: DirectoryBlock, timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            dblock,
            ..Self::default()
        }
    }

    pub fn height(&self) -> u32 {
        self.dblock.height
    }

    /// Size of the encoded message, used for burst accounting.
    pub fn encoded_len(&self) -> usize {
        match &self.raw {
            Some(raw) => raw.len(),
            None => self.marshal().len(),
        }
    }
}

impl Payload for DbState {
    const KIND: MessageType = MessageType::DbState;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        w.push_timestamp(self.timestamp);
        self.dblock.write(w);
        w.push_bytes(&self.admin_block);
        w.push_bytes(&self.factoid_block);
        w.push_bytes(&self.ec_block);
        w.push_byte_list(&self.entry_blocks);
        w.push_byte_list(&self.entries);
        w.push_signature_list(&self.signatures);
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        Ok(Self {
            timestamp: r.read_timestamp()?,
            dblock: DirectoryBlock::read(r)?,
            admin_block: r.read_bytes()?,
            factoid_block: r.read_bytes()?,
            ec_block: r.read_bytes()?,
            entry_blocks: r.read_byte_list()?,
            entries: r.read_byte_list()?,
            signatures: r.read_signature_list()?,
            ..Self::default()
        })
    }

    fn marshal(&self) -> Vec<u8> {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        let mut w = Writer::tagged(Self::KIND);
        self.write_body(&mut w);
        w.into_bytes()
    }

    fn unmarshal(data: &[u8]) -> Result<(Self, &[u8]), MessageError> {
        let mut r = Reader::new(data);
        let tag = r.read_u8()?;
        if tag != Self::KIND.tag() {
            return Err(MessageError::WrongType {
                expected: Self::KIND.tag(),
                found: tag,
            });
        }
        let mut msg = Self::read_body(&mut r)?;
        msg.raw = Some(data[..r.position()].to_vec());
        Ok((msg, r.rest()))
    }
}

impl fmt::Display for DbState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DBState dbht={} dblock={} eblocks={} entries={} sigs={}",
            self.dblock.height,
            &self.dblock.hash().to_hex()[..8],
            self.entry_blocks.len(),
            self.entries.len(),
            self.signatures.len()
        )
    }
}

/// Request for the saved blocks `start..=end`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DbStateMissing {
    #[serde(flatten)]
    pub base: MessageBase,
    pub timestamp: Timestamp,
    pub start: u32,
    pub end: u32,
}

impl DbStateMissing {
    pub fn new(start: u32, end: u32, timestamp: Timestamp) -> Self {
        Self {
            base: MessageBase::new(),
            timestamp,
            start,
            end,
        }
    }
}

impl Payload for DbStateMissing {
    const KIND: MessageType = MessageType::DbStateMissing;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        w.push_timestamp(self.timestamp);
        w.push_u32(self.start);
        w.push_u32(self.end);
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        let timestamp = r.read_timestamp()?;
        let start = r.read_u32()?;
        Ok(Self::new(start, r.read_u32()?, timestamp))
    }
}

impl fmt::Display for DbStateMissing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DBStateMissing {}..={}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DbState {
        let mut state = DbState::new(
            DirectoryBlock {
                height: 7,
                prev_hash: Hash::new([6; 32]),
                timestamp: Timestamp::from_secs(1_600_000_000),
                body: vec![1, 2, 3],
            },
            Timestamp::from_secs(1_600_000_100),
        );
        state.admin_block = vec![4; 10];
        state.entry_blocks = vec![vec![5; 3], vec![]];
        state.entries = vec![vec![9; 40]];
        state
    }

    #[test]
    fn decoded_state_reencodes_to_source_bytes() {
        let bytes = sample().marshal();
        let (mut decoded, rest) = DbState::unmarshal(&bytes).unwrap();
        assert!(rest.is_empty());
        decoded.is_last = true;
        decoded.base.origin = 3;
        assert_eq!(decoded.marshal(), bytes);
        assert_eq!(decoded.encoded_len(), bytes.len());
        assert_eq!(decoded.dblock, sample().dblock);
    }

    #[test]
    fn dblock_hash_depends_on_prev_link() {
        let a = sample().dblock;
        let mut b = a.clone();
        b.prev_hash = Hash::ZERO;
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn nested_decode_leaves_remainder() {
        let mut bytes = DbStateMissing::new(3, 9, Timestamp::EPOCH).marshal();
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        let (msg, rest) = DbStateMissing::unmarshal(&bytes).unwrap();
        assert_eq!((msg.start, msg.end), (3, 9));
        assert_eq!(rest, &[0xAA, 0xBB]);
    }
}
