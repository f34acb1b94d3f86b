//! Entry-block-only catch-up: a bounded height-range request and its reply.

use serde::Serialize;
use std::fmt;

use quorum_types::Timestamp;

use crate::buffer::{Reader, Writer};
use crate::envelope::MessageBase;
use crate::error::MessageError;
use crate::kind::MessageType;
use crate::payload::{base_accessors, Payload};

/// Widest range a single [`MissingEntryBlocks`] request may name.
pub const MAX_ENTRY_BLOCK_SPAN: u32 = 20;

#[derive(Clone, Debug, Default, Serialize)]
pub struct MissingEntryBlocks {
    #[serde(flatten)]
    pub base: MessageBase,
    pub timestamp: Timestamp,
    pub start: u32,
    pub end: u32,
}

impl MissingEntryBlocks {
    pub fn new(start: u32, end: u32, timestamp: Timestamp) -> Self {
        Self {
            base: MessageBase::new(),
            timestamp,
            start,
            end,
        }
    }
}

impl Payload for MissingEntryBlocks {
    const KIND: MessageType = MessageType::MissingEntryBlocks;

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

impl fmt::Display for MissingEntryBlocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MissingEntryBlocks {}..={}", self.start, self.end)
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct EntryBlockResponse {
    #[serde(flatten)]
    pub base: MessageBase,
    pub timestamp: Timestamp,
    #[serde(skip)]
    pub entry_blocks: Vec<Vec<u8>>,
    #[serde(skip)]
    pub entries: Vec<Vec<u8>>,
}

impl EntryBlockResponse {
    pub fn new(entry_blocks: Vec<Vec<u8>>, entries: Vec<Vec<u8>>, timestamp: Timestamp) -> Self {
        Self {
            base: MessageBase::new(),
            timestamp,
            entry_blocks,
            entries,
        }
    }
}

impl Payload for EntryBlockResponse {
    const KIND: MessageType = MessageType::EntryBlockResponse;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        w.push_timestamp(self.timestamp);
        w.push_byte_list(&self.entry_blocks);
        w.push_byte_list(&self.entries);
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        let timestamp = r.read_timestamp()?;
        let entry_blocks = r.read_byte_list()?;
        Ok(Self::new(entry_blocks, r.read_byte_list()?, timestamp))
    }
}

impl fmt::Display for EntryBlockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EntryBlockResponse eblocks={} entries={}",
            self.entry_blocks.len(),
            self.entries.len()
        )
    }
}
