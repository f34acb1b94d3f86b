//! Requests for process-list slots or data a node failed to receive, and the
//! answers to them.

use serde::Serialize;
use std::fmt;

use quorum_crypto::sha256;
use quorum_types::{Hash, Timestamp};

use crate::ack::{hex_bytes, Ack};
use crate::buffer::{Reader, Writer};
use crate::envelope::MessageBase;
use crate::error::MessageError;
use crate::kind::MessageType;
use crate::message::Message;
use crate::payload::{base_accessors, Payload};

/// Ask for the acked messages at the listed heights of one VM.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MissingMsg {
    #[serde(flatten)]
    pub base: MessageBase,
    pub timestamp: Timestamp,
    pub db_height: u32,
    pub system_height: u32,
    pub process_list_heights: Vec<u32>,
}

impl MissingMsg {
    pub fn new(vm_index: u8, db_height: u32, heights: Vec<u32>, timestamp: Timestamp) -> Self {
        let mut base = MessageBase::new();
        base.place(vm_index, 0);
        Self {
            base,
            timestamp,
            db_height,
            system_height: 0,
            process_list_heights: heights,
        }
    }
}

impl Payload for MissingMsg {
    const KIND: MessageType = MessageType::MissingMsg;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        w.push_timestamp(self.timestamp);
        w.push_u8(self.base.vm_index);
        w.push_u32(self.db_height);
        w.push_u32(self.system_height);
        w.push_u32(self.process_list_heights.len() as u32);
        for h in &self.process_list_heights {
            w.push_u32(*h);
        }
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        let timestamp = r.read_timestamp()?;
        let vm_index = r.read_u8()?;
        let db_height = r.read_u32()?;
        let system_height = r.read_u32()?;
        let count = r.read_count(4)?;
        let mut heights = Vec::with_capacity(count);
        for _ in 0..count {
            heights.push(r.read_u32()?);
        }
        let mut msg = Self::new(vm_index, db_height, heights, timestamp);
        msg.system_height = system_height;
        Ok(msg)
    }
}

impl fmt::Display for MissingMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MissingMsg vm={} dbht={} heights={:?}",
            self.base.vm_index, self.db_height, self.process_list_heights
        )
    }
}

/// An ack together with the message it orders.
///
/// The inner message may be any kind except another response, so a hostile
/// peer cannot build an unbounded nesting.
#[derive(Clone, Debug, Serialize)]
pub struct MissingMsgResponse {
    #[serde(flatten)]
    pub base: MessageBase,
    pub timestamp: Timestamp,
    pub ack: Ack,
    pub message: Box<Message>,
}

impl MissingMsgResponse {
    pub fn new(ack: Ack, message: Message, timestamp: Timestamp) -> Self {
        Self {
            base: MessageBase::new(),
            timestamp,
            ack,
            message: Box::new(message),
        }
    }
}

impl Payload for MissingMsgResponse {
    const KIND: MessageType = MessageType::MissingMsgResponse;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        w.push_timestamp(self.timestamp);
        w.push_bytes(&self.ack.marshal());
        w.push_bytes(&self.message.encode());
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        let timestamp = r.read_timestamp()?;
        let ack_bytes = r.read_bytes()?;
        let (ack, rest) = Ack::unmarshal(&ack_bytes)?;
        if !rest.is_empty() {
            return Err(MessageError::TrailingBytes(rest.len()));
        }
        let msg_bytes = r.read_bytes()?;
        if msg_bytes.first() == Some(&MessageType::MissingMsgResponse.tag()) {
            return Err(MessageError::Malformed(
                "missing-message response may not nest another response".into(),
            ));
        }
        let message = Message::decode(&msg_bytes)?;
        Ok(Self::new(ack, message, timestamp))
    }
}

impl fmt::Display for MissingMsgResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MissingMsgResponse [{}] [{}]", self.ack, self.message)
    }
}

/// Ask peers for an entry or entry block by hash.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MissingData {
    #[serde(flatten)]
    pub base: MessageBase,
    pub timestamp: Timestamp,
    pub requested_hash: Hash,
}

impl MissingData {
    pub fn new(requested_hash: Hash, timestamp: Timestamp) -> Self {
        Self {
            base: MessageBase::new(),
            timestamp,
            requested_hash,
        }
    }
}

impl Payload for MissingData {
    const KIND: MessageType = MessageType::MissingData;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        w.push_timestamp(self.timestamp);
        w.push_hash(&self.requested_hash);
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        let timestamp = r.read_timestamp()?;
        Ok(Self::new(r.read_hash()?, timestamp))
    }
}

impl fmt::Display for MissingData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MissingData hash={}", &self.requested_hash.to_hex()[..8])
    }
}

/// What a [`DataResponse`] carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum DataKind {
    #[default]
    Entry,
    EntryBlock,
}

/// Answer to [`MissingData`].
#[derive(Clone, Debug, Default, Serialize)]
pub struct DataResponse {
    #[serde(flatten)]
    pub base: MessageBase,
    pub data_kind: DataKind,
    pub data_hash: Hash,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl DataResponse {
    pub fn new(data_kind: DataKind, data: Vec<u8>) -> Self {
        Self {
            base: MessageBase::new(),
            data_kind,
            data_hash: sha256(&data),
            data,
        }
    }

    /// The payload hashes to the hash it claims.
    pub fn is_consistent(&self) -> bool {
        sha256(&self.data) == self.data_hash
    }
}

impl Payload for DataResponse {
    const KIND: MessageType = MessageType::DataResponse;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        w.push_u8(match self.data_kind {
            DataKind::Entry => 0,
            DataKind::EntryBlock => 1,
        });
        w.push_hash(&self.data_hash);
        w.push_bytes(&self.data);
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        let data_kind = match r.read_u8()? {
            0 => DataKind::Entry,
            1 => DataKind::EntryBlock,
            other => {
                return Err(MessageError::Malformed(format!(
                    "unknown data response kind {other}"
                )))
            }
        };
        Ok(Self {
            base: MessageBase::new(),
            data_kind,
            data_hash: r.read_hash()?,
            data: r.read_bytes()?,
        })
    }
}

impl fmt::Display for DataResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DataResponse {:?} hash={} size={}",
            self.data_kind,
            &self.data_hash.to_hex()[..8],
            self.data.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eom::Eom;

    fn response() -> MissingMsgResponse {
        let eom = Eom::new(Hash::new([1; 32]), 0, 3, 10, Timestamp::from_secs(5));
        let mut ack = Ack::default();
        ack.db_height = 10;
        MissingMsgResponse::new(ack, Message::Eom(eom), Timestamp::from_secs(6))
    }

    #[test]
    fn response_roundtrip_decodes_nested_message() {
        let bytes = response().marshal();
        let (decoded, rest) = MissingMsgResponse::unmarshal(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded.message.kind(), MessageType::Eom);
        assert_eq!(decoded.ack.db_height, 10);
    }

    #[test]
    fn nested_response_is_rejected() {
        let inner = response();
        let outer = MissingMsgResponse {
            base: MessageBase::new(),
            timestamp: Timestamp::EPOCH,
            ack: Ack::default(),
            message: Box::new(Message::MissingMsgResponse(inner)),
        };
        let bytes = outer.marshal();
        assert!(matches!(
            MissingMsgResponse::unmarshal(&bytes),
            Err(MessageError::Malformed(_))
        ));
    }

    #[test]
    fn missing_msg_keeps_vm_and_heights() {
        let msg = MissingMsg::new(4, 77, vec![1, 5, 9], Timestamp::EPOCH);
        let (decoded, _) = MissingMsg::unmarshal(&msg.marshal()).unwrap();
        assert_eq!(decoded.base.vm_index, 4);
        assert_eq!(decoded.process_list_heights, vec![1, 5, 9]);
    }

    #[test]
    fn data_response_detects_mismatched_hash() {
        let mut resp = DataResponse::new(DataKind::Entry, b"entry".to_vec());
        assert!(resp.is_consistent());
        resp.data.push(0);
        assert!(!resp.is_consistent());
    }
}
