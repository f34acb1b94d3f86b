//! The closed set of protocol messages.

use serde::Serialize;
use std::fmt;

use quorum_crypto::sha256;
use quorum_types::{FullSignature, Hash, KeyPair};

use crate::ack::Ack;
use crate::bounce::{Bounce, BounceReply};
use crate::buffer::Reader;
use crate::commit::{CommitChain, CommitEntry};
use crate::dbsig::DirectoryBlockSignature;
use crate::dbstate::{DbState, DbStateMissing};
use crate::entry_blocks::{EntryBlockResponse, MissingEntryBlocks};
use crate::envelope::MessageBase;
use crate::eom::Eom;
use crate::error::MessageError;
use crate::factoid::FactoidTransaction;
use crate::fault::{FullServerFault, ServerFault};
use crate::heartbeat::Heartbeat;
use crate::kind::MessageType;
use crate::missing::{DataResponse, MissingData, MissingMsg, MissingMsgResponse};
use crate::negotiation::Negotiation;
use crate::payload::{Payload, Signable};
use crate::reveal::RevealEntry;
use crate::server::{AddServer, ChangeServerKey, RemoveServer};

/// Any protocol message.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum Message {
    Eom(Eom),
    Ack(Ack),
    ServerFault(ServerFault),
    Negotiation(Negotiation),
    FullServerFault(FullServerFault),
    CommitChain(CommitChain),
    CommitEntry(CommitEntry),
    DirectoryBlockSignature(DirectoryBlockSignature),
    FactoidTransaction(FactoidTransaction),
    Heartbeat(Heartbeat),
    RevealEntry(RevealEntry),
    MissingMsg(MissingMsg),
    MissingData(MissingData),
    DataResponse(DataResponse),
    MissingMsgResponse(MissingMsgResponse),
    DbState(DbState),
    DbStateMissing(DbStateMissing),
    AddServer(AddServer),
    ChangeServerKey(ChangeServerKey),
    RemoveServer(RemoveServer),
    Bounce(Bounce),
    BounceReply(BounceReply),
    MissingEntryBlocks(MissingEntryBlocks),
    EntryBlockResponse(EntryBlockResponse),
}

macro_rules! each_variant {
    ($msg:expr, $m:ident => $body:expr) => {
        match $msg {
            Message::Eom($m) => $body,
            Message::Ack($m) => $body,
            Message::ServerFault($m) => $body,
            Message::Negotiation($m) => $body,
            Message::FullServerFault($m) => $body,
            Message::CommitChain($m) => $body,
            Message::CommitEntry($m) => $body,
            Message::DirectoryBlockSignature($m) => $body,
            Message::FactoidTransaction($m) => $body,
            Message::Heartbeat($m) => $body,
            Message::RevealEntry($m) => $body,
            Message::MissingMsg($m) => $body,
            Message::MissingData($m) => $body,
            Message::DataResponse($m) => $body,
            Message::MissingMsgResponse($m) => $body,
            Message::DbState($m) => $body,
            Message::DbStateMissing($m) => $body,
            Message::AddServer($m) => $body,
            Message::ChangeServerKey($m) => $body,
            Message::RemoveServer($m) => $body,
            Message::Bounce($m) => $body,
            Message::BounceReply($m) => $body,
            Message::MissingEntryBlocks($m) => $body,
            Message::EntryBlockResponse($m) => $body,
        }
    };
}

/// Runs `$body` for signable variants, `$other` for the rest.
macro_rules! signable_variant {
    ($msg:expr, $m:ident => $body:expr, _ => $other:expr) => {
        match $msg {
            Message::Eom($m) => $body,
            Message::Ack($m) => $body,
            Message::ServerFault($m) => $body,
            Message::Negotiation($m) => $body,
            Message::FullServerFault($m) => $body,
            Message::DirectoryBlockSignature($m) => $body,
            Message::Heartbeat($m) => $body,
            Message::AddServer($m) => $body,
            Message::ChangeServerKey($m) => $body,
            Message::RemoveServer($m) => $body,
            _ => $other,
        }
    };
}

impl Message {
    pub fn kind(&self) -> MessageType {
        match self {
            Self::Eom(_) => MessageType::Eom,
            Self::Ack(_) => MessageType::Ack,
            Self::ServerFault(_) => MessageType::ServerFault,
            Self::Negotiation(_) => MessageType::Negotiation,
            Self::FullServerFault(_) => MessageType::FullServerFault,
            Self::CommitChain(_) => MessageType::CommitChain,
            Self::CommitEntry(_) => MessageType::CommitEntry,
            Self::DirectoryBlockSignature(_) => MessageType::DirectoryBlockSignature,
            Self::FactoidTransaction(_) => MessageType::FactoidTransaction,
            Self::Heartbeat(_) => MessageType::Heartbeat,
            Self::RevealEntry(_) => MessageType::RevealEntry,
            Self::MissingMsg(_) => MessageType::MissingMsg,
            Self::MissingData(_) => MessageType::MissingData,
            Self::DataResponse(_) => MessageType::DataResponse,
            Self::MissingMsgResponse(_) => MessageType::MissingMsgResponse,
            Self::DbState(_) => MessageType::DbState,
            Self::DbStateMissing(_) => MessageType::DbStateMissing,
            Self::AddServer(_) => MessageType::AddServer,
            Self::ChangeServerKey(_) => MessageType::ChangeServerKey,
            Self::RemoveServer(_) => MessageType::RemoveServer,
            Self::Bounce(_) => MessageType::Bounce,
            Self::BounceReply(_) => MessageType::BounceReply,
            Self::MissingEntryBlocks(_) => MessageType::MissingEntryBlocks,
            Self::EntryBlockResponse(_) => MessageType::EntryBlockResponse,
        }
    }

    pub fn base(&self) -> &MessageBase {
        each_variant!(self, m => m.base())
    }

    pub fn base_mut(&mut self) -> &mut MessageBase {
        each_variant!(self, m => m.base_mut())
    }

    pub fn encode(&self) -> Vec<u8> {
        each_variant!(self, m => m.marshal())
    }

    /// Decode exactly one message; leftover input is an error.
    pub fn decode(data: &[u8]) -> Result<Self, MessageError> {
        let (msg, rest) = Self::decode_prefix(data)?;
        if !rest.is_empty() {
            return Err(MessageError::TrailingBytes(rest.len()));
        }
        Ok(msg)
    }

    /// Decode one message from the front of `data`, returning the remainder.
    pub fn decode_prefix(data: &[u8]) -> Result<(Self, &[u8]), MessageError> {
        let kind = MessageType::try_from(Reader::new(data).peek_u8()?)?;
        Ok(match kind {
            MessageType::Eom => wrap(Eom::unmarshal(data)?, Self::Eom),
            MessageType::Ack => wrap(Ack::unmarshal(data)?, Self::Ack),
            MessageType::ServerFault => wrap(ServerFault::unmarshal(data)?, Self::ServerFault),
            MessageType::Negotiation => wrap(Negotiation::unmarshal(data)?, Self::Negotiation),
            MessageType::FullServerFault => {
                wrap(FullServerFault::unmarshal(data)?, Self::FullServerFault)
            }
            MessageType::CommitChain => wrap(CommitChain::unmarshal(data)?, Self::CommitChain),
            MessageType::CommitEntry => wrap(CommitEntry::unmarshal(data)?, Self::CommitEntry),
            MessageType::DirectoryBlockSignature => wrap(
                DirectoryBlockSignature::unmarshal(data)?,
                Self::DirectoryBlockSignature,
            ),
            MessageType::FactoidTransaction => {
                wrap(FactoidTransaction::unmarshal(data)?, Self::FactoidTransaction)
            }
            MessageType::Heartbeat => wrap(Heartbeat::unmarshal(data)?, Self::Heartbeat),
            MessageType::RevealEntry => wrap(RevealEntry::unmarshal(data)?, Self::RevealEntry),
            MessageType::MissingMsg => wrap(MissingMsg::unmarshal(data)?, Self::MissingMsg),
            MessageType::MissingData => wrap(MissingData::unmarshal(data)?, Self::MissingData),
            MessageType::DataResponse => wrap(DataResponse::unmarshal(data)?, Self::DataResponse),
            MessageType::MissingMsgResponse => {
                wrap(MissingMsgResponse::unmarshal(data)?, Self::MissingMsgResponse)
            }
            MessageType::DbState => wrap(DbState::unmarshal(data)?, Self::DbState),
            MessageType::DbStateMissing => {
                wrap(DbStateMissing::unmarshal(data)?, Self::DbStateMissing)
            }
            MessageType::AddServer => wrap(AddServer::unmarshal(data)?, Self::AddServer),
            MessageType::ChangeServerKey => {
                wrap(ChangeServerKey::unmarshal(data)?, Self::ChangeServerKey)
            }
            MessageType::RemoveServer => wrap(RemoveServer::unmarshal(data)?, Self::RemoveServer),
            MessageType::Bounce => wrap(Bounce::unmarshal(data)?, Self::Bounce),
            MessageType::BounceReply => wrap(BounceReply::unmarshal(data)?, Self::BounceReply),
            MessageType::MissingEntryBlocks => {
                wrap(MissingEntryBlocks::unmarshal(data)?, Self::MissingEntryBlocks)
            }
            MessageType::EntryBlockResponse => {
                wrap(EntryBlockResponse::unmarshal(data)?, Self::EntryBlockResponse)
            }
        })
    }

    pub fn is_signable(&self) -> bool {
        signable_variant!(self, _m => true, _ => false)
    }

    /// Hash of the signed content, identical before and after signing.
    pub fn msg_hash(&self) -> Hash {
        self.base().hashes.msg_or_init(|| {
            let preimage = signable_variant!(self, m => m.marshal_for_signature(), _ => self.encode());
            sha256(&preimage)
        })
    }

    /// Hash of the full encoding, signature included. Used for duplicate
    /// suppression.
    pub fn repeat_hash(&self) -> Hash {
        self.base()
            .hashes
            .repeat_or_init(|| sha256(&self.encode()))
    }

    /// The identifying hash of the message's subject.
    pub fn hash(&self) -> Hash {
        self.base().hashes.hash_or_init(|| match self {
            Self::ServerFault(m) => m.core_hash(),
            Self::FullServerFault(m) => m.core_hash(),
            Self::Negotiation(m) => m.core_hash(),
            Self::CommitChain(m) => m.commit.hash(),
            Self::CommitEntry(m) => m.commit.hash(),
            Self::RevealEntry(m) => m.entry_hash(),
            Self::DbState(m) => m.dblock.hash(),
            Self::DataResponse(m) => m.data_hash,
            _ => self.msg_hash(),
        })
    }

    /// Equality of wire content, ignoring process-local state.
    pub fn is_same_as(&self, other: &Message) -> bool {
        self.kind() == other.kind() && self.encode() == other.encode()
    }

    pub fn signature(&self) -> Option<&FullSignature> {
        signable_variant!(self, m => m.signature(), _ => None)
    }

    pub fn sign(&mut self, keypair: &KeyPair) -> Result<(), MessageError> {
        let name = self.kind().name();
        signable_variant!(self, m => {
            m.sign(keypair);
            Ok(())
        }, _ => Err(MessageError::NotSignable(name)))
    }

    pub fn verify_signature(&mut self) -> Result<bool, MessageError> {
        let name = self.kind().name();
        signable_variant!(self, m => m.verify_signature(), _ => Err(MessageError::NotSignable(name)))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn wrap<T>(decoded: (T, &[u8]), variant: fn(T) -> Message) -> (Message, &[u8]) {
    (variant(decoded.0), decoded.1)
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        each_variant!(self, m => fmt::Display::fmt(m, f))
    }
}
