//! The closed registry of message type tags.

use serde::Serialize;
use std::fmt;

use crate::error::MessageError;

/// Every message kind understood by the node, keyed by its wire tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum MessageType {
    Eom = 0,
    Ack = 1,
    ServerFault = 2,
    Negotiation = 3,
    FullServerFault = 4,
    CommitChain = 5,
    CommitEntry = 6,
    DirectoryBlockSignature = 7,
    FactoidTransaction = 9,
    Heartbeat = 10,
    RevealEntry = 13,
    MissingMsg = 16,
    MissingData = 17,
    DataResponse = 18,
    MissingMsgResponse = 19,
    DbState = 20,
    DbStateMissing = 21,
    AddServer = 22,
    ChangeServerKey = 23,
    RemoveServer = 24,
    Bounce = 25,
    BounceReply = 26,
    MissingEntryBlocks = 27,
    EntryBlockResponse = 28,
}

impl MessageType {
    pub const ALL: [MessageType; 24] = [
        Self::Eom,
        Self::Ack,
        Self::ServerFault,
        Self::Negotiation,
        Self::FullServerFault,
        Self::CommitChain,
        Self::CommitEntry,
        Self::DirectoryBlockSignature,
        Self::FactoidTransaction,
        Self::Heartbeat,
        Self::RevealEntry,
        Self::MissingMsg,
        Self::MissingData,
        Self::DataResponse,
        Self::MissingMsgResponse,
        Self::DbState,
        Self::DbStateMissing,
        Self::AddServer,
        Self::ChangeServerKey,
        Self::RemoveServer,
        Self::Bounce,
        Self::BounceReply,
        Self::MissingEntryBlocks,
        Self::EntryBlockResponse,
    ];

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Eom => "EOM",
            Self::Ack => "Ack",
            Self::ServerFault => "ServerFault",
            Self::Negotiation => "Negotiation",
            Self::FullServerFault => "FullServerFault",
            Self::CommitChain => "CommitChain",
            Self::CommitEntry => "CommitEntry",
            Self::DirectoryBlockSignature => "DirectoryBlockSignature",
            Self::FactoidTransaction => "FactoidTransaction",
            Self::Heartbeat => "Heartbeat",
            Self::RevealEntry => "RevealEntry",
            Self::MissingMsg => "MissingMsg",
            Self::MissingData => "MissingData",
            Self::DataResponse => "DataResponse",
            Self::MissingMsgResponse => "MissingMsgResponse",
            Self::DbState => "DBState",
            Self::DbStateMissing => "DBStateMissing",
            Self::AddServer => "AddServer",
            Self::ChangeServerKey => "ChangeServerKey",
            Self::RemoveServer => "RemoveServer",
            Self::Bounce => "Bounce",
            Self::BounceReply => "BounceReply",
            Self::MissingEntryBlocks => "MissingEntryBlocks",
            Self::EntryBlockResponse => "EntryBlockResponse",
        }
    }

    /// Fault messages get a longer retry schedule from the reliability layer.
    pub fn is_fault(self) -> bool {
        matches!(self, Self::ServerFault | Self::FullServerFault)
    }

    /// Kinds a leader orders into its VM by issuing an ack.
    pub fn is_leader_ordered(self) -> bool {
        matches!(
            self,
            Self::Eom
                | Self::CommitChain
                | Self::CommitEntry
                | Self::RevealEntry
                | Self::DirectoryBlockSignature
                | Self::FactoidTransaction
                | Self::AddServer
                | Self::ChangeServerKey
                | Self::RemoveServer
        )
    }
}

impl TryFrom<u8> for MessageType {
    type Error = MessageError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.tag() == tag)
            .ok_or(MessageError::UnknownType(tag))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
