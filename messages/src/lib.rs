//! Protocol messages exchanged between consensus nodes.
//!
//! Every message is a variant of [`Message`], encoded as a one-byte type tag
//! followed by the variant's fields. Per-variant codecs implement
//! [`Payload`]; variants carrying a signature also implement [`Signable`].

pub mod ack;
pub mod bounce;
pub mod buffer;
pub mod commit;
pub mod dbsig;
pub mod dbstate;
pub mod entry_blocks;
pub mod envelope;
pub mod eom;
pub mod error;
pub mod factoid;
pub mod fault;
pub mod heartbeat;
pub mod kind;
pub mod message;
pub mod missing;
pub mod negotiation;
pub mod payload;
pub mod reveal;
pub mod server;

pub use ack::Ack;
pub use bounce::{Bounce, BounceReply, Ping};
pub use commit::{ChainCommit, CommitChain, CommitEntry, EntryCommit};
pub use dbsig::DirectoryBlockSignature;
pub use dbstate::{DbState, DbStateMissing, DirectoryBlock};
pub use entry_blocks::{EntryBlockResponse, MissingEntryBlocks, MAX_ENTRY_BLOCK_SPAN};
pub use envelope::{HashCache, MessageBase};
pub use eom::Eom;
pub use error::MessageError;
pub use factoid::FactoidTransaction;
pub use fault::{FaultCore, FullServerFault, ServerFault};
pub use heartbeat::Heartbeat;
pub use kind::MessageType;
pub use message::Message;
pub use missing::{DataKind, DataResponse, MissingData, MissingMsg, MissingMsgResponse};
pub use negotiation::Negotiation;
pub use payload::{Payload, Signable};
pub use reveal::{RevealEntry, MAX_ENTRY_SIZE};
pub use server::{AddServer, ChangeServerKey, RemoveServer, ServerType};
