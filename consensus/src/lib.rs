//! Consensus: validation, ordering and leader failover.
//!
//! Leaders order messages into virtual machines (VMs) by issuing signed,
//! hash-chained acks. Followers accept acks strictly in height order. A
//! leader that stalls is replaced once a strict majority of federated
//! servers sign the same fault.
//!
//! ## Module overview
//!
//! - [`state`]: Traits for the chain state read during validation and mutated by `process`.
//! - [`validate`]: The tri-state validation contract for every message kind.
//! - [`vm`]: VM index selection.
//! - [`ack`]: Ack issuing (leader) and ack-chain following (follower).
//! - [`fault`]: Quorum counting, claim priority and admin-block conversion.
//! - [`negotiation`]: Per-lane failover sessions.
//! - [`execute`]: Leader/follower execution and `process`.
//! - [`admin`]: Admin-block entries.
//! - [`error`]: Consensus error types.

pub mod ack;
pub mod admin;
pub mod error;
pub mod execute;
pub mod fault;
pub mod negotiation;
pub mod state;
pub mod validate;
pub mod vm;

pub use ack::{AckChain, AckOrder, Leader};
pub use admin::AdminEntry;
pub use error::ConsensusError;
pub use execute::{has_process_effect, process, Action, Executor, PENDING_TTL_MS};
pub use fault::{
    has_enough_sigs, priority, quorum_threshold, sig_tally, to_admin_block_entry,
    FAULT_PRIORITY_WINDOW_MS,
};
pub use negotiation::{negotiator_for, FaultTracker, NegotiationSession, DEFAULT_FAULT_TIMEOUT_MS};
pub use state::{AuthorityLevel, ChainState, ProcessState, SlotStatus};
pub use validate::{validate, validate_ack, validate_dbstate};
pub use vm::{compute_vm_index, selection_hash, vm_index_for};
