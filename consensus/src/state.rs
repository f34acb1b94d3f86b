//! Interfaces to the chain state this layer reads and the process-list
//! state it mutates.
//!
//! Storage, identity registry and transaction semantics live behind these
//! traits. Implementations must present a consistent snapshot for the
//! duration of each call.

use std::collections::HashMap;

use serde::Serialize;

use quorum_messages::{DataKind, DbState};
use quorum_types::{FullSignature, Hash, NetworkId, PublicKey, Timestamp, Validity};

use crate::admin::AdminEntry;

/// Authority a signature carries at a given height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum AuthorityLevel {
    Federated,
    Audit,
    None,
}

impl AuthorityLevel {
    /// `1` federated, `0` audit, `-1` not an authority.
    pub fn as_i8(&self) -> i8 {
        match self {
            Self::Federated => 1,
            Self::Audit => 0,
            Self::None => -1,
        }
    }

    pub fn is_federated(&self) -> bool {
        matches!(self, Self::Federated)
    }
}

/// Local knowledge of a process-list slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum SlotStatus {
    /// The process list for that height/VM does not exist here yet.
    Unknown,
    /// The slot exists and is free.
    Empty,
    /// The slot already holds an acked message.
    Occupied,
}

/// Read-only view of the chain.
pub trait ChainState {
    fn network(&self) -> NetworkId;
    fn now(&self) -> Timestamp;

    /// This node's identity chain id.
    fn identity_chain_id(&self) -> Hash;

    fn highest_saved_block(&self) -> u32;
    /// Height of the block currently being assembled.
    fn leader_height(&self) -> u32;
    /// Minute of the block currently being assembled, 0 to 9.
    fn current_minute(&self) -> u8;
    /// Count of faults applied so far; orders faults across VMs.
    fn system_height(&self) -> u32;
    /// Serial hash of the last full server fault applied, if any.
    fn last_fault_serial(&self) -> Option<Hash>;

    /// VM led by `chain_id` at `db_height`/`minute`, if it leads one.
    fn virtual_server(&self, db_height: u32, minute: u8, chain_id: &Hash) -> Option<u8>;
    /// Level of the authority whose key made `sig` over `data` at `db_height`.
    fn verify_authority_signature(
        &self,
        data: &[u8],
        sig: &FullSignature,
        db_height: u32,
    ) -> AuthorityLevel;
    /// Federated servers at `db_height`, in VM order.
    fn fed_servers(&self, db_height: u32) -> Vec<Hash>;
    fn audit_servers(&self, db_height: u32) -> Vec<Hash>;
    fn is_authority(&self, chain_id: &Hash) -> bool;
    /// Signing key of the authority `chain_id`.
    fn authority_key(&self, chain_id: &Hash) -> Option<PublicKey>;
    /// Key authorized to change the authority set.
    fn skeleton_key(&self) -> PublicKey;

    fn ack_slot(&self, db_height: u32, vm_index: u8, height: u32) -> SlotStatus;

    fn ec_balance(&self, ec_key: &PublicKey) -> i64;
    fn has_commit(&self, entry_hash: &Hash) -> bool;
    fn validate_factoid_transaction(&self, transaction: &[u8]) -> Validity;

    /// Known-good directory block hash at `height`; consulted on the
    /// production network only.
    fn checkpoint(&self, height: u32) -> Option<Hash>;
    fn saved_dblock_hash(&self, height: u32) -> Option<Hash>;
    fn load_dbstate(&self, height: u32) -> Option<DbState>;
    /// Entry blocks and entries saved at `height`.
    fn entry_blocks_at(&self, height: u32) -> Option<(Vec<Vec<u8>>, Vec<Vec<u8>>)>;
    fn fetch_data(&self, hash: &Hash) -> Option<(DataKind, Vec<u8>)>;
}

/// Mutations applied when an ordered message is processed.
///
/// Each returns `false` when the state cannot apply the change yet; the
/// caller retries on a later pass.
pub trait ProcessState: ChainState {
    fn add_commit(&mut self, entry_hash: Hash, credits: u8, ec_key: PublicKey) -> bool;
    fn add_entry(&mut self, chain_id: Hash, content: &[u8]) -> bool;
    fn apply_transaction(&mut self, transaction: &[u8]) -> bool;
    fn end_of_minute(&mut self, db_height: u32, vm_index: u8, minute: u8) -> bool;
    fn add_dblock_signature(&mut self, db_height: u32, identity: Hash, sig: FullSignature) -> bool;
    fn add_admin_entry(&mut self, db_height: u32, entry: AdminEntry) -> bool;
    fn replace_leader(&mut self, db_height: u32, vm_index: u8, new_leader: Hash) -> bool;
    /// Extend the full-fault lineage with `serial_hash`.
    fn set_last_fault_serial(&mut self, serial_hash: Hash);
    /// Replace the known-good block hashes.
    fn load_checkpoints(&mut self, checkpoints: HashMap<u32, Hash>);
    fn fast_forward(&mut self, dbstate: &DbState) -> bool;
}
