//! Nullable chain state: an in-memory authority set, process list and
//! block store.

use std::collections::{BTreeMap, HashMap, HashSet};

use quorum_consensus::{AdminEntry, AuthorityLevel, ChainState, ProcessState, SlotStatus};
use quorum_crypto::{keypair_from_seed, verify_full};
use quorum_messages::{DataKind, DbState};
use quorum_types::{FullSignature, Hash, KeyPair, NetworkId, PublicKey, Timestamp, Validity};

use crate::clock::NullClock;

/// Deterministic identity and key for authority number `seed`.
pub fn authority(seed: u8) -> (Hash, KeyPair) {
    let mut id = [0u8; 32];
    id[0] = 0x88;
    id[31] = seed;
    (Hash::new(id), keypair_from_seed(&[seed; 32]))
}

/// Seed of the skeleton key used by [`NullState::skeleton_keypair`].
pub const SKELETON_SEED: [u8; 32] = [0xAA; 32];

/// In-memory [`ChainState`] and [`ProcessState`].
///
/// Authorities are listed in VM order. Process lists exist for every height
/// above the saved tip up to the leader height.
pub struct NullState {
    pub clock: NullClock,
    pub network: NetworkId,
    pub identity: Hash,
    pub saved: u32,
    pub leader_height: u32,
    pub minute: u8,
    pub system_height: u32,
    pub last_fault_serial: Option<Hash>,
    pub feds: Vec<(Hash, PublicKey)>,
    pub audits: Vec<(Hash, PublicKey)>,
    pub skeleton: PublicKey,
    pub occupied: HashSet<(u32, u8, u32)>,
    pub balances: HashMap<PublicKey, i64>,
    pub commits: HashSet<Hash>,
    pub factoid_validity: Validity,
    pub checkpoints: HashMap<u32, Hash>,
    pub blocks: BTreeMap<u32, DbState>,
    pub entry_blocks: HashMap<u32, (Vec<Vec<u8>>, Vec<Vec<u8>>)>,
    pub data: HashMap<Hash, (DataKind, Vec<u8>)>,
    pub entries: Vec<(Hash, Vec<u8>)>,
    pub transactions: Vec<Vec<u8>>,
    pub eoms: Vec<(u32, u8, u8)>,
    pub dblock_signatures: Vec<(u32, Hash, FullSignature)>,
    pub admin: Vec<(u32, AdminEntry)>,
}

impl NullState {
    /// A local-network state with `fed` federated and `audit` audit servers
    /// from [`authority`] seeds `1..=fed` and `fed+1..=fed+audit`. This node
    /// is the first federated server.
    pub fn new(fed: u8, audit: u8) -> Self {
        let feds: Vec<_> = (1..=fed)
            .map(|s| {
                let (id, kp) = authority(s);
                (id, kp.public)
            })
            .collect();
        let audits = (fed + 1..=fed + audit)
            .map(|s| {
                let (id, kp) = authority(s);
                (id, kp.public)
            })
            .collect();
        let identity = feds.first().map(|(id, _)| *id).unwrap_or_default();
        Self {
            clock: NullClock::new(1_700_000_000_000),
            network: NetworkId::Local,
            identity,
            saved: 0,
            leader_height: 1,
            minute: 0,
            system_height: 0,
            last_fault_serial: None,
            feds,
            audits,
            skeleton: keypair_from_seed(&SKELETON_SEED).public,
            occupied: HashSet::new(),
            balances: HashMap::new(),
            commits: HashSet::new(),
            factoid_validity: Validity::Valid,
            checkpoints: HashMap::new(),
            blocks: BTreeMap::new(),
            entry_blocks: HashMap::new(),
            data: HashMap::new(),
            entries: Vec::new(),
            transactions: Vec::new(),
            eoms: Vec::new(),
            dblock_signatures: Vec::new(),
            admin: Vec::new(),
        }
    }

    pub fn skeleton_keypair() -> KeyPair {
        keypair_from_seed(&SKELETON_SEED)
    }

    /// Act as authority `seed`.
    pub fn as_authority(mut self, seed: u8) -> Self {
        self.identity = authority(seed).0;
        self
    }

    /// Mark `height` saved and open the next block.
    pub fn with_saved(mut self, height: u32) -> Self {
        self.saved = height;
        self.leader_height = height + 1;
        self
    }

    /// Store a saved block and advance the tip to it.
    pub fn save_block(&mut self, dbstate: DbState) {
        let height = dbstate.height();
        self.blocks.insert(height, dbstate);
        if height >= self.saved {
            self.saved = height;
            self.leader_height = self.leader_height.max(height + 1);
        }
    }

    fn level_of(&self, key: &PublicKey) -> AuthorityLevel {
        if self.feds.iter().any(|(_, k)| k == key) {
            AuthorityLevel::Federated
        } else if self.audits.iter().any(|(_, k)| k == key) {
            AuthorityLevel::Audit
        } else {
            AuthorityLevel::None
        }
    }
}

impl ChainState for NullState {
    fn network(&self) -> NetworkId {
        self.network
    }

    fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn identity_chain_id(&self) -> Hash {
        self.identity
    }

    fn highest_saved_block(&self) -> u32 {
        self.saved
    }

    fn leader_height(&self) -> u32 {
        self.leader_height
    }

    fn current_minute(&self) -> u8 {
        self.minute
    }

    fn system_height(&self) -> u32 {
        self.system_height
    }

    fn last_fault_serial(&self) -> Option<Hash> {
        self.last_fault_serial
    }

    fn virtual_server(&self, db_height: u32, _minute: u8, chain_id: &Hash) -> Option<u8> {
        if db_height <= self.saved || db_height > self.leader_height {
            return None;
        }
        self.feds
            .iter()
            .position(|(id, _)| id == chain_id)
            .and_then(|p| u8::try_from(p).ok())
    }

    fn verify_authority_signature(&self, data: &[u8], sig: &FullSignature, _db_height: u32) -> AuthorityLevel {
        if !verify_full(data, sig) {
            return AuthorityLevel::None;
        }
        self.level_of(&sig.public_key)
    }

    fn fed_servers(&self, _db_height: u32) -> Vec<Hash> {
        self.feds.iter().map(|(id, _)| *id).collect()
    }

    fn audit_servers(&self, _db_height: u32) -> Vec<Hash> {
        self.audits.iter().map(|(id, _)| *id).collect()
    }

    fn is_authority(&self, chain_id: &Hash) -> bool {
        self.feds.iter().chain(self.audits.iter()).any(|(id, _)| id == chain_id)
    }

    fn authority_key(&self, chain_id: &Hash) -> Option<PublicKey> {
        self.feds
            .iter()
            .chain(self.audits.iter())
            .find(|(id, _)| id == chain_id)
            .map(|(_, key)| *key)
    }

    fn skeleton_key(&self) -> PublicKey {
        self.skeleton
    }

    fn ack_slot(&self, db_height: u32, vm_index: u8, height: u32) -> SlotStatus {
        if db_height <= self.saved || db_height > self.leader_height {
            SlotStatus::Unknown
        } else if self.occupied.contains(&(db_height, vm_index, height)) {
            SlotStatus::Occupied
        } else {
            SlotStatus::Empty
        }
    }

    fn ec_balance(&self, ec_key: &PublicKey) -> i64 {
        self.balances.get(ec_key).copied().unwrap_or(0)
    }

    fn has_commit(&self, entry_hash: &Hash) -> bool {
        self.commits.contains(entry_hash)
    }

    fn validate_factoid_transaction(&self, _transaction: &[u8]) -> Validity {
        self.factoid_validity
    }

    fn checkpoint(&self, height: u32) -> Option<Hash> {
        self.checkpoints.get(&height).copied()
    }

    fn saved_dblock_hash(&self, height: u32) -> Option<Hash> {
        self.blocks.get(&height).map(|b| b.dblock.hash())
    }

    fn load_dbstate(&self, height: u32) -> Option<DbState> {
        self.blocks.get(&height).cloned()
    }

    fn entry_blocks_at(&self, height: u32) -> Option<(Vec<Vec<u8>>, Vec<Vec<u8>>)> {
        self.entry_blocks.get(&height).cloned()
    }

    fn fetch_data(&self, hash: &Hash) -> Option<(DataKind, Vec<u8>)> {
        self.data.get(hash).cloned()
    }
}

impl ProcessState for NullState {
    fn add_commit(&mut self, entry_hash: Hash, credits: u8, ec_key: PublicKey) -> bool {
        let balance = self.balances.entry(ec_key).or_insert(0);
        if *balance < i64::from(credits) {
            return false;
        }
        *balance -= i64::from(credits);
        self.commits.insert(entry_hash)
    }

    fn add_entry(&mut self, chain_id: Hash, content: &[u8]) -> bool {
        self.entries.push((chain_id, content.to_vec()));
        true
    }

    fn apply_transaction(&mut self, transaction: &[u8]) -> bool {
        self.transactions.push(transaction.to_vec());
        true
    }

    fn end_of_minute(&mut self, db_height: u32, vm_index: u8, minute: u8) -> bool {
        self.eoms.push((db_height, vm_index, minute));
        true
    }

    fn add_dblock_signature(&mut self, db_height: u32, identity: Hash, sig: FullSignature) -> bool {
        self.dblock_signatures.push((db_height, identity, sig));
        true
    }

    fn add_admin_entry(&mut self, db_height: u32, entry: AdminEntry) -> bool {
        self.admin.push((db_height, entry));
        true
    }

    /// The audit server takes the faulted leader's place in VM order.
    fn replace_leader(&mut self, _db_height: u32, vm_index: u8, new_leader: Hash) -> bool {
        let Some(pos) = self.audits.iter().position(|(id, _)| *id == new_leader) else {
            return false;
        };
        let Some(slot) = self.feds.get_mut(usize::from(vm_index)) else {
            return false;
        };
        let promoted = self.audits.remove(pos);
        let demoted = std::mem::replace(slot, promoted);
        self.audits.push(demoted);
        self.system_height += 1;
        true
    }

    fn set_last_fault_serial(&mut self, serial_hash: Hash) {
        self.last_fault_serial = Some(serial_hash);
    }

    fn load_checkpoints(&mut self, checkpoints: HashMap<u32, Hash>) {
        self.checkpoints = checkpoints;
    }

    fn fast_forward(&mut self, dbstate: &DbState) -> bool {
        if dbstate.height() != self.saved + 1 && !(self.blocks.is_empty() && dbstate.height() == 0) {
            return false;
        }
        self.save_block(dbstate.clone());
        true
    }
}
