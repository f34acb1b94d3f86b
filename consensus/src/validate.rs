//! The tri-state validation contract.
//!
//! [`Validity::Invalid`] messages are discarded for good, [`Validity::Pending`]
//! ones are held and re-checked, [`Validity::Valid`] ones are admitted.
//! Signature checks that pass are cached on the envelope, so re-validating a
//! held message never repeats the cryptography.

use tracing::trace;

use quorum_crypto::{chain_hash, verify_full};
use quorum_messages::{
    Ack, AddServer, ChangeServerKey, CommitChain, CommitEntry, DbState, DirectoryBlockSignature,
    Eom, FullServerFault, Heartbeat, Message, MissingEntryBlocks, MissingMsgResponse,
    Negotiation, RemoveServer, RevealEntry, ServerFault, Signable, MAX_ENTRY_BLOCK_SPAN,
    MAX_ENTRY_SIZE,
};
use quorum_types::Validity::{self, Invalid, Pending, Valid};

use crate::fault::{has_enough_sigs, quorum_threshold};
use crate::negotiation::negotiator_for;
use crate::state::{AuthorityLevel, ChainState, SlotStatus};

/// Validate `msg` against the current chain state.
pub fn validate<S: ChainState + ?Sized>(msg: &mut Message, state: &S) -> Validity {
    if msg.base().invalid {
        return Invalid;
    }
    let result = match msg {
        Message::Eom(m) => validate_eom(m, state),
        Message::Ack(m) => validate_ack(m, state),
        Message::ServerFault(m) => validate_server_fault(m, state),
        Message::FullServerFault(m) => validate_full_server_fault(m, state),
        Message::Negotiation(m) => validate_negotiation(m, state),
        Message::CommitChain(m) => validate_commit_chain(m, state),
        Message::CommitEntry(m) => validate_commit_entry(m, state),
        Message::RevealEntry(m) => validate_reveal(m, state),
        Message::FactoidTransaction(m) => state.validate_factoid_transaction(&m.transaction),
        Message::DirectoryBlockSignature(m) => validate_dbsig(m, state),
        Message::Heartbeat(m) => validate_heartbeat(m, state),
        Message::MissingMsg(m) => {
            if m.process_list_heights.is_empty() {
                Invalid
            } else {
                Valid
            }
        }
        Message::MissingMsgResponse(m) => validate_missing_response(m),
        Message::MissingData(m) => {
            if m.requested_hash.is_zero() {
                Invalid
            } else {
                Valid
            }
        }
        Message::DataResponse(m) => {
            if m.is_consistent() {
                Valid
            } else {
                Invalid
            }
        }
        Message::DbState(m) => validate_dbstate(m, state),
        Message::DbStateMissing(m) => {
            if m.start > m.end {
                Invalid
            } else {
                Valid
            }
        }
        Message::MissingEntryBlocks(m) => validate_missing_entry_blocks(m, state),
        Message::AddServer(m) => validate_add_server(m, state),
        Message::ChangeServerKey(m) => validate_change_key(m, state),
        Message::RemoveServer(m) => validate_remove_server(m, state),
        Message::Bounce(_) | Message::BounceReply(_) | Message::EntryBlockResponse(_) => Valid,
    };
    if result == Invalid {
        msg.base_mut().invalid = true;
    }
    trace!(kind = %msg.kind(), validity = %result, "validated");
    result
}

/// Embedded signature verifies; a missing signature counts as bad.
fn signature_ok<T: Signable>(m: &mut T) -> bool {
    matches!(m.verify_signature(), Ok(true))
}

/// Level of the embedded signer at `db_height`, after the signature itself
/// verifies.
fn signer_level<T: Signable, S: ChainState + ?Sized>(m: &mut T, state: &S, db_height: u32) -> AuthorityLevel {
    if !signature_ok(m) {
        return AuthorityLevel::None;
    }
    match m.signature() {
        Some(sig) => state.verify_authority_signature(&m.marshal_for_signature(), sig, db_height),
        None => AuthorityLevel::None,
    }
}

fn validate_eom<S: ChainState + ?Sized>(m: &mut Eom, state: &S) -> Validity {
    if m.db_height <= state.highest_saved_block() || m.base.minute > 9 {
        return Invalid;
    }
    match state.virtual_server(m.db_height, m.base.minute, &m.chain_id) {
        None => return Pending,
        Some(vm) if vm != m.base.vm_index => return Invalid,
        Some(_) => {}
    }
    let db_height = m.db_height;
    if !signer_level(m, state, db_height).is_federated() {
        return Invalid;
    }
    Valid
}

pub fn validate_ack<S: ChainState + ?Sized>(m: &mut Ack, state: &S) -> Validity {
    let slot = state.ack_slot(m.db_height, m.base.vm_index, m.height);
    if slot == SlotStatus::Occupied {
        return Invalid;
    }
    if m.db_height <= state.highest_saved_block() {
        return Invalid;
    }
    if slot == SlotStatus::Unknown {
        return Pending;
    }
    if !signature_ok(m) {
        return Invalid;
    }
    let leader_chain_id = m.base.leader_chain_id;
    match state.virtual_server(m.db_height, m.base.minute, &leader_chain_id) {
        None => return Pending,
        Some(vm) if vm != m.base.vm_index => return Invalid,
        Some(_) => {}
    }
    let db_height = m.db_height;
    if !signer_level(m, state, db_height).is_federated() {
        return Invalid;
    }
    Valid
}

fn validate_server_fault<S: ChainState + ?Sized>(m: &mut ServerFault, state: &S) -> Validity {
    let core = m.core;
    if core.is_nil() || core.db_height <= state.highest_saved_block() {
        return Invalid;
    }
    if !state.fed_servers(core.db_height).contains(&core.server_id)
        || !state.audit_servers(core.db_height).contains(&core.audit_server_id)
    {
        return Invalid;
    }
    if !signer_level(m, state, core.db_height).is_federated() {
        return Invalid;
    }
    Valid
}

fn validate_full_server_fault<S: ChainState + ?Sized>(m: &mut FullServerFault, state: &S) -> Validity {
    let core = m.core;
    if core.is_nil() || core.db_height <= state.highest_saved_block() {
        return Invalid;
    }
    if m.signature.is_some() && !signature_ok(m) {
        return Invalid;
    }
    let core_hash = m.core_hash();
    let expected_serial = match state.last_fault_serial() {
        Some(previous) => chain_hash(&previous, &core_hash),
        None => core_hash,
    };
    if m.serial_hash != expected_serial {
        trace!(vm = core.vm_index, db_height = core.db_height, "full fault does not extend the fault lineage");
        return Invalid;
    }
    if m.base.already_validated {
        return Valid;
    }
    let data = core.to_bytes();
    if m.signature_list.iter().any(|sig| !verify_full(&data, sig)) {
        return Invalid;
    }
    if !has_enough_sigs(m, state) {
        return Pending;
    }
    m.base.already_validated = true;
    Valid
}

fn validate_negotiation<S: ChainState + ?Sized>(m: &mut Negotiation, state: &S) -> Validity {
    if m.db_height <= state.highest_saved_block() {
        return Invalid;
    }
    let feds = state.fed_servers(m.db_height);
    if feds.get(usize::from(m.vm_index())) != Some(&m.server_id) {
        return Invalid;
    }
    // Only the federated server after the suspected leader may negotiate.
    let negotiator_key = negotiator_for(&feds, &m.server_id).and_then(|n| state.authority_key(&n));
    if negotiator_key.is_none() || m.signature.map(|s| s.public_key) != negotiator_key {
        return Invalid;
    }
    let db_height = m.db_height;
    if !signer_level(m, state, db_height).is_federated() {
        return Invalid;
    }
    Valid
}

fn validate_commit_chain<S: ChainState + ?Sized>(m: &CommitChain, state: &S) -> Validity {
    let c = &m.commit;
    if !c.credits_in_range() || !c.verify() {
        return Invalid;
    }
    if state.ec_balance(&c.ec_pub_key) < i64::from(c.credits) {
        return Pending;
    }
    Valid
}

fn validate_commit_entry<S: ChainState + ?Sized>(m: &CommitEntry, state: &S) -> Validity {
    let c = &m.commit;
    if !c.credits_in_range() || !c.verify() {
        return Invalid;
    }
    if state.ec_balance(&c.ec_pub_key) < i64::from(c.credits) {
        return Pending;
    }
    Valid
}

fn validate_reveal<S: ChainState + ?Sized>(m: &RevealEntry, state: &S) -> Validity {
    if m.content.len() > MAX_ENTRY_SIZE {
        return Invalid;
    }
    if state.has_commit(&m.entry_hash()) {
        Valid
    } else {
        Pending
    }
}

fn validate_dbsig<S: ChainState + ?Sized>(m: &mut DirectoryBlockSignature, state: &S) -> Validity {
    if m.db_height <= state.highest_saved_block() {
        return Invalid;
    }
    match state.virtual_server(m.db_height, 0, &m.server_identity_chain_id) {
        None => return Pending,
        Some(vm) if vm != m.base.vm_index => return Invalid,
        Some(_) => {}
    }
    let Some(block_sig) = m.dblock_signature else {
        return Invalid;
    };
    if !verify_full(m.dblock_hash.as_bytes(), &block_sig) {
        return Invalid;
    }
    let db_height = m.db_height;
    if !signer_level(m, state, db_height).is_federated() {
        return Invalid;
    }
    match m
        .db_height
        .checked_sub(1)
        .and_then(|prev| state.saved_dblock_hash(prev))
    {
        Some(saved) if saved == m.dblock_hash => Valid,
        Some(_) => Invalid,
        None => Pending,
    }
}

fn validate_heartbeat<S: ChainState + ?Sized>(m: &mut Heartbeat, state: &S) -> Validity {
    let db_height = m.db_height;
    match signer_level(m, state, db_height) {
        AuthorityLevel::None => Invalid,
        AuthorityLevel::Federated | AuthorityLevel::Audit => Valid,
    }
}

fn validate_missing_response(m: &MissingMsgResponse) -> Validity {
    if m.ack.message_hash == m.message.msg_hash() {
        Valid
    } else {
        Invalid
    }
}

/// Genesis is always accepted. On the production network a known
/// checkpoint decides alone; otherwise the block must extend the saved tip.
pub fn validate_dbstate<S: ChainState + ?Sized>(m: &DbState, state: &S) -> Validity {
    let height = m.height();
    if height == 0 {
        return Valid;
    }
    let dblock_hash = m.dblock.hash();
    if state.network().is_production() {
        if let Some(expected) = state.checkpoint(height) {
            return if expected == dblock_hash { Valid } else { Invalid };
        }
    }
    let saved = state.highest_saved_block();
    if height <= saved {
        return Invalid;
    }
    if height > saved + 1 {
        return Pending;
    }
    match state.saved_dblock_hash(height - 1) {
        Some(prev) if prev == m.dblock.prev_hash => {}
        Some(_) => return Invalid,
        None => return Pending,
    }
    if m.signatures.is_empty() {
        return Valid;
    }
    let data = dblock_hash.as_bytes();
    let mut signers = std::collections::HashSet::new();
    for sig in &m.signatures {
        if state.verify_authority_signature(data, sig, height).is_federated() {
            signers.insert(sig.public_key);
        }
    }
    if signers.len() >= quorum_threshold(state.fed_servers(height).len()) {
        Valid
    } else {
        Invalid
    }
}

fn validate_missing_entry_blocks<S: ChainState + ?Sized>(m: &MissingEntryBlocks, state: &S) -> Validity {
    if m.start > m.end || m.start > state.highest_saved_block() {
        return Invalid;
    }
    if m.end - m.start > MAX_ENTRY_BLOCK_SPAN {
        return Invalid;
    }
    Valid
}

/// Signed by the skeleton key.
fn skeleton_signed<T: Signable, S: ChainState + ?Sized>(m: &mut T, state: &S) -> bool {
    let key = state.skeleton_key();
    m.signature().map(|s| s.public_key) == Some(key) && signature_ok(m)
}

fn validate_add_server<S: ChainState + ?Sized>(m: &mut AddServer, state: &S) -> Validity {
    if skeleton_signed(m, state) {
        Valid
    } else {
        Invalid
    }
}

fn validate_change_key<S: ChainState + ?Sized>(m: &mut ChangeServerKey, state: &S) -> Validity {
    if skeleton_signed(m, state) {
        Valid
    } else {
        Invalid
    }
}

fn validate_remove_server<S: ChainState + ?Sized>(m: &mut RemoveServer, state: &S) -> Validity {
    if !state.is_authority(&m.server_chain_id) {
        return Invalid;
    }
    if skeleton_signed(m, state) {
        Valid
    } else {
        Invalid
    }
}
