//! Leader and follower execution of validated messages, and `process`.
//!
//! Execution never touches the network or the chain directly. It returns
//! [`Action`]s for the host to dispatch: broadcasts, replies to the
//! requesting peer, and ordered messages to apply with [`process`].

use std::collections::HashMap;
use tracing::{debug, warn};

use quorum_messages::{
    Ack, BounceReply, DataResponse, Message, MessageType, MissingMsg, MissingMsgResponse,
};
use quorum_types::{Hash, KeyPair, Timestamp, Validity};

use crate::ack::{AckChain, AckOrder, Leader};
use crate::admin::AdminEntry;
use crate::error::ConsensusError;
use crate::fault::to_admin_block_entry;
use crate::negotiation::FaultTracker;
use crate::state::{ChainState, ProcessState};
use crate::validate::validate;
use crate::vm::compute_vm_index;

/// Unacked messages older than this are forgotten.
pub const PENDING_TTL_MS: u64 = 10 * 60 * 1000;

/// Process-list slot: (block height, VM, height).
type Slot = (u32, u8, u32);

/// Effect requested by execution.
#[derive(Clone, Debug)]
pub enum Action {
    /// Send to every peer through the reliability layer.
    Broadcast(Message),
    /// Send back to the peer the request came from.
    Reply(Message),
    /// `message` is ordered by `ack`; apply it at `db_height`.
    AppendToProcessList {
        db_height: u32,
        ack: Ack,
        message: Message,
    },
    /// Apply `message` at `db_height` without an ack.
    Process { db_height: u32, message: Message },
}

/// Per-node execution context.
pub struct Executor {
    leader: Leader,
    followers: AckChain,
    /// Ordered-kind messages waiting for their ack, by message hash.
    pending: HashMap<Hash, (Timestamp, Message)>,
    /// Acks waiting for their message or for earlier heights.
    acks: HashMap<Slot, Ack>,
    /// Everything ordered so far, kept to answer missing-message requests.
    processed: HashMap<Slot, (Ack, Message)>,
    faults: FaultTracker,
}

impl Executor {
    pub fn new(keypair: KeyPair, identity_chain_id: Hash, fault_timeout_ms: u64) -> Self {
        Self {
            leader: Leader::new(keypair, identity_chain_id),
            followers: AckChain::new(),
            pending: HashMap::new(),
            acks: HashMap::new(),
            processed: HashMap::new(),
            faults: FaultTracker::new(fault_timeout_ms),
        }
    }

    pub fn identity_chain_id(&self) -> Hash {
        self.leader.identity_chain_id()
    }

    pub fn faults(&self) -> &FaultTracker {
        &self.faults
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Ordered `(ack, message)` at a slot, if this node has it.
    pub fn processed(&self, db_height: u32, vm_index: u8, height: u32) -> Option<&(Ack, Message)> {
        self.processed.get(&(db_height, vm_index, height))
    }

    /// VM this node leads for `msg`, if any.
    pub fn leads<S: ChainState + ?Sized>(&self, msg: &mut Message, state: &S) -> Option<u8> {
        if !msg.kind().is_leader_ordered() {
            return None;
        }
        let db_height = state.leader_height();
        let fed_count = state.fed_servers(db_height).len();
        let vm = compute_vm_index(msg, fed_count);
        let me = self.leader.identity_chain_id();
        (state.virtual_server(db_height, state.current_minute(), &me) == Some(vm)).then_some(vm)
    }

    /// Execute a valid message on the leader path when this node leads its
    /// VM, on the follower path otherwise.
    pub fn execute<S: ChainState + ?Sized>(
        &mut self,
        mut msg: Message,
        state: &S,
    ) -> Result<Vec<Action>, ConsensusError> {
        match self.leads(&mut msg, state) {
            Some(vm) => Ok(self.leader_execute(msg, vm, state)),
            None => self.follower_execute(msg, state),
        }
    }

    /// Order `msg` into VM `vm_index` at the current slot.
    pub fn leader_execute<S: ChainState + ?Sized>(
        &mut self,
        mut msg: Message,
        vm_index: u8,
        state: &S,
    ) -> Vec<Action> {
        let db_height = state.leader_height();
        let minute = state.current_minute();
        let now = state.now();
        msg.base_mut().place(vm_index, minute);
        let ack = self.leader.issue_ack(&msg, db_height, vm_index, minute, now);
        self.faults.observe_progress(db_height, vm_index, ack.height, now);
        self.processed
            .insert((db_height, vm_index, ack.height), (ack.clone(), msg.clone()));
        debug!(kind = %msg.kind(), vm = vm_index, db_height, height = ack.height, "leader ordered message");
        vec![
            Action::Broadcast(msg.clone()),
            Action::Broadcast(Message::Ack(ack.clone())),
            Action::AppendToProcessList {
                db_height,
                ack,
                message: msg,
            },
        ]
    }

    /// Follow acks from other leaders and answer requests.
    ///
    /// Negotiation takes this path on every node: leadership changes only
    /// through the pledge and full-fault sequence.
    pub fn follower_execute<S: ChainState + ?Sized>(
        &mut self,
        msg: Message,
        state: &S,
    ) -> Result<Vec<Action>, ConsensusError> {
        let now = state.now();
        let me = self.leader.identity_chain_id();
        let actions = match msg {
            Message::Ack(ack) => {
                let lane = (ack.db_height, ack.base.vm_index);
                self.acks.insert((ack.db_height, ack.base.vm_index, ack.height), ack);
                self.drain_lane(lane.0, lane.1, now)
            }
            Message::Negotiation(n) => {
                self.faults
                    .on_negotiation(&n, state, self.leader.keypair(), &me, now)?
            }
            Message::ServerFault(f) => {
                self.faults.on_server_fault(&f, state, self.leader.keypair())
            }
            Message::FullServerFault(f) => self.faults.on_full_fault(&f, now),
            Message::DbState(s) => vec![Action::Process {
                db_height: s.height(),
                message: Message::DbState(s),
            }],
            Message::MissingData(req) => match state.fetch_data(&req.requested_hash) {
                Some((kind, data)) => {
                    let mut resp = DataResponse::new(kind, data);
                    resp.base.reply_to(&req.base);
                    vec![Action::Reply(Message::DataResponse(resp))]
                }
                None => Vec::new(),
            },
            Message::MissingMsg(req) => self.answer_missing(&req, now),
            Message::MissingMsgResponse(resp) => {
                let MissingMsgResponse { ack, message, .. } = resp;
                let mut ack_msg = Message::Ack(ack);
                if validate(&mut ack_msg, state) != Validity::Valid {
                    debug!("missing-message response carried an unusable ack");
                    return Ok(Vec::new());
                }
                let mut actions = self.follower_execute(ack_msg, state)?;
                actions.extend(self.follower_execute(*message, state)?);
                actions
            }
            Message::Bounce(b) => {
                let mut reply = BounceReply::answer(&b, now);
                reply.base.reply_to(&b.base);
                vec![Action::Reply(Message::BounceReply(reply))]
            }
            Message::BounceReply(r) => {
                debug!(name = %r.ping.name, hop_ms = ?r.ping.mean_hop_millis(), "bounce returned");
                Vec::new()
            }
            other if other.kind().is_leader_ordered() => {
                let hash = other.msg_hash();
                self.pending.insert(hash, (now, other));
                let lane = self
                    .acks
                    .values()
                    .find(|a| a.message_hash == hash)
                    .map(|a| (a.db_height, a.base.vm_index));
                match lane {
                    Some((db_height, vm)) => self.drain_lane(db_height, vm, now),
                    None => Vec::new(),
                }
            }
            _ => Vec::new(),
        };
        Ok(actions)
    }

    /// Pair acks with their messages in height order until a gap.
    fn drain_lane(&mut self, db_height: u32, vm_index: u8, now: Timestamp) -> Vec<Action> {
        let mut actions = Vec::new();
        loop {
            let next = self.followers.next_height(db_height, vm_index);
            let slot = (db_height, vm_index, next);
            let Some(ack) = self.acks.get(&slot) else {
                break;
            };
            if !self.pending.contains_key(&ack.message_hash) {
                break;
            }
            match self.followers.accept(ack) {
                AckOrder::Ordered => {}
                AckOrder::Broken => {
                    warn!(vm = vm_index, db_height, height = next, "ack serial hash does not extend the chain, dropped");
                    self.acks.remove(&slot);
                    break;
                }
                AckOrder::Stale | AckOrder::Ahead => {
                    self.acks.remove(&slot);
                    continue;
                }
            }
            let Some(ack) = self.acks.remove(&slot) else {
                break;
            };
            let Some((_, mut message)) = self.pending.remove(&ack.message_hash) else {
                break;
            };
            message.base_mut().place(vm_index, ack.base.minute);
            self.faults.observe_progress(db_height, vm_index, next, now);
            self.processed.insert(slot, (ack.clone(), message.clone()));
            actions.push(Action::AppendToProcessList {
                db_height,
                ack,
                message,
            });
        }
        actions
    }

    fn answer_missing(&self, req: &MissingMsg, now: Timestamp) -> Vec<Action> {
        req.process_list_heights
            .iter()
            .filter_map(|h| self.processed.get(&(req.db_height, req.base.vm_index, *h)))
            .map(|(ack, message)| {
                let mut resp = MissingMsgResponse::new(ack.clone(), message.clone(), now);
                resp.base.reply_to(&req.base);
                Action::Reply(Message::MissingMsgResponse(resp))
            })
            .collect()
    }

    /// Periodic work: suspect stalled leaders and expire stale sessions.
    pub fn tick<S: ChainState + ?Sized>(&mut self, state: &S) -> Result<Vec<Action>, ConsensusError> {
        let now = state.now();
        let me = self.leader.identity_chain_id();
        let actions = self
            .faults
            .check_timeouts(state, self.leader.keypair(), &me, now)?;
        let expired = self.faults.expire_sessions(now);
        if expired > 0 {
            debug!(expired, "negotiation sessions timed out");
        }
        self.pending
            .retain(|_, (seen, _)| seen.elapsed_since(now) < PENDING_TTL_MS);
        Ok(actions)
    }

    /// A new block started at `db_height`; drop lanes of saved blocks.
    pub fn begin_block<S: ChainState + ?Sized>(&mut self, db_height: u32, state: &S) {
        let saved = state.highest_saved_block();
        self.leader.prune(saved);
        self.followers.prune(saved);
        self.acks.retain(|(dbht, _, _), _| *dbht > saved);
        self.processed.retain(|(dbht, _, _), _| *dbht > saved);
        self.faults
            .begin_height(db_height, state.fed_servers(db_height).len(), state.now());
    }
}

/// Apply an ordered message to the process list at `db_height`.
///
/// Returns `false` when the state cannot apply it yet.
pub fn process<S: ProcessState + ?Sized>(msg: &Message, db_height: u32, state: &mut S) -> bool {
    match msg {
        Message::CommitChain(m) => {
            let c = &m.commit;
            state.add_commit(c.entry_hash, c.credits, c.ec_pub_key)
        }
        Message::CommitEntry(m) => {
            let c = &m.commit;
            state.add_commit(c.entry_hash, c.credits, c.ec_pub_key)
        }
        Message::RevealEntry(m) => state.add_entry(m.chain_id, &m.content),
        Message::FactoidTransaction(m) => state.apply_transaction(&m.transaction),
        Message::Eom(m) => state.end_of_minute(db_height, m.base.vm_index, m.base.minute),
        Message::DirectoryBlockSignature(m) => match m.dblock_signature {
            Some(sig) => state.add_dblock_signature(db_height, m.server_identity_chain_id, sig),
            None => false,
        },
        Message::AddServer(m) => state.add_admin_entry(db_height, AdminEntry::add_server(m, db_height)),
        Message::RemoveServer(m) => {
            state.add_admin_entry(db_height, AdminEntry::remove_server(m, db_height))
        }
        Message::ChangeServerKey(m) => state.add_admin_entry(db_height, AdminEntry::change_key(m)),
        Message::FullServerFault(m) => {
            let applied = state.add_admin_entry(db_height, to_admin_block_entry(m))
                && state.replace_leader(db_height, m.core.vm_index, m.core.audit_server_id);
            if applied {
                state.set_last_fault_serial(m.serial_hash);
            }
            applied
        }
        Message::DbState(m) => state.fast_forward(m),
        _ => true,
    }
}

/// Kinds that reach [`process`] with an effect.
pub fn has_process_effect(kind: MessageType) -> bool {
    kind.is_leader_ordered() || matches!(kind, MessageType::FullServerFault | MessageType::DbState)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_effect_covers_ordered_and_catch_up_kinds() {
        assert!(has_process_effect(MessageType::CommitEntry));
        assert!(has_process_effect(MessageType::Eom));
        assert!(has_process_effect(MessageType::FullServerFault));
        assert!(has_process_effect(MessageType::DbState));
        assert!(!has_process_effect(MessageType::Heartbeat));
        assert!(!has_process_effect(MessageType::ServerFault));
    }
}
