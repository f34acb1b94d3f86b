//! Leader-failover negotiation.
//!
//! Each (block height, VM) lane moves through:
//!
//! 1. **Suspect**: the lane made no progress within the fault timeout. The
//!    federated server after the stalled leader becomes the negotiator and
//!    broadcasts a [`Negotiation`].
//! 2. **Pledge**: every federated server that sees the negotiation and has
//!    itself watched the lane stall signs a [`ServerFault`] over the core it
//!    derives locally, and broadcasts it once. A negotiation that arrives
//!    before the local stall is kept until the lane times out here too.
//! 3. **Quorum**: the negotiator collects pledges in its local vote map.
//!    With strictly more than half of the federated servers it assembles a
//!    [`FullServerFault`], broadcasts it and applies it.
//!
//! A session is created by the local timeout or by an accepted negotiation,
//! never by a pledge, and destroyed on quorum or timeout. Pledges seen
//! before their session exists wait and are counted only if they match the
//! derived core. Sessions are process-local and never persisted.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use quorum_messages::{FaultCore, FullServerFault, Message, Negotiation, ServerFault, Signable};
use quorum_types::{Hash, KeyPair, PublicKey, Timestamp};

use crate::error::ConsensusError;
use crate::execute::Action;
use crate::fault::{quorum_threshold, sig_tally};
use crate::state::ChainState;

/// Default time a lane may stall before its leader is suspected.
pub const DEFAULT_FAULT_TIMEOUT_MS: u64 = 30_000;

type LaneKey = (u32, u8);

/// Negotiation state for one lane.
#[derive(Clone, Debug)]
pub struct NegotiationSession {
    pub core: FaultCore,
    pub negotiator: Hash,
    pub am_negotiator: bool,
    /// This node has broadcast its own pledge.
    pub pledge_done: bool,
    /// Pledges by signer key.
    pub local_vote_map: HashMap<PublicKey, ServerFault>,
    pub created_at: Timestamp,
}

impl NegotiationSession {
    fn new(core: FaultCore, negotiator: Hash, me: &Hash, now: Timestamp) -> Self {
        Self {
            core,
            negotiator,
            am_negotiator: negotiator == *me,
            pledge_done: false,
            local_vote_map: HashMap::new(),
            created_at: now,
        }
    }

    pub fn vote_count(&self) -> usize {
        self.local_vote_map.len()
    }
}

/// The federated server after `faulted` in VM order, wrapping around.
pub fn negotiator_for(feds: &[Hash], faulted: &Hash) -> Option<Hash> {
    if feds.len() < 2 {
        return None;
    }
    let pos = feds.iter().position(|f| f == faulted)?;
    Some(feds[(pos + 1) % feds.len()])
}

/// Watches lane progress and drives negotiation sessions.
pub struct FaultTracker {
    timeout_ms: u64,
    /// Last progress per lane and the next height expected there.
    progress: HashMap<LaneKey, (Timestamp, u32)>,
    sessions: HashMap<LaneKey, NegotiationSession>,
    /// Negotiations received before this node saw their lane stall.
    deferred: HashMap<LaneKey, Negotiation>,
    /// Pledges received before their lane had a session, by signer.
    early_pledges: HashMap<LaneKey, HashMap<PublicKey, ServerFault>>,
}

impl FaultTracker {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            progress: HashMap::new(),
            sessions: HashMap::new(),
            deferred: HashMap::new(),
            early_pledges: HashMap::new(),
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn session(&self, db_height: u32, vm_index: u8) -> Option<&NegotiationSession> {
        self.sessions.get(&(db_height, vm_index))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Start the stall clocks for every VM of a new block.
    pub fn begin_height(&mut self, db_height: u32, fed_count: usize, now: Timestamp) {
        for vm in 0..fed_count.min(usize::from(u8::MAX)) {
            self.progress.entry((db_height, vm as u8)).or_insert((now, 0));
        }
        self.progress.retain(|(dbht, _), _| *dbht >= db_height);
        self.sessions.retain(|(dbht, _), _| *dbht >= db_height);
        self.deferred.retain(|(dbht, _), _| *dbht >= db_height);
        self.early_pledges.retain(|(dbht, _), _| *dbht >= db_height);
    }

    /// The lane made no progress within the fault timeout.
    fn stalled(&self, key: LaneKey, now: Timestamp) -> bool {
        self.progress
            .get(&key)
            .is_some_and(|(last, _)| last.elapsed_since(now) >= self.timeout_ms)
    }

    /// Record that `height` was ordered in a lane.
    pub fn observe_progress(&mut self, db_height: u32, vm_index: u8, height: u32, now: Timestamp) {
        self.progress.insert((db_height, vm_index), (now, height + 1));
    }

    /// Core every witness of a lane's fault derives identically.
    pub fn derive_core<S: ChainState + ?Sized>(
        state: &S,
        server_id: Hash,
        vm_index: u8,
        db_height: u32,
        height: u32,
        timestamp: Timestamp,
    ) -> Result<FaultCore, ConsensusError> {
        let audits = state.audit_servers(db_height);
        if audits.is_empty() {
            return Err(ConsensusError::NoAuditServer { db_height });
        }
        let audit_server_id = audits[usize::from(vm_index) % audits.len()];
        Ok(FaultCore {
            server_id,
            audit_server_id,
            vm_index,
            db_height,
            height,
            system_height: state.system_height(),
            timestamp,
        })
    }

    /// Suspect stalled leaders at the current height. Returns the
    /// negotiation and pledge this node broadcasts when it is the
    /// negotiator of a stalled lane.
    pub fn check_timeouts<S: ChainState + ?Sized>(
        &mut self,
        state: &S,
        keypair: &KeyPair,
        me: &Hash,
        now: Timestamp,
    ) -> Result<Vec<Action>, ConsensusError> {
        let db_height = state.leader_height();
        let feds = state.fed_servers(db_height);
        let stalled: Vec<(u8, u32)> = self
            .progress
            .iter()
            .filter(|((dbht, vm), (last, _))| {
                *dbht == db_height
                    && last.elapsed_since(now) >= self.timeout_ms
                    && !self.sessions.contains_key(&(*dbht, *vm))
            })
            .map(|((_, vm), (_, next))| (*vm, *next))
            .collect();

        let mut actions = Vec::new();
        for (vm, height) in stalled {
            let Some(faulted) = feds.get(usize::from(vm)).copied() else {
                continue;
            };
            if faulted == *me {
                continue;
            }
            if negotiator_for(&feds, &faulted).as_ref() != Some(me) {
                if let Some(negotiation) = self.deferred.remove(&(db_height, vm)) {
                    debug!(vm, db_height, "lane stalled here too, joining negotiation");
                    actions.extend(self.join(&negotiation, state, keypair, me, now)?);
                }
                continue;
            }
            warn!(vm, db_height, height, leader = %faulted, "leader suspected, negotiating");
            let mut negotiation = Negotiation::new(faulted, vm, db_height, height, now);
            negotiation.sign(keypair);
            let core = Self::derive_core(state, faulted, vm, db_height, height, negotiation.timestamp)?;
            self.open_session((db_height, vm), core, *me, me, now);
            actions.push(Action::Broadcast(Message::Negotiation(negotiation)));
            actions.extend(self.pledge(state, keypair, (db_height, vm)));
            actions.extend(self.try_complete(state, keypair, (db_height, vm)));
        }
        Ok(actions)
    }

    /// A valid negotiation opens the lane's session and triggers this
    /// node's pledge, once this node has seen the lane stall as well.
    pub fn on_negotiation<S: ChainState + ?Sized>(
        &mut self,
        negotiation: &Negotiation,
        state: &S,
        keypair: &KeyPair,
        me: &Hash,
        now: Timestamp,
    ) -> Result<Vec<Action>, ConsensusError> {
        let key = (negotiation.db_height, negotiation.vm_index());
        if negotiation.server_id == *me || self.sessions.contains_key(&key) {
            return Ok(Vec::new());
        }
        if !self.stalled(key, now) {
            debug!(vm = key.1, db_height = key.0, "negotiation for a lane still live here, deferred");
            self.deferred.insert(key, negotiation.clone());
            return Ok(Vec::new());
        }
        self.join(negotiation, state, keypair, me, now)
    }

    /// Open the session a negotiation asks for and pledge into it.
    fn join<S: ChainState + ?Sized>(
        &mut self,
        negotiation: &Negotiation,
        state: &S,
        keypair: &KeyPair,
        me: &Hash,
        now: Timestamp,
    ) -> Result<Vec<Action>, ConsensusError> {
        let key = (negotiation.db_height, negotiation.vm_index());
        let feds = state.fed_servers(negotiation.db_height);
        let negotiator = negotiator_for(&feds, &negotiation.server_id)
            .ok_or(ConsensusError::UnknownServer(negotiation.server_id))?;
        let core = Self::derive_core(
            state,
            negotiation.server_id,
            negotiation.vm_index(),
            negotiation.db_height,
            negotiation.height,
            negotiation.timestamp,
        )?;
        debug!(vm = key.1, db_height = key.0, "negotiation session opened");
        self.open_session(key, core, negotiator, me, now);
        if !feds.contains(me) {
            return Ok(Vec::new());
        }
        let mut actions = self.pledge(state, keypair, key);
        actions.extend(self.try_complete(state, keypair, key));
        Ok(actions)
    }

    /// Start a session over a locally derived core, counting any pledges
    /// that arrived early and match it.
    fn open_session(&mut self, key: LaneKey, core: FaultCore, negotiator: Hash, me: &Hash, now: Timestamp) {
        self.deferred.remove(&key);
        let mut session = NegotiationSession::new(core, negotiator, me, now);
        let core_hash = core.hash();
        for (signer, fault) in self.early_pledges.remove(&key).unwrap_or_default() {
            if fault.core_hash() == core_hash {
                session.local_vote_map.insert(signer, fault);
            }
        }
        self.sessions.insert(key, session);
    }

    /// Record a witness pledge. Pledges count only toward a session whose
    /// locally derived core they match; before the session exists they wait.
    pub fn on_server_fault<S: ChainState + ?Sized>(
        &mut self,
        fault: &ServerFault,
        state: &S,
        keypair: &KeyPair,
    ) -> Vec<Action> {
        let Some(sig) = fault.signature else {
            return Vec::new();
        };
        let key = (fault.core.db_height, fault.core.vm_index);
        let Some(session) = self.sessions.get_mut(&key) else {
            let waiting = self.early_pledges.entry(key).or_default();
            if waiting.len() < state.fed_servers(key.0).len() || waiting.contains_key(&sig.public_key) {
                waiting.insert(sig.public_key, fault.clone());
            }
            return Vec::new();
        };
        if session.core.hash() != fault.core_hash() {
            debug!(vm = key.1, db_height = key.0, "pledge over a different fault core ignored");
            return Vec::new();
        }
        session.local_vote_map.insert(sig.public_key, fault.clone());
        self.try_complete(state, keypair, key)
    }

    /// A full fault reached the lane; close its session and apply it.
    pub fn on_full_fault(&mut self, fault: &FullServerFault, now: Timestamp) -> Vec<Action> {
        let key = (fault.core.db_height, fault.core.vm_index);
        self.sessions.remove(&key);
        self.deferred.remove(&key);
        self.early_pledges.remove(&key);
        self.progress.insert(key, (now, fault.core.height));
        info!(
            vm = key.1,
            db_height = key.0,
            replacement = %fault.core.audit_server_id,
            "leader replaced by full server fault"
        );
        vec![Action::Process {
            db_height: fault.core.db_height,
            message: Message::FullServerFault(fault.clone()),
        }]
    }

    /// Drop sessions that failed to reach quorum in twice the fault timeout.
    pub fn expire_sessions(&mut self, now: Timestamp) -> usize {
        let limit = self.timeout_ms.saturating_mul(2);
        let before = self.sessions.len();
        self.sessions
            .retain(|_, s| s.created_at.elapsed_since(now) < limit);
        before - self.sessions.len()
    }

    fn pledge<S: ChainState + ?Sized>(
        &mut self,
        state: &S,
        keypair: &KeyPair,
        key: LaneKey,
    ) -> Vec<Action> {
        let Some(session) = self.sessions.get_mut(&key) else {
            return Vec::new();
        };
        if session.pledge_done || !state.fed_servers(key.0).contains(&state.identity_chain_id()) {
            return Vec::new();
        }
        let mut fault = ServerFault::new(session.core);
        fault.sign(keypair);
        session.local_vote_map.insert(keypair.public, fault.clone());
        session.pledge_done = true;
        vec![Action::Broadcast(Message::ServerFault(fault))]
    }

    fn try_complete<S: ChainState + ?Sized>(
        &mut self,
        state: &S,
        keypair: &KeyPair,
        key: LaneKey,
    ) -> Vec<Action> {
        let Some(session) = self.sessions.get(&key) else {
            return Vec::new();
        };
        if !session.am_negotiator {
            return Vec::new();
        }
        let signatures: Vec<_> = session
            .local_vote_map
            .values()
            .filter_map(|f| f.signature)
            .collect();
        let fed_count = state.fed_servers(key.0).len();
        if sig_tally(&session.core, &signatures, state) < quorum_threshold(fed_count) {
            return Vec::new();
        }
        let previous = state.last_fault_serial();
        let mut full = FullServerFault::new(session.core, previous.as_ref(), signatures);
        full.sign(keypair);
        let mut actions = vec![Action::Broadcast(Message::FullServerFault(full.clone()))];
        actions.extend(self.on_full_fault(&full, state.now()));
        actions
    }
}

impl Default for FaultTracker {
    fn default() -> Self {
        Self::new(DEFAULT_FAULT_TIMEOUT_MS)
    }
}
