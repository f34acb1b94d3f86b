//! Integration tests exercising the consensus path end to end:
//! signing → wire encoding → validation → execution → process list.
//!
//! These tests wire together components that are normally only connected
//! inside the pipeline worker, using the in-memory chain state from
//! `quorum-nullables`.

use std::sync::Arc;

use quorum_consensus::{
    has_enough_sigs, process, validate, validate_ack, Action, Executor, Leader,
};
use quorum_messages::{
    Ack, Bounce, DbState, DbStateMissing, DirectoryBlock, FactoidTransaction, FaultCore,
    FullServerFault, Message, MissingMsg, Negotiation, Ping, RevealEntry, ServerFault, Signable,
};
use quorum_network::{bounded, DbStateResponder, QueueDepths, SyncLimits};
use quorum_node::{Inbound, NodeConfig, NodeMetrics, Pipeline, QuorumNode, ShutdownController};
use quorum_nullables::{authority, NullState};
use quorum_protocol::encode_frame;
use quorum_types::{Hash, NetworkId, Timestamp, Validity};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn executor_for(seed: u8, fault_timeout_ms: u64) -> Executor {
    let (id, kp) = authority(seed);
    Executor::new(kp, id, fault_timeout_ms)
}

/// A chain of `count` linked directory blocks starting at genesis.
fn chain(count: u32) -> Vec<DbState> {
    let mut prev = Hash::default();
    (0..count)
        .map(|height| {
            let dblock = DirectoryBlock {
                height,
                prev_hash: prev,
                timestamp: Timestamp::from_secs(u64::from(height) * 600),
                body: vec![height as u8; 16],
            };
            prev = dblock.hash();
            DbState::new(dblock, Timestamp::from_secs(u64::from(height) * 600))
        })
        .collect()
}

fn appended(actions: &[Action]) -> Vec<(u32, Message)> {
    actions
        .iter()
        .filter_map(|a| match a {
            Action::AppendToProcessList {
                db_height, message, ..
            } => Some((*db_height, message.clone())),
            _ => None,
        })
        .collect()
}

fn broadcasts(actions: &[Action]) -> Vec<Message> {
    actions
        .iter()
        .filter_map(|a| match a {
            Action::Broadcast(m) => Some(m.clone()),
            _ => None,
        })
        .collect()
}

fn fault_core(state: &NullState, faulted: u8, audit: u8) -> FaultCore {
    FaultCore {
        server_id: authority(faulted).0,
        audit_server_id: authority(audit).0,
        vm_index: faulted - 1,
        db_height: state.leader_height,
        height: 0,
        system_height: 0,
        timestamp: state.clock.now(),
    }
}

fn signed_fault(core: FaultCore, seed: u8) -> ServerFault {
    let mut fault = ServerFault::new(core);
    fault.sign(&authority(seed).1);
    fault
}

// ---------------------------------------------------------------------------
// 1. Ack signing and wire round-trip
// ---------------------------------------------------------------------------

#[test]
fn signed_ack_survives_the_wire() {
    let (id, kp) = authority(1);
    let mut ack = Ack {
        timestamp: Timestamp::from_secs(1_700_000_000),
        message_hash: Hash::new([0x42; 32]),
        db_height: 123,
        height: 456,
        serial_hash: Hash::new([0x17; 32]),
        ..Ack::default()
    };
    ack.base.place(0, 3);
    ack.base.leader_chain_id = id;
    ack.sign(&kp);

    let msg = Message::Ack(ack);
    let bytes = msg.encode();
    let mut decoded = Message::decode(&bytes).expect("decode ack");
    assert!(decoded.is_same_as(&msg));
    assert!(decoded.verify_signature().expect("signable"));

    let Message::Ack(back) = &decoded else {
        panic!("decoded {} instead of an ack", decoded.kind());
    };
    assert_eq!(back.db_height, 123);
    assert_eq!(back.height, 456);
    assert_eq!(back.base.minute, 3);
}

#[test]
fn tampered_ack_fails_verification() {
    let (id, kp) = authority(1);
    let mut leader = Leader::new(kp, id);
    let target = Message::FactoidTransaction(FactoidTransaction::new(vec![1, 2, 3], Timestamp::EPOCH));
    let mut ack = leader.issue_ack(&target, 7, 0, 0, Timestamp::from_secs(10));
    ack.height += 1;
    // Signing cached a pass; a received copy starts unchecked.
    ack.base.sig_valid = false;
    let mut msg = Message::Ack(ack);
    assert!(!msg.verify_signature().expect("signable"));
}

// ---------------------------------------------------------------------------
// 2. Ack validation boundary around the saved tip
// ---------------------------------------------------------------------------

#[test]
fn acks_at_or_below_saved_height_are_invalid() {
    let state = NullState::new(3, 1).with_saved(5);
    let (id, kp) = authority(1);
    let mut leader = Leader::new(kp, id);
    let target = Message::FactoidTransaction(FactoidTransaction::new(vec![9], Timestamp::EPOCH));

    let mut stale = leader.issue_ack(&target, 5, 0, 0, state.clock.now());
    assert_eq!(validate_ack(&mut stale, &state), Validity::Invalid);

    let mut current = leader.issue_ack(&target, 6, 0, 0, state.clock.now());
    assert_eq!(validate_ack(&mut current, &state), Validity::Valid);
}

#[test]
fn acks_for_unknown_process_lists_wait() {
    let state = NullState::new(3, 1).with_saved(5);
    let (id, kp) = authority(1);
    let mut leader = Leader::new(kp, id);
    let target = Message::FactoidTransaction(FactoidTransaction::new(vec![9], Timestamp::EPOCH));
    let mut ahead = leader.issue_ack(&target, 9, 0, 0, state.clock.now());
    assert_eq!(validate_ack(&mut ahead, &state), Validity::Pending);
}

#[test]
fn acks_into_occupied_slots_are_invalid() {
    let mut state = NullState::new(3, 1).with_saved(5);
    state.occupied.insert((6, 0, 0));
    let (id, kp) = authority(1);
    let mut leader = Leader::new(kp, id);
    let target = Message::FactoidTransaction(FactoidTransaction::new(vec![9], Timestamp::EPOCH));
    let mut ack = leader.issue_ack(&target, 6, 0, 0, state.clock.now());
    assert_eq!(validate_ack(&mut ack, &state), Validity::Invalid);
}

#[test]
fn acks_from_the_wrong_leader_are_invalid() {
    let state = NullState::new(3, 1).with_saved(5);
    // Authority 2 leads VM 1, not VM 0.
    let (id, kp) = authority(2);
    let mut leader = Leader::new(kp, id);
    let target = Message::FactoidTransaction(FactoidTransaction::new(vec![9], Timestamp::EPOCH));
    let mut ack = leader.issue_ack(&target, 6, 0, 0, state.clock.now());
    assert_eq!(validate_ack(&mut ack, &state), Validity::Invalid);
}

// ---------------------------------------------------------------------------
// 3. Fault quorum and core equality
// ---------------------------------------------------------------------------

#[test]
fn quorum_needs_strictly_more_than_half() {
    let state = NullState::new(4, 1);
    let core = fault_core(&state, 1, 5);
    let half: Vec<_> = [2, 3]
        .iter()
        .filter_map(|s| signed_fault(core, *s).signature)
        .collect();
    let fault = FullServerFault::new(core, None, half.clone());
    assert!(!has_enough_sigs(&fault, &state));

    let mut majority = half;
    majority.extend(signed_fault(core, 4).signature);
    let fault = FullServerFault::new(core, None, majority);
    assert!(has_enough_sigs(&fault, &state));
}

#[test]
fn repeated_and_outside_signers_do_not_count() {
    let state = NullState::new(4, 1);
    let core = fault_core(&state, 1, 5);
    let sigs: Vec<_> = [2, 2, 2, 5, 9]
        .iter()
        .filter_map(|s| signed_fault(core, *s).signature)
        .collect();
    let fault = FullServerFault::new(core, None, sigs);
    assert!(!has_enough_sigs(&fault, &state));
}

#[test]
fn pledges_and_full_fault_share_the_core() {
    let state = NullState::new(3, 1);
    let core = fault_core(&state, 1, 4);
    let pledge = signed_fault(core, 2);
    let full = FullServerFault::new(core, None, pledge.signature.into_iter().collect());
    assert_eq!(pledge.core_hash(), full.core_hash());
    assert_eq!(full.serial_hash, core.hash());

    let chained = FullServerFault::new(core, Some(&full.serial_hash), Vec::new());
    assert_ne!(chained.serial_hash, full.serial_hash);
}

#[test]
fn full_fault_below_quorum_is_pending() {
    let state = NullState::new(3, 1);
    let core = fault_core(&state, 1, 4);
    let sigs = signed_fault(core, 2).signature.into_iter().collect();
    let mut msg = Message::FullServerFault(FullServerFault::new(core, None, sigs));
    assert_eq!(validate(&mut msg, &state), Validity::Pending);
}

#[test]
fn full_fault_must_extend_the_fault_lineage() {
    let mut state = NullState::new(3, 1);
    let core = fault_core(&state, 1, 4);
    let sigs: Vec<_> = [2, 3]
        .iter()
        .filter_map(|s| signed_fault(core, *s).signature)
        .collect();

    let mut first = Message::FullServerFault(FullServerFault::new(core, None, sigs.clone()));
    assert_eq!(validate(&mut first, &state), Validity::Valid);

    let mut forged = FullServerFault::new(core, None, sigs.clone());
    forged.serial_hash = Hash::new([0xEE; 32]);
    assert_eq!(
        validate(&mut Message::FullServerFault(forged), &state),
        Validity::Invalid
    );

    // Once a fault is applied the next one must chain onto it.
    let previous = Hash::new([0x42; 32]);
    state.last_fault_serial = Some(previous);
    let mut unchained = Message::FullServerFault(FullServerFault::new(core, None, sigs.clone()));
    assert_eq!(validate(&mut unchained, &state), Validity::Invalid);
    let mut chained = Message::FullServerFault(FullServerFault::new(core, Some(&previous), sigs));
    assert_eq!(validate(&mut chained, &state), Validity::Valid);

    assert!(process(&chained, core.db_height, &mut state));
    let Message::FullServerFault(applied) = &chained else {
        unreachable!("built above");
    };
    assert_eq!(state.last_fault_serial, Some(applied.serial_hash));
}

// ---------------------------------------------------------------------------
// 4. Leader and follower execution
// ---------------------------------------------------------------------------

#[test]
fn follower_orders_what_the_leader_acked() {
    let mut leader_state = NullState::new(1, 0);
    let mut follower_state = NullState::new(1, 0).as_authority(9);
    let mut leader = executor_for(1, 30_000);
    let mut follower = executor_for(9, 30_000);

    let tx = Message::FactoidTransaction(FactoidTransaction::new(vec![7; 40], leader_state.clock.now()));
    let actions = leader.execute(tx, &leader_state).expect("leader execute");
    let sent = broadcasts(&actions);
    assert_eq!(sent.len(), 2);
    for (db_height, message) in appended(&actions) {
        assert!(process(&message, db_height, &mut leader_state));
    }
    assert_eq!(leader_state.transactions.len(), 1);

    // The ack arrives before its message.
    let mut ack = sent[1].clone();
    assert_eq!(validate(&mut ack, &follower_state), Validity::Valid);
    let first = follower.execute(ack, &follower_state).expect("ack");
    assert!(appended(&first).is_empty());

    let second = follower
        .execute(sent[0].clone(), &follower_state)
        .expect("message");
    let ordered = appended(&second);
    assert_eq!(ordered.len(), 1);
    for (db_height, message) in ordered {
        assert!(process(&message, db_height, &mut follower_state));
    }
    assert_eq!(follower_state.transactions, leader_state.transactions);
    assert!(follower.processed(1, 0, 0).is_some());
}

#[test]
fn missing_messages_are_recovered_from_the_leader() {
    let leader_state = NullState::new(1, 0);
    let mut follower_state = NullState::new(1, 0).as_authority(9);
    let mut leader = executor_for(1, 30_000);
    let mut follower = executor_for(9, 30_000);

    let tx = Message::FactoidTransaction(FactoidTransaction::new(vec![3; 8], leader_state.clock.now()));
    leader.execute(tx, &leader_state).expect("leader execute");

    let request = Message::MissingMsg(MissingMsg::new(0, 1, vec![0], leader_state.clock.now()));
    let replies = leader.execute(request, &leader_state).expect("answer");
    let [Action::Reply(response)] = replies.as_slice() else {
        panic!("expected a single reply, got {replies:?}");
    };

    let mut response = response.clone();
    assert_eq!(validate(&mut response, &follower_state), Validity::Valid);
    let actions = follower.execute(response, &follower_state).expect("response");
    let ordered = appended(&actions);
    assert_eq!(ordered.len(), 1);
    for (db_height, message) in ordered {
        assert!(process(&message, db_height, &mut follower_state));
    }
    assert_eq!(follower_state.transactions.len(), 1);
}

// ---------------------------------------------------------------------------
// 5. Negotiation to full fault
// ---------------------------------------------------------------------------

#[test]
fn stalled_leader_is_replaced_after_quorum() {
    // Authority 1 leads VM 0 and goes silent. Authority 2 negotiates,
    // authority 3 pledges, authority 4 is the audit replacement.
    let mut negotiator_state = NullState::new(3, 1).as_authority(2);
    let mut witness_state = NullState::new(3, 1).as_authority(3);
    let mut negotiator = executor_for(2, 1_000);
    let mut witness = executor_for(3, 1_000);

    negotiator.begin_block(1, &negotiator_state);
    witness.begin_block(1, &witness_state);
    negotiator_state.clock.advance_millis(1_000);
    witness_state.clock.advance_millis(1_000);
    let opening = negotiator.tick(&negotiator_state).expect("tick");
    let sent = broadcasts(&opening);
    assert_eq!(sent.len(), 2, "negotiation plus own pledge");
    assert!(negotiator.faults().session(1, 0).is_some());

    let mut negotiation = sent[0].clone();
    assert_eq!(validate(&mut negotiation, &witness_state), Validity::Valid);
    let pledges = witness.execute(negotiation, &witness_state).expect("pledge");
    let pledge = broadcasts(&pledges);
    assert_eq!(pledge.len(), 1);

    let mut pledge = pledge[0].clone();
    assert_eq!(validate(&mut pledge, &negotiator_state), Validity::Valid);
    let closing = negotiator.execute(pledge, &negotiator_state).expect("quorum");
    let full = broadcasts(&closing)
        .into_iter()
        .find(|m| matches!(m, Message::FullServerFault(_)))
        .expect("full fault broadcast");
    assert_eq!(negotiator.faults().session_count(), 0);

    let mut check = full.clone();
    assert_eq!(validate(&mut check, &witness_state), Validity::Valid);

    for action in closing {
        if let Action::Process { db_height, message } = action {
            assert!(process(&message, db_height, &mut negotiator_state));
        }
    }
    assert_eq!(negotiator_state.feds[0].0, authority(4).0);
    assert_eq!(negotiator_state.audits, vec![(authority(1).0, authority(1).1.public)]);
    assert_eq!(negotiator_state.admin.len(), 1);
    let Message::FullServerFault(full) = full else {
        unreachable!("matched above");
    };
    assert_eq!(negotiator_state.last_fault_serial, Some(full.serial_hash));
}

#[test]
fn only_the_next_server_negotiates() {
    let mut state = NullState::new(3, 1).as_authority(3);
    let mut executor = executor_for(3, 1_000);
    executor.begin_block(1, &state);
    state.clock.advance_millis(1_000);
    // Authority 3 negotiates only for VM 1 (authority 2's lane).
    let actions = executor.tick(&state).expect("tick");
    assert!(executor.faults().session(1, 1).is_some());
    assert!(executor.faults().session(1, 0).is_none());
    assert_eq!(broadcasts(&actions).len(), 2);
}

fn negotiation_by(seed: u8, state: &NullState) -> Message {
    let mut negotiation = Negotiation::new(authority(1).0, 0, state.leader_height, 0, state.clock.now());
    negotiation.sign(&authority(seed).1);
    Message::Negotiation(negotiation)
}

fn pledges_for_vm(actions: &[Action], vm: u8) -> Vec<ServerFault> {
    broadcasts(actions)
        .into_iter()
        .filter_map(|m| match m {
            Message::ServerFault(f) if f.core.vm_index == vm => Some(f),
            _ => None,
        })
        .collect()
}

#[test]
fn only_the_negotiator_may_open_a_negotiation() {
    // Authority 2 follows authority 1 in VM order; authority 3 does not.
    let state = NullState::new(3, 1).as_authority(2);
    let mut rogue = negotiation_by(3, &state);
    assert_eq!(validate(&mut rogue, &state), Validity::Invalid);
    let mut rightful = negotiation_by(2, &state);
    assert_eq!(validate(&mut rightful, &state), Validity::Valid);

    let mut wrong_lane = Negotiation::new(authority(1).0, 1, state.leader_height, 0, state.clock.now());
    wrong_lane.sign(&authority(2).1);
    assert_eq!(
        validate(&mut Message::Negotiation(wrong_lane), &state),
        Validity::Invalid
    );
}

#[test]
fn live_lane_defers_negotiation_until_it_stalls() {
    let mut state = NullState::new(3, 1).as_authority(3);
    let mut witness = executor_for(3, 1_000);
    witness.begin_block(1, &state);

    // The leader of VM 0 is still making progress here.
    let early = witness.execute(negotiation_by(2, &state), &state).expect("negotiation");
    assert!(early.is_empty());
    assert!(witness.faults().session(1, 0).is_none());

    state.clock.advance_millis(1_000);
    let joined = witness.tick(&state).expect("tick");
    let pledges = pledges_for_vm(&joined, 0);
    assert_eq!(pledges.len(), 1);
    assert_eq!(pledges[0].core.server_id, authority(1).0);
    assert!(witness.faults().session(1, 0).is_some());
}

#[test]
fn healthy_leader_survives_a_lone_negotiator() {
    // Authority 2 negotiates without any stall; the other witnesses never
    // pledge, so one pledge short of quorum nothing is replaced.
    let mut negotiator_state = NullState::new(3, 1).as_authority(2);
    let witness_state = NullState::new(3, 1).as_authority(3);
    let mut negotiator = executor_for(2, 1_000);
    let mut witness = executor_for(3, 1_000);
    negotiator.begin_block(1, &negotiator_state);
    witness.begin_block(1, &witness_state);

    negotiator_state.clock.advance_millis(1_000);
    let opening = negotiator.tick(&negotiator_state).expect("tick");
    let negotiation = broadcasts(&opening)
        .into_iter()
        .find(|m| matches!(m, Message::Negotiation(_)))
        .expect("negotiation");
    let reply = witness.execute(negotiation, &witness_state).expect("negotiation");
    assert!(pledges_for_vm(&reply, 0).is_empty());
    assert_eq!(negotiator.faults().session(1, 0).map(|s| s.vote_count()), Some(1));
    assert_eq!(negotiator_state.feds[0].0, authority(1).0);
}

#[test]
fn mismatched_early_pledge_does_not_capture_the_session() {
    let mut negotiator_state = NullState::new(3, 1).as_authority(2);
    let mut witness_state = NullState::new(3, 1).as_authority(3);
    let mut negotiator = executor_for(2, 1_000);
    let mut witness = executor_for(3, 1_000);
    negotiator.begin_block(1, &negotiator_state);
    witness.begin_block(1, &witness_state);

    // A pledge over a core nobody derives arrives before any session.
    let mut forged_core = fault_core(&negotiator_state, 1, 4);
    forged_core.timestamp = Timestamp::from_millis(5);
    let forged = Message::ServerFault(signed_fault(forged_core, 3));
    assert!(negotiator.execute(forged, &negotiator_state).expect("pledge").is_empty());

    negotiator_state.clock.advance_millis(1_000);
    witness_state.clock.advance_millis(1_000);
    let opening = negotiator.tick(&negotiator_state).expect("tick");
    let session = negotiator.faults().session(1, 0).expect("session");
    assert_eq!(session.vote_count(), 1, "only the negotiator's own pledge");
    let derived = session.core;
    assert_ne!(derived.hash(), forged_core.hash());

    let negotiation = broadcasts(&opening)
        .into_iter()
        .find(|m| matches!(m, Message::Negotiation(_)))
        .expect("negotiation");
    let reply = witness.execute(negotiation, &witness_state).expect("pledge");
    let pledge = pledges_for_vm(&reply, 0).pop().expect("honest pledge");
    assert_eq!(pledge.core_hash(), derived.hash());

    let closing = negotiator
        .execute(Message::ServerFault(pledge), &negotiator_state)
        .expect("quorum");
    let full = broadcasts(&closing)
        .into_iter()
        .find_map(|m| match m {
            Message::FullServerFault(f) => Some(f),
            _ => None,
        })
        .expect("full fault");
    assert_eq!(full.core_hash(), derived.hash());
}

// ---------------------------------------------------------------------------
// 6. Catch-up responder
// ---------------------------------------------------------------------------

#[test]
fn responder_clamps_to_inbound_load() {
    let mut state = NullState::new(1, 0);
    for block in chain(400) {
        state.save_block(block);
    }
    let req = DbStateMissing::new(1, 1_000, state.clock.now());

    let mut idle = DbStateResponder::new(SyncLimits::default());
    let served = idle.respond(&req, &state, QueueDepths::default());
    assert_eq!(served.len(), 201);
    let Some(Message::DbState(last)) = served.last() else {
        panic!("expected blocks");
    };
    assert_eq!(last.height(), 201);
    assert!(last.is_last);

    let mut busy = DbStateResponder::new(SyncLimits::default());
    let depths = QueueDepths {
        inbound: 600,
        ..QueueDepths::default()
    };
    assert_eq!(busy.respond(&req, &state, depths).len(), 51);

    let mut saturated = DbStateResponder::new(SyncLimits::default());
    let depths = QueueDepths {
        inbound: 1_001,
        ..QueueDepths::default()
    };
    assert!(saturated.respond(&req, &state, depths).is_empty());
}

#[test]
fn responder_does_not_resend_within_window() {
    let mut state = NullState::new(1, 0);
    for block in chain(10) {
        state.save_block(block);
    }
    let req = DbStateMissing::new(1, 5, state.clock.now());
    let mut responder = DbStateResponder::default();
    assert_eq!(responder.respond(&req, &state, QueueDepths::default()).len(), 5);
    assert!(responder.respond(&req, &state, QueueDepths::default()).is_empty());

    state.clock.advance_millis(10_000);
    assert_eq!(responder.respond(&req, &state, QueueDepths::default()).len(), 5);
}

#[test]
fn responder_caps_burst_bytes() {
    let mut state = NullState::new(1, 0);
    for block in chain(50) {
        state.save_block(block);
    }
    let one_block = state.blocks[&1].encoded_len();
    let limits = SyncLimits {
        burst_cap_bytes: one_block * 3,
        ..SyncLimits::default()
    };
    let mut responder = DbStateResponder::new(limits);
    let req = DbStateMissing::new(1, 40, state.clock.now());
    assert_eq!(responder.respond(&req, &state, QueueDepths::default()).len(), 3);
}

#[test]
fn blocks_extend_the_saved_tip() {
    let blocks = chain(3);
    let mut state = NullState::new(1, 0);
    state.save_block(blocks[0].clone());

    let mut skip = Message::DbState(blocks[2].clone());
    assert_eq!(validate(&mut skip, &state), Validity::Pending);

    let mut next = Message::DbState(blocks[1].clone());
    assert_eq!(validate(&mut next, &state), Validity::Valid);
    assert!(process(&next, 1, &mut state));
    assert_eq!(state.saved, 1);

    let mut stale = Message::DbState(blocks[1].clone());
    assert_eq!(validate(&mut stale, &state), Validity::Invalid);
}

#[test]
fn production_checkpoints_decide_alone() {
    let blocks = chain(3);
    let mut state = NullState::new(1, 0);
    state.network = NetworkId::Main;
    state.checkpoints.insert(2, blocks[2].dblock.hash());

    let mut known = Message::DbState(blocks[2].clone());
    assert_eq!(validate(&mut known, &state), Validity::Valid);

    state.checkpoints.insert(2, Hash::new([1; 32]));
    let mut wrong = Message::DbState(blocks[2].clone());
    assert_eq!(validate(&mut wrong, &state), Validity::Invalid);
}

// ---------------------------------------------------------------------------
// 7. Pipeline
// ---------------------------------------------------------------------------

struct Harness {
    pipeline: Pipeline<NullState>,
    inbound: quorum_network::QueueSender<Inbound>,
    inbound_rx: quorum_network::QueueReceiver<Inbound>,
    outbound_rx: quorum_network::QueueReceiver<Message>,
    metrics: Arc<NodeMetrics>,
}

fn harness(state: NullState) -> Harness {
    let config = NodeConfig::default();
    let (in_tx, in_rx) = bounded("inbound", 64);
    let (out_tx, out_rx) = bounded("outbound", 256);
    let metrics = Arc::new(NodeMetrics::new());
    let keypair = authority(1).1;
    let pipeline = Pipeline::new(&config, state, keypair, in_tx.clone(), out_tx, metrics.clone());
    Harness {
        pipeline,
        inbound: in_tx,
        inbound_rx: in_rx,
        outbound_rx: out_rx,
        metrics,
    }
}

fn frame(msg: &Message) -> Inbound {
    Inbound {
        peer: 1,
        peer_addr: "10.0.0.2:8108".into(),
        frame: encode_frame(NetworkId::Local, msg).expect("frame"),
    }
}

fn ping(name: &str) -> Message {
    Message::Bounce(Bounce::new(Ping {
        name: name.into(),
        number: 1,
        timestamp: Timestamp::from_secs(5),
        ..Ping::default()
    }))
}

#[tokio::test]
async fn pipeline_drops_malformed_and_repeated_frames() {
    let mut h = harness(NullState::new(1, 0));
    h.pipeline.handle_frame(Inbound {
        peer: 1,
        peer_addr: "10.0.0.2:8108".into(),
        frame: vec![0xFF; 4],
    });
    assert_eq!(h.metrics.messages_malformed.get(), 1);

    let bounce = frame(&ping("ping"));
    h.pipeline.handle_frame(bounce.clone());
    h.pipeline.handle_frame(bounce);
    assert_eq!(h.metrics.messages_decoded.get(), 2);
    assert_eq!(h.metrics.messages_duplicate.get(), 1);

    let reply = h.outbound_rx.recv().await.expect("bounce reply");
    let Message::BounceReply(reply) = reply else {
        panic!("expected a bounce reply");
    };
    assert_eq!(reply.ping.stamps.len(), 1);
}

#[tokio::test]
async fn pipeline_holds_reveals_until_committed() {
    let mut h = harness(NullState::new(1, 0));
    let reveal = RevealEntry::new(Hash::new([5; 32]), b"hello".to_vec(), Timestamp::from_secs(1));
    let entry_hash = reveal.entry_hash();
    h.pipeline.handle_message(Message::RevealEntry(reveal));
    assert_eq!(h.pipeline.holding().len(), 1);
    assert_eq!(h.metrics.messages_held.get(), 1);

    h.pipeline.review_holding();
    assert_eq!(h.pipeline.holding().len(), 1);
    assert!(h.pipeline.state().entries.is_empty());

    h.pipeline.state_mut().commits.insert(entry_hash);
    h.pipeline.review_holding();
    assert!(h.pipeline.holding().is_empty());
    assert_eq!(h.pipeline.state().entries.len(), 1);

    // This node leads VM 0, so the reveal and its ack go out.
    let first = h.outbound_rx.recv().await.expect("reveal");
    let second = h.outbound_rx.recv().await.expect("ack");
    assert!(matches!(first, Message::RevealEntry(_)));
    assert!(matches!(second, Message::Ack(_)));
}

#[tokio::test]
async fn pipeline_serves_and_applies_blocks() {
    let blocks = chain(6);

    let mut server_state = NullState::new(1, 0);
    for block in blocks.iter().cloned() {
        server_state.save_block(block);
    }
    let mut server = harness(server_state);
    server
        .pipeline
        .handle_message(Message::DbStateMissing(DbStateMissing::new(1, 3, Timestamp::from_secs(9))));
    assert_eq!(server.metrics.blocks_served.get(), 3);

    let mut client_state = NullState::new(1, 0);
    client_state.save_block(blocks[0].clone());
    let mut client = harness(client_state);
    for _ in 0..3 {
        let served = server.outbound_rx.recv().await.expect("block");
        client.pipeline.handle_message(served);
    }
    assert_eq!(client.pipeline.state().saved, 3);
}

#[tokio::test]
async fn pipeline_worker_stops_on_shutdown() {
    let mut h = harness(NullState::new(1, 0));
    let shutdown = ShutdownController::new();
    let inbound = h.inbound.clone();
    let worker = h.pipeline.spawn(h.inbound_rx, shutdown.subscribe());

    inbound.try_push(frame(&ping("worker"))).expect("queue has room");
    let reply = h.outbound_rx.recv().await.expect("reply");
    assert!(matches!(reply, Message::BounceReply(_)));

    assert_eq!(shutdown.shutdown(), 1);
    let pipeline = worker.await.expect("worker joins");
    assert!(pipeline.holding().is_empty());
    assert_eq!(h.metrics.messages_decoded.get(), 1);
}

// ---------------------------------------------------------------------------
// 8. Node assembly
// ---------------------------------------------------------------------------

#[tokio::test]
async fn node_answers_peers_and_stops_cleanly() {
    let config = NodeConfig {
        signing_key: Some("01".repeat(32)),
        identity_chain_id: authority(1).0,
        ..NodeConfig::default()
    };
    let mut node = QuorumNode::start(config, NullState::new(1, 0)).expect("node starts");
    let mut outbound = node.take_outbound().expect("outbound queue");
    assert!(node.take_outbound().is_none());

    node.inbound()
        .try_push(frame(&ping("node")))
        .expect("queue has room");
    let reply = outbound.recv().await.expect("reply");
    assert!(matches!(reply, Message::BounceReply(_)));

    let pipeline = node.stop().await.expect("clean stop");
    assert_eq!(pipeline.state().saved, 0);
    assert_eq!(node.metrics().messages_decoded.get(), 1);
    assert!(node.stop().await.is_err());
}

#[tokio::test]
async fn configured_checkpoints_reach_the_chain_state() {
    let blocks = chain(3);
    let toml = format!(
        "network = \"main\"\nsigning_key = \"{}\"\n\n[checkpoints]\n\"2\" = \"{}\"\n",
        "01".repeat(32),
        "ee".repeat(32),
    );
    let config = NodeConfig::from_toml_str(&toml).expect("config parses");
    let mut state = NullState::new(1, 0);
    state.network = NetworkId::Main;

    let mut node = QuorumNode::start(config, state).expect("node starts");
    let mut pipeline = node.stop().await.expect("clean stop");
    assert_eq!(pipeline.state().checkpoints.get(&2), Some(&Hash::new([0xEE; 32])));

    // Without the checkpoint this block would wait for heights 0 and 1.
    pipeline.handle_message(Message::DbState(blocks[2].clone()));
    assert_eq!(node.metrics().messages_invalid.get(), 1);
    assert!(pipeline.holding().is_empty());
}

#[test]
fn node_rejects_a_foreign_identity() {
    let config = NodeConfig {
        identity_chain_id: authority(2).0,
        ..NodeConfig::default()
    };
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let _guard = runtime.enter();
    assert!(QuorumNode::start(config, NullState::new(1, 0)).is_err());
}
