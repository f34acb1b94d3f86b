//! The message pipeline: decode, deduplicate, validate, then execute, hold
//! or drop.
//!
//! One worker owns the pipeline and is the only consumer of the inbound
//! queue. It also reviews the holding queue and drives fault timeouts on
//! fixed intervals, so chain state is never shared between tasks.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use quorum_consensus::{process, validate, Action, ChainState, Executor, ProcessState};
use quorum_messages::Message;
use quorum_network::{
    expire, missing_range, resend, respond_entry_blocks, send_out, DbStateResponder,
    MessageDedup, QueueDepths, QueueReceiver, QueueSender, ResendPolicy, RetryPolicy, SyncLimits,
};
use quorum_protocol::decode_frame;
use quorum_types::{KeyPair, NetworkId, Timestamp, Validity};

use crate::config::NodeConfig;
use crate::holding::HoldingQueue;
use crate::metrics::NodeMetrics;
use crate::shutdown::StopReason;
use crate::tracing_spans::{fault_span, holding_span, message_span, sync_span, validate_span};

/// A raw frame from a peer.
#[derive(Clone, Debug)]
pub struct Inbound {
    /// Local peer index; 0 is reserved for this node.
    pub peer: usize,
    pub peer_addr: String,
    pub frame: Vec<u8>,
}

/// Per-node message pipeline over chain state `S`.
pub struct Pipeline<S> {
    network: NetworkId,
    state: S,
    executor: Executor,
    holding: HoldingQueue,
    dedup: MessageDedup,
    responder: DbStateResponder,
    sync_limits: SyncLimits,
    retry: RetryPolicy,
    resend: ResendPolicy,
    inbound: QueueSender<Inbound>,
    outbound: QueueSender<Message>,
    metrics: Arc<NodeMetrics>,
    review_interval: Duration,
    last_sync_request: Option<Timestamp>,
}

impl<S: ProcessState> Pipeline<S> {
    pub fn new(
        config: &NodeConfig,
        state: S,
        keypair: KeyPair,
        inbound: QueueSender<Inbound>,
        outbound: QueueSender<Message>,
        metrics: Arc<NodeMetrics>,
    ) -> Self {
        let sync_limits = config.sync_limits();
        Self {
            network: config.network,
            executor: Executor::new(keypair, state.identity_chain_id(), config.fault_timeout_ms),
            state,
            holding: HoldingQueue::new(config.holding_capacity),
            dedup: MessageDedup::new(config.dedup_capacity),
            responder: DbStateResponder::new(sync_limits),
            sync_limits,
            retry: config.retry_policy(),
            resend: config.resend_policy(),
            inbound,
            outbound,
            metrics,
            review_interval: Duration::from_millis(config.holding_review_interval_ms.max(1)),
            last_sync_request: None,
        }
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn holding(&self) -> &HoldingQueue {
        &self.holding
    }

    fn depths(&self) -> QueueDepths {
        QueueDepths {
            inbound: self.inbound.len(),
            outbound: self.outbound.len(),
            holding: self.holding.len(),
        }
    }

    /// Decode a frame from a peer and handle the message it carries.
    pub fn handle_frame(&mut self, inbound: Inbound) {
        let mut msg = match decode_frame(self.network, &inbound.frame) {
            Ok((msg, _)) => msg,
            Err(e) => {
                self.metrics.messages_malformed.inc();
                warn!(peer = %inbound.peer_addr, error = %e, "malformed frame dropped");
                return;
            }
        };
        self.metrics.messages_decoded.inc();
        let base = msg.base_mut();
        base.origin = inbound.peer;
        base.network_origin = inbound.peer_addr;
        self.handle_message(msg);
    }

    /// Handle a decoded message, from a peer or generated locally.
    pub fn handle_message(&mut self, mut msg: Message) {
        let span = message_span(&msg);
        let _enter = span.enter();
        if self.dedup.is_repeat(&msg) {
            self.metrics.messages_duplicate.inc();
            debug!("repeat dropped");
            return;
        }
        let validity = validate_span(&msg).in_scope(|| validate(&mut msg, &self.state));
        match validity {
            Validity::Invalid => {
                self.metrics.messages_invalid.inc();
                debug!("invalid message dropped");
            }
            Validity::Pending => self.hold(msg),
            Validity::Valid => self.execute(msg),
        }
    }

    fn hold(&mut self, msg: Message) {
        let (ec_key, credits) = match &msg {
            Message::CommitChain(m) => (Some(m.commit.ec_pub_key), m.commit.credits),
            Message::CommitEntry(m) => (Some(m.commit.ec_pub_key), m.commit.credits),
            _ => (None, 0),
        };
        let held = match ec_key {
            // Commits short of credit wait for a balance change, not a timer.
            Some(key) if self.state.ec_balance(&key) < i64::from(credits) => {
                self.holding.hold_for_credit(key, msg)
            }
            _ => self.holding.insert(msg),
        };
        if held {
            self.metrics.messages_held.inc();
        } else {
            debug!(depth = self.holding.len(), "holding queue full or message already held");
        }
    }

    fn execute(&mut self, msg: Message) {
        self.metrics.messages_executed.inc();
        match msg {
            Message::DbStateMissing(req) => {
                let span = sync_span(req.start, req.end);
                let _enter = span.enter();
                let depths = self.depths();
                let blocks = self.responder.respond(&req, &self.state, depths);
                self.metrics.blocks_served.inc_by(blocks.len() as u64);
                for mut block in blocks {
                    block.base_mut().no_resend = true;
                    self.send(&block);
                }
            }
            Message::MissingEntryBlocks(req) => {
                let depths = self.depths();
                if let Some(resp) = respond_entry_blocks(&req, &self.state, depths, &self.sync_limits) {
                    self.send(&resp);
                }
            }
            msg => match self.executor.execute(msg, &self.state) {
                Ok(actions) => self.dispatch(actions),
                Err(e) => warn!(error = %e, "execution failed"),
            },
        }
    }

    fn send(&self, msg: &Message) {
        if let Err(e) = send_out(&self.outbound, msg, &self.retry) {
            warn!(kind = %msg.kind(), error = %e, "message not sent");
        }
    }

    fn dispatch(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Broadcast(msg) | Action::Reply(msg) => self.send(&msg),
                Action::AppendToProcessList {
                    db_height, message, ..
                } => self.apply(&message, db_height),
                Action::Process { db_height, message } => self.apply(&message, db_height),
            }
        }
    }

    fn apply(&mut self, msg: &Message, db_height: u32) {
        let saved_before = self.state.highest_saved_block();
        if !process(msg, db_height, &mut self.state) {
            debug!(kind = %msg.kind(), db_height, "state could not apply message yet");
            return;
        }
        match msg {
            Message::FullServerFault(f) => {
                let span = fault_span(f.core.db_height, f.core.vm_index);
                let _enter = span.enter();
                self.metrics.faults_escalated.inc();
                info!(faulted = %f.core.server_id, "full server fault applied");
            }
            Message::FactoidTransaction(_) => {
                // Balances may have changed; parked commits get another look.
                for parked in self.holding.release_all_credit() {
                    self.holding.insert(parked);
                }
            }
            _ => {}
        }
        if self.state.highest_saved_block() != saved_before {
            let height = self.state.leader_height();
            self.executor.begin_block(height, &self.state);
        }
    }

    /// Re-validate everything held: execute what became valid, drop what
    /// became invalid or expired, and resend the rest on schedule.
    pub fn review_holding(&mut self) {
        let depth = self.holding.len();
        let span = holding_span(depth);
        let _enter = span.enter();
        let now = self.state.now();
        for mut msg in self.holding.drain() {
            match validate(&mut msg, &self.state) {
                Validity::Invalid => {
                    self.metrics.messages_invalid.inc();
                }
                Validity::Valid => self.execute(msg),
                Validity::Pending => {
                    if expire(msg.base_mut(), Validity::Pending, depth, now) {
                        self.metrics.messages_expired.inc();
                        debug!(kind = %msg.kind(), "held message expired");
                        continue;
                    }
                    if resend(msg.base_mut(), now, self.outbound.len(), &self.resend) {
                        self.send(&msg);
                    }
                    self.holding.insert(msg);
                }
            }
        }
        self.metrics.holding_depth.set(self.holding.len() as i64);
    }

    /// Periodic work: leader timeouts, catch-up requests, gauges.
    pub fn tick(&mut self) {
        match self.executor.tick(&self.state) {
            Ok(actions) => self.dispatch(actions),
            Err(e) => warn!(error = %e, "fault check failed"),
        }
        let now = self.state.now();
        let due = self
            .last_sync_request
            .map_or(true, |at| at.elapsed_since(now) >= self.sync_limits.resend_window_ms);
        if due {
            if let Some(req) = missing_range(&self.state, &self.sync_limits.watermarks) {
                debug!(start = req.start, end = req.end, "requesting missing blocks");
                self.last_sync_request = Some(now);
                self.send(&Message::DbStateMissing(req));
            }
        }
        self.metrics.inbound_depth.set(self.inbound.len() as i64);
        self.metrics.outbound_depth.set(self.outbound.len() as i64);
    }
}

impl<S: ProcessState + Send + 'static> Pipeline<S> {
    /// Run the pipeline worker until shutdown or until the inbound queue
    /// closes. The pipeline is handed back when the worker stops.
    pub fn spawn(
        mut self,
        mut inbound_rx: QueueReceiver<Inbound>,
        mut shutdown_rx: broadcast::Receiver<StopReason>,
    ) -> JoinHandle<Self> {
        let worker = async move {
            let mut review = tokio::time::interval(self.review_interval);
            loop {
                tokio::select! {
                    reason = shutdown_rx.recv() => {
                        info!(reason = ?reason.ok(), "pipeline stopping");
                        break;
                    }
                    frame = inbound_rx.recv() => match frame {
                        Some(frame) => self.handle_frame(frame),
                        None => break,
                    },
                    _ = review.tick() => {
                        self.review_holding();
                        self.tick();
                    }
                }
            }
            self
        };
        tokio::spawn(worker.instrument(tracing::info_span!("pipeline")))
    }
}
