//! Block catch-up: answering `DbStateMissing` and `MissingEntryBlocks`
//! under load shedding, and asking peers for blocks this node lacks.
//!
//! The responder never amplifies load onto a congested node. The range it
//! serves shrinks as the inbound queue deepens, a single answer is capped in
//! bytes, and the same height is not re-sent within the resend window.

use std::collections::HashMap;
use tracing::{debug, trace};

use quorum_consensus::ChainState;
use quorum_messages::{DbStateMissing, EntryBlockResponse, Message, MissingEntryBlocks};
use quorum_types::Timestamp;

/// Inbound-queue watermarks and the spans served at each load level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Watermarks {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    /// Widest range served above the medium watermark.
    pub medium_span: u32,
    /// Widest range ever served.
    pub high_span: u32,
}

impl Default for Watermarks {
    fn default() -> Self {
        Self {
            low: 100,
            medium: 500,
            high: 1000,
            medium_span: 50,
            high_span: 200,
        }
    }
}

/// Coarse load level of a queue depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadLevel {
    Idle,
    Normal,
    Busy,
    Saturated,
}

impl Watermarks {
    pub fn level(&self, depth: usize) -> LoadLevel {
        if depth > self.high {
            LoadLevel::Saturated
        } else if depth > self.medium {
            LoadLevel::Busy
        } else if depth > self.low {
            LoadLevel::Normal
        } else {
            LoadLevel::Idle
        }
    }
}

/// Queue depths at the moment a request is answered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueDepths {
    pub inbound: usize,
    pub outbound: usize,
    pub holding: usize,
}

/// Effective range to serve for a request of `start..=end` given the
/// inbound queue depth. `(0, 0)` means serve nothing; callers check the
/// load level first, since `(0, 0)` is also a genesis-only range.
pub fn clamp(depth: usize, start: u32, end: u32, marks: &Watermarks) -> (u32, u32) {
    if depth > marks.high {
        return (0, 0);
    }
    (start, new_end(depth, start, end, marks))
}

/// End of the served range; see [`clamp`].
pub fn new_end(depth: usize, start: u32, end: u32, marks: &Watermarks) -> u32 {
    if depth > marks.high {
        return 0;
    }
    let span = end.saturating_sub(start);
    if depth > marks.medium && span > marks.medium_span {
        return start.saturating_add(marks.medium_span);
    }
    if span > marks.high_span {
        return start.saturating_add(marks.high_span);
    }
    end
}

/// Limits applied when answering catch-up requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncLimits {
    pub watermarks: Watermarks,
    /// Serialized bytes sent in answer to one request.
    pub burst_cap_bytes: usize,
    /// A height sent within this window is not sent again.
    pub resend_window_ms: u64,
    /// No answers while the outbound queue holds more than this.
    pub out_queue_headroom: usize,
}

impl Default for SyncLimits {
    fn default() -> Self {
        Self {
            watermarks: Watermarks::default(),
            burst_cap_bytes: 1024 * 1024,
            resend_window_ms: 10_000,
            out_queue_headroom: 1000,
        }
    }
}

/// Serves saved blocks to peers that are behind.
pub struct DbStateResponder {
    limits: SyncLimits,
    /// Last send time per height.
    sent: HashMap<u32, Timestamp>,
}

impl DbStateResponder {
    pub fn new(limits: SyncLimits) -> Self {
        Self {
            limits,
            sent: HashMap::new(),
        }
    }

    pub fn limits(&self) -> &SyncLimits {
        &self.limits
    }

    fn overloaded(&self, depths: QueueDepths) -> bool {
        depths.outbound > self.limits.out_queue_headroom
            || self.limits.watermarks.level(depths.inbound) == LoadLevel::Saturated
    }

    /// Saved blocks answering `req`, oldest first.
    pub fn respond<S: ChainState + ?Sized>(
        &mut self,
        req: &DbStateMissing,
        state: &S,
        depths: QueueDepths,
    ) -> Vec<Message> {
        if self.overloaded(depths) {
            debug!(inbound = depths.inbound, outbound = depths.outbound, "too busy to serve blocks");
            return Vec::new();
        }
        let now = state.now();
        let window = self.limits.resend_window_ms;
        self.sent.retain(|_, at| at.elapsed_since(now) < window);

        let (start, end) = clamp(depths.inbound, req.start, req.end, &self.limits.watermarks);
        let end = end.min(state.highest_saved_block());
        let mut out = Vec::new();
        let mut bytes = 0usize;
        for height in start..=end {
            if self.sent.contains_key(&height) {
                trace!(height, "block sent recently, skipped");
                continue;
            }
            let Some(mut dbstate) = state.load_dbstate(height) else {
                break;
            };
            let len = dbstate.encoded_len();
            if !out.is_empty() && bytes + len > self.limits.burst_cap_bytes {
                break;
            }
            bytes += len;
            dbstate.base.reply_to(&req.base);
            dbstate.is_last = height == end;
            self.sent.insert(height, now);
            out.push(Message::DbState(dbstate));
        }
        if start <= end {
            debug!(start, end, served = out.len(), bytes, "served block range");
        }
        out
    }
}

impl Default for DbStateResponder {
    fn default() -> Self {
        Self::new(SyncLimits::default())
    }
}

/// Entry blocks and entries saved in `req`'s range, as one response.
pub fn respond_entry_blocks<S: ChainState + ?Sized>(
    req: &MissingEntryBlocks,
    state: &S,
    depths: QueueDepths,
    limits: &SyncLimits,
) -> Option<Message> {
    if depths.outbound > limits.out_queue_headroom
        || limits.watermarks.level(depths.inbound) == LoadLevel::Saturated
    {
        return None;
    }
    let (start, end) = clamp(depths.inbound, req.start, req.end, &limits.watermarks);
    let end = end.min(state.highest_saved_block());
    let mut entry_blocks = Vec::new();
    let mut entries = Vec::new();
    let mut bytes = 0usize;
    for height in start..=end {
        let Some((blocks, ents)) = state.entry_blocks_at(height) else {
            break;
        };
        let len: usize = blocks.iter().chain(ents.iter()).map(Vec::len).sum();
        if !entry_blocks.is_empty() && bytes + len > limits.burst_cap_bytes {
            break;
        }
        bytes += len;
        entry_blocks.extend(blocks);
        entries.extend(ents);
    }
    let mut resp = EntryBlockResponse::new(entry_blocks, entries, state.now());
    resp.base.reply_to(&req.base);
    Some(Message::EntryBlockResponse(resp))
}

/// Request for the blocks between the saved tip and the network's height,
/// or `None` when this node is not behind.
pub fn missing_range<S: ChainState + ?Sized>(state: &S, marks: &Watermarks) -> Option<DbStateMissing> {
    let saved = state.highest_saved_block();
    let target = state.leader_height().checked_sub(1)?;
    if target <= saved {
        return None;
    }
    let start = saved + 1;
    let end = target.min(start.saturating_add(marks.high_span));
    Some(DbStateMissing::new(start, end, state.now()))
}
