//! Pre-built [`tracing::Span`] constructors for consensus operations.
//!
//! Consistent span names and field sets make it easy to filter and
//! correlate one message's path from decode through execution.

use tracing::{debug_span, info_span, Span};

use quorum_messages::Message;

/// Span covering the handling of a single inbound message.
pub fn message_span(msg: &Message) -> Span {
    info_span!(
        "message",
        kind = %msg.kind(),
        hash = %msg.msg_hash(),
        origin = msg.base().origin,
    )
}

/// Span covering one validation pass.
pub fn validate_span(msg: &Message) -> Span {
    debug_span!("validate", kind = %msg.kind())
}

/// Span covering a fault escalation on one lane.
pub fn fault_span(db_height: u32, vm_index: u8) -> Span {
    info_span!("fault", db_height, vm = vm_index)
}

/// Span covering an answer to a catch-up request.
pub fn sync_span(start: u32, end: u32) -> Span {
    info_span!("sync", start, end)
}

/// Span covering a holding-queue review.
pub fn holding_span(depth: usize) -> Span {
    debug_span!("holding_review", depth)
}
