//! Message delivery for the consensus layer.
//!
//! Bounded queues with observable depth, the reliability policy (automatic
//! retries, holding-queue resends, expiry), repeat-hash deduplication and
//! the load-shedding block catch-up responders.

pub mod dedup;
pub mod error;
pub mod queue;
pub mod reliability;
pub mod sync;

pub use dedup::{MessageDedup, DEFAULT_DEDUP_CAPACITY};
pub use error::NetworkError;
pub use queue::{bounded, QueueReceiver, QueueSender};
pub use reliability::{expire, expiry_window_ms, resend, send_out, ResendPolicy, RetryPolicy};
pub use sync::{
    clamp, missing_range, new_end, respond_entry_blocks, DbStateResponder, LoadLevel,
    QueueDepths, SyncLimits, Watermarks,
};
