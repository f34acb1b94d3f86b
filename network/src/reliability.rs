//! Delivery reliability: automatic retries, holding-queue resends and
//! expiry of messages that stay undecidable.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use quorum_messages::{Message, MessageBase};
use quorum_types::{Timestamp, Validity};

use crate::queue::QueueSender;
use crate::NetworkError;

const MINUTE_MS: u64 = 60 * 1000;

/// Retry schedule applied by [`send_out`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub fault_retries: u32,
    pub fault_interval: Duration,
    pub default_retries: u32,
    pub default_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            fault_retries: 2,
            fault_interval: Duration::from_secs(5),
            default_retries: 1,
            default_interval: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Retries and spacing for a message of this kind.
    pub fn schedule(&self, msg: &Message) -> (u32, Duration) {
        if msg.kind().is_fault() {
            (self.fault_retries, self.fault_interval)
        } else {
            (self.default_retries, self.default_interval)
        }
    }
}

/// Queue `msg` for delivery once, then schedule its retries on a detached
/// task.
///
/// No retries are scheduled when the message opts out with `no_resend` or
/// when a retry task for it is already in flight. Local-only messages are
/// never queued. Must run inside a tokio runtime.
pub fn send_out(
    out: &QueueSender<Message>,
    msg: &Message,
    policy: &RetryPolicy,
) -> Result<Option<JoinHandle<()>>, NetworkError> {
    let base = msg.base();
    if base.local_only {
        trace!(kind = %msg.kind(), "local-only message not sent");
        return Ok(None);
    }
    out.try_push(msg.clone())?;
    if base.no_resend || base.bump_resend() != 0 {
        return Ok(None);
    }
    let (retries, interval) = policy.schedule(msg);
    if retries == 0 {
        return Ok(None);
    }
    let out = out.clone();
    let msg = msg.clone();
    Ok(Some(tokio::spawn(async move {
        for attempt in 1..=retries {
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            if let Err(e) = out.try_push(msg.clone()) {
                debug!(kind = %msg.kind(), attempt, error = %e, "retry abandoned");
                break;
            }
        }
    })))
}

/// Rate limit for resending held messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResendPolicy {
    pub interval_ms: u64,
    /// Resends pause while the outbound queue holds this many messages.
    pub out_queue_headroom: usize,
}

impl Default for ResendPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            out_queue_headroom: 1000,
        }
    }
}

/// Whether a held message should be resent now.
///
/// The first call arms the timer and answers no. Later calls answer yes
/// once the interval has passed since the last resend and the outbound
/// queue has room; answering yes re-arms the timer.
pub fn resend(base: &mut MessageBase, now: Timestamp, out_len: usize, policy: &ResendPolicy) -> bool {
    let Some(last) = base.resend_at else {
        base.resend_at = Some(now);
        return false;
    };
    if last.elapsed_since(now) < policy.interval_ms || out_len >= policy.out_queue_headroom {
        return false;
    }
    base.resend_at = Some(now);
    true
}

/// How long a message may sit in a holding queue of `depth` messages.
///
/// Deeper queues shed faster. Indeterminate messages get five minutes once
/// the queue holds more than a hundred.
pub fn expiry_window_ms(depth: usize, validity: Validity) -> u64 {
    let mut window = match depth {
        d if d > 1500 => 2 * MINUTE_MS,
        d if d > 1000 => 10 * MINUTE_MS,
        d if d > 500 => 15 * MINUTE_MS,
        d if d > 200 => 20 * MINUTE_MS,
        _ => 60 * MINUTE_MS,
    };
    if depth > 100 && validity == Validity::Pending {
        window = window.min(5 * MINUTE_MS);
    }
    window
}

/// Whether a held message should be dropped. Starts the hold clock on the
/// first call.
pub fn expire(base: &mut MessageBase, validity: Validity, depth: usize, now: Timestamp) -> bool {
    let first = *base.first_held_at.get_or_insert(now);
    let held_ms = first.elapsed_since(now);
    let expired = held_ms >= expiry_window_ms(depth, validity);
    if expired {
        base.stalled = true;
    }
    expired
}
