//! Stop signalling for the pipeline worker.
//!
//! A stop is delivered once, carrying the reason, over a
//! `tokio::sync::broadcast` channel. Later stop requests are no-ops so a
//! signal arriving during [`QuorumNode::stop`](crate::QuorumNode::stop)
//! cannot wake the worker twice.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Why the node is stopping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// SIGINT or ctrl-c.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// The embedding code asked for it.
    Requested,
}

/// One-shot stop broadcast shared by the node and its pipeline worker.
pub struct ShutdownController {
    tx: broadcast::Sender<StopReason>,
    stopping: AtomicBool,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            stopping: AtomicBool::new(false),
        }
    }

    /// A receiver for the pipeline worker to `select!` on.
    pub fn subscribe(&self) -> broadcast::Receiver<StopReason> {
        self.tx.subscribe()
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Request a stop. Returns how many workers were told; zero if a stop
    /// was already delivered.
    pub fn shutdown(&self) -> usize {
        self.stop_with(StopReason::Requested)
    }

    fn stop_with(&self, reason: StopReason) -> usize {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return 0;
        }
        info!(?reason, "stop requested");
        self.tx.send(reason).unwrap_or(0)
    }

    /// Block until the process receives SIGINT or SIGTERM, then stop.
    pub async fn wait_for_signal(&self) -> StopReason {
        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "SIGTERM handler unavailable");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let reason = tokio::select! {
            _ = signal::ctrl_c() => StopReason::Interrupt,
            _ = terminate => StopReason::Terminate,
        };
        self.stop_with(reason);
        reason
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn worker_learns_why_it_stopped() {
        let controller = ShutdownController::new();
        let mut worker = controller.subscribe();
        assert!(!controller.is_stopping());
        assert_eq!(controller.shutdown(), 1);
        assert_eq!(worker.recv().await.ok(), Some(StopReason::Requested));
        assert!(controller.is_stopping());
    }

    #[tokio::test]
    async fn stop_is_delivered_once() {
        let controller = ShutdownController::new();
        let mut worker = controller.subscribe();
        assert_eq!(controller.stop_with(StopReason::Terminate), 1);
        assert_eq!(controller.shutdown(), 0);
        assert_eq!(worker.recv().await.ok(), Some(StopReason::Terminate));
        assert!(worker.try_recv().is_err());
    }

    #[test]
    fn stopping_an_unwatched_node_still_latches() {
        let controller = ShutdownController::new();
        assert_eq!(controller.shutdown(), 0);
        assert!(controller.is_stopping());
    }
}
