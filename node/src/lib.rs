//! Quorum consensus node: hosts the message pipeline on a tokio runtime.
//!
//! The node wires the pieces together:
//! - configuration from TOML with serde defaults
//! - structured logging and per-message tracing spans
//! - Prometheus metrics in a node-owned registry
//! - the pipeline worker that validates, executes and holds messages
//! - a one-shot stop signal that tells the worker why it stopped

pub mod config;
pub mod error;
pub mod holding;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod pipeline;
pub mod shutdown;
pub mod tracing_spans;

pub use config::NodeConfig;
pub use error::NodeError;
pub use holding::HoldingQueue;
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::QuorumNode;
pub use pipeline::{Inbound, Pipeline};
pub use shutdown::{ShutdownController, StopReason};
