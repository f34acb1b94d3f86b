//! Prometheus metrics for the consensus node.
//!
//! The [`NodeMetrics`] struct owns a dedicated [`Registry`] that an
//! exporter can encode into the Prometheus text exposition format.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge,
    Opts, Registry,
};

/// Central collection of all node-level Prometheus metrics.
pub struct NodeMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Frames decoded into messages.
    pub messages_decoded: IntCounter,
    /// Frames dropped because they failed to decode.
    pub messages_malformed: IntCounter,
    /// Messages dropped as repeats.
    pub messages_duplicate: IntCounter,
    /// Messages that validated to invalid.
    pub messages_invalid: IntCounter,
    /// Messages placed in the holding queue.
    pub messages_held: IntCounter,
    /// Held messages dropped by the expiry policy.
    pub messages_expired: IntCounter,
    /// Messages executed on the leader or follower path.
    pub messages_executed: IntCounter,
    /// Full server faults applied.
    pub faults_escalated: IntCounter,
    /// Saved blocks sent to peers catching up.
    pub blocks_served: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub holding_depth: IntGauge,
    pub inbound_depth: IntGauge,
    pub outbound_depth: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    register_int_counter_with_registry!(Opts::new(name, help), registry)
        .expect("metric names are unique within the node registry")
}

fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
    register_int_gauge_with_registry!(Opts::new(name, help), registry)
        .expect("metric names are unique within the node registry")
}

impl NodeMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();
        Self {
            messages_decoded: counter(&registry, "quorum_messages_decoded_total", "Frames decoded into messages"),
            messages_malformed: counter(&registry, "quorum_messages_malformed_total", "Frames that failed to decode"),
            messages_duplicate: counter(&registry, "quorum_messages_duplicate_total", "Repeated messages dropped"),
            messages_invalid: counter(&registry, "quorum_messages_invalid_total", "Messages that validated as invalid"),
            messages_held: counter(&registry, "quorum_messages_held_total", "Messages placed in the holding queue"),
            messages_expired: counter(&registry, "quorum_messages_expired_total", "Held messages expired"),
            messages_executed: counter(&registry, "quorum_messages_executed_total", "Messages executed"),
            faults_escalated: counter(&registry, "quorum_faults_escalated_total", "Full server faults applied"),
            blocks_served: counter(&registry, "quorum_blocks_served_total", "Saved blocks sent to peers"),
            holding_depth: gauge(&registry, "quorum_holding_depth", "Messages in the holding queue"),
            inbound_depth: gauge(&registry, "quorum_inbound_depth", "Frames in the inbound queue"),
            outbound_depth: gauge(&registry, "quorum_outbound_depth", "Messages in the outbound queue"),
            registry,
        }
    }

    /// Prometheus text exposition of every metric.
    pub fn encode(&self) -> String {
        use prometheus::Encoder;
        let mut buf = Vec::new();
        let encoder = prometheus::TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
