//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use quorum_crypto::{generate_keypair, keypair_from_seed};
use quorum_network::{ResendPolicy, RetryPolicy, SyncLimits, Watermarks};
use quorum_types::{Hash, KeyPair, NetworkId};

use crate::logging::LogFormat;
use crate::NodeError;

/// Configuration for a consensus node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Which network to join.
    #[serde(default = "default_network")]
    pub network: NetworkId,

    /// This server's identity chain id.
    #[serde(default)]
    pub identity_chain_id: Hash,

    /// Hex-encoded 32-byte signing key seed. A fresh key is generated when
    /// absent.
    #[serde(default)]
    pub signing_key: Option<String>,

    #[serde(default = "default_queue_capacity")]
    pub inbound_queue_capacity: usize,

    #[serde(default = "default_queue_capacity")]
    pub outbound_queue_capacity: usize,

    #[serde(default = "default_holding_capacity")]
    pub holding_capacity: usize,

    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,

    /// Inbound depth above which block catch-up requests shrink.
    #[serde(default = "default_watermark_low")]
    pub watermark_low: usize,
    #[serde(default = "default_watermark_medium")]
    pub watermark_medium: usize,
    /// Inbound depth above which catch-up requests are not served at all.
    #[serde(default = "default_watermark_high")]
    pub watermark_high: usize,
    #[serde(default = "default_medium_span")]
    pub medium_span: u32,
    #[serde(default = "default_high_span")]
    pub high_span: u32,

    #[serde(default = "default_fault_retries")]
    pub fault_retries: u32,
    #[serde(default = "default_fault_retry_interval_ms")]
    pub fault_retry_interval_ms: u64,
    #[serde(default = "default_retries")]
    pub default_retries: u32,

    /// Minimum spacing between resends of one held message.
    #[serde(default = "default_resend_interval_ms")]
    pub resend_interval_ms: u64,
    /// Outbound depth at which held-message resends pause.
    #[serde(default = "default_out_queue_headroom")]
    pub out_queue_headroom: usize,

    /// Bytes of blocks sent in answer to one catch-up request.
    #[serde(default = "default_burst_cap_bytes")]
    pub sync_burst_cap_bytes: usize,
    #[serde(default = "default_sync_resend_window_ms")]
    pub sync_resend_window_ms: u64,

    /// Time a VM may stall before its leader is suspected.
    #[serde(default = "default_fault_timeout_ms")]
    pub fault_timeout_ms: u64,

    #[serde(default = "default_holding_review_interval_ms")]
    pub holding_review_interval_ms: u64,

    /// Known-good directory block hashes by height, honoured on the main
    /// network only.
    #[serde(default)]
    pub checkpoints: BTreeMap<String, Hash>,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_network() -> NetworkId {
    NetworkId::Local
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_holding_capacity() -> usize {
    5_000
}

fn default_dedup_capacity() -> usize {
    quorum_network::DEFAULT_DEDUP_CAPACITY
}

fn default_watermark_low() -> usize {
    Watermarks::default().low
}

fn default_watermark_medium() -> usize {
    Watermarks::default().medium
}

fn default_watermark_high() -> usize {
    Watermarks::default().high
}

fn default_medium_span() -> u32 {
    Watermarks::default().medium_span
}

fn default_high_span() -> u32 {
    Watermarks::default().high_span
}

fn default_fault_retries() -> u32 {
    2
}

fn default_fault_retry_interval_ms() -> u64 {
    5_000
}

fn default_retries() -> u32 {
    1
}

fn default_resend_interval_ms() -> u64 {
    10_000
}

fn default_out_queue_headroom() -> usize {
    1_000
}

fn default_burst_cap_bytes() -> usize {
    1024 * 1024
}

fn default_sync_resend_window_ms() -> u64 {
    10_000
}

fn default_fault_timeout_ms() -> u64 {
    quorum_consensus::DEFAULT_FAULT_TIMEOUT_MS
}

fn default_holding_review_interval_ms() -> u64 {
    1_000
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// The configured signing key, or a fresh one.
    pub fn keypair(&self) -> Result<KeyPair, NodeError> {
        let Some(seed_hex) = &self.signing_key else {
            return Ok(generate_keypair());
        };
        let bytes = hex::decode(seed_hex.trim())
            .map_err(|e| NodeError::Config(format!("signing_key: {e}")))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| NodeError::Config("signing_key must be 32 bytes".into()))?;
        Ok(keypair_from_seed(&seed))
    }

    /// Checkpoint table keyed by height.
    pub fn checkpoint_table(&self) -> Result<HashMap<u32, Hash>, NodeError> {
        self.checkpoints
            .iter()
            .map(|(height, hash)| {
                height
                    .parse::<u32>()
                    .map(|h| (h, *hash))
                    .map_err(|_| NodeError::Config(format!("checkpoint height {height:?}")))
            })
            .collect()
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse()
    }

    pub fn watermarks(&self) -> Watermarks {
        Watermarks {
            low: self.watermark_low,
            medium: self.watermark_medium,
            high: self.watermark_high,
            medium_span: self.medium_span,
            high_span: self.high_span,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            fault_retries: self.fault_retries,
            fault_interval: Duration::from_millis(self.fault_retry_interval_ms),
            default_retries: self.default_retries,
            default_interval: Duration::ZERO,
        }
    }

    pub fn resend_policy(&self) -> ResendPolicy {
        ResendPolicy {
            interval_ms: self.resend_interval_ms,
            out_queue_headroom: self.out_queue_headroom,
        }
    }

    pub fn sync_limits(&self) -> SyncLimits {
        SyncLimits {
            watermarks: self.watermarks(),
            burst_cap_bytes: self.sync_burst_cap_bytes,
            resend_window_ms: self.sync_resend_window_ms,
            out_queue_headroom: self.out_queue_headroom,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            identity_chain_id: Hash::ZERO,
            signing_key: None,
            inbound_queue_capacity: default_queue_capacity(),
            outbound_queue_capacity: default_queue_capacity(),
            holding_capacity: default_holding_capacity(),
            dedup_capacity: default_dedup_capacity(),
            watermark_low: default_watermark_low(),
            watermark_medium: default_watermark_medium(),
            watermark_high: default_watermark_high(),
            medium_span: default_medium_span(),
            high_span: default_high_span(),
            fault_retries: default_fault_retries(),
            fault_retry_interval_ms: default_fault_retry_interval_ms(),
            default_retries: default_retries(),
            resend_interval_ms: default_resend_interval_ms(),
            out_queue_headroom: default_out_queue_headroom(),
            sync_burst_cap_bytes: default_burst_cap_bytes(),
            sync_resend_window_ms: default_sync_resend_window_ms(),
            fault_timeout_ms: default_fault_timeout_ms(),
            holding_review_interval_ms: default_holding_review_interval_ms(),
            checkpoints: BTreeMap::new(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string().expect("should serialize");
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.fault_timeout_ms, config.fault_timeout_ms);
        assert_eq!(parsed.watermarks(), config.watermarks());
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.watermarks(), Watermarks::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.resend_policy(), ResendPolicy::default());
        assert_eq!(config.sync_limits(), SyncLimits::default());
        assert_eq!(config.log_format().unwrap(), LogFormat::Human);
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            watermark_high = 2000
            fault_timeout_ms = 5000
            log_format = "json"
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.watermark_high, 2000);
        assert_eq!(config.fault_timeout_ms, 5000);
        assert_eq!(config.log_format().unwrap(), LogFormat::Json);
        assert_eq!(config.watermark_medium, 500); // default
    }

    #[test]
    fn checkpoints_parse_by_height() {
        let hash = "ab".repeat(32);
        let toml = format!("[checkpoints]\n\"70386\" = \"{hash}\"\n");
        let config = NodeConfig::from_toml_str(&toml).expect("should parse");
        let table = config.checkpoint_table().unwrap();
        assert_eq!(table.get(&70386), Some(&Hash::new([0xAB; 32])));
    }

    #[test]
    fn bad_checkpoint_height_is_config_error() {
        let hash = "00".repeat(32);
        let toml = format!("[checkpoints]\ntip = \"{hash}\"\n");
        let config = NodeConfig::from_toml_str(&toml).expect("should parse");
        assert!(matches!(config.checkpoint_table(), Err(NodeError::Config(_))));
    }

    #[test]
    fn signing_key_seed_is_deterministic() {
        let config = NodeConfig {
            signing_key: Some("11".repeat(32)),
            ..NodeConfig::default()
        };
        let a = config.keypair().unwrap();
        let b = config.keypair().unwrap();
        assert_eq!(a.public, b.public);
        let short = NodeConfig {
            signing_key: Some("11".repeat(8)),
            ..NodeConfig::default()
        };
        assert!(matches!(short.keypair(), Err(NodeError::Config(_))));
    }

    #[test]
    fn config_file_loads() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "network = \"test\"\nholding_capacity = 7\n").unwrap();
        let config = NodeConfig::from_toml_file(&path).expect("should load");
        assert_eq!(config.network, NetworkId::Test);
        assert_eq!(config.holding_capacity, 7);
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/quorum.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}
