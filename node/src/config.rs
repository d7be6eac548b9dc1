//! Node configuration with TOML file support.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use lattice_network::{BandwidthLimits, ChannelRegistryConfig};

use crate::backlog_population::BacklogPopulationConfig;
use crate::block_processor::BlockProcessorConfig;
use crate::error::NodeError;
use crate::frontier_scan::FrontierScanConfig;
use crate::vote_processor::VoteProcessorConfig;

/// Configuration for a Lattice node.
///
/// Loaded from a TOML file via [`NodeConfig::from_toml_file`] or built
/// programmatically (tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub block_processor: BlockProcessorSection,

    #[serde(default)]
    pub vote_processor: VoteProcessorSection,

    #[serde(default)]
    pub elections: ElectionsSection,

    #[serde(default)]
    pub backlog: BacklogSection,

    #[serde(default)]
    pub frontier_scan: FrontierScanSection,

    #[serde(default)]
    pub network: NetworkSection,

    /// Minimum proof-of-work difficulty for queue admission.
    #[serde(default)]
    pub work_threshold: u64,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockProcessorSection {
    #[serde(default = "default_bp_full_size")]
    pub full_size: usize,
    #[serde(default = "default_bp_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_bp_batch_max_time_ms")]
    pub batch_max_time_ms: u64,
    #[serde(default = "default_bp_timeout_secs")]
    pub block_process_timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VoteProcessorSection {
    #[serde(default = "default_vp_max_votes")]
    pub max_votes: usize,
    #[serde(default = "default_vp_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_vp_threads")]
    pub threads: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ElectionsSection {
    #[serde(default = "default_el_table_size")]
    pub table_size: usize,
    #[serde(default = "default_el_hinted_limit_percent")]
    pub hinted_limit_percent: usize,
    #[serde(default = "default_el_hint_weight_percent")]
    pub hint_weight_percent: u128,
    #[serde(default = "default_el_priority_depth")]
    pub priority_depth: usize,
    #[serde(default = "default_el_optimistic_depth")]
    pub optimistic_depth: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BacklogSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_backlog_delay_secs")]
    pub delay_between_runs_secs: u64,
    #[serde(default = "default_backlog_batch_size")]
    pub batch_size: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FrontierScanSection {
    #[serde(default = "default_fs_parallelism")]
    pub head_parallelism: u64,
    #[serde(default = "default_fs_consideration")]
    pub consideration_count: usize,
    #[serde(default = "default_fs_candidates")]
    pub candidates_target: usize,
    #[serde(default = "default_fs_cooldown_secs")]
    pub cooldown_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkSection {
    #[serde(default = "default_net_max_per_ip")]
    pub max_peers_per_ip: usize,
    #[serde(default = "default_net_max_per_subnet")]
    pub max_peers_per_subnetwork: usize,
    #[serde(default = "default_net_protocol_min")]
    pub protocol_version_min: u8,
    #[serde(default = "default_net_keepalive_secs")]
    pub keepalive_period_secs: u64,
    #[serde(default = "default_net_merge_ms")]
    pub merge_period_ms: u64,
    #[serde(default = "default_net_generic_bandwidth")]
    pub generic_bytes_per_sec: u64,
    #[serde(default = "default_net_bootstrap_bandwidth")]
    pub bootstrap_bytes_per_sec: u64,
    #[serde(default)]
    pub allow_local_peers: bool,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_bp_full_size() -> usize {
    65_536
}

fn default_bp_batch_size() -> usize {
    256
}

fn default_bp_batch_max_time_ms() -> u64 {
    500
}

fn default_bp_timeout_secs() -> u64 {
    30
}

fn default_vp_max_votes() -> usize {
    16 * 1024
}

fn default_vp_batch_size() -> usize {
    1024
}

fn default_vp_threads() -> usize {
    1
}

fn default_el_table_size() -> usize {
    5000
}

fn default_el_hinted_limit_percent() -> usize {
    20
}

fn default_el_hint_weight_percent() -> u128 {
    10
}

fn default_el_priority_depth() -> usize {
    4096
}

fn default_el_optimistic_depth() -> usize {
    1024
}

fn default_backlog_delay_secs() -> u64 {
    300
}

fn default_backlog_batch_size() -> usize {
    10_000
}

fn default_fs_parallelism() -> u64 {
    128
}

fn default_fs_consideration() -> usize {
    4
}

fn default_fs_candidates() -> usize {
    1000
}

fn default_fs_cooldown_secs() -> u64 {
    5
}

fn default_net_max_per_ip() -> usize {
    5
}

fn default_net_max_per_subnet() -> usize {
    16
}

fn default_net_protocol_min() -> u8 {
    1
}

fn default_net_keepalive_secs() -> u64 {
    60
}

fn default_net_merge_ms() -> u64 {
    250
}

fn default_net_generic_bandwidth() -> u64 {
    10 * 1024 * 1024
}

fn default_net_bootstrap_bandwidth() -> u64 {
    5 * 1024 * 1024
}

macro_rules! default_section {
    ($section:ident) => {
        impl Default for $section {
            fn default() -> Self {
                toml::from_str("").expect("empty section uses field defaults")
            }
        }
    };
}

default_section!(BlockProcessorSection);
default_section!(VoteProcessorSection);
default_section!(ElectionsSection);
default_section!(BacklogSection);
default_section!(FrontierScanSection);
default_section!(NetworkSection);

impl Default for NodeConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty config uses field defaults")
    }
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("NodeConfig is always serializable to TOML")
    }

    pub fn block_processor_config(&self) -> BlockProcessorConfig {
        BlockProcessorConfig {
            full_size: self.block_processor.full_size,
            batch_size: self.block_processor.batch_size,
            batch_max_time: Duration::from_millis(self.block_processor.batch_max_time_ms),
            block_process_timeout: Duration::from_secs(
                self.block_processor.block_process_timeout_secs,
            ),
        }
    }

    pub fn vote_processor_config(&self) -> VoteProcessorConfig {
        VoteProcessorConfig {
            max_votes: self.vote_processor.max_votes,
            batch_size: self.vote_processor.batch_size,
            num_threads: self.vote_processor.threads,
        }
    }

    pub fn backlog_config(&self) -> BacklogPopulationConfig {
        BacklogPopulationConfig {
            enabled: self.backlog.enabled,
            delay_between_runs: Duration::from_secs(self.backlog.delay_between_runs_secs),
            batch_size: self.backlog.batch_size,
        }
    }

    pub fn frontier_scan_config(&self) -> FrontierScanConfig {
        FrontierScanConfig {
            head_parallelism: self.frontier_scan.head_parallelism,
            consideration_count: self.frontier_scan.consideration_count,
            candidates_target: self.frontier_scan.candidates_target,
            cooldown: Duration::from_secs(self.frontier_scan.cooldown_secs),
        }
    }

    pub fn registry_config(&self) -> ChannelRegistryConfig {
        ChannelRegistryConfig {
            max_peers_per_ip: self.network.max_peers_per_ip,
            max_peers_per_subnetwork: self.network.max_peers_per_subnetwork,
            protocol_version_min: self.network.protocol_version_min,
            keepalive_period: Duration::from_secs(self.network.keepalive_period_secs),
            merge_period: Duration::from_millis(self.network.merge_period_ms),
            allow_local_peers: self.network.allow_local_peers,
        }
    }

    pub fn bandwidth_limits(&self) -> BandwidthLimits {
        BandwidthLimits {
            generic_bytes_per_sec: self.network.generic_bytes_per_sec,
            bootstrap_bytes_per_sec: self.network.bootstrap_bytes_per_sec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.block_processor.full_size, config.block_processor.full_size);
        assert_eq!(parsed.network.max_peers_per_ip, config.network.max_peers_per_ip);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.block_processor.batch_size, 256);
        assert_eq!(config.elections.hint_weight_percent, 10);
        assert_eq!(config.frontier_scan.head_parallelism, 128);
        assert_eq!(config.log_format, "human");
        assert!(config.backlog.enabled);
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            work_threshold = 77

            [block_processor]
            batch_size = 64

            [network]
            max_peers_per_ip = 2
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.work_threshold, 77);
        assert_eq!(config.block_processor.batch_size, 64);
        assert_eq!(config.network.max_peers_per_ip, 2);
        // Unset fields keep defaults.
        assert_eq!(config.block_processor.full_size, 65_536);
        assert_eq!(config.vote_processor.batch_size, 1024);
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/lattice.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }

    #[test]
    fn duration_conversions() {
        let config = NodeConfig::default();
        assert_eq!(
            config.block_processor_config().batch_max_time,
            Duration::from_millis(500)
        );
        assert_eq!(
            config.registry_config().keepalive_period,
            Duration::from_secs(60)
        );
    }
}
