//! Configuration structure and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{ConfigError, ConfigResult};

/// Complete node configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Node identity and listen address
    pub node: NodeSection,
    /// Peer list and connection tuning
    #[serde(default)]
    pub network: NetworkSection,
    /// Consensus parameters
    #[serde(default)]
    pub consensus: ConsensusSection,
    /// Data directory
    #[serde(default)]
    pub storage: StorageSection,
    /// Log filtering
    #[serde(default)]
    pub logging: LoggingSection,
}

impl Config {
    /// Loads and validates configuration from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        info!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        debug!(node_id = %config.node.id, peers = config.network.peers.len(), "configuration parsed");
        Ok(config)
    }

    /// Checks value ranges and internal consistency.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.node.id.is_empty() {
            return Err(ConfigError::Validation("node.id must not be empty".into()));
        }
        if self.node.port == 0 {
            return Err(ConfigError::Validation("node.port must not be 0".into()));
        }
        if self.consensus.block_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "consensus.block_interval_secs must be at least 1".into(),
            ));
        }
        if self.consensus.max_txs_per_block == 0 {
            return Err(ConfigError::Validation(
                "consensus.max_txs_per_block must be at least 1".into(),
            ));
        }
        if let Some(quorum) = self.consensus.quorum_size {
            let validators = self.network.peers.len() + 1;
            if quorum == 0 || quorum > validators {
                return Err(ConfigError::Validation(format!(
                    "consensus.quorum_size {} is outside 1..={} (validator count)",
                    quorum, validators
                )));
            }
        }
        for peer in &self.network.peers {
            peer.parse()?;
        }
        Ok(())
    }

    /// Quorum to use: the configured override, or a simple majority of
    /// the validator set (self plus peers).
    pub fn effective_quorum(&self) -> usize {
        self.consensus
            .quorum_size
            .unwrap_or_else(|| (self.network.peers.len() + 1) / 2 + 1)
    }
}

/// `[node]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    /// Validator identity (hostname by convention)
    pub id: String,
    /// Interface the listener binds to
    #[serde(default = "default_listen_host")]
    pub host: String,
    /// Listening port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            id: String::new(),
            host: default_listen_host(),
            port: default_port(),
        }
    }
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    9000
}

/// One normalized peer entry: `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerEntry(pub String);

impl PeerEntry {
    /// Splits the entry into host and port.
    pub fn parse(&self) -> ConfigResult<(String, u16)> {
        let (host, port) = self.0.rsplit_once(':').ok_or_else(|| {
            ConfigError::Validation(format!("peer entry '{}' is not host:port", self.0))
        })?;
        if host.is_empty() {
            return Err(ConfigError::Validation(format!(
                "peer entry '{}' has an empty host",
                self.0
            )));
        }
        let port: u16 = port.parse().map_err(|_| {
            ConfigError::Validation(format!("peer entry '{}' has an invalid port", self.0))
        })?;
        Ok((host.to_string(), port))
    }
}

/// `[network]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSection {
    /// Normalized peer list supplied by the launcher
    #[serde(default)]
    pub peers: Vec<PeerEntry>,
    /// Outbound dial timeout
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_secs: u64,
    /// Interval between heartbeat broadcasts
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// Silence after which a peer counts as down
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            dial_timeout_secs: default_dial_timeout(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            heartbeat_timeout_secs: default_heartbeat_timeout(),
        }
    }
}

const fn default_dial_timeout() -> u64 {
    5
}

const fn default_heartbeat_interval() -> u64 {
    3
}

const fn default_heartbeat_timeout() -> u64 {
    10
}

/// `[consensus]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusSection {
    /// Seconds between block proposals
    #[serde(default = "default_block_interval")]
    pub block_interval_secs: u64,
    /// Seconds a stalled round waits before the view-change hook fires
    #[serde(default = "default_proposal_timeout")]
    pub proposal_timeout_secs: u64,
    /// ACKs required to commit; simple majority when unset
    #[serde(default)]
    pub quorum_size: Option<usize>,
    /// Maximum transactions per block
    #[serde(default = "default_max_txs")]
    pub max_txs_per_block: usize,
}

impl Default for ConsensusSection {
    fn default() -> Self {
        Self {
            block_interval_secs: default_block_interval(),
            proposal_timeout_secs: default_proposal_timeout(),
            quorum_size: None,
            max_txs_per_block: default_max_txs(),
        }
    }
}

const fn default_block_interval() -> u64 {
    5
}

const fn default_proposal_timeout() -> u64 {
    10
}

const fn default_max_txs() -> usize {
    100
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    /// Directory holding the persisted chain
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// tracing filter directive (e.g. `info`, `minichain=debug`)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
