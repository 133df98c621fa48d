//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::NodeError;

/// Configuration for a lattice node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address the UDP socket binds to.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Data directory holding the identity key and peer cache.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Bootstrap peer addresses (`host:port`) to connect to on startup.
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_listen() -> String {
    "0.0.0.0:7600".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./lattice_data")
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

    /// Where the PEM-encoded long-term identity key lives.
    pub fn identity_key_path(&self) -> PathBuf {
        self.data_dir.join("identity.pem")
    }

    /// Where connected peers are exported for future bootstraps.
    pub fn peer_cache_path(&self) -> PathBuf {
        self.data_dir.join("peers.txt")
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            data_dir: default_data_dir(),
            bootstrap_peers: Vec::new(),
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
        let toml_str = config.to_toml_string();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.listen, config.listen);
        assert_eq!(parsed.data_dir, config.data_dir);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.listen, "0.0.0.0:7600");
        assert_eq!(config.log_format, "human");
        assert!(config.bootstrap_peers.is_empty());
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            listen = "127.0.0.1:9999"
            bootstrap_peers = ["192.0.2.1:7600", "192.0.2.2:7600"]
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.listen, "127.0.0.1:9999");
        assert_eq!(config.bootstrap_peers.len(), 2);
        assert_eq!(config.log_level, "info"); // default
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/lattice.toml");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }

    #[test]
    fn derived_paths_live_under_data_dir() {
        let mut config = NodeConfig::default();
        config.data_dir = PathBuf::from("/tmp/n1");
        assert_eq!(config.identity_key_path(), PathBuf::from("/tmp/n1/identity.pem"));
        assert_eq!(config.peer_cache_path(), PathBuf::from("/tmp/n1/peers.txt"));
    }
}
