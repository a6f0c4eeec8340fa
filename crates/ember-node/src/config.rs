//! Node configuration.

use anyhow::{Context, Result};
use ember_sync::SyncConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node name, used in logs only.
    pub node_name: String,
    /// Network (mainnet, testnet).
    pub network: String,
    /// Sync engine configuration.
    pub sync: SyncConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_name: "ember".to_string(),
            network: "mainnet".to_string(),
            sync: SyncConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = NodeConfig::load(Path::new("/definitely/not/here.toml")).unwrap();
        assert_eq!(config.node_name, "ember");
        assert!(config.sync.sync_enabled);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: NodeConfig = toml::from_str(
            "node_name = \"probe\"\n\n[sync]\nsync_enabled = false\nimport_queue_cap = 4\n",
        )
        .unwrap();
        assert_eq!(config.node_name, "probe");
        assert!(!config.sync.sync_enabled);
        assert_eq!(config.sync.import_queue_cap, 4);
        // Untouched keys keep their defaults.
        assert_eq!(config.sync.header_backlog_cap, 20_000);
        assert_eq!(config.network, "mainnet");
    }
}
