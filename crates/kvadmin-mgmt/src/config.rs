//! Admin client configuration file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Admin client configuration, loaded from TOML or JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Meta server addresses, `host:port`.
    pub meta_servers: Vec<String>,
    /// Replica server addresses; empty means ask a meta server.
    pub replica_servers: Vec<String>,
    /// TCP connect bound per node.
    pub connect_timeout_ms: u64,
    /// Per-node bound on one remote command.
    pub command_timeout_ms: u64,
    /// Per-node bound on one reverse lookup.
    pub resolve_timeout_ms: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            meta_servers: vec![String::from("127.0.0.1:34601")],
            replica_servers: Vec::new(),
            connect_timeout_ms: 3000,
            command_timeout_ms: 10_000,
            resolve_timeout_ms: 2000,
        }
    }
}

impl AdminConfig {
    /// Load from `path`; the extension picks TOML or JSON.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let config: AdminConfig = toml::from_str(&contents)?;
                Ok(config)
            }
            "json" => {
                let config: AdminConfig = serde_json::from_str(&contents)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }

    /// [`command_timeout_ms`](Self::command_timeout_ms) as a `Duration`.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// [`resolve_timeout_ms`](Self::resolve_timeout_ms) as a `Duration`.
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }
}
