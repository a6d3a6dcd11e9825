//! Configuration for the registry and node daemons.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $LATTICE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/lattice/config.toml
//!   3. ~/.config/lattice/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::fingers::DEFAULT_NR;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LatticeConfig {
    pub registry: RegistryConfig,
    pub node: NodeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// TCP port the registry listens on for peer connections.
    pub port: u16,
    /// Fingers per peer (NR). Minimum 1; the console can override per setup.
    pub finger_count: u32,
    /// Seconds to wait after the completion barrier before harvesting
    /// summaries. Data packets carry no acknowledgment, so "finished
    /// sending" does not imply "finished receiving" — this bounds
    /// in-flight traffic.
    pub settle_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Registry host to register with.
    pub registry_host: String,
    /// Registry port.
    pub registry_port: u16,
    /// Port to accept overlay connections on. 0 = OS-assigned.
    pub listen_port: u16,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

impl Default for LatticeConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            node: NodeConfig::default(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            port: 5200,
            finger_count: DEFAULT_NR,
            settle_delay_secs: 5,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            registry_host: "127.0.0.1".to_string(),
            registry_port: 5200,
            listen_port: 0,
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
}

// ── Loading ──────────────────────────────────────────────────────────────────

impl LatticeConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            LatticeConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("LATTICE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Apply LATTICE_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LATTICE_REGISTRY__PORT") {
            if let Ok(p) = v.parse() {
                self.registry.port = p;
            }
        }
        if let Ok(v) = std::env::var("LATTICE_REGISTRY__FINGER_COUNT") {
            if let Ok(n) = v.parse() {
                self.registry.finger_count = n;
            }
        }
        if let Ok(v) = std::env::var("LATTICE_REGISTRY__SETTLE_DELAY_SECS") {
            if let Ok(s) = v.parse() {
                self.registry.settle_delay_secs = s;
            }
        }
        if let Ok(v) = std::env::var("LATTICE_NODE__REGISTRY_HOST") {
            self.node.registry_host = v;
        }
        if let Ok(v) = std::env::var("LATTICE_NODE__REGISTRY_PORT") {
            if let Ok(p) = v.parse() {
                self.node.registry_port = p;
            }
        }
        if let Ok(v) = std::env::var("LATTICE_NODE__LISTEN_PORT") {
            if let Ok(p) = v.parse() {
                self.node.listen_port = p;
            }
        }
    }
}

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            std::env::var("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp"))
                .join(".config")
        })
        .join("lattice")
}
