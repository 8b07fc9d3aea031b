//! Configuration management for a hashline switch.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub routing: RoutingConfig,
    pub liveness: LivenessConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Local UDP address the switch binds to.
    pub bind_addr: String,
    /// Bootstrap switch contacted on startup, `ip:port`.
    #[serde(default)]
    pub seed: Option<String>,
}

impl NetworkConfig {
    pub fn bind_socket_addr(&self) -> Result<SocketAddr> {
        parse_addr(&self.bind_addr)
    }

    pub fn seed_socket_addr(&self) -> Result<Option<SocketAddr>> {
        self.seed.as_deref().map(parse_addr).transpose()
    }
}

fn parse_addr(raw: &str) -> Result<SocketAddr> {
    raw.parse()
        .map_err(|e| CoreError::Config(format!("invalid address {raw:?}: {e}")))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Upper bound on hops taken by a single nearest-neighbor walk.
    pub max_hops: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// Lines silent for longer than this are purged.
    pub line_timeout_secs: u64,
    pub scan_interval_secs: u64,
}

impl Config {
    #[cfg(feature = "toml")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.as_ref().display(), "Loaded switch configuration");
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            network: NetworkConfig {
                bind_addr: "0.0.0.0:42424".to_string(),
                seed: None,
            },
            routing: RoutingConfig { max_hops: 16 },
            liveness: LivenessConfig {
                line_timeout_secs: 70,
                scan_interval_secs: 30,
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
