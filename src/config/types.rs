//! Root configuration types.

use super::defaults::{default_port, default_stats_path};
use super::logging::LoggingConfig;
use super::server::RelayConfig;
use serde::{Deserialize, Serialize};

/// Root configuration struct for the relay server.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Path to the persisted counters/ban-list file.
    #[serde(default = "default_stats_path")]
    pub stats_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            relay: RelayConfig::default(),
            logging: LoggingConfig::default(),
            stats_path: default_stats_path(),
        }
    }
}
