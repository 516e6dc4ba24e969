//! Relay behavior configuration.

use super::defaults::{
    default_heartbeat_period_secs, default_inactivity_threshold_secs,
    default_invalid_packet_threshold, default_write_deadline_secs,
};
use serde::{Deserialize, Serialize};

/// Tunable knobs for the session relay engine.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelayConfig {
    /// Period at which the heartbeat, inactivity sweep, and stats tasks tick.
    #[serde(default = "default_heartbeat_period_secs")]
    pub heartbeat_period_secs: u64,
    /// Rooms idle longer than this are deleted by the inactivity sweep.
    #[serde(default = "default_inactivity_threshold_secs")]
    pub inactivity_threshold_secs: u64,
    /// Consecutive malformed packets before a connection's IP is banned.
    #[serde(default = "default_invalid_packet_threshold")]
    pub invalid_packet_threshold: u32,
    /// Deadline for a single frame write before the connection is dropped.
    #[serde(default = "default_write_deadline_secs")]
    pub write_deadline_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            heartbeat_period_secs: default_heartbeat_period_secs(),
            inactivity_threshold_secs: default_inactivity_threshold_secs(),
            invalid_packet_threshold: default_invalid_packet_threshold(),
            write_deadline_secs: default_write_deadline_secs(),
        }
    }
}
