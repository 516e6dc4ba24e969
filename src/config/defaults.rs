//! Default value functions for configuration fields.
//!
//! This module contains all the default value functions used by serde's `#[serde(default = ...)]`
//! attributes throughout the configuration system.

use super::logging::LogFormat;

// =============================================================================
// Root Config
// =============================================================================

pub const fn default_port() -> u16 {
    43383
}

pub fn default_stats_path() -> String {
    "stats.json".to_string()
}

// =============================================================================
// Relay Defaults
// =============================================================================

/// Period at which the heartbeat, liveness, and stats tasks tick (seconds).
pub const fn default_heartbeat_period_secs() -> u64 {
    30
}

/// Rooms with no client activity older than this are swept (seconds).
pub const fn default_inactivity_threshold_secs() -> u64 {
    300
}

/// Consecutive malformed packets from one connection before its IP is banned.
pub const fn default_invalid_packet_threshold() -> u32 {
    5
}

/// Deadline for a single frame write before the connection is disconnected (seconds).
pub const fn default_write_deadline_secs() -> u64 {
    10
}

// =============================================================================
// Logging Defaults
// =============================================================================

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "relay.log".to_string()
}

pub fn default_rotation() -> String {
    "daily".to_string()
}

pub const fn default_enable_file_logging() -> bool {
    true
}

pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
