//! Configuration module for the relay server.
//!
//! This module provides configuration management with support for:
//! - JSON configuration files
//! - Environment variable overrides
//! - Stdin input
//! - Sensible defaults
//!
//! # Module Structure
//!
//! - [`crate::config::types`]: Root `Config` struct
//! - [`server`]: Relay tuning (heartbeat period, inactivity threshold, bans)
//! - [`logging`]: Logging configuration
//! - [`crate::config::loader`]: Configuration loading functions
//! - [`crate::config::validation`]: Configuration validation functions
//! - [`crate::config::defaults`]: Default value functions

// Submodules
pub mod defaults;
pub mod loader;
pub mod logging;
pub mod server;
pub mod types;
pub mod validation;

// Re-exports for convenience
pub use loader::load;

pub use logging::{LogFormat, LogLevel, LoggingConfig};

pub use server::RelayConfig;

pub use types::Config;

pub use validation::validate_config_security;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();

        assert_eq!(config.port, 43383);
        assert_eq!(config.relay.heartbeat_period_secs, 30);
        assert_eq!(config.relay.inactivity_threshold_secs, 300);
        assert_eq!(config.relay.invalid_packet_threshold, 5);
        assert_eq!(config.relay.write_deadline_secs, 10);
        assert_eq!(config.stats_path, "stats.json");

        assert_eq!(config.logging.dir, "logs");
        assert_eq!(config.logging.filename, "relay.log");
        assert_eq!(config.logging.rotation, "daily");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config.port, deserialized.port);
        assert_eq!(
            config.relay.heartbeat_period_secs,
            deserialized.relay.heartbeat_period_secs
        );
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Trace.to_string(), "trace");
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert_eq!(LogLevel::Info.to_string(), "info");
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert_eq!(LogLevel::Error.to_string(), "error");
    }

    #[test]
    fn test_log_level_as_str() {
        assert_eq!(LogLevel::Trace.as_str(), "trace");
        assert_eq!(LogLevel::Debug.as_str(), "debug");
        assert_eq!(LogLevel::Info.as_str(), "info");
        assert_eq!(LogLevel::Warn.as_str(), "warn");
        assert_eq!(LogLevel::Error.as_str(), "error");
    }
}
