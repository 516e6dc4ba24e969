//! Configuration validation functions.

use super::Config;

/// Sanity-check a loaded configuration. Returns an error describing the first
/// problem found; `load()` only warns on these, callers that need a hard
/// failure call this explicitly.
pub fn validate_config_security(config: &Config) -> anyhow::Result<()> {
    if config.port == 0 {
        anyhow::bail!("port must be nonzero");
    }

    if config.relay.heartbeat_period_secs == 0 {
        anyhow::bail!("relay.heartbeat_period_secs must be nonzero");
    }

    if config.relay.inactivity_threshold_secs == 0 {
        anyhow::bail!("relay.inactivity_threshold_secs must be nonzero");
    }

    if config.relay.invalid_packet_threshold == 0 {
        anyhow::bail!("relay.invalid_packet_threshold must be nonzero");
    }

    if config.relay.write_deadline_secs == 0 {
        anyhow::bail!("relay.write_deadline_secs must be nonzero");
    }

    if config.stats_path.trim().is_empty() {
        anyhow::bail!("stats_path must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(validate_config_security(&Config::default()).is_ok());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut cfg = Config::default();
        cfg.port = 0;
        assert!(validate_config_security(&cfg).is_err());
    }

    #[test]
    fn zero_invalid_packet_threshold_is_rejected() {
        let mut cfg = Config::default();
        cfg.relay.invalid_packet_threshold = 0;
        assert!(validate_config_security(&cfg).is_err());
    }
}
