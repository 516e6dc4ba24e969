#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use relay_server::config;
use relay_server::logging;
use relay_server::relay::Relay;
use relay_server::stats::StatsSnapshot;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Relay Server -- in-memory TCP relay for cooperating game clients
#[derive(Parser, Debug)]
#[command(name = "relay-server")]
#[command(about = "A lightweight, in-memory TCP relay for cooperating game clients")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines and pre-deployment checks.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    /// Useful for debugging configuration loading from multiple sources.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration from config.json if present; otherwise use code defaults.
    let cfg = config::load();

    // Handle --print-config: output the loaded configuration as JSON
    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = config::validate_config_security(&cfg);

    // Handle --validate-config: exit after validation
    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Port: {}", cfg.port);
                println!("  Heartbeat period (s): {}", cfg.relay.heartbeat_period_secs);
                println!("  Inactivity threshold (s): {}", cfg.relay.inactivity_threshold_secs);
                println!("  Invalid packet threshold: {}", cfg.relay.invalid_packet_threshold);
                println!("  Write deadline (s): {}", cfg.relay.write_deadline_secs);
                println!("  Stats path: {}", cfg.stats_path);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    // In normal operation, propagate validation errors
    validation_result?;

    logging::init_with_config(&cfg.logging);

    let port: u16 = cfg.port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "starting relay server");

    let stats = StatsSnapshot::load(&cfg.stats_path).await?;
    let relay = Relay::new(cfg.relay.clone(), cfg.stats_path.clone(), &stats);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| anyhow::anyhow!("failed to bind {addr}: {err}"))?;
    tracing::info!(%addr, "relay listening");

    let accept_relay = Arc::clone(&relay);
    let accept_handle = tokio::spawn(accept_relay.run_accept_loop(listener));

    let sweep_relay = Arc::clone(&relay);
    let sweep_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(sweep_relay.config.inactivity_threshold_secs));
        loop {
            interval.tick().await;
            sweep_relay.sweep_inactive_rooms().await;
        }
    });

    let heartbeat_relay = Arc::clone(&relay);
    let heartbeat_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(heartbeat_relay.config.heartbeat_period_secs));
        loop {
            interval.tick().await;
            heartbeat_relay.send_liveness_heartbeats().await;
        }
    });

    let stats_relay = Arc::clone(&relay);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(stats_relay.config.heartbeat_period_secs));
        loop {
            interval.tick().await;
            stats_relay.run_stats_heartbeat().await;
        }
    });

    let console_relay = Arc::clone(&relay);
    let console_handle = tokio::spawn(relay_server::console::run(console_relay));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
        _ = console_handle => {
            tracing::info!("operator requested shutdown");
        }
    }

    accept_handle.abort();
    sweep_handle.abort();
    heartbeat_handle.abort();
    stats_handle.abort();

    let snapshot = relay.stats_snapshot();
    if let Err(err) = StatsSnapshot::save(&relay.stats_path, &snapshot).await {
        tracing::error!(error = %err, "failed to persist stats on shutdown");
    }

    Ok(())
}

#[cfg(test)]
mod cli_tests {
    use super::Cli;
    use clap::Parser;

    #[test]
    fn test_cli_default_no_flags() {
        let cli = Cli::try_parse_from(["relay-server"]).unwrap();
        assert!(!cli.validate_config);
        assert!(!cli.print_config);
    }

    #[test]
    fn test_cli_validate_config_long() {
        let cli = Cli::try_parse_from(["relay-server", "--validate-config"]).unwrap();
        assert!(cli.validate_config);
        assert!(!cli.print_config);
    }

    #[test]
    fn test_cli_validate_config_short() {
        let cli = Cli::try_parse_from(["relay-server", "-c"]).unwrap();
        assert!(cli.validate_config);
        assert!(!cli.print_config);
    }

    #[test]
    fn test_cli_print_config() {
        let cli = Cli::try_parse_from(["relay-server", "--print-config"]).unwrap();
        assert!(!cli.validate_config);
        assert!(cli.print_config);
    }

    #[test]
    fn test_cli_validate_and_print_config_conflict() {
        let result = Cli::try_parse_from(["relay-server", "--validate-config", "--print-config"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("cannot be used with"));
    }

    #[test]
    fn test_cli_help_contains_flags() {
        let result = Cli::try_parse_from(["relay-server", "--help"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        let help_text = err.to_string();
        assert!(help_text.contains("--validate-config"));
        assert!(help_text.contains("--print-config"));
        assert!(help_text.contains("-c"));
    }

    #[test]
    fn test_cli_version() {
        let result = Cli::try_parse_from(["relay-server", "--version"]);
        assert!(result.is_err());
    }
}
