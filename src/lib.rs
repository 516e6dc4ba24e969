#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Relay Server
//!
//! An in-memory TCP relay that lets cooperating game clients join rooms,
//! split into teams, and exchange JSON state packets for the lifetime of a
//! run. No database, no authentication beyond the handshake, no durable
//! storage for rooms or teams: everything lives in memory for as long as a
//! room stays active.

/// NUL-delimited packet framing and path-based JSON field access.
pub mod codec;

/// Server configuration and environment variable overrides.
pub mod config;

/// Error taxonomy shared across the codec, session, and stats-store seams.
pub mod error;

/// Structured logging configuration.
pub mod logging;

/// Atomic counters tracking relay activity.
pub mod metrics;

/// Client, Team, and Room in-memory state.
pub mod model;

/// The relay: client/room indexes, registration, broadcast, periodic sweeps.
pub mod relay;

/// Per-connection session state machine.
pub mod session;

/// Operator console (stdin command loop).
pub mod console;

/// Hashing helpers for the IP ban list.
pub mod security;

/// Persisted counters and ban list (`stats.json`).
pub mod stats;
