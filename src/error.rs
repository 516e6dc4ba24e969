//! Error taxonomy for the codec, session, and stats-store seams.
//!
//! `thiserror` enums live here; `anyhow` is used at the binary and console
//! boundary where errors are only ever logged.

use thiserror::Error;

/// Errors from parsing/encoding a single wire frame.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame is not valid UTF-8 JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("frame is missing a string `type` field")]
    MissingType,
}

/// Errors surfaced while servicing a connected client.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("write deadline exceeded")]
    WriteTimeout,
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("peer disconnected")]
    Disconnected,
}

/// Errors from the stats store's load/save cycle.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
