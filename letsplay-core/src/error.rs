//! Error types for the session engine.
//!
//! Only genuinely fatal or caller-visible failures are errors. Declined
//! negotiation, unknown environment commands and captures before the
//! first video frame are ordinary return values, not `Err`.

use std::path::PathBuf;

use thiserror::Error;

/// The canonical error type for `letsplay-core`.
#[derive(Debug, Error)]
pub enum SessionError {
    // ── Bootstrap Errors ─────────────────────────────────────────
    /// The game image could not be read.
    #[error("cannot read game image {path}: {source}")]
    GameLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The core refused the game image.
    #[error("core rejected game: {0}")]
    GameRejected(String),

    /// The core could not be initialised.
    #[error("core initialisation failed: {0}")]
    CoreInit(String),

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    // ── Runtime Errors ───────────────────────────────────────────
    /// Encoding a frame payload failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The broadcast collaborator failed to deliver a payload.
    #[error("broadcast failed: {0}")]
    Broadcast(String),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// A worker thread could not be spawned or panicked.
    #[error("worker thread error: {0}")]
    Worker(String),

    /// The I/O layer reported an error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for SessionError {
    fn from(s: String) -> Self {
        SessionError::Other(s)
    }
}

impl From<&str> for SessionError {
    fn from(s: &str) -> Self {
        SessionError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for SessionError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        SessionError::ChannelClosed
    }
}

impl From<tokio::task::JoinError> for SessionError {
    fn from(e: tokio::task::JoinError) -> Self {
        SessionError::Worker(e.to_string())
    }
}
