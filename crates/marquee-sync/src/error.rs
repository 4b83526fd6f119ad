//! Sync engine error types.

use marquee_remote::RemoteError;
use marquee_types::{DecodeError, KeyError};
use thiserror::Error;

/// Errors surfaced by the sync engine.
///
/// None of these are fatal: a failed pull leaves the local snapshot as it
/// was, a failed push leaves the affected records queued for the next cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("invalid group: {0}")]
    Key(#[from] KeyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("RON write error: {0}")]
    RonWrite(#[from] ron::Error),

    #[error("{0} not found")]
    NotFound(String),
}

impl SyncError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
