//! Remote store error types.

use std::time::Duration;

use thiserror::Error;

use crate::record::Record;

/// An optimistic-concurrency rejection.
///
/// Carries the server's current record so the caller can reapply its fields
/// without a separate read. `server_record` is `None` when the record was
/// deleted since it was read.
#[derive(Debug, Clone)]
pub struct ConflictError {
    pub server_record: Option<Record>,
}

/// Remote store error type.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Save precondition failed: the record changed since it was read.
    #[error("record changed on the server")]
    Conflict(Box<ConflictError>),

    /// Record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Cursor is unknown or expired.
    #[error("invalid query cursor: {0}")]
    InvalidCursor(String),

    /// Network-level failure; the operation may succeed if retried later.
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// The call exceeded the request timeout.
    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),

    /// Record encode/decode failure inside a backend.
    #[error("record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend storage failure (e.g. SQLite).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl RemoteError {
    /// Create a Conflict error carrying the server's current record.
    pub fn conflict(server_record: Option<Record>) -> Self {
        Self::Conflict(Box::new(ConflictError { server_record }))
    }

    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a Transient error.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<rusqlite::Error> for RemoteError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Remote result type.
pub type RemoteResult<T> = Result<T, RemoteError>;
