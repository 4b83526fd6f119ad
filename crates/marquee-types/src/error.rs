//! Error types for identity construction and payload decoding.

use thiserror::Error;

/// Errors from constructing scopes and keys.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Invite codes must contain at least one non-whitespace character.
    #[error("invite code is empty")]
    EmptyInviteCode,

    /// The code collides with the storage key of the ungrouped scope.
    #[error("invite code '{0}' is reserved")]
    ReservedInviteCode(String),
}

/// Errors decoding an entity from a record or persisted blob.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Binary payload (postcard) failed to parse.
    #[error("payload decode failed: {0}")]
    Payload(#[from] postcard::Error),

    /// JSON payload failed to parse.
    #[error("json decode failed: {0}")]
    Json(#[from] serde_json::Error),

    /// A required record field was absent.
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    /// A record field had an unexpected type or value.
    #[error("field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// Envelope version this build cannot read.
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u32),
}

impl DecodeError {
    /// Create an InvalidField error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
