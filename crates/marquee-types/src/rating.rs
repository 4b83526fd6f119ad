//! Per-reviewer movie ratings.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::group::GroupScope;
use crate::ids::{MovieId, RecordId};

/// Highest score a reviewer can give.
pub const MAX_SCORE: f32 = 10.0;

/// One reviewer's rating of one movie.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub movie_id: MovieId,
    /// Display form as typed; identity uses [`Rating::reviewer_key`].
    pub reviewer: String,
    pub score: f32,
    pub comment: Option<String>,
    /// Unix millis. Later ratings replace earlier ones from the same reviewer.
    pub rated_at: u64,
}

impl Rating {
    /// A new rating, score clamped to `0.0..=MAX_SCORE`.
    pub fn new(movie_id: MovieId, reviewer: impl Into<String>, score: f32) -> Self {
        Self {
            movie_id,
            reviewer: reviewer.into().trim().to_string(),
            score: score.clamp(0.0, MAX_SCORE),
            comment: None,
            rated_at: crate::now_millis(),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Case-insensitive reviewer identity.
    pub fn reviewer_key(&self) -> String {
        self.reviewer.trim().to_lowercase()
    }

    pub fn identity(&self, scope: &GroupScope) -> RecordId {
        crate::keys::rating_identity(scope, self.movie_id, &self.reviewer)
    }

    pub fn encode_payload(&self) -> Result<Vec<u8>, DecodeError> {
        Ok(postcard::to_stdvec(self)?)
    }

    pub fn decode_payload(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(postcard::from_bytes(bytes)?)
    }
}
