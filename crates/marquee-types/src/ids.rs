//! Typed identifiers for remote records, movies, and custom goals.
//!
//! All ID types wrap a UUID. `MovieId` and `GoalId` are minted as UUIDv7
//! (time-ordered) when an entity is created locally; `RecordId` is whatever
//! identity a record has on the remote store, either one of those or a
//! UUIDv5 from [`derive_identity`](crate::derive_identity).
//!
//! Display is the standard hyphenated UUID (it is also the remote record
//! name); the `short()` form is for logs and UI only.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a record on the remote store.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(uuid::Uuid);

/// A movie identifier (UUIDv7, assigned at creation).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovieId(uuid::Uuid);

/// A custom goal identifier (UUIDv7), carried inside the goal payload.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoalId(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Create a new time-ordered ID (UUIDv7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// First 8 hex characters, for logs and UI. Not unique enough for lookup.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// The raw 16 bytes.
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s).map(Self)
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> uuid::Uuid {
                self.0
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }

        impl std::str::FromStr for $T {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(RecordId, "RecordId");
impl_typed_id!(MovieId, "MovieId");
impl_typed_id!(GoalId, "GoalId");

// Entities with an embedded identity use it verbatim as their record name.

impl From<MovieId> for RecordId {
    fn from(id: MovieId) -> Self {
        Self(id.0)
    }
}

impl From<GoalId> for RecordId {
    fn from(id: GoalId) -> Self {
        Self(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_unique() {
        assert_ne!(MovieId::new(), MovieId::new());
    }

    #[test]
    fn test_parse_roundtrip() {
        let id = MovieId::new();
        let parsed: MovieId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(MovieId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_movie_id_becomes_record_id_verbatim() {
        let movie = MovieId::new();
        let record: RecordId = movie.into();
        assert_eq!(record.to_string(), movie.to_string());
    }

    #[test]
    fn test_debug_shows_type_and_short() {
        let id = GoalId::new();
        let debug = format!("{:?}", id);
        assert!(debug.starts_with("GoalId("));
        assert_eq!(debug.len(), "GoalId(".len() + 8 + 1);
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = RecordId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }
}
