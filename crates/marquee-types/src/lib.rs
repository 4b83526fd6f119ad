//! Shared identity and entity types for Marquee.
//!
//! This crate is the leaf of the workspace: typed IDs, deterministic key
//! derivation, group scopes, and the four synced entity families. It has
//! **no internal marquee dependencies**.
//!
//! # Entity Overview
//!
//! ```text
//! GroupScope (Ungrouped | Invite(code)) ← partitions every collection
//!     └── Movie   (MovieId, random v7)          watched / backlog
//!     └── Rating  (derived: movie + reviewer)   one per reviewer per movie
//!     └── Member  (derived: name)               case-insensitive unique
//!     └── Goal    AnnualGoal (derived: year)
//!                 CustomGoal (embedded GoalId, versioned envelope)
//! ```
//!
//! # Key Types
//!
//! |--------------------|---------------------------------------------|
//! | Type               | Purpose                                     |
//! |--------------------|---------------------------------------------|
//! | [`RecordId`]       | Remote record identity (any family)         |
//! | [`MovieId`]        | Movie identity, assigned at creation        |
//! | [`GoalId`]         | Custom goal identity, embedded in payload   |
//! | [`GroupScope`]     | Which group a collection belongs to         |
//! | [`EntityFamily`]   | Movies / Ratings / Members / Goals          |
//! | [`GoalEnvelope`]   | Versioned custom-goal payload (v2 → v3)     |
//! |--------------------|---------------------------------------------|

pub mod error;
pub mod family;
pub mod goal;
pub mod group;
pub mod ids;
pub mod keys;
pub mod member;
pub mod movie;
pub mod rating;

pub use error::{DecodeError, KeyError};
pub use family::EntityFamily;
pub use goal::{AnnualGoal, CustomGoal, GoalEnvelope, GOAL_ENVELOPE_VERSION};
pub use group::{GroupInfo, GroupScope};
pub use ids::{GoalId, MovieId, RecordId};
pub use keys::{
    annual_goal_identity, derive_identity, member_identity, normalize_key, rating_identity,
};
pub use member::Member;
pub use movie::Movie;
pub use rating::Rating;

/// Current time as Unix milliseconds. Used by constructors throughout the crate.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
