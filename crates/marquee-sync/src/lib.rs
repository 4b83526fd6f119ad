//! Offline-first sync for Marquee group collections.
//!
//! Every collection lives in a local snapshot first; the remote record
//! store is reconciled in the background.
//!
//! ```text
//! SyncEngine
//!   ├── GroupContext            active scope + known groups (persisted)
//!   └── SyncCoordinator<F>      one per family: Movies, Ratings, Members, Goals
//!         ├── LocalSnapshot<C>  watch channel + BlobStore persistence
//!         ├── RecordStore       marquee-remote, scoped by group field
//!         └── baseline          last state known to match the server
//! ```
//!
//! Writes carry an [`Origin`]: local writes schedule a push of the scope
//! they landed in, remote writes (pull results) do not, so pulled data is
//! not echoed back. Only local edits a pull kept are pushed after it.

pub mod config;
pub mod constants;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod families;
pub mod group;
pub mod persist;
pub mod snapshot;

pub use config::SyncConfig;
pub use coordinator::{
    FamilySync, PullOutcome, PullPhase, PushPhase, PushReport, SkipReason, SyncCoordinator,
    SyncStatus,
};
pub use engine::{RefreshReport, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use families::{
    GoalBook, GoalFamily, GoalItem, MemberFamily, MemberRoster, MovieFamily, MovieShelf,
    RatingBook, RatingFamily,
};
pub use group::GroupContext;
pub use persist::{BlobStore, FileBlobStore, MemoryBlobStore};
pub use snapshot::{LocalSnapshot, Origin, SnapshotWrite};
