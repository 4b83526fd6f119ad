//! Remote record store operations trait.
//!
//! This is the whole surface the sync engine needs from a remote: cursor
//! paged queries, point reads, precondition-guarded saves, and deletes.
//! There is no push channel; clients poll.

use std::fmt;

use async_trait::async_trait;
use marquee_types::RecordId;
use serde::{Deserialize, Serialize};

use crate::error::RemoteResult;
use crate::predicate::Query;
use crate::record::Record;

/// Opaque continuation token. Passed back verbatim; never inspected.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Backends wrap their own token format.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cursor(..{} bytes)", self.0.len())
    }
}

/// Open cursors a backend keeps. Opening one more expires the oldest, so a
/// query abandoned mid-stream does not pin its result set forever.
pub const MAX_OPEN_CURSORS: usize = 64;

/// One page of query results.
#[derive(Clone, Debug, Default)]
pub struct Page {
    pub records: Vec<Record>,
    /// `None` when the query is exhausted.
    pub cursor: Option<Cursor>,
}

/// Save precondition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SavePolicy {
    /// Reject with `Conflict` unless the server's change tag equals the
    /// record's (`None` = the record must not exist yet).
    IfUnchanged,
    /// Write unconditionally.
    Overwrite,
}

/// Core remote store operations.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Start a query; returns the first page of at most `limit` records.
    async fn query(&self, query: &Query, limit: usize) -> RemoteResult<Page>;

    /// Fetch the next page of a previous query.
    async fn continue_query(&self, cursor: &Cursor, limit: usize) -> RemoteResult<Page>;

    /// Read one record. `Ok(None)` when it does not exist.
    async fn read_record(&self, record_type: &str, id: RecordId) -> RemoteResult<Option<Record>>;

    /// Save a record, returning the stored version with its new change tag.
    ///
    /// With `SavePolicy::IfUnchanged`, a stale change tag yields
    /// `RemoteError::Conflict` carrying the server's current record.
    async fn save_record(&self, record: Record, policy: SavePolicy) -> RemoteResult<Record>;

    /// Delete a record. `RemoteError::NotFound` when it does not exist.
    async fn delete_record(&self, record_type: &str, id: RecordId) -> RemoteResult<()>;
}
