//! Typed access to one remote record type.
//!
//! `RecordStore` is what the sync coordinators talk to. It scopes queries to a
//! group, wraps every call in the request timeout, and turns the store's
//! optimistic-concurrency protocol into a single `upsert`:
//!
//! ```text
//! read ──► apply desired fields ──► save(IfUnchanged)
//!                                     │ Conflict(server_record)
//!                                     ▼
//!                    apply desired fields to server_record ──► save(IfUnchanged)
//!                                                                │ Conflict again
//!                                                                ▼
//!                                                     UpsertOutcome::ServerWon
//! ```

use std::sync::Arc;
use std::time::Duration;

use marquee_types::{GroupScope, RecordId};
use tracing::{debug, warn};

use crate::error::{RemoteError, RemoteResult};
use crate::ops::{RemoteStore, SavePolicy};
use crate::paging::{timed, PagedQuery, DEFAULT_PAGE_SIZE};
use crate::predicate::{Predicate, Query, SortKey};
use crate::record::{FieldValue, Fields, Record, RECORD_ID_FIELD};

/// Result of an upsert that reached the server.
#[derive(Clone, Debug, PartialEq)]
pub enum UpsertOutcome {
    /// The desired fields are on the server; carries the stored record.
    Saved(Record),
    /// The server's version stands for this cycle, after two consecutive
    /// conflicts or because the caller judged it newer. Carries it when known.
    ServerWon(Option<Record>),
}

impl UpsertOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }
}

/// Remote CRUD over one record type.
#[derive(Clone)]
pub struct RecordStore {
    remote: Arc<dyn RemoteStore>,
    record_type: String,
    page_size: usize,
    timeout: Option<Duration>,
    sort: Vec<SortKey>,
}

impl RecordStore {
    pub fn new(remote: Arc<dyn RemoteStore>, record_type: impl Into<String>) -> Self {
        Self {
            remote,
            record_type: record_type.into(),
            page_size: DEFAULT_PAGE_SIZE,
            timeout: None,
            sort: Vec::new(),
        }
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Deadline applied to every remote call.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Server-side ordering for fetches.
    pub fn sorted_by(mut self, sort: Vec<SortKey>) -> Self {
        self.sort = sort;
        self
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    fn paged(&self, scope: &GroupScope) -> PagedQuery {
        let query = Query::new(self.record_type.clone(), Predicate::in_scope(scope))
            .sorted_by(self.sort.clone());
        PagedQuery::new(self.remote.clone(), query)
            .page_size(self.page_size)
            .timeout(self.timeout)
    }

    /// Every record of this type in `scope`.
    pub async fn fetch_all(&self, scope: &GroupScope) -> RemoteResult<Vec<Record>> {
        self.paged(scope).collect_all().await
    }

    /// Records in `scope` whose identity is in `ids`, fetched in chunks.
    pub async fn fetch_by_ids(
        &self,
        scope: &GroupScope,
        ids: &[RecordId],
    ) -> RemoteResult<Vec<Record>> {
        let values: Vec<FieldValue> = ids.iter().map(|id| FieldValue::from(*id)).collect();
        self.paged(scope).collect_chunked(RECORD_ID_FIELD, &values).await
    }

    /// Records in `scope` whose `field` is one of `values`, fetched in chunks.
    pub async fn fetch_where_in(
        &self,
        scope: &GroupScope,
        field: &str,
        values: &[FieldValue],
    ) -> RemoteResult<Vec<Record>> {
        self.paged(scope).collect_chunked(field, values).await
    }

    async fn read(&self, id: RecordId) -> RemoteResult<Option<Record>> {
        timed(self.timeout, self.remote.read_record(&self.record_type, id)).await
    }

    async fn save(&self, record: Record) -> RemoteResult<Record> {
        timed(self.timeout, self.remote.save_record(record, SavePolicy::IfUnchanged)).await
    }

    /// Create or update `id` so it carries `fields`. Fields not named in
    /// `fields` keep whatever the server has.
    pub async fn upsert(&self, id: RecordId, fields: &Fields) -> RemoteResult<UpsertOutcome> {
        self.upsert_unless(id, fields, |_| false).await
    }

    /// Like [`upsert`](Self::upsert), but leave the server's record alone
    /// (reporting `ServerWon`) whenever `server_wins` says so.
    pub async fn upsert_unless(
        &self,
        id: RecordId,
        fields: &Fields,
        server_wins: impl Fn(&Record) -> bool + Send,
    ) -> RemoteResult<UpsertOutcome> {
        let current = self.read(id).await?;
        if let Some(existing) = &current {
            if server_wins(existing) {
                debug!(record_type = %self.record_type, id = %id.short(), "server record is newer");
                return Ok(UpsertOutcome::ServerWon(current));
            }
            if fields.iter().all(|(k, v)| existing.fields.get(k) == Some(v)) {
                debug!(record_type = %self.record_type, id = %id.short(), "upsert is a no-op");
                return Ok(UpsertOutcome::Saved(existing.clone()));
            }
        }

        let base = current.unwrap_or_else(|| Record::new(self.record_type.clone(), id));
        let conflict = match self.save(base.with_fields(fields)).await {
            Ok(saved) => return Ok(UpsertOutcome::Saved(saved)),
            Err(RemoteError::Conflict(conflict)) => conflict,
            Err(e) => return Err(e),
        };

        debug!(record_type = %self.record_type, id = %id.short(), "conflict, reapplying on server record");
        let server = match conflict.server_record {
            Some(record) => Some(record),
            None => self.read(id).await?,
        };
        if server.as_ref().is_some_and(&server_wins) {
            return Ok(UpsertOutcome::ServerWon(server));
        }
        let base = server.unwrap_or_else(|| Record::new(self.record_type.clone(), id));

        match self.save(base.with_fields(fields)).await {
            Ok(saved) => Ok(UpsertOutcome::Saved(saved)),
            Err(RemoteError::Conflict(conflict)) => {
                warn!(
                    record_type = %self.record_type,
                    id = %id.short(),
                    "second conflict, server version kept"
                );
                Ok(UpsertOutcome::ServerWon(conflict.server_record))
            }
            Err(e) => Err(e),
        }
    }

    /// Delete `id`. Already-absent records count as deleted.
    pub async fn delete(&self, id: RecordId) -> RemoteResult<()> {
        match timed(self.timeout, self.remote.delete_record(&self.record_type, id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(record_type = %self.record_type, id = %id.short(), "delete of absent record");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
