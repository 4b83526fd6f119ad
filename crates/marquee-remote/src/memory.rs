//! In-memory remote store.
//!
//! Used for tests and for running several simulated devices in one process.
//! Behaves like the real service where it matters to sync: change tags,
//! precondition conflicts, bounded pages, opaque cursors. It also exposes
//! fault injection (failing pages and records, interfering writers, latency)
//! and operation counters.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use marquee_types::RecordId;
use parking_lot::Mutex;

use crate::error::{RemoteError, RemoteResult};
use crate::ops::{Cursor, Page, RemoteStore, SavePolicy, MAX_OPEN_CURSORS};
use crate::predicate::{compare_records, Query};
use crate::record::{ChangeTag, Record};

type RecordKey = (String, RecordId);

/// Mutation applied to a stored record right before a save is evaluated.
type Interference = Arc<dyn Fn(&mut Record) + Send + Sync>;

/// Counters for assertions in tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RemoteStats {
    /// `query` + `continue_query` calls.
    pub query_pages: usize,
    pub reads: usize,
    /// Successful saves.
    pub saves: usize,
    pub conflicts: usize,
    /// Successful deletes.
    pub deletes: usize,
}

struct CursorState {
    remaining: Vec<RecordKey>,
}

#[derive(Default)]
struct Faults {
    /// Absolute page-call number that fails.
    fail_page_at: Option<usize>,
    failing_ids: HashSet<RecordId>,
    interference: HashMap<RecordId, (usize, Interference)>,
}

#[derive(Default)]
struct Inner {
    records: BTreeMap<RecordKey, Record>,
    /// Keyed by the sequence number in the cursor token.
    cursors: BTreeMap<u64, CursorState>,
    next_tag: u64,
    next_cursor: u64,
    stats: RemoteStats,
    faults: Faults,
}

impl Inner {
    fn bump_tag(&mut self) -> ChangeTag {
        self.next_tag += 1;
        ChangeTag(format!("t{}", self.next_tag))
    }

    fn count_page(&mut self) -> RemoteResult<()> {
        self.stats.query_pages += 1;
        if self.faults.fail_page_at == Some(self.stats.query_pages) {
            self.faults.fail_page_at = None;
            return Err(RemoteError::transient("injected page failure"));
        }
        Ok(())
    }

    /// Take up to `limit` keys, returning their current records and a cursor
    /// for the rest. Keys deleted since the query started are skipped.
    fn page_from(&mut self, mut keys: Vec<RecordKey>, limit: usize) -> Page {
        let rest = if keys.len() > limit { keys.split_off(limit) } else { Vec::new() };
        let records = keys
            .iter()
            .filter_map(|key| self.records.get(key).cloned())
            .collect();
        let cursor = if rest.is_empty() {
            None
        } else {
            self.next_cursor += 1;
            self.cursors.insert(self.next_cursor, CursorState { remaining: rest });
            while self.cursors.len() > MAX_OPEN_CURSORS {
                self.cursors.pop_first();
            }
            Some(Cursor::from_token(format!("mem-{}", self.next_cursor)))
        };
        Page { records, cursor }
    }

    fn check_failing(&self, id: RecordId) -> RemoteResult<()> {
        if self.faults.failing_ids.contains(&id) {
            return Err(RemoteError::transient(format!("injected failure for {id}")));
        }
        Ok(())
    }

    fn interfere(&mut self, key: &RecordKey) {
        let Some((remaining, mutate)) = self.faults.interference.get_mut(&key.1) else {
            return;
        };
        let mutate = mutate.clone();
        *remaining -= 1;
        if *remaining == 0 {
            self.faults.interference.remove(&key.1);
        }
        let tag = self.bump_tag();
        let record = self
            .records
            .entry(key.clone())
            .or_insert_with(|| Record::new(key.0.clone(), key.1));
        mutate(record);
        record.change_tag = Some(tag);
    }
}

/// In-memory remote store. Thread-safe; cheap to share behind an `Arc`.
pub struct MemoryRemote {
    inner: Mutex<Inner>,
    max_page_size: usize,
    latency: Mutex<Option<Duration>>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_page_size: usize::MAX,
            latency: Mutex::new(None),
        }
    }

    /// Cap page sizes regardless of what the client asks for.
    pub fn with_max_page_size(mut self, max: usize) -> Self {
        self.max_page_size = max.max(1);
        self
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn stats(&self) -> RemoteStats {
        self.inner.lock().stats
    }

    /// Number of stored records of `record_type`.
    pub fn count(&self, record_type: &str) -> usize {
        self.inner
            .lock()
            .records
            .keys()
            .filter(|(t, _)| t == record_type)
            .count()
    }

    /// Snapshot of one stored record, bypassing counters and faults.
    pub fn peek(&self, record_type: &str, id: RecordId) -> Option<Record> {
        self.inner
            .lock()
            .records
            .get(&(record_type.to_string(), id))
            .cloned()
    }

    /// Fail the `n`th page fetch from now (1-based) with a transient error.
    pub fn fail_query_page(&self, n: usize) {
        let mut inner = self.inner.lock();
        inner.faults.fail_page_at = Some(inner.stats.query_pages + n.max(1));
    }

    /// Make every save and delete of `id` fail with a transient error.
    pub fn fail_record(&self, id: RecordId) {
        self.inner.lock().faults.failing_ids.insert(id);
    }

    pub fn heal_record(&self, id: RecordId) {
        self.inner.lock().faults.failing_ids.remove(&id);
    }

    /// Simulate a concurrent writer: before each of the next `times` saves of
    /// `id`, apply `mutate` to the stored record and bump its change tag.
    pub fn interfere_with(
        &self,
        id: RecordId,
        times: usize,
        mutate: impl Fn(&mut Record) + Send + Sync + 'static,
    ) {
        if times == 0 {
            return;
        }
        self.inner
            .lock()
            .faults
            .interference
            .insert(id, (times, Arc::new(mutate)));
    }

    async fn delay(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn query(&self, query: &Query, limit: usize) -> RemoteResult<Page> {
        self.delay().await;
        let mut inner = self.inner.lock();
        inner.count_page()?;

        let mut matched: Vec<&Record> = inner
            .records
            .values()
            .filter(|r| r.record_type == query.record_type && query.predicate.matches(r))
            .collect();
        matched.sort_by(|a, b| compare_records(a, b, &query.sort));
        let keys: Vec<RecordKey> = matched
            .into_iter()
            .map(|r| (r.record_type.clone(), r.id))
            .collect();

        Ok(inner.page_from(keys, limit.min(self.max_page_size)))
    }

    async fn continue_query(&self, cursor: &Cursor, limit: usize) -> RemoteResult<Page> {
        self.delay().await;
        let mut inner = self.inner.lock();
        inner.count_page()?;

        let state = cursor
            .token()
            .strip_prefix("mem-")
            .and_then(|seq| seq.parse::<u64>().ok())
            .and_then(|seq| inner.cursors.remove(&seq))
            .ok_or_else(|| RemoteError::InvalidCursor(cursor.token().to_string()))?;
        Ok(inner.page_from(state.remaining, limit.min(self.max_page_size)))
    }

    async fn read_record(&self, record_type: &str, id: RecordId) -> RemoteResult<Option<Record>> {
        self.delay().await;
        let mut inner = self.inner.lock();
        inner.stats.reads += 1;
        Ok(inner.records.get(&(record_type.to_string(), id)).cloned())
    }

    async fn save_record(&self, mut record: Record, policy: SavePolicy) -> RemoteResult<Record> {
        self.delay().await;
        let mut inner = self.inner.lock();
        inner.check_failing(record.id)?;

        let key = (record.record_type.clone(), record.id);
        inner.interfere(&key);

        if policy == SavePolicy::IfUnchanged {
            let current = inner.records.get(&key);
            let server_tag = current.and_then(|r| r.change_tag.as_ref());
            if server_tag != record.change_tag.as_ref() {
                let server_record = current.cloned();
                inner.stats.conflicts += 1;
                return Err(RemoteError::conflict(server_record));
            }
        }

        record.change_tag = Some(inner.bump_tag());
        inner.records.insert(key, record.clone());
        inner.stats.saves += 1;
        Ok(record)
    }

    async fn delete_record(&self, record_type: &str, id: RecordId) -> RemoteResult<()> {
        self.delay().await;
        let mut inner = self.inner.lock();
        inner.check_failing(id)?;
        match inner.records.remove(&(record_type.to_string(), id)) {
            Some(_) => {
                inner.stats.deletes += 1;
                Ok(())
            }
            None => Err(RemoteError::not_found(format!("{record_type}/{id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::Predicate;
    use marquee_types::GroupScope;

    #[tokio::test]
    async fn test_create_requires_absent_record() {
        let remote = MemoryRemote::new();
        let record = Record::new("Member", RecordId::new());

        let saved = remote.save_record(record.clone(), SavePolicy::IfUnchanged).await.unwrap();
        assert!(saved.change_tag.is_some());

        // Saving the never-saved version again conflicts with the stored one.
        let err = remote.save_record(record, SavePolicy::IfUnchanged).await.unwrap_err();
        match err {
            RemoteError::Conflict(c) => assert_eq!(c.server_record, Some(saved)),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stale_tag_conflicts() {
        let remote = MemoryRemote::new();
        let v1 = remote
            .save_record(Record::new("Movie", RecordId::new()), SavePolicy::Overwrite)
            .await
            .unwrap();
        let _v2 = remote.save_record(v1.clone(), SavePolicy::IfUnchanged).await.unwrap();
        assert!(remote.save_record(v1, SavePolicy::IfUnchanged).await.unwrap_err().is_conflict());
        assert_eq!(remote.stats().conflicts, 1);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let remote = MemoryRemote::new();
        let err = remote.delete_record("Movie", RecordId::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_unknown_cursor_rejected() {
        let remote = MemoryRemote::new();
        let err = remote
            .continue_query(&Cursor::from_token("nope"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::InvalidCursor(_)));
    }

    #[tokio::test]
    async fn test_abandoned_cursors_expire_oldest_first() {
        let remote = MemoryRemote::new();
        for _ in 0..2 {
            remote
                .save_record(Record::new("Movie", RecordId::new()), SavePolicy::Overwrite)
                .await
                .unwrap();
        }
        let query = Query::new("Movie", Predicate::in_scope(&GroupScope::Ungrouped));

        let mut cursors = Vec::new();
        for _ in 0..=MAX_OPEN_CURSORS {
            let page = remote.query(&query, 1).await.unwrap();
            cursors.push(page.cursor.unwrap());
        }
        assert_eq!(remote.inner.lock().cursors.len(), MAX_OPEN_CURSORS);

        let err = remote.continue_query(&cursors[0], 1).await.unwrap_err();
        assert!(matches!(err, RemoteError::InvalidCursor(_)));
        let last = remote.continue_query(&cursors[MAX_OPEN_CURSORS], 1).await.unwrap();
        assert_eq!(last.records.len(), 1);
        assert!(last.cursor.is_none());
    }

    #[tokio::test]
    async fn test_interference_bumps_tag_before_save() {
        let remote = MemoryRemote::new();
        let v1 = remote
            .save_record(Record::new("Movie", RecordId::new()), SavePolicy::Overwrite)
            .await
            .unwrap();
        remote.interfere_with(v1.id, 1, |r| r.set("poster", "theirs.png"));

        let err = remote.save_record(v1.clone(), SavePolicy::IfUnchanged).await.unwrap_err();
        let RemoteError::Conflict(conflict) = err else {
            panic!("expected conflict");
        };
        let server = conflict.server_record.unwrap();
        assert_eq!(server.text("poster"), Some("theirs.png"));

        // Interference is used up; saving on top of the server version succeeds.
        remote.save_record(server, SavePolicy::IfUnchanged).await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_record() {
        let remote = MemoryRemote::new();
        let id = RecordId::new();
        remote.fail_record(id);
        let err = remote
            .save_record(Record::new("Movie", id), SavePolicy::Overwrite)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Transient(_)));
        remote.heal_record(id);
        remote
            .save_record(Record::new("Movie", id), SavePolicy::Overwrite)
            .await
            .unwrap();
    }
}
