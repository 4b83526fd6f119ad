//! SQLite-backed remote store.
//!
//! Lets several CLI processes on one machine act as separate devices sharing
//! one "server" file. Fields are stored as JSON; predicates and sorting are
//! evaluated in process, same as [`MemoryRemote`](crate::memory::MemoryRemote).

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use marquee_types::RecordId;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{RemoteError, RemoteResult};
use crate::ops::{Cursor, Page, RemoteStore, SavePolicy, MAX_OPEN_CURSORS};
use crate::predicate::{compare_records, Query};
use crate::record::{ChangeTag, Fields, Record};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    record_type TEXT NOT NULL,
    id TEXT NOT NULL,
    change_tag INTEGER NOT NULL,
    fields TEXT NOT NULL,
    PRIMARY KEY (record_type, id)
);
CREATE INDEX IF NOT EXISTS idx_records_tag ON records(change_tag);
"#;

/// Remote store over a single SQLite file.
pub struct SqliteRemote {
    conn: Mutex<Connection>,
    /// Pending result sets, keyed by the sequence number in the cursor
    /// token. Local to this process.
    cursors: Mutex<BTreeMap<u64, Vec<RecordId>>>,
    next_cursor: Mutex<u64>,
}

impl SqliteRemote {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> RemoteResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> RemoteResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> RemoteResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            cursors: Mutex::new(BTreeMap::new()),
            next_cursor: Mutex::new(0),
        })
    }

    fn row_to_record(record_type: &str, id: &str, tag: i64, fields: &str) -> RemoteResult<Record> {
        let id = RecordId::parse(id)
            .map_err(|e| RemoteError::Backend(format!("bad record id {id}: {e}")))?;
        let fields: Fields = serde_json::from_str(fields)?;
        Ok(Record {
            record_type: record_type.to_string(),
            id,
            change_tag: Some(ChangeTag(tag.to_string())),
            fields,
        })
    }

    fn load(&self, record_type: &str, id: RecordId) -> RemoteResult<Option<Record>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT change_tag, fields FROM records WHERE record_type = ?1 AND id = ?2",
                params![record_type, id.to_string()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        row.map(|(tag, fields)| Self::row_to_record(record_type, &id.to_string(), tag, &fields))
            .transpose()
    }

    fn load_many(&self, record_type: &str, ids: &[RecordId]) -> RemoteResult<Vec<Record>> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.load(record_type, *id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn page_from(&self, record_type: &str, mut ids: Vec<RecordId>, limit: usize) -> RemoteResult<Page> {
        let limit = limit.max(1);
        let rest = if ids.len() > limit { ids.split_off(limit) } else { Vec::new() };
        let records = self.load_many(record_type, &ids)?;
        let cursor = if rest.is_empty() {
            None
        } else {
            let seq = {
                let mut next = self.next_cursor.lock();
                *next += 1;
                *next
            };
            let mut cursors = self.cursors.lock();
            cursors.insert(seq, rest);
            while cursors.len() > MAX_OPEN_CURSORS {
                cursors.pop_first();
            }
            Some(Cursor::from_token(format!("{record_type}:{seq}")))
        };
        Ok(Page { records, cursor })
    }
}

#[async_trait]
impl RemoteStore for SqliteRemote {
    async fn query(&self, query: &Query, limit: usize) -> RemoteResult<Page> {
        let mut matched = {
            let conn = self.conn.lock();
            let mut stmt =
                conn.prepare("SELECT id, change_tag, fields FROM records WHERE record_type = ?1")?;
            let rows = stmt.query_map(params![query.record_type], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            let mut matched = Vec::new();
            for row in rows {
                let (id, tag, fields) = row?;
                let record = Self::row_to_record(&query.record_type, &id, tag, &fields)?;
                if query.predicate.matches(&record) {
                    matched.push(record);
                }
            }
            matched
        };
        matched.sort_by(|a, b| compare_records(a, b, &query.sort));
        let ids = matched.into_iter().map(|r| r.id).collect();
        self.page_from(&query.record_type, ids, limit)
    }

    async fn continue_query(&self, cursor: &Cursor, limit: usize) -> RemoteResult<Page> {
        let invalid = || RemoteError::InvalidCursor(cursor.token().to_string());
        let (record_type, seq) = cursor.token().rsplit_once(':').ok_or_else(invalid)?;
        let seq: u64 = seq.parse().map_err(|_| invalid())?;
        let ids = self.cursors.lock().remove(&seq).ok_or_else(invalid)?;
        self.page_from(record_type, ids, limit)
    }

    async fn read_record(&self, record_type: &str, id: RecordId) -> RemoteResult<Option<Record>> {
        self.load(record_type, id)
    }

    async fn save_record(&self, mut record: Record, policy: SavePolicy) -> RemoteResult<Record> {
        let fields = serde_json::to_string(&record.fields)?;
        let id = record.id.to_string();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let current: Option<(i64, String)> = tx
            .query_row(
                "SELECT change_tag, fields FROM records WHERE record_type = ?1 AND id = ?2",
                params![record.record_type, id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if policy == SavePolicy::IfUnchanged {
            let server_tag = current.as_ref().map(|(tag, _)| tag.to_string());
            let client_tag = record.change_tag.as_ref().map(|t| t.0.clone());
            if server_tag != client_tag {
                let server_record = current
                    .map(|(tag, fields)| Self::row_to_record(&record.record_type, &id, tag, &fields))
                    .transpose()?;
                return Err(RemoteError::conflict(server_record));
            }
        }

        let next_tag: i64 =
            tx.query_row("SELECT COALESCE(MAX(change_tag), 0) + 1 FROM records", [], |row| {
                row.get(0)
            })?;
        tx.execute(
            "INSERT INTO records (record_type, id, change_tag, fields) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(record_type, id) DO UPDATE SET change_tag = ?3, fields = ?4",
            params![record.record_type, id, next_tag, fields],
        )?;
        tx.commit()?;

        record.change_tag = Some(ChangeTag(next_tag.to_string()));
        Ok(record)
    }

    async fn delete_record(&self, record_type: &str, id: RecordId) -> RemoteResult<()> {
        let removed = self.conn.lock().execute(
            "DELETE FROM records WHERE record_type = ?1 AND id = ?2",
            params![record_type, id.to_string()],
        )?;
        if removed == 0 {
            return Err(RemoteError::not_found(format!("{record_type}/{id}")));
        }
        Ok(())
    }
}
