//! Cursor-driven paged queries.
//!
//! [`PagedQuery::pages`] is a lazy stream of pages. It follows the cursor the
//! store hands back until the store returns none. Every call starts from the
//! first page; there is no mid-stream resume.
//!
//! [`PagedQuery::collect_chunked`] handles large "value in set" filters by
//! splitting the set into chunks of at most [`MAX_IN_CHUNK`] values and
//! running one paged query per chunk:
//!
//! ```text
//! ids (250) ──► [0..100) [100..200) [200..250)
//!                  │         │          │
//!           base ∧ In(f, chunk) for each, paged to exhaustion
//!                  └─────────┴──────────┴──► merged, de-duplicated by id
//! ```
//!
//! Any page failure aborts the whole operation. Partial results are never
//! returned.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, TryStreamExt};
use tracing::{debug, trace};

use crate::error::{RemoteError, RemoteResult};
use crate::ops::{Cursor, RemoteStore};
use crate::predicate::{Predicate, Query};
use crate::record::{FieldValue, Record};

/// Largest value set sent in a single `In` filter.
pub const MAX_IN_CHUNK: usize = 100;

/// Page size used when the caller does not choose one.
pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Run a remote call under an optional deadline.
pub(crate) async fn timed<T>(
    timeout: Option<Duration>,
    fut: impl Future<Output = RemoteResult<T>>,
) -> RemoteResult<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| RemoteError::Timeout(limit))?,
        None => fut.await,
    }
}

enum PageState {
    Start,
    Next(Cursor),
    Done,
}

/// A restartable paged query.
#[derive(Clone)]
pub struct PagedQuery {
    store: Arc<dyn RemoteStore>,
    query: Query,
    page_size: usize,
    timeout: Option<Duration>,
}

impl PagedQuery {
    pub fn new(store: Arc<dyn RemoteStore>, query: Query) -> Self {
        Self {
            store,
            query,
            page_size: DEFAULT_PAGE_SIZE,
            timeout: None,
        }
    }

    /// Records requested per page (at least 1).
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Deadline applied to each page fetch.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Lazy stream of result pages, starting from the first page.
    pub fn pages(&self) -> impl Stream<Item = RemoteResult<Vec<Record>>> + Send + '_ {
        futures::stream::try_unfold(PageState::Start, move |state| async move {
            let page = match state {
                PageState::Start => {
                    timed(self.timeout, self.store.query(&self.query, self.page_size)).await?
                }
                PageState::Next(cursor) => {
                    timed(self.timeout, self.store.continue_query(&cursor, self.page_size))
                        .await?
                }
                PageState::Done => return Ok(None),
            };
            trace!(
                record_type = %self.query.record_type,
                count = page.records.len(),
                more = page.cursor.is_some(),
                "fetched page"
            );
            let next = match page.cursor {
                Some(cursor) => PageState::Next(cursor),
                None => PageState::Done,
            };
            Ok(Some((page.records, next)))
        })
    }

    /// Drain every page into one collection.
    pub async fn collect_all(&self) -> RemoteResult<Vec<Record>> {
        let mut pages = std::pin::pin!(self.pages());
        let mut records = Vec::new();
        let mut page_count = 0usize;
        while let Some(page) = pages.try_next().await? {
            page_count += 1;
            records.extend(page);
        }
        debug!(
            record_type = %self.query.record_type,
            pages = page_count,
            records = records.len(),
            "query drained"
        );
        Ok(records)
    }

    /// Restrict this query to records whose `field` is in `values`, splitting
    /// the set into chunks of [`MAX_IN_CHUNK`].
    ///
    /// Chunks run concurrently; results are merged in chunk order and
    /// de-duplicated by record id.
    pub async fn collect_chunked(
        &self,
        field: &str,
        values: &[FieldValue],
    ) -> RemoteResult<Vec<Record>> {
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_queries: Vec<PagedQuery> = values
            .chunks(MAX_IN_CHUNK)
            .map(|chunk| {
                let predicate = self
                    .query
                    .predicate
                    .clone()
                    .and(Predicate::In(field.to_string(), chunk.to_vec()));
                let mut sub = self.clone();
                sub.query = Query {
                    record_type: self.query.record_type.clone(),
                    predicate,
                    sort: self.query.sort.clone(),
                };
                sub
            })
            .collect();

        debug!(
            record_type = %self.query.record_type,
            values = values.len(),
            chunks = chunk_queries.len(),
            "chunked query"
        );

        let results =
            futures::future::try_join_all(chunk_queries.iter().map(|q| q.collect_all())).await?;

        let mut seen = HashSet::new();
        let merged = results
            .into_iter()
            .flatten()
            .filter(|record| seen.insert(record.id))
            .collect();
        Ok(merged)
    }
}
