//! Remote record store protocol for Marquee.
//!
//! The remote is a schemaless record service: typed records with named
//! fields, server-assigned change tags for optimistic concurrency, paged
//! queries with opaque cursors. There is no push channel; clients poll.
//!
//! # Layers
//!
//! ```text
//! RecordStore (per record type: fetch_all / fetch_by_ids / upsert / delete)
//!     └── PagedQuery (cursor stream, chunked "in set" queries)
//!           └── dyn RemoteStore (query / continue_query / read / save / delete)
//!                 ├── MemoryRemote  (tests, simulated devices, fault injection)
//!                 └── SqliteRemote  (shared file, CLI)
//! ```

pub mod error;
pub mod memory;
pub mod ops;
pub mod paging;
pub mod predicate;
pub mod record;
pub mod record_store;
pub mod sqlite;

pub use error::{ConflictError, RemoteError, RemoteResult};
pub use memory::{MemoryRemote, RemoteStats};
pub use ops::{Cursor, Page, RemoteStore, SavePolicy, MAX_OPEN_CURSORS};
pub use paging::{PagedQuery, DEFAULT_PAGE_SIZE, MAX_IN_CHUNK};
pub use predicate::{Predicate, Query, SortKey};
pub use record::{ChangeTag, FieldValue, Fields, Record, GROUP_FIELD, RECORD_ID_FIELD};
pub use record_store::{RecordStore, UpsertOutcome};
pub use sqlite::SqliteRemote;
