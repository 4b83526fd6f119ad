//! Sync engine defaults.
//!
//! Centralizes tunables so `SyncConfig::default()` and the CLI agree.

use std::time::Duration;

/// Non-forced pulls of one family closer together than this are skipped.
pub const DEFAULT_PULL_COOLDOWN: Duration = Duration::from_secs(8);

/// Upper bound on concurrent record operations in one push.
pub const DEFAULT_PUSH_CONCURRENCY: usize = 8;

/// Records requested per query page.
pub const DEFAULT_PAGE_SIZE: usize = marquee_remote::DEFAULT_PAGE_SIZE;

/// Deadline for a single remote call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Blob key of the joined-groups registry.
pub const GROUPS_KEY: &str = "Groups";

/// Prefix of blob keys holding the last state known to be on the server.
pub const SYNCED_PREFIX: &str = "Synced";

