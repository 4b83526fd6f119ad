//! Per-family pull and push.
//!
//! One [`SyncCoordinator`] runs per entity family. The family-specific parts
//! (record encoding, merge rules) live behind [`FamilySync`]; everything else
//! is shared here.
//!
//! # Pull
//!
//! ```text
//! Idle ─► Pulling ─► Merging ─► Applied
//!            │          │
//!            └──────────┴─► Failed (snapshot untouched)
//! ```
//!
//! Fetch every record in the active scope, decode (skipping bad records),
//! overlay unpushed local edits, then write the result with
//! `Origin::Remote` so it is not pushed back. If the active scope changed
//! while fetching, the result is discarded.
//!
//! A push that lands while the fetch is paging makes the fetched copy of
//! the records it touched stale. Those ids are taken from the baseline
//! instead, and the merge itself runs under the push lock. Local edits the
//! merge keeps are pushed once it is applied.
//!
//! # Push
//!
//! ```text
//! Idle ─► Diffing ─► Pushing ─► Done
//! ```
//!
//! Diff the current collection against the *synced baseline* (the last state
//! known to match the server): baseline ids missing locally are deleted,
//! local items that are new or differ from the baseline are upserted. Each
//! operation that succeeds updates the baseline; failures leave it alone, so
//! the next push retries them.
//!
//! The baseline is also what makes the pull overlay work: a local item that
//! differs from the baseline is an edit the server has not seen yet, and a
//! baseline id missing locally is a delete the server has not seen yet.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures::StreamExt;
use marquee_remote::{Fields, GROUP_FIELD, Record, RecordStore, SortKey, UpsertOutcome};
use marquee_types::{DecodeError, EntityFamily, GroupScope, RecordId};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::constants::SYNCED_PREFIX;
use crate::error::SyncResult;
use crate::group::GroupContext;
use crate::persist::BlobStore;
use crate::snapshot::{Collection, LocalSnapshot, Origin};

// ── Family seam ─────────────────────────────────────────────────────────────

/// What a coordinator needs to know about one entity family.
pub trait FamilySync: Send + Sync + 'static {
    /// The merged local collection.
    type Collection: Collection + Debug;
    /// One remote-mirrored entity.
    type Item: Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    const FAMILY: EntityFamily;
    const RECORD_TYPE: &'static str;

    /// The collection's entities keyed by remote identity.
    fn items(collection: &Self::Collection, scope: &GroupScope) -> BTreeMap<RecordId, Self::Item>;

    /// Record fields for one entity. The group field is added by the caller.
    fn encode(
        item: &Self::Item,
        collection: &Self::Collection,
    ) -> Result<Fields, DecodeError>;

    fn decode(record: &Record) -> Result<Self::Item, DecodeError>;

    /// Build a collection from merged entities. `previous` carries local-only
    /// state (e.g. the selected member); `records` is the raw pull result.
    fn assemble(
        items: Vec<Self::Item>,
        previous: &Self::Collection,
        records: &[Record],
    ) -> Self::Collection;

    /// Whether the server's record should win over a local entity about to
    /// be pushed.
    fn server_is_newer(_local: &Self::Item, _server: &Record) -> bool {
        false
    }

    /// A group display name carried by the collection, if any.
    fn display_name(_collection: &Self::Collection) -> Option<&str> {
        None
    }

    /// Ordering requested from the server.
    fn sort_keys() -> Vec<SortKey> {
        Vec::new()
    }
}

// ── Status and outcomes ─────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PullPhase {
    #[default]
    Idle,
    Pulling,
    Merging,
    Applied,
    Failed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushPhase {
    #[default]
    Idle,
    Diffing,
    Pushing,
    Done,
}

/// Counts from one push cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReport {
    pub upserted: usize,
    pub deleted: usize,
    pub failed: usize,
    /// Upserts abandoned because the server kept a different version.
    pub server_won: usize,
}

impl PushReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Published through [`SyncCoordinator::subscribe_status`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncStatus {
    pub pull: PullPhase,
    pub push: PushPhase,
    pub last_error: Option<String>,
    pub last_push: Option<PushReport>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Another pull of this family is running.
    InFlight,
    /// Within the cooldown of the previous pull.
    Throttled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PullOutcome {
    Applied {
        fetched: usize,
        skipped: usize,
    },
    /// The server had nothing for this scope; local data was pushed as seed
    /// and pulled back.
    Bootstrapped {
        pushed: PushReport,
        fetched: usize,
    },
    /// The active scope changed while the pull was running.
    Discarded,
    Skipped(SkipReason),
}

// ── Coordinator ─────────────────────────────────────────────────────────────

/// Clears the in-flight flag on drop.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Last state known to match the server, for one scope.
struct Baseline<T> {
    scope: GroupScope,
    items: BTreeMap<RecordId, T>,
}

enum PushOp<T> {
    Delete(RecordId),
    Upsert(RecordId, T, Fields),
}

enum OpResult<T> {
    Deleted(RecordId),
    Saved(RecordId, T),
    ServerWon(RecordId, T),
    Failed(RecordId),
}

/// Pull/push orchestration for one family.
pub struct SyncCoordinator<F: FamilySync> {
    store: RecordStore,
    snapshot: Arc<LocalSnapshot<F::Collection>>,
    groups: Arc<GroupContext>,
    blobs: Arc<dyn BlobStore>,
    config: SyncConfig,
    baseline: Mutex<Option<Baseline<F::Item>>>,
    pulling: AtomicBool,
    last_pull: Mutex<Option<Instant>>,
    push_lock: tokio::sync::Mutex<()>,
    /// Scope of the background push waiting to run, if any.
    push_queued: Mutex<Option<GroupScope>>,
    status: watch::Sender<SyncStatus>,
}

impl<F: FamilySync> SyncCoordinator<F> {
    pub fn new(
        store: RecordStore,
        snapshot: Arc<LocalSnapshot<F::Collection>>,
        groups: Arc<GroupContext>,
        blobs: Arc<dyn BlobStore>,
        config: SyncConfig,
    ) -> Self {
        let store = store.sorted_by(F::sort_keys());
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            store,
            snapshot,
            groups,
            blobs,
            config,
            baseline: Mutex::new(None),
            pulling: AtomicBool::new(false),
            last_pull: Mutex::new(None),
            push_lock: tokio::sync::Mutex::new(()),
            push_queued: Mutex::new(None),
            status,
        }
    }

    pub fn family(&self) -> EntityFamily {
        F::FAMILY
    }

    pub fn snapshot(&self) -> &Arc<LocalSnapshot<F::Collection>> {
        &self.snapshot
    }

    pub(crate) fn record_store(&self) -> &RecordStore {
        &self.store
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Forget the throttle, so the next pull runs regardless of cooldown.
    pub fn reset_throttle(&self) {
        *self.last_pull.lock() = None;
    }

    fn set_pull_phase(&self, phase: PullPhase, error: Option<String>) {
        self.status.send_modify(|s| {
            s.pull = phase;
            if error.is_some() {
                s.last_error = error;
            }
        });
    }

    fn set_push_phase(&self, phase: PushPhase) {
        self.status.send_modify(|s| s.push = phase);
    }

    // ── Baseline ────────────────────────────────────────────────────────────

    fn baseline_key(scope: &GroupScope) -> String {
        format!("{SYNCED_PREFIX}.{}", F::FAMILY.storage_key(scope))
    }

    /// Baseline items for `scope`, loading them from the blob store on first
    /// use of that scope.
    async fn baseline_for(&self, scope: &GroupScope) -> BTreeMap<RecordId, F::Item> {
        let cached = self
            .baseline
            .lock()
            .as_ref()
            .filter(|b| b.scope == *scope)
            .map(|b| b.items.clone());
        if let Some(items) = cached {
            return items;
        }

        let key = Self::baseline_key(scope);
        let items: BTreeMap<RecordId, F::Item> = match self.blobs.load(&key).await {
            Ok(Some(blob)) => serde_json::from_slice(&blob).unwrap_or_else(|e| {
                warn!(%key, error = %e, "discarding unreadable sync baseline");
                BTreeMap::new()
            }),
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!(%key, error = %e, "failed to load sync baseline");
                BTreeMap::new()
            }
        };

        let mut slot = self.baseline.lock();
        match slot.as_ref() {
            // Someone else loaded it meanwhile; theirs may be newer.
            Some(b) if b.scope == *scope => b.items.clone(),
            _ => {
                *slot = Some(Baseline {
                    scope: scope.clone(),
                    items: items.clone(),
                });
                items
            }
        }
    }

    /// Apply `edit` to the baseline of `scope` and persist it.
    async fn update_baseline(
        &self,
        scope: &GroupScope,
        edit: impl FnOnce(&mut BTreeMap<RecordId, F::Item>),
    ) {
        let mut items = self.baseline_for(scope).await;
        let snapshot = {
            let mut slot = self.baseline.lock();
            if let Some(b) = slot.as_mut().filter(|b| b.scope == *scope) {
                items = std::mem::take(&mut b.items);
            }
            edit(&mut items);
            *slot = Some(Baseline {
                scope: scope.clone(),
                items: items.clone(),
            });
            items
        };

        let key = Self::baseline_key(scope);
        let result = match serde_json::to_vec(&snapshot) {
            Ok(blob) => self.blobs.save(&key, blob).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(%key, error = %e, "failed to persist sync baseline");
        }
    }

    // ── Pull ────────────────────────────────────────────────────────────────

    /// Fetch the active scope and merge it into the local snapshot.
    ///
    /// Returns immediately with `Skipped(InFlight)` if a pull is already
    /// running, or `Skipped(Throttled)` if the last pull started less than
    /// the configured cooldown ago and `force` is false.
    pub async fn pull(&self, force: bool) -> SyncResult<PullOutcome> {
        let Some(_flight) = FlightGuard::try_acquire(&self.pulling) else {
            debug!(family = %F::FAMILY, "pull already in flight");
            return Ok(PullOutcome::Skipped(SkipReason::InFlight));
        };

        {
            let mut last = self.last_pull.lock();
            if !force
                && last.is_some_and(|at| at.elapsed() < self.config.pull_cooldown)
            {
                debug!(family = %F::FAMILY, "pull throttled");
                return Ok(PullOutcome::Skipped(SkipReason::Throttled));
            }
            *last = Some(Instant::now());
        }

        let scope = self.groups.current_scope();
        match self.pull_scope(&scope).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(family = %F::FAMILY, %scope, error = %e, "pull failed");
                self.set_pull_phase(PullPhase::Failed, Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn pull_scope(&self, scope: &GroupScope) -> SyncResult<PullOutcome> {
        self.set_pull_phase(PullPhase::Pulling, None);
        let mut fetch_baseline = self.baseline_for(scope).await;
        let mut records = self.store.fetch_all(scope).await?;

        self.set_pull_phase(PullPhase::Merging, None);
        let (mut remote, mut skipped) = decode_records::<F>(&records, scope);

        let mut seeded = None;
        if remote.is_empty() && skipped == 0 {
            let (local_scope, local) = self.snapshot.scoped();
            if local_scope == *scope && !F::items(&local, scope).is_empty() {
                info!(family = %F::FAMILY, %scope, "remote empty, seeding from local data");
                // Everything local is pushed, including items the baseline
                // says the server already had.
                self.update_baseline(scope, BTreeMap::clear).await;
                seeded = Some(self.push_scope(scope).await?);
                self.set_pull_phase(PullPhase::Pulling, None);
                fetch_baseline = self.baseline_for(scope).await;
                records = self.store.fetch_all(scope).await?;
                self.set_pull_phase(PullPhase::Merging, None);
                (remote, skipped) = decode_records::<F>(&records, scope);
            }
        }

        if self.groups.current_scope() != *scope {
            return Ok(self.discard(scope));
        }

        let fetched = remote.len();
        let pending = {
            let _serial = self.push_lock.lock().await;
            let baseline = self.baseline_for(scope).await;
            let known = known_remote(remote.into_iter().collect(), &fetch_baseline, &baseline);

            let mut pending = false;
            let applied = self
                .snapshot
                .apply_in_scope(scope, Origin::Remote, |current| {
                    let local = F::items(current, scope);
                    let merged = overlay(&known, &local, &baseline);
                    pending = merged != known;
                    F::assemble(merged.into_values().collect(), current, &records)
                })
                .await;
            if applied.is_none() {
                return Ok(self.discard(scope));
            }

            self.update_baseline(scope, |items| *items = known).await;
            pending
        };

        let current = self.snapshot.get();
        if let Some(name) = F::display_name(&current) {
            self.groups.adopt_display_name(scope, name).await?;
        }

        self.set_pull_phase(PullPhase::Applied, None);
        info!(family = %F::FAMILY, %scope, fetched, skipped, pending, "pull applied");

        if pending {
            if let Err(e) = self.push_scope(scope).await {
                warn!(family = %F::FAMILY, %scope, error = %e, "push after pull failed");
            }
        }

        Ok(match seeded {
            Some(pushed) => PullOutcome::Bootstrapped { pushed, fetched },
            None => PullOutcome::Applied { fetched, skipped },
        })
    }

    fn discard(&self, scope: &GroupScope) -> PullOutcome {
        info!(family = %F::FAMILY, %scope, "scope changed during pull, discarding result");
        self.set_pull_phase(PullPhase::Idle, None);
        PullOutcome::Discarded
    }

    // ── Push ────────────────────────────────────────────────────────────────

    /// Push local changes for the active scope. Pushes of one family run
    /// one at a time.
    pub async fn push(&self) -> SyncResult<PushReport> {
        let scope = self.snapshot.scope();
        self.push_scope(&scope).await
    }

    /// Push local changes made in `scope`. Does nothing once the snapshot has
    /// moved to another scope; the edits stay in that scope's local
    /// collection and go out after its next pull.
    pub async fn push_scope(&self, scope: &GroupScope) -> SyncResult<PushReport> {
        let _serial = self.push_lock.lock().await;
        {
            let mut queued = self.push_queued.lock();
            if queued.as_ref() == Some(scope) {
                *queued = None;
            }
        }

        let (active, current) = self.snapshot.scoped();
        if active != *scope {
            debug!(family = %F::FAMILY, %scope, "scope changed before push, skipping");
            return Ok(PushReport::default());
        }
        let scope = active;

        self.set_push_phase(PushPhase::Diffing);
        let local = F::items(&current, &scope);
        let baseline = self.baseline_for(&scope).await;

        let mut report = PushReport::default();
        let mut ops = Vec::new();
        for id in baseline.keys().filter(|id| !local.contains_key(id)) {
            ops.push(PushOp::Delete(*id));
        }
        for (id, item) in local {
            if baseline.get(&id) == Some(&item) {
                continue;
            }
            match F::encode(&item, &current) {
                Ok(mut fields) => {
                    if let Some(code) = scope.invite_code() {
                        fields.insert(GROUP_FIELD.to_string(), code.into());
                    }
                    ops.push(PushOp::Upsert(id, item, fields));
                }
                Err(e) => {
                    warn!(family = %F::FAMILY, id = %id.short(), error = %e, "cannot encode entity");
                    report.failed += 1;
                }
            }
        }

        if ops.is_empty() {
            self.finish_push(report);
            return Ok(report);
        }

        self.set_push_phase(PushPhase::Pushing);
        let results: Vec<OpResult<F::Item>> = futures::stream::iter(ops)
            .map(|op| self.run_op(op))
            .buffer_unordered(self.config.push_concurrency.max(1))
            .collect()
            .await;

        let mut settled = Vec::with_capacity(results.len());
        for result in results {
            match result {
                OpResult::Deleted(id) => {
                    report.deleted += 1;
                    settled.push((id, None));
                }
                OpResult::Saved(id, item) => {
                    report.upserted += 1;
                    settled.push((id, Some(item)));
                }
                // The server's version stands. Marking the local item as
                // synced lets the next pull replace it.
                OpResult::ServerWon(id, item) => {
                    report.server_won += 1;
                    settled.push((id, Some(item)));
                }
                OpResult::Failed(_) => report.failed += 1,
            }
        }
        self.update_baseline(&scope, |items| {
            for (id, item) in settled {
                match item {
                    Some(item) => items.insert(id, item),
                    None => items.remove(&id),
                };
            }
        })
        .await;

        self.finish_push(report);
        info!(
            family = %F::FAMILY,
            %scope,
            upserted = report.upserted,
            deleted = report.deleted,
            failed = report.failed,
            server_won = report.server_won,
            "push done"
        );
        Ok(report)
    }

    fn finish_push(&self, report: PushReport) {
        self.status.send_modify(|s| {
            s.push = PushPhase::Done;
            s.last_push = Some(report);
        });
    }

    async fn run_op(&self, op: PushOp<F::Item>) -> OpResult<F::Item> {
        match op {
            PushOp::Delete(id) => match self.store.delete(id).await {
                Ok(()) => OpResult::Deleted(id),
                Err(e) => {
                    warn!(family = %F::FAMILY, id = %id.short(), error = %e, "delete failed");
                    OpResult::Failed(id)
                }
            },
            PushOp::Upsert(id, item, fields) => {
                let outcome = self
                    .store
                    .upsert_unless(id, &fields, |server| F::server_is_newer(&item, server))
                    .await;
                match outcome {
                    Ok(UpsertOutcome::Saved(_)) => OpResult::Saved(id, item),
                    Ok(UpsertOutcome::ServerWon(_)) => {
                        warn!(family = %F::FAMILY, id = %id.short(), "server kept its version");
                        OpResult::ServerWon(id, item)
                    }
                    Err(e) => {
                        warn!(family = %F::FAMILY, id = %id.short(), error = %e, "upsert failed");
                        OpResult::Failed(id)
                    }
                }
            }
        }
    }

    /// Spawn a background push of `scope` unless one is already waiting to
    /// run for it.
    pub fn schedule_push(self: &Arc<Self>, scope: GroupScope) -> Option<JoinHandle<()>> {
        {
            let mut queued = self.push_queued.lock();
            if queued.as_ref() == Some(&scope) {
                return None;
            }
            *queued = Some(scope.clone());
        }
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            if let Err(e) = this.push_scope(&scope).await {
                warn!(family = %F::FAMILY, error = %e, "background push failed");
            }
        }))
    }
}

/// Decode pulled records, dropping ones that fail or belong to another group.
pub(crate) fn decode_records<F: FamilySync>(
    records: &[Record],
    scope: &GroupScope,
) -> (Vec<(RecordId, F::Item)>, usize) {
    let mut items = Vec::with_capacity(records.len());
    let mut skipped = 0;
    for record in records {
        if record.group() != scope.invite_code() {
            warn!(family = %F::FAMILY, id = %record.id.short(), "record outside active group");
            skipped += 1;
            continue;
        }
        match F::decode(record) {
            Ok(item) => items.push((record.id, item)),
            Err(e) => {
                warn!(family = %F::FAMILY, id = %record.id.short(), error = %e, "skipping undecodable record");
                skipped += 1;
            }
        }
    }
    (items, skipped)
}

/// What the server is known to hold after a fetch. Ids whose baseline
/// entry changed while the fetch ran were pushed mid-fetch; the fetched copy
/// of those may predate the push, so the baseline's entry stands in for it.
fn known_remote<T: Clone + PartialEq>(
    mut fetched: BTreeMap<RecordId, T>,
    before: &BTreeMap<RecordId, T>,
    baseline: &BTreeMap<RecordId, T>,
) -> BTreeMap<RecordId, T> {
    let touched: BTreeSet<RecordId> = before
        .keys()
        .chain(baseline.keys())
        .filter(|id| before.get(id) != baseline.get(id))
        .copied()
        .collect();
    for id in touched {
        match baseline.get(&id) {
            Some(item) => fetched.insert(id, item.clone()),
            None => fetched.remove(&id),
        };
    }
    fetched
}

/// Remote state with unpushed local work laid on top: local items that
/// differ from the baseline win, and baseline ids deleted locally stay
/// deleted.
fn overlay<T: Clone + PartialEq>(
    remote: &BTreeMap<RecordId, T>,
    local: &BTreeMap<RecordId, T>,
    baseline: &BTreeMap<RecordId, T>,
) -> BTreeMap<RecordId, T> {
    let mut merged = remote.clone();
    for (id, item) in local {
        if baseline.get(id) != Some(item) {
            merged.insert(*id, item.clone());
        }
    }
    for id in baseline.keys() {
        if !local.contains_key(id) {
            merged.remove(id);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u128) -> RecordId {
        RecordId::from(uuid::Uuid::from_u128(n))
    }

    fn map(pairs: &[(u128, &str)]) -> BTreeMap<RecordId, String> {
        pairs.iter().map(|(n, v)| (id(*n), v.to_string())).collect()
    }

    #[test]
    fn test_overlay_remote_update_of_clean_item() {
        let baseline = map(&[(1, "v1")]);
        let local = map(&[(1, "v1")]);
        let remote = map(&[(1, "v2")]);
        assert_eq!(overlay(&remote, &local, &baseline), map(&[(1, "v2")]));
    }

    #[test]
    fn test_overlay_keeps_unpushed_edit_and_create() {
        let baseline = map(&[(1, "v1")]);
        let local = map(&[(1, "mine"), (2, "new")]);
        let remote = map(&[(1, "v1"), (3, "theirs")]);
        assert_eq!(
            overlay(&remote, &local, &baseline),
            map(&[(1, "mine"), (2, "new"), (3, "theirs")])
        );
    }

    #[test]
    fn test_overlay_does_not_resurrect_pending_delete() {
        let baseline = map(&[(1, "v1"), (2, "v2")]);
        let local = map(&[(2, "v2")]);
        let remote = map(&[(1, "v1"), (2, "v2")]);
        assert_eq!(overlay(&remote, &local, &baseline), map(&[(2, "v2")]));
    }

    #[test]
    fn test_overlay_drops_remotely_deleted_clean_item() {
        let baseline = map(&[(1, "v1")]);
        let local = map(&[(1, "v1")]);
        let remote = BTreeMap::new();
        assert!(overlay(&remote, &local, &baseline).is_empty());
    }

    #[test]
    fn test_known_remote_prefers_baseline_for_ids_pushed_mid_fetch() {
        let before = map(&[(1, "v1"), (2, "v2"), (3, "v3")]);
        // 1 was deleted and 2 updated by a push while the fetch ran.
        let baseline = map(&[(2, "mine"), (3, "v3")]);
        let fetched = map(&[(1, "v1"), (2, "v2"), (3, "theirs"), (4, "new")]);
        assert_eq!(
            known_remote(fetched, &before, &baseline),
            map(&[(2, "mine"), (3, "theirs"), (4, "new")])
        );
    }

    #[test]
    fn test_known_remote_without_concurrent_push_is_the_fetch() {
        let baseline = map(&[(1, "v1")]);
        let fetched = map(&[(1, "v2"), (2, "new")]);
        assert_eq!(known_remote(fetched.clone(), &baseline, &baseline), fetched);
    }

    #[test]
    fn test_flight_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let guard = FlightGuard::try_acquire(&flag).unwrap();
        assert!(FlightGuard::try_acquire(&flag).is_none());
        drop(guard);
        assert!(FlightGuard::try_acquire(&flag).is_some());
    }
}
