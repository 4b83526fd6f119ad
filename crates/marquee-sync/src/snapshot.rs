//! Per-family local collections with change notification.
//!
//! A `LocalSnapshot` holds the collection for the active group scope, publishes
//! every change through a `tokio::sync::watch` channel, and mirrors it to the
//! blob store under `<Family>.<scope key>`.
//!
//! Every write names its [`Origin`]. Only local writes ask for a push; remote
//! writes come from a pull and must not echo back to the server.

use std::sync::Arc;

use marquee_types::{EntityFamily, GroupScope};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::SyncResult;
use crate::persist::BlobStore;

/// Who produced a snapshot write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// A user mutation on this device.
    #[default]
    Local,
    /// Merged remote state from a pull.
    Remote,
}

/// Result of a snapshot write.
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct SnapshotWrite {
    pub changed: bool,
    pub origin: Origin,
    /// The scope that was active when the write landed.
    pub scope: GroupScope,
}

impl SnapshotWrite {
    /// Local writes that changed something are pushed.
    pub fn needs_push(&self) -> bool {
        self.changed && self.origin == Origin::Local
    }
}

/// Bounds shared by every snapshot collection.
pub trait Collection:
    Clone + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> Collection for T where
    T: Clone + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// The local copy of one family's collection for the active scope.
pub struct LocalSnapshot<C> {
    family: EntityFamily,
    store: Arc<dyn BlobStore>,
    /// Guards scope changes and scope-checked writes.
    scope: Mutex<GroupScope>,
    tx: watch::Sender<C>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl<C: Collection> LocalSnapshot<C> {
    /// Open the snapshot for `scope`, loading whatever was persisted.
    pub async fn open(family: EntityFamily, store: Arc<dyn BlobStore>, scope: GroupScope) -> Self {
        let collection = load_collection(store.as_ref(), family, &scope).await;
        let (tx, _) = watch::channel(collection);
        Self {
            family,
            store,
            scope: Mutex::new(scope),
            tx,
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn family(&self) -> EntityFamily {
        self.family
    }

    pub fn scope(&self) -> GroupScope {
        self.scope.lock().clone()
    }

    pub fn get(&self) -> C {
        self.tx.borrow().clone()
    }

    /// Scope and collection read together.
    pub fn scoped(&self) -> (GroupScope, C) {
        let scope = self.scope.lock();
        (scope.clone(), self.tx.borrow().clone())
    }

    pub fn subscribe(&self) -> watch::Receiver<C> {
        self.tx.subscribe()
    }

    /// Replace the collection.
    pub async fn set(&self, collection: C, origin: Origin) -> SnapshotWrite {
        let (changed, scope) = {
            let scope = self.scope.lock();
            let changed = self.tx.send_if_modified(|current| {
                if *current == collection {
                    false
                } else {
                    *current = collection;
                    true
                }
            });
            (changed, scope.clone())
        };
        self.finish_write(changed, origin, scope).await
    }

    /// Edit the collection in place.
    pub async fn update(&self, origin: Origin, edit: impl FnOnce(&mut C)) -> SnapshotWrite {
        let (changed, scope) = {
            let scope = self.scope.lock();
            let changed = self.tx.send_if_modified(|current| {
                let before = current.clone();
                edit(current);
                *current != before
            });
            (changed, scope.clone())
        };
        self.finish_write(changed, origin, scope).await
    }

    /// Replace the collection with `merge(current)`, but only while the
    /// active scope is still `scope`. Returns `None` when the scope moved on.
    ///
    /// `merge` runs under the snapshot lock so no local write can slip in
    /// between reading the current collection and replacing it.
    pub async fn apply_in_scope(
        &self,
        scope: &GroupScope,
        origin: Origin,
        merge: impl FnOnce(&C) -> C,
    ) -> Option<SnapshotWrite> {
        let changed = {
            let active = self.scope.lock();
            if *active != *scope {
                return None;
            }
            self.tx.send_if_modified(|current| {
                let next = merge(current);
                if next == *current {
                    false
                } else {
                    *current = next;
                    true
                }
            })
        };
        Some(self.finish_write(changed, origin, scope.clone()).await)
    }

    /// Switch to `scope`, loading its persisted collection. Subscribers see
    /// the new collection; nothing is pushed.
    pub async fn load_scope(&self, scope: GroupScope) {
        let collection = load_collection(self.store.as_ref(), self.family, &scope).await;
        let mut active = self.scope.lock();
        *active = scope;
        self.tx.send_replace(collection);
    }

    async fn finish_write(
        &self,
        changed: bool,
        origin: Origin,
        scope: GroupScope,
    ) -> SnapshotWrite {
        if changed {
            debug!(family = %self.family, ?origin, "snapshot changed");
            if let Err(e) = self.persist().await {
                warn!(family = %self.family, error = %e, "failed to persist snapshot");
            }
        }
        SnapshotWrite {
            changed,
            origin,
            scope,
        }
    }

    /// Write the latest collection. Serialized so an older value never lands
    /// after a newer one.
    async fn persist(&self) -> SyncResult<()> {
        let _guard = self.persist_lock.lock().await;
        let (scope, collection) = self.scoped();
        let blob = serde_json::to_vec(&collection)?;
        self.store.save(&self.family.storage_key(&scope), blob).await
    }
}

async fn load_collection<C: Collection>(
    store: &dyn BlobStore,
    family: EntityFamily,
    scope: &GroupScope,
) -> C {
    let key = family.storage_key(scope);
    match store.load(&key).await {
        Ok(Some(blob)) => serde_json::from_slice(&blob).unwrap_or_else(|e| {
            warn!(%key, error = %e, "discarding unreadable snapshot");
            C::default()
        }),
        Ok(None) => C::default(),
        Err(e) => {
            warn!(%key, error = %e, "failed to load snapshot");
            C::default()
        }
    }
}
