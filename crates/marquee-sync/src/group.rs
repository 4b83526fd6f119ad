//! Active group selection and the registry of joined groups.

use std::sync::Arc;

use marquee_types::{GroupInfo, GroupScope};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::constants::GROUPS_KEY;
use crate::error::SyncResult;
use crate::persist::BlobStore;

/// Persisted under [`GROUPS_KEY`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct GroupRegistry {
    active: GroupScope,
    /// Every invite group ever joined on this device, oldest first.
    groups: Vec<GroupInfo>,
}

impl GroupRegistry {
    fn find_mut(&mut self, scope: &GroupScope) -> Option<&mut GroupInfo> {
        self.groups.iter_mut().find(|g| g.scope == *scope)
    }

    fn info(&self, scope: &GroupScope) -> GroupInfo {
        self.groups
            .iter()
            .find(|g| g.scope == *scope)
            .cloned()
            .unwrap_or_else(|| GroupInfo {
                scope: scope.clone(),
                display_name: None,
                joined_at: 0,
            })
    }
}

/// Which group this device is working in. At most one is active.
pub struct GroupContext {
    store: Arc<dyn BlobStore>,
    registry: RwLock<GroupRegistry>,
    tx: watch::Sender<GroupScope>,
}

impl GroupContext {
    /// Load the registry from `store`. Starts ungrouped if nothing is saved.
    pub async fn load(store: Arc<dyn BlobStore>) -> SyncResult<Self> {
        let registry = match store.load(GROUPS_KEY).await? {
            Some(blob) => serde_json::from_slice(&blob).unwrap_or_else(|e| {
                warn!(error = %e, "discarding unreadable group registry");
                GroupRegistry::default()
            }),
            None => GroupRegistry::default(),
        };
        let (tx, _) = watch::channel(registry.active.clone());
        Ok(Self {
            store,
            registry: RwLock::new(registry),
            tx,
        })
    }

    pub fn current_scope(&self) -> GroupScope {
        self.registry.read().active.clone()
    }

    /// The active group with its display name.
    pub fn current(&self) -> GroupInfo {
        let registry = self.registry.read();
        registry.info(&registry.active)
    }

    /// Joined invite groups, oldest first.
    pub fn groups(&self) -> Vec<GroupInfo> {
        self.registry.read().groups.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GroupScope> {
        self.tx.subscribe()
    }

    /// Make `scope` active, registering it if new. A provided display name
    /// replaces the stored one.
    pub async fn switch(&self, scope: GroupScope, display_name: Option<String>) -> SyncResult<()> {
        {
            let mut registry = self.registry.write();
            if let GroupScope::Invite(_) = scope {
                match registry.find_mut(&scope) {
                    Some(info) => {
                        if display_name.is_some() {
                            info.display_name = display_name;
                        }
                    }
                    None => registry
                        .groups
                        .push(GroupInfo::new(scope.clone(), display_name)),
                }
            }
            registry.active = scope.clone();
        }
        info!(%scope, "active group changed");
        self.tx.send_replace(scope);
        self.save().await
    }

    /// Record a display name learned from the remote, unless one is set.
    /// Returns whether the name was adopted.
    pub async fn adopt_display_name(&self, scope: &GroupScope, name: &str) -> SyncResult<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(false);
        }
        let adopted = {
            let mut registry = self.registry.write();
            match registry.find_mut(scope) {
                Some(info) if info.display_name.is_none() => {
                    info.display_name = Some(name.to_string());
                    true
                }
                _ => false,
            }
        };
        if adopted {
            info!(%scope, name, "adopted group display name");
            self.save().await?;
        }
        Ok(adopted)
    }

    async fn save(&self) -> SyncResult<()> {
        let blob = serde_json::to_vec(&*self.registry.read())?;
        self.store.save(GROUPS_KEY, blob).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryBlobStore;

    #[tokio::test]
    async fn test_starts_ungrouped() {
        let ctx = GroupContext::load(Arc::new(MemoryBlobStore::new())).await.unwrap();
        assert_eq!(ctx.current_scope(), GroupScope::Ungrouped);
        assert!(ctx.groups().is_empty());
    }

    #[tokio::test]
    async fn test_switch_registers_and_persists() {
        let store = Arc::new(MemoryBlobStore::new());
        let ctx = GroupContext::load(store.clone()).await.unwrap();
        let g1 = GroupScope::invite("G1").unwrap();
        let mut rx = ctx.subscribe();

        ctx.switch(g1.clone(), Some("Movie Night".into())).await.unwrap();
        ctx.switch(GroupScope::Ungrouped, None).await.unwrap();
        ctx.switch(g1.clone(), None).await.unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), g1);
        assert_eq!(ctx.groups().len(), 1);
        assert_eq!(ctx.current().label(), "Movie Night");

        let reloaded = GroupContext::load(store).await.unwrap();
        assert_eq!(reloaded.current_scope(), g1);
        assert_eq!(reloaded.current().display_name.as_deref(), Some("Movie Night"));
    }

    #[tokio::test]
    async fn test_adopt_only_fills_missing_name() {
        let ctx = GroupContext::load(Arc::new(MemoryBlobStore::new())).await.unwrap();
        let g1 = GroupScope::invite("G1").unwrap();
        ctx.switch(g1.clone(), None).await.unwrap();

        assert!(ctx.adopt_display_name(&g1, "Friday Club").await.unwrap());
        assert!(!ctx.adopt_display_name(&g1, "Other").await.unwrap());
        assert_eq!(ctx.current().label(), "Friday Club");
    }
}
