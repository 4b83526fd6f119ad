//! Key-value blob persistence for local snapshots.
//!
//! The engine only needs "save blob under key" and "load blob for key".
//! Keys look like `Members.Default` or `Movies.<invite>`; the group registry
//! lives under `Groups`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::SyncResult;

/// Opaque blob persistence.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn save(&self, key: &str, blob: Vec<u8>) -> SyncResult<()>;

    /// `Ok(None)` when nothing was ever saved under `key`.
    async fn load(&self, key: &str) -> SyncResult<Option<Vec<u8>>>;
}

/// In-memory blob store for tests and ephemeral devices.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn save(&self, key: &str, blob: Vec<u8>) -> SyncResult<()> {
        self.blobs.lock().insert(key.to_string(), blob);
        Ok(())
    }

    async fn load(&self, key: &str) -> SyncResult<Option<Vec<u8>>> {
        Ok(self.blobs.lock().get(key).cloned())
    }
}

/// One file per key under a directory.
///
/// Writes go to a temp file that is renamed over the target, so a crash
/// never leaves a torn blob.
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> SyncResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.blob", file_name_for(key)))
    }
}

/// Map a key to a file name. Invite codes are user input, so anything
/// outside `[A-Za-z0-9.-]` is hex-escaped.
fn file_name_for(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'-' => name.push(byte as char),
            _ => name.push_str(&format!("_{byte:02x}")),
        }
    }
    name
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn save(&self, key: &str, blob: Vec<u8>) -> SyncResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("blob.tmp");
        tokio::fs::write(&tmp, &blob).await?;
        tokio::fs::rename(&tmp, &path).await?;
        trace!(key, bytes = blob.len(), "blob saved");
        Ok(())
    }

    async fn load(&self, key: &str) -> SyncResult<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
