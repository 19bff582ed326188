//! Named-blob storage
//!
//! Every persisted log is a single blob addressed by a flat key such as
//! `WAVES-ETH-minute-trading-history.json`. A missing blob is `Ok(None)`,
//! never an error.

use async_trait::async_trait;
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{Result, SwapdError};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read a blob, `None` when it does not exist
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace a blob in full
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;
}

/// Keys are single path components; anything else is rejected.
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key == "."
        || key == ".."
        || key.contains('/')
        || key.contains('\\')
        || key.contains('\0')
    {
        return Err(SwapdError::Storage(format!("invalid blob key: {:?}", key)));
    }
    Ok(())
}

/// Blobs as files in one directory
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        match tokio::fs::read(self.root.join(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SwapdError::Storage(format!("read {}: {}", key, e))),
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        validate_key(key)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| SwapdError::Storage(format!("create {}: {}", self.root.display(), e)))?;

        // Write next to the target and rename so readers never see a torn blob.
        let target = self.root.join(key);
        let staging = self.root.join(format!(".{}.tmp", key));
        if let Err(e) = write_synced(&staging, &bytes).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(SwapdError::Storage(format!("write {}: {}", key, e)));
        }
        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(SwapdError::Storage(format!("commit {}: {}", key, e)));
        }
        // The rename itself lives in the directory entry.
        if let Err(e) = sync_dir(&self.root).await {
            warn!("Directory sync after storing {} failed: {}", key, e);
        }

        debug!("Stored {} ({} bytes)", key, bytes.len());
        Ok(())
    }
}

/// Write and flush to disk before the caller renames the file into place.
async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// In-process store, used by tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.blobs.get(key).map(|bytes| bytes.clone()))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        validate_key(key)?;
        self.blobs.insert(key.to_string(), bytes);
        Ok(())
    }
}
