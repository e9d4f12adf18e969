//! On-disk store backend.
//!
//! Layout: `{root}/{store name}/{sha256(key)}.json`. Each file holds the key
//! and its snapshot; writes go to a temporary file first and are renamed
//! into place, so readers never observe a half-written entry.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use super::{CacheStorage, Store, validate_store_name};
use crate::types::{RequestKey, Snapshot};
use crate::{HifadhiError, Result};

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    key: RequestKey,
    snapshot: Snapshot,
}

/// File-backed [`CacheStorage`] rooted at a directory.
pub struct DiskStorage {
    root: PathBuf,
    tmp_counter: Arc<AtomicU64>,
}

impl DiskStorage {
    /// Use `root` as the storage directory. Created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Default location: `~/.cache/hifadhi/stores`.
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("hifadhi")
            .join("stores")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// A store directory.
pub struct DiskStore {
    name: String,
    dir: PathBuf,
    tmp_counter: Arc<AtomicU64>,
}

impl DiskStore {
    fn entry_path(&self, key: &RequestKey) -> PathBuf {
        let digest = Sha256::digest(key.to_string().as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }

    async fn read_entry(path: &Path) -> Result<Option<StoredEntry>> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&raw).map(Some).map_err(|e| {
            HifadhiError::Store(format!("corrupt entry {}: {e}", path.display()))
        })
    }
}

#[async_trait]
impl Store for DiskStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &RequestKey) -> Result<Option<Snapshot>> {
        let entry = Self::read_entry(&self.entry_path(key)).await?;
        // Digest collisions are not expected, but never serve another key's entry.
        Ok(entry
            .filter(|entry| &entry.key == key)
            .map(|entry| entry.snapshot))
    }

    async fn put(&self, key: RequestKey, snapshot: Snapshot) -> Result<()> {
        let path = self.entry_path(&key);
        let json = serde_json::to_vec(&StoredEntry { key, snapshot })?;

        // No create_dir_all here: a store deleted by activation stays deleted.
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp_path = path.with_extension(format!("{n}.tmp"));
        tokio::fs::write(&tmp_path, &json).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(HifadhiError::Store(format!(
                "failed to move {} into place: {e}",
                path.display()
            )));
        }
        Ok(())
    }

    async fn remove(&self, key: &RequestKey) -> Result<bool> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_entry(&path).await {
                Ok(Some(entry)) => keys.push(entry.key),
                Ok(None) => {}
                Err(e) => warn!(store = %self.name, error = %e, "skipping unreadable entry"),
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Store>> {
        validate_store_name(name)?;
        let dir = self.root.join(name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| HifadhiError::StoreOpen {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Arc::new(DiskStore {
            name: name.to_string(),
            dir,
            tmp_counter: self.tmp_counter.clone(),
        }))
    }

    async fn open_existing(&self, name: &str) -> Result<Option<Arc<dyn Store>>> {
        validate_store_name(name)?;
        let dir = self.root.join(name);
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(Some(Arc::new(DiskStore {
                name: name.to_string(),
                dir,
                tmp_counter: self.tmp_counter.clone(),
            }))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn names(&self) -> Result<Vec<String>> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            if !item.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = item.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        // Names listed from disk may predate validation; only refuse escapes.
        let mut components = Path::new(name).components();
        if !matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        ) {
            return Err(HifadhiError::Store(format!("refusing to delete '{name}'")));
        }
        match tokio::fs::remove_dir_all(self.root.join(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
