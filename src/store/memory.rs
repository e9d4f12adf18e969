//! In-memory store backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use moka::future::Cache;
use tokio::sync::RwLock;

use super::{CacheStorage, Store, validate_store_name};
use crate::Result;
use crate::types::{RequestKey, Snapshot};

/// Configuration for [`MemoryStorage`].
///
/// ```rust
/// # use hifadhi::store::MemoryStorageConfig;
/// let config = MemoryStorageConfig::new().max_entries(500);
/// assert_eq!(config.max_entries, 500);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStorageConfig {
    /// Maximum entries per store. Default: 10,000.
    ///
    /// When exceeded, moka evicts the least valuable entries. There is no
    /// time-to-live: staleness is handled by generation eviction.
    pub max_entries: u64,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        Self { max_entries: 10_000 }
    }
}

impl MemoryStorageConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of entries per store.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }
}

/// A single moka-backed store.
pub struct MemoryStore {
    name: String,
    entries: Cache<RequestKey, Snapshot>,
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &RequestKey) -> Result<Option<Snapshot>> {
        Ok(self.entries.get(key).await)
    }

    async fn put(&self, key: RequestKey, snapshot: Snapshot) -> Result<()> {
        self.entries.insert(key, snapshot).await;
        Ok(())
    }

    async fn remove(&self, key: &RequestKey) -> Result<bool> {
        Ok(self.entries.remove(key).await.is_some())
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        Ok(self
            .entries
            .iter()
            .map(|(key, _)| RequestKey::clone(&key))
            .collect())
    }
}

/// Process-local [`CacheStorage`].
///
/// Thread-safe; stores are created lazily on first `open`.
pub struct MemoryStorage {
    config: MemoryStorageConfig,
    stores: RwLock<HashMap<String, Arc<MemoryStore>>>,
}

impl MemoryStorage {
    /// Create an empty storage with default configuration.
    pub fn new() -> Self {
        Self::with_config(MemoryStorageConfig::default())
    }

    pub fn with_config(config: MemoryStorageConfig) -> Self {
        Self {
            config,
            stores: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Store>> {
        validate_store_name(name)?;
        if let Some(store) = self.stores.read().await.get(name) {
            return Ok(store.clone());
        }
        let mut stores = self.stores.write().await;
        let store = stores
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryStore {
                    name: name.to_string(),
                    entries: Cache::new(self.config.max_entries),
                })
            })
            .clone();
        Ok(store)
    }

    async fn open_existing(&self, name: &str) -> Result<Option<Arc<dyn Store>>> {
        Ok(self
            .stores
            .read()
            .await
            .get(name)
            .map(|store| store.clone() as Arc<dyn Store>))
    }

    async fn names(&self) -> Result<Vec<String>> {
        Ok(self.stores.read().await.keys().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let removed = self.stores.write().await.remove(name);
        if let Some(store) = &removed {
            store.entries.invalidate_all();
        }
        Ok(removed.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use reqwest::Url;

    fn key(path: &str) -> RequestKey {
        RequestKey::get(&Url::parse(&format!("https://example.test{path}")).unwrap())
    }

    fn snapshot(body: &'static str) -> Snapshot {
        Snapshot {
            status: 200,
            headers: vec![("content-type".into(), "text/plain".into())],
            body: Bytes::from_static(body.as_bytes()),
            stored_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn open_returns_same_store() {
        let storage = MemoryStorage::new();
        let a = storage.open("static-v1").await.unwrap();
        a.put(key("/a"), snapshot("a")).await.unwrap();

        let b = storage.open("static-v1").await.unwrap();
        assert!(b.get(&key("/a")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn put_replaces_entry() {
        let storage = MemoryStorage::new();
        let store = storage.open("api-v1").await.unwrap();
        store.put(key("/api/clubs"), snapshot("old")).await.unwrap();
        store.put(key("/api/clubs"), snapshot("new")).await.unwrap();

        let got = store.get(&key("/api/clubs")).await.unwrap().unwrap();
        assert_eq!(got.body, Bytes::from_static(b"new"));
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let storage = MemoryStorage::new();
        storage.open("gone").await.unwrap();
        assert!(storage.delete("gone").await.unwrap());
        assert!(!storage.delete("gone").await.unwrap());
        assert!(!storage.has("gone").await.unwrap());
    }

    #[tokio::test]
    async fn open_existing_does_not_create() {
        let storage = MemoryStorage::new();
        assert!(storage.open_existing("late-v1").await.unwrap().is_none());
        assert!(!storage.has("late-v1").await.unwrap());

        storage.open("late-v1").await.unwrap();
        assert!(storage.open_existing("late-v1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn remove_entry() {
        let storage = MemoryStorage::new();
        let store = storage.open("s").await.unwrap();
        store.put(key("/x"), snapshot("x")).await.unwrap();
        assert!(store.remove(&key("/x")).await.unwrap());
        assert!(store.get(&key("/x")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_name_rejected() {
        let storage = MemoryStorage::new();
        assert!(storage.open("a/b").await.is_err());
    }
}
