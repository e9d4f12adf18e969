//! Store manager: named, versioned stores of response snapshots.
//!
//! A [`CacheStorage`] owns any number of named [`Store`]s. Each store maps a
//! [`RequestKey`] to an immutable [`Snapshot`]; a write replaces the entry
//! wholesale and entries never expire by time.
//!
//! Two backends are provided:
//!
//! - [`MemoryStorage`]: moka-backed, per-process. Optionally bounded by
//!   entry count (never by age).
//! - [`DiskStorage`]: one directory per store, one JSON file per entry.
//!   Survives restarts.
//!
//! # Generations
//!
//! Store names carry a generation tag (see [`StoreSet`]). Each worker
//! generation owns exactly two live stores, one for static assets and one
//! for API data; [`evict_stale`] deletes every other store during
//! activation.

mod disk;
mod memory;

pub use disk::DiskStorage;
pub use memory::{MemoryStorage, MemoryStorageConfig};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::telemetry;
use crate::types::{RequestKey, Snapshot};
use crate::{HifadhiError, Result};

/// One named store of response snapshots.
#[async_trait]
pub trait Store: Send + Sync {
    /// Store name, including its generation tag.
    fn name(&self) -> &str;

    /// Look up the entry for `key`.
    async fn get(&self, key: &RequestKey) -> Result<Option<Snapshot>>;

    /// Insert or replace the entry for `key`.
    async fn put(&self, key: RequestKey, snapshot: Snapshot) -> Result<()>;

    /// Remove the entry for `key`. Returns whether one existed.
    async fn remove(&self, key: &RequestKey) -> Result<bool>;

    /// All keys currently stored. Order is not guaranteed.
    async fn keys(&self) -> Result<Vec<RequestKey>>;
}

/// The set of all stores known to this process.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open (creating if needed) the store called `name`.
    async fn open(&self, name: &str) -> Result<Arc<dyn Store>>;

    /// Open the store called `name` only if it already exists.
    ///
    /// Event handlers use this instead of [`open`](Self::open) so that a
    /// request still in flight when a newer generation activates cannot
    /// bring a deleted store back. Backends should override the default,
    /// which checks and opens in two steps.
    async fn open_existing(&self, name: &str) -> Result<Option<Arc<dyn Store>>> {
        if self.has(name).await? {
            self.open(name).await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Names of every existing store.
    async fn names(&self) -> Result<Vec<String>>;

    /// Delete a store and all of its entries. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Whether a store called `name` exists.
    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.names().await?.iter().any(|n| n == name))
    }
}

/// The live store names of one worker generation.
///
/// Names follow `{prefix}-{generation}` for static assets and
/// `{prefix}-api-{generation}` for API data, e.g. `harambee-v1` and
/// `harambee-api-v1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSet {
    pub static_store: String,
    pub api_store: String,
}

impl StoreSet {
    /// Derive the store names for a generation.
    pub fn for_generation(prefix: &str, generation: &str) -> Result<Self> {
        let set = Self {
            static_store: format!("{prefix}-{generation}"),
            api_store: format!("{prefix}-api-{generation}"),
        };
        validate_store_name(&set.static_store)?;
        validate_store_name(&set.api_store)?;
        Ok(set)
    }

    /// Whether `name` belongs to this generation.
    pub fn is_live(&self, name: &str) -> bool {
        name == self.static_store || name == self.api_store
    }
}

/// Delete every store that is not part of `live`.
///
/// Returns the names that were deleted. Running this twice with the same
/// set deletes nothing the second time.
pub async fn evict_stale(storage: &dyn CacheStorage, live: &StoreSet) -> Result<Vec<String>> {
    let mut deleted = Vec::new();
    for name in storage.names().await? {
        if live.is_live(&name) {
            continue;
        }
        if storage.delete(&name).await? {
            info!(store = %name, "deleted stale store");
            metrics::counter!(telemetry::STORES_EVICTED_TOTAL).increment(1);
            deleted.push(name);
        }
    }
    deleted.sort();
    Ok(deleted)
}

/// Store names double as directory names, so keep them portable.
pub(crate) fn validate_store_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(HifadhiError::Configuration(format!(
            "invalid store name '{name}': use ASCII letters, digits, '-', '_' or '.'"
        )))
    }
}
