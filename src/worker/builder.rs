//! Builder for configuring worker instances

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::Url;

use super::{LifecycleState, OfflineWorker};
use crate::config::{Config, StorageBackend};
use crate::event::SYNC_ACTIONS_TAG;
use crate::fallback::OfflineFallback;
use crate::network::{HttpNetwork, Network, RetryConfig};
use crate::notification::{DEFAULT_APP_NAME, LogNotifier, Notifier};
use crate::queue::DeferredQueue;
use crate::router::RouteTable;
use crate::store::{CacheStorage, DiskStorage, MemoryStorage, StoreSet};
use crate::strategy::{Bypass, CacheFirst, DEFAULT_FETCH_TIMEOUT, DEFAULT_SHELL_PATH, NetworkFirst};
use crate::{HifadhiError, Result};

/// Builder for [`OfflineWorker`].
///
/// Only the origin is required. Defaults: in-memory stores, an
/// [`HttpNetwork`] client, the standard route table, an in-memory queue and
/// a [`LogNotifier`].
pub struct OfflineWorkerBuilder {
    origin: Option<String>,
    generation: String,
    store_prefix: String,
    storage: Option<Arc<dyn CacheStorage>>,
    network: Option<Arc<dyn Network>>,
    connect_timeout: Option<Duration>,
    fetch_timeout: Duration,
    routes: Option<RouteTable>,
    fallback: OfflineFallback,
    shell_path: Option<String>,
    install_retry: RetryConfig,
    queue: Option<DeferredQueue>,
    notifier: Option<Arc<dyn Notifier>>,
    sync_tag: String,
    app_name: String,
}

impl Default for OfflineWorkerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineWorkerBuilder {
    pub fn new() -> Self {
        Self {
            origin: None,
            generation: "v1".to_string(),
            store_prefix: "hifadhi".to_string(),
            storage: None,
            network: None,
            connect_timeout: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            routes: None,
            fallback: OfflineFallback::default(),
            shell_path: Some(DEFAULT_SHELL_PATH.to_string()),
            install_retry: RetryConfig::default(),
            queue: None,
            notifier: None,
            sync_tag: SYNC_ACTIONS_TAG.to_string(),
            app_name: DEFAULT_APP_NAME.to_string(),
        }
    }

    /// Builder populated from a loaded [`Config`].
    ///
    /// Opens the configured store backend and the persistent queue file.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let storage: Arc<dyn CacheStorage> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStorage::with_config(
                config.storage.memory_config(),
            )),
            StorageBackend::Disk => Arc::new(DiskStorage::new(config.storage.dir())),
        };
        let queue = DeferredQueue::open(config.queue.path()).await?;
        let shell_path = Some(config.worker.shell_path.clone()).filter(|p| !p.is_empty());

        Ok(Self::new()
            .origin(&config.worker.origin)
            .generation(&config.worker.generation)
            .store_prefix(&config.worker.store_prefix)
            .storage(storage)
            .connect_timeout(Duration::from_secs(config.network.connect_timeout_secs))
            .fetch_timeout(Duration::from_secs(config.network.fetch_timeout_secs))
            .routes(RouteTable::from_config(&config.routes))
            .fallback(config.fallback.clone())
            .shell_path(shell_path)
            .install_retry(config.install.retry.clone())
            .queue(queue)
            .sync_tag(&config.worker.sync_tag)
            .app_name(&config.worker.app_name))
    }

    /// Origin that relative asset paths resolve against.
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Generation tag (default: "v1"). Stores of other generations are
    /// deleted on activation.
    pub fn generation(mut self, generation: impl Into<String>) -> Self {
        self.generation = generation.into();
        self
    }

    /// Store name prefix (default: "hifadhi").
    pub fn store_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.store_prefix = prefix.into();
        self
    }

    pub fn storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Use a custom network instead of [`HttpNetwork`].
    pub fn network(mut self, network: Arc<dyn Network>) -> Self {
        self.network = Some(network);
        self
    }

    /// Connection timeout of the default [`HttpNetwork`].
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Time the caching strategies wait for a complete network response
    /// before answering from their stores.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn routes(mut self, routes: RouteTable) -> Self {
        self.routes = Some(routes);
        self
    }

    pub fn fallback(mut self, fallback: OfflineFallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Shell document for offline navigations; `None` disables it.
    pub fn shell_path(mut self, path: Option<String>) -> Self {
        self.shell_path = path;
        self
    }

    /// Retry policy of install-time fetches.
    pub fn install_retry(mut self, retry: RetryConfig) -> Self {
        self.install_retry = retry;
        self
    }

    pub fn queue(mut self, queue: DeferredQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Sync tag that triggers queue replay (default: "sync-actions").
    pub fn sync_tag(mut self, tag: impl Into<String>) -> Self {
        self.sync_tag = tag.into();
        self
    }

    /// Default notification title.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Build the worker, in state [`LifecycleState::Parsed`].
    pub fn build(self) -> Result<OfflineWorker> {
        let origin = self
            .origin
            .ok_or_else(|| HifadhiError::Configuration("worker origin is required".into()))?;
        let origin = Url::parse(&origin).map_err(|e| {
            HifadhiError::Configuration(format!("invalid origin '{origin}': {e}"))
        })?;
        if origin.cannot_be_a_base() {
            return Err(HifadhiError::Configuration(format!(
                "origin '{origin}' cannot resolve relative paths"
            )));
        }
        let stores = StoreSet::for_generation(&self.store_prefix, &self.generation)?;

        let network: Arc<dyn Network> = match self.network {
            Some(network) => network,
            None => Arc::new(match self.connect_timeout {
                Some(timeout) => HttpNetwork::with_connect_timeout(timeout)?,
                None => HttpNetwork::new()?,
            }),
        };
        let storage: Arc<dyn CacheStorage> = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));

        let cache_first = CacheFirst::new(storage.clone(), &stores.static_store, network.clone())
            .fallback(self.fallback.clone())
            .shell_path(self.shell_path)
            .origin(origin.clone())
            .timeout(self.fetch_timeout);
        let network_first = NetworkFirst::new(storage.clone(), &stores.api_store, network.clone())
            .fallback(self.fallback.clone())
            .timeout(self.fetch_timeout);
        let bypass = Bypass::new(network.clone()).fallback(self.fallback);

        Ok(OfflineWorker {
            origin,
            stores,
            storage,
            network,
            install_retry: self.install_retry,
            routes: self.routes.unwrap_or_default(),
            cache_first,
            network_first,
            bypass,
            queue: self.queue.unwrap_or_else(DeferredQueue::in_memory),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(LogNotifier)),
            sync_tag: self.sync_tag,
            app_name: self.app_name,
            state: RwLock::new(LifecycleState::Parsed),
            skip_waiting: AtomicBool::new(false),
            clients_claimed: AtomicBool::new(false),
        })
    }
}
