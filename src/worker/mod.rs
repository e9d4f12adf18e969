//! Lifecycle controller: install, activate, and event dispatch.
//!
//! An [`OfflineWorker`] is one generation of the engine. It moves through
//!
//! ```text
//! Parsed ──install──▶ Installing ──▶ Waiting ──activate──▶ Active
//!                                                              │
//!                                        retire (superseded) ──▶ Redundant
//! ```
//!
//! Fetch events are intercepted only while `Active`; in every other state
//! they pass through to the network untouched. A new generation is a new
//! worker built with a different generation tag: its activation deletes
//! the previous generation's stores.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hifadhi::{AssetManifest, FetchEvent, OfflineWorker, Request};
//! use hifadhi::store::MemoryStorage;
//!
//! # async fn run() -> hifadhi::Result<()> {
//! let worker = OfflineWorker::builder()
//!     .origin("https://harambee.example")
//!     .store_prefix("harambee")
//!     .generation("v1")
//!     .storage(Arc::new(MemoryStorage::new()))
//!     .build()?;
//!
//! worker.install(&AssetManifest::default()).await?;
//! worker.activate().await?;
//!
//! let event = FetchEvent::new(Request::get("https://harambee.example/api/clubs")?);
//! let _outcome = worker.handle_fetch(&event).await;
//! event.settled().await;
//! # Ok(())
//! # }
//! ```

mod builder;
mod manifest;

pub use builder::OfflineWorkerBuilder;
pub use manifest::AssetManifest;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use futures_util::future::join_all;
use reqwest::header::{CACHE_CONTROL, HeaderValue};
use reqwest::{Method, Url};
use tracing::{debug, info, warn};

use crate::event::{FetchEvent, FetchOutcome, PushEvent, SyncEvent};
use crate::network::{Network, RetryConfig, RetryingNetwork};
use crate::notification::{Notification, Notifier};
use crate::queue::{DeferredQueue, ReplayReport};
use crate::router::{PolicyClass, Route, RouteTable};
use crate::store::{CacheStorage, Store, StoreSet, evict_stale};
use crate::strategy::{Bypass, CacheFirst, NetworkFirst, Strategy};
use crate::telemetry;
use crate::types::{Request, RequestKey, Snapshot};
use crate::{HifadhiError, Result};

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Built, nothing done yet.
    Parsed,
    /// Install in progress.
    Installing,
    /// Installed, waiting for activation.
    Waiting,
    /// Controlling clients and intercepting fetches.
    Active,
    /// Superseded by a newer generation.
    Redundant,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Waiting => "waiting",
            LifecycleState::Active => "active",
            LifecycleState::Redundant => "redundant",
        }
    }
}

/// An install-time fetch or write that did not make it into a store.
#[derive(Debug)]
pub struct InstallFailure {
    pub path: String,
    pub error: HifadhiError,
}

/// Outcome of [`OfflineWorker::install`].
#[derive(Debug, Default)]
pub struct InstallReport {
    /// Static assets written, in manifest order.
    pub cached: Vec<String>,
    /// API endpoints written, in manifest order.
    pub warmed: Vec<String>,
    /// Per-resource failures. Installation completes regardless.
    pub failures: Vec<InstallFailure>,
    /// Stores that could not be opened; their resources were not cached.
    pub store_errors: Vec<HifadhiError>,
}

impl InstallReport {
    /// Whether every listed resource was stored.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.store_errors.is_empty()
    }
}

/// Outcome of [`OfflineWorker::activate`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ActivateReport {
    /// Stale stores deleted, sorted by name.
    pub deleted: Vec<String>,
}

/// One generation of the offline engine.
pub struct OfflineWorker {
    origin: Url,
    stores: StoreSet,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    install_retry: RetryConfig,
    routes: RouteTable,
    cache_first: CacheFirst,
    network_first: NetworkFirst,
    bypass: Bypass,
    queue: DeferredQueue,
    notifier: Arc<dyn Notifier>,
    sync_tag: String,
    app_name: String,
    state: RwLock<LifecycleState>,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
}

impl OfflineWorker {
    /// Create a new builder.
    pub fn builder() -> OfflineWorkerBuilder {
        OfflineWorkerBuilder::new()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: LifecycleState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Move to `to` if the current state is one of `from`.
    fn transition(
        &self,
        from: &[LifecycleState],
        to: LifecycleState,
        operation: &'static str,
    ) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !from.contains(&*state) {
            return Err(HifadhiError::InvalidState(operation));
        }
        *state = to;
        Ok(())
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Live store names of this generation.
    pub fn stores(&self) -> &StoreSet {
        &self.stores
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn queue(&self) -> &DeferredQueue {
        &self.queue
    }

    /// Whether install asked to supersede the previous generation at once.
    pub fn skip_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    /// Whether activation claimed the open clients.
    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::Acquire)
    }

    // ========================================================================
    // Install
    // ========================================================================

    /// Pre-cache the manifest into the current generation's stores.
    ///
    /// Fetches bypass HTTP caches (`cache-control: no-cache`), run in
    /// parallel with retry on transient failures, and are written in
    /// manifest order. Failed resources and unavailable stores are
    /// reported, never fatal.
    pub async fn install(&self, manifest: &AssetManifest) -> Result<InstallReport> {
        self.transition(&[LifecycleState::Parsed], LifecycleState::Installing, "install")?;
        info!(
            version = %crate::version_string(),
            static_store = %self.stores.static_store,
            assets = manifest.len(),
            "installing"
        );

        let fetcher = RetryingNetwork::new(self.network.clone(), self.install_retry.clone());
        let mut report = InstallReport::default();
        let cached = self
            .precache(&fetcher, &self.stores.static_store, &manifest.assets, &mut report)
            .await;
        let warmed = self
            .precache(&fetcher, &self.stores.api_store, &manifest.api_endpoints, &mut report)
            .await;
        report.cached = cached;
        report.warmed = warmed;

        self.skip_waiting.store(true, Ordering::Release);
        self.set_state(LifecycleState::Waiting);
        if report.is_complete() {
            info!(cached = report.cached.len(), warmed = report.warmed.len(), "installed");
        } else {
            warn!(
                cached = report.cached.len(),
                failed = report.failures.len(),
                "installed with missing resources"
            );
        }
        Ok(report)
    }

    /// Create `store_name`, then fetch `paths` and write them into it.
    /// Returns the paths stored.
    ///
    /// The store is created even when `paths` is empty: event handlers
    /// only write into stores that already exist.
    async fn precache(
        &self,
        fetcher: &dyn Network,
        store_name: &str,
        paths: &[String],
        report: &mut InstallReport,
    ) -> Vec<String> {
        let store: Option<Arc<dyn Store>> = match self.storage.open(store_name).await {
            Ok(store) => Some(store),
            Err(e) => {
                let e = match e {
                    HifadhiError::StoreOpen { .. } => e,
                    other => HifadhiError::StoreOpen {
                        name: store_name.to_string(),
                        reason: other.to_string(),
                    },
                };
                warn!(store = store_name, error = %e, "continuing install without caching");
                report.store_errors.push(e);
                None
            }
        };
        if paths.is_empty() {
            return Vec::new();
        }

        let results = join_all(paths.iter().map(|path| self.fetch_asset(fetcher, path))).await;

        let mut stored = Vec::new();
        for (path, result) in paths.iter().zip(results) {
            let written = match result {
                Ok((key, snapshot)) => match &store {
                    Some(store) => store.put(key, snapshot).await,
                    None => continue,
                },
                Err(e) => Err(e),
            };
            match written {
                Ok(()) => {
                    metrics::counter!(telemetry::INSTALL_ASSETS_TOTAL, "status" => "ok").increment(1);
                    stored.push(path.clone());
                }
                Err(error) => {
                    warn!(path = %path, error = %error, "install resource skipped");
                    metrics::counter!(telemetry::INSTALL_ASSETS_TOTAL, "status" => "error")
                        .increment(1);
                    report.failures.push(InstallFailure {
                        path: path.clone(),
                        error,
                    });
                }
            }
        }
        stored
    }

    async fn fetch_asset(
        &self,
        fetcher: &dyn Network,
        path: &str,
    ) -> Result<(RequestKey, Snapshot)> {
        let url = self.origin.join(path).map_err(|e| HifadhiError::InstallAssetFetch {
            url: path.to_string(),
            reason: e.to_string(),
        })?;
        let failure = |reason: String| HifadhiError::InstallAssetFetch {
            url: url.to_string(),
            reason,
        };

        let request = Request::new(Method::GET, url.clone())
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        let response = fetcher
            .fetch(&request)
            .await
            .map_err(|e| failure(e.to_string()))?;
        if !response.is_success() {
            return Err(failure(format!("server answered {}", response.status())));
        }
        let response = response.buffered().await.map_err(|e| failure(e.to_string()))?;
        let snapshot =
            Snapshot::capture(&response).ok_or_else(|| failure("body not buffered".into()))?;
        Ok((RequestKey::get(&url), snapshot))
    }

    // ========================================================================
    // Activate
    // ========================================================================

    /// Delete every store outside this generation and take control.
    ///
    /// Safe to repeat: a second activation deletes nothing.
    pub async fn activate(&self) -> Result<ActivateReport> {
        let state = self.state();
        if !matches!(state, LifecycleState::Waiting | LifecycleState::Active) {
            return Err(HifadhiError::InvalidState("activate"));
        }
        let deleted = evict_stale(self.storage.as_ref(), &self.stores).await?;
        self.clients_claimed.store(true, Ordering::Release);
        self.transition(
            &[LifecycleState::Waiting, LifecycleState::Active],
            LifecycleState::Active,
            "activate",
        )?;
        info!(deleted = deleted.len(), "activated");
        Ok(ActivateReport { deleted })
    }

    /// Take over as the active worker of a generation installed by an
    /// earlier process, without reinstalling or evicting anything.
    ///
    /// Fails with [`HifadhiError::InvalidState`] unless the worker is
    /// freshly built and the generation's static store exists.
    pub async fn resume(&self) -> Result<()> {
        if self.state() != LifecycleState::Parsed
            || !self.storage.has(&self.stores.static_store).await?
        {
            return Err(HifadhiError::InvalidState("resume"));
        }
        // Installs that predate the API store, or lost it, get an empty one.
        self.storage.open(&self.stores.api_store).await?;
        self.transition(&[LifecycleState::Parsed], LifecycleState::Active, "resume")?;
        self.clients_claimed.store(true, Ordering::Release);
        info!(static_store = %self.stores.static_store, "resumed");
        Ok(())
    }

    /// Mark this worker as superseded. It stops intercepting fetches.
    pub fn retire(&self) {
        self.set_state(LifecycleState::Redundant);
        self.clients_claimed.store(false, Ordering::Release);
        info!(static_store = %self.stores.static_store, "retired");
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Answer an intercepted request.
    pub async fn handle_fetch(&self, event: &FetchEvent) -> FetchOutcome {
        if self.state() != LifecycleState::Active {
            return FetchOutcome::PassThrough;
        }
        let request = event.request();
        let policy = match self.routes.classify(request) {
            Route::Policy(policy) => policy,
            Route::Ignore => {
                metrics::counter!(
                    telemetry::REQUESTS_TOTAL,
                    "route" => "ignore",
                    "source" => "passthrough"
                )
                .increment(1);
                return FetchOutcome::PassThrough;
            }
        };

        let strategy: &dyn Strategy = match policy {
            PolicyClass::StaticCacheFirst => &self.cache_first,
            PolicyClass::ApiNetworkFirst => &self.network_first,
            PolicyClass::StreamingBypass => &self.bypass,
        };
        let start = Instant::now();
        let response = strategy.respond(request, event.lifetime()).await;
        let elapsed = start.elapsed();

        debug!(
            url = %request.url(),
            route = policy.as_str(),
            source = response.source().as_str(),
            status = response.status().as_u16(),
            elapsed_ms = elapsed.as_millis() as u64,
            "fetch handled"
        );
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "route" => policy.as_str())
            .record(elapsed.as_secs_f64());
        metrics::counter!(
            telemetry::REQUESTS_TOTAL,
            "route" => policy.as_str(),
            "source" => response.source().as_str()
        )
        .increment(1);
        FetchOutcome::Respond(response)
    }

    /// Replay the deferred-write queue on the sync tag.
    ///
    /// Returns `Ok(None)` for any other tag. The replay cycle has finished
    /// when this returns.
    pub async fn handle_sync(&self, event: &SyncEvent) -> Result<Option<ReplayReport>> {
        if event.tag != self.sync_tag {
            debug!(tag = %event.tag, "ignoring sync event");
            return Ok(None);
        }
        info!(tag = %event.tag, "connectivity restored, replaying queue");
        self.queue.replay(self.network.as_ref()).await.map(Some)
    }

    /// Show a notification for a push message.
    ///
    /// Empty pushes are ignored; pushes that are not JSON are logged and
    /// dropped.
    pub async fn handle_push(&self, event: &PushEvent) -> Result<()> {
        let Some(data) = event.data.as_ref().filter(|data| !data.is_empty()) else {
            debug!("push without payload, nothing to show");
            return Ok(());
        };
        let payload: serde_json::Value = match serde_json::from_slice(data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "dropping malformed push payload");
                return Ok(());
            }
        };
        let notification = Notification::from_payload(&self.app_name, payload);
        debug!(title = %notification.title, tag = %notification.tag, "showing notification");
        self.notifier.show(notification).await
    }

    /// Queue a mutating request for delivery once connectivity returns.
    pub async fn enqueue_write(&self, request: &Request) -> Result<u64> {
        self.queue.enqueue(request).await
    }
}

impl std::fmt::Debug for OfflineWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineWorker")
            .field("origin", &self.origin.as_str())
            .field("stores", &self.stores)
            .field("network", &self.network.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
