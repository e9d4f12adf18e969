//! Caching strategies: how a classified request is answered.
//!
//! Each [`PolicyClass`](crate::router::PolicyClass) has one [`Strategy`]:
//!
//! | Policy | Strategy | Store | Last resort |
//! |--------|----------|-------|-------------|
//! | `StaticCacheFirst` | [`CacheFirst`] | static | shell document, then unavailable |
//! | `ApiNetworkFirst` | [`NetworkFirst`] | API | offline JSON body |
//! | `StreamingBypass` | [`Bypass`] | none | unavailable status, not counted |
//!
//! Strategies never return an error: every failure on the read path ends
//! in a cached value or a synthesized fallback. The caching strategies
//! bound each network exchange by a timeout and treat a stall like a lost
//! connection. Store writes are handed to the event's [`EventLifetime`] and
//! do not delay the response. They only go to stores that still exist, so
//! activation's eviction is final.

mod bypass;
mod cache_first;
mod network_first;

pub use bypass::Bypass;
pub use cache_first::{CacheFirst, DEFAULT_SHELL_PATH};
pub use network_first::NetworkFirst;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::event::EventLifetime;
use crate::network::Network;
use crate::store::{CacheStorage, Store};
use crate::telemetry;
use crate::types::{Request, RequestKey, Response, Snapshot};
use crate::{HifadhiError, Result};

/// Default time allowed for a caching strategy's fetch, body included.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Answers one request under a fixed policy.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Name for logging/debugging.
    fn name(&self) -> &str;

    /// Produce the response for `request`. Background work goes on `lifetime`.
    async fn respond(&self, request: &Request, lifetime: &EventLifetime) -> Response;
}

// ============================================================================
// Store access shared by the caching strategies
// ============================================================================

/// A named store opened lazily per event, labelled for metrics.
#[derive(Clone)]
pub(crate) struct StoreRef {
    storage: Arc<dyn CacheStorage>,
    name: String,
    kind: &'static str,
}

impl StoreRef {
    pub(crate) fn new(
        storage: Arc<dyn CacheStorage>,
        name: impl Into<String>,
        kind: &'static str,
    ) -> Self {
        Self {
            storage,
            name: name.into(),
            kind,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Open the store if it exists. A missing or unavailable store behaves
    /// like an empty one.
    async fn open(&self) -> Option<Arc<dyn Store>> {
        match self.storage.open_existing(&self.name).await {
            Ok(Some(store)) => Some(store),
            Ok(None) => {
                debug!(store = %self.name, "store does not exist");
                None
            }
            Err(e) => {
                warn!(store = %self.name, error = %e, "store unavailable");
                None
            }
        }
    }

    /// Look up `key`. Read errors count as a miss.
    async fn lookup(&self, key: &RequestKey) -> Option<Snapshot> {
        let found = match self.open().await {
            Some(store) => match store.get(key).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(store = %self.name, %key, error = %e, "store read failed, treating as miss");
                    None
                }
            },
            None => None,
        };
        if found.is_some() {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "store" => self.kind).increment(1);
        } else {
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "store" => self.kind).increment(1);
        }
        found
    }

    /// Snapshot a buffered `response` and write it under `key` on `lifetime`.
    ///
    /// Streamed bodies are skipped, and so are writes into a store that no
    /// longer exists. Write failures are logged, never reported to the client.
    fn store_in_background(
        &self,
        key: RequestKey,
        response: &Response,
        lifetime: &EventLifetime,
    ) {
        let Some(snapshot) = Snapshot::capture(response) else {
            debug!(%key, "response body not buffered, not storing");
            return;
        };
        let this = self.clone();
        lifetime.wait_until(async move {
            let status = match this.open().await {
                Some(store) => match store.put(key.clone(), snapshot).await {
                    Ok(()) => {
                        debug!(store = %this.name, %key, "stored response");
                        "ok"
                    }
                    Err(e) => {
                        warn!(store = %this.name, %key, error = %e, "store write failed");
                        "error"
                    }
                },
                None => "skipped",
            };
            metrics::counter!(
                telemetry::STORE_WRITES_TOTAL,
                "store" => this.kind,
                "status" => status
            )
            .increment(1);
        });
    }
}

/// Fetch `request` and buffer a 2xx body, all within `limit`.
///
/// A server that accepts the connection and then stalls is reported as a
/// network failure, so the caller can fall back to its store. Non-2xx
/// responses are returned unbuffered.
pub(crate) async fn fetch_within(
    network: &dyn Network,
    request: &Request,
    limit: Duration,
) -> Result<Response> {
    let attempt = async {
        let response = network.fetch(request).await?;
        if response.is_success() {
            response.buffered().await
        } else {
            Ok(response)
        }
    };
    match tokio::time::timeout(limit, attempt).await {
        Ok(result) => result,
        Err(_) => Err(HifadhiError::Network(format!(
            "no complete response from {} within {limit:?}",
            request.url()
        ))),
    }
}
