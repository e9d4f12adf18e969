//! Cache-first strategy for static assets.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, warn};

use super::{DEFAULT_FETCH_TIMEOUT, StoreRef, Strategy, fetch_within};
use crate::event::EventLifetime;
use crate::fallback::OfflineFallback;
use crate::network::Network;
use crate::store::CacheStorage;
use crate::telemetry;
use crate::types::{Destination, Request, RequestKey, Response};

/// Default path of the application shell document.
pub const DEFAULT_SHELL_PATH: &str = "/index.html";

/// Serve from the static store; on a miss fetch, store and return.
///
/// With the network down and nothing stored, document requests receive the
/// cached application shell and everything else the generic unavailable
/// response.
pub struct CacheFirst {
    store: StoreRef,
    network: Arc<dyn Network>,
    fallback: OfflineFallback,
    shell_path: Option<String>,
    origin: Option<Url>,
    timeout: Duration,
}

impl CacheFirst {
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        store_name: impl Into<String>,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            store: StoreRef::new(storage, store_name, "static"),
            network,
            fallback: OfflineFallback::default(),
            shell_path: Some(DEFAULT_SHELL_PATH.to_string()),
            origin: None,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn fallback(mut self, fallback: OfflineFallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Path of the shell document served to offline navigations.
    /// `None` disables the shell fallback.
    pub fn shell_path(mut self, path: Option<String>) -> Self {
        self.shell_path = path;
        self
    }

    /// Origin the shell path is resolved against. Without one, the shell
    /// is looked up on the request's own origin.
    pub fn origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Time allowed for the network to deliver a complete response.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn shell_key(&self, url: &Url) -> Option<RequestKey> {
        let path = self.shell_path.as_deref()?;
        let base = self.origin.as_ref().unwrap_or(url);
        match base.join(path) {
            Ok(shell) => Some(RequestKey::get(&shell)),
            Err(e) => {
                warn!(path, error = %e, "invalid shell path");
                None
            }
        }
    }

    async fn offline(&self, request: &Request) -> Response {
        if request.expected_destination() == Destination::Document
            && let Some(key) = self.shell_key(request.url())
            && let Some(shell) = self.store.lookup(&key).await
        {
            debug!(url = %request.url(), "serving cached shell document");
            metrics::counter!(telemetry::FALLBACKS_TOTAL, "kind" => "shell").increment(1);
            return shell.to_response();
        }
        self.fallback.unavailable_response()
    }
}

#[async_trait]
impl Strategy for CacheFirst {
    fn name(&self) -> &str {
        "cache_first"
    }

    async fn respond(&self, request: &Request, lifetime: &EventLifetime) -> Response {
        let key = match request.key() {
            Ok(key) => key,
            Err(e) => {
                debug!(error = %e, "request cannot be stored, forwarding");
                return match self.network.fetch(request).await {
                    Ok(response) => response,
                    Err(_) => self.fallback.unavailable_response(),
                };
            }
        };

        if let Some(snapshot) = self.store.lookup(&key).await {
            return snapshot.to_response();
        }

        let response = match fetch_within(self.network.as_ref(), request, self.timeout).await {
            Ok(response) => response,
            Err(e) => {
                debug!(%key, error = %e, "network unavailable");
                return self.offline(request).await;
            }
        };
        if response.is_success() {
            self.store.store_in_background(key, &response, lifetime);
        }
        response
    }
}
