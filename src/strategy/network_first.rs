//! Network-first strategy for API data.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{DEFAULT_FETCH_TIMEOUT, StoreRef, Strategy, fetch_within};
use crate::event::EventLifetime;
use crate::fallback::OfflineFallback;
use crate::network::Network;
use crate::store::CacheStorage;
use crate::types::{Request, RequestKey, Response};

/// Fetch first; keep the last good 2xx answer for when the network is gone.
pub struct NetworkFirst {
    store: StoreRef,
    network: Arc<dyn Network>,
    fallback: OfflineFallback,
    timeout: Duration,
}

impl NetworkFirst {
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        store_name: impl Into<String>,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            store: StoreRef::new(storage, store_name, "api"),
            network,
            fallback: OfflineFallback::default(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn fallback(mut self, fallback: OfflineFallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Time allowed for the network to deliver a complete response before
    /// the stored entry is served instead.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn offline(&self, key: Option<&RequestKey>) -> Response {
        if let Some(key) = key
            && let Some(snapshot) = self.store.lookup(key).await
        {
            debug!(store = %self.store.name(), %key, "serving stored API response");
            return snapshot.to_response();
        }
        self.fallback.offline_response()
    }
}

#[async_trait]
impl Strategy for NetworkFirst {
    fn name(&self) -> &str {
        "network_first"
    }

    async fn respond(&self, request: &Request, lifetime: &EventLifetime) -> Response {
        let key = request.key().ok();

        let response = match fetch_within(self.network.as_ref(), request, self.timeout).await {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %request.url(), error = %e, "network unavailable");
                return self.offline(key.as_ref()).await;
            }
        };
        if response.is_success()
            && let Some(key) = key
        {
            self.store.store_in_background(key, &response, lifetime);
        }
        response
    }
}
