//! Pass-through strategy for streaming endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::Strategy;
use crate::event::EventLifetime;
use crate::fallback::OfflineFallback;
use crate::network::Network;
use crate::types::{Request, Response};

/// Forward to the network untouched. The body stays a stream.
///
/// Nothing is cached and no fallback is synthesized from a store. A
/// transport failure becomes the plain unavailable status, which is not
/// counted in the fallback metrics.
pub struct Bypass {
    network: Arc<dyn Network>,
    fallback: OfflineFallback,
}

impl Bypass {
    pub fn new(network: Arc<dyn Network>) -> Self {
        Self {
            network,
            fallback: OfflineFallback::default(),
        }
    }

    pub fn fallback(mut self, fallback: OfflineFallback) -> Self {
        self.fallback = fallback;
        self
    }
}

#[async_trait]
impl Strategy for Bypass {
    fn name(&self) -> &str {
        "bypass"
    }

    async fn respond(&self, request: &Request, _lifetime: &EventLifetime) -> Response {
        match self.network.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %request.url(), error = %e, "bypassed request failed");
                self.fallback.unavailable()
            }
        }
    }
}
