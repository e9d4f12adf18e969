//! reqwest-backed network client.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::debug;

use super::Network;
use crate::types::{Body, Request, Response};
use crate::{HifadhiError, Result};

/// Default connection timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// [`Network`] over a shared `reqwest::Client`.
///
/// Only connection setup is time-bounded here: bodies are returned as
/// streams so event subscriptions can stay open indefinitely. The caching
/// strategies put their own limit on the whole exchange (see
/// [`DEFAULT_FETCH_TIMEOUT`](crate::strategy::DEFAULT_FETCH_TIMEOUT)).
#[derive(Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    /// Client with the default connection timeout.
    pub fn new() -> Result<Self> {
        Self::with_connect_timeout(DEFAULT_CONNECT_TIMEOUT)
    }

    /// Client with a custom connection timeout.
    pub fn with_connect_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("hifadhi/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HifadhiError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, request: &Request) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());
        if let Some(body) = request.body_bytes() {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        debug!(method = %request.method(), url = %request.url(), %status, "network response");

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| HifadhiError::Stream(e.to_string())));
        Ok(Response::new(status, Body::Stream(Box::pin(stream))).with_headers(headers))
    }
}
