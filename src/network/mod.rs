//! Network collaborator.
//!
//! The engine never talks to the network directly; every fetch goes through
//! a [`Network`] implementation. [`HttpNetwork`] is the production client,
//! [`RetryingNetwork`] decorates any implementation with backoff on
//! transient failures, and tests substitute their own.
//!
//! # Failure semantics
//!
//! `fetch` returns `Err` only when no HTTP response was obtained (DNS,
//! connect, TLS, reset). An HTTP error status is still `Ok`; strategies
//! decide what to do with it.

mod http;
pub mod retry;

pub use http::{DEFAULT_CONNECT_TIMEOUT, HttpNetwork};
pub use retry::{RetryConfig, RetryingNetwork};

use async_trait::async_trait;

use crate::Result;
use crate::types::{Request, Response};

/// Something that can perform a request.
#[async_trait]
pub trait Network: Send + Sync {
    /// Name for logging/debugging.
    fn name(&self) -> &str {
        "network"
    }

    /// Perform `request`.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}
