//! Event payloads delivered to the worker, and their lifetimes.
//!
//! Every intercepted event carries an [`EventLifetime`]. Work that must
//! finish before the event is torn down (store writes, mostly) is handed
//! to [`EventLifetime::wait_until`]; the host awaits
//! [`EventLifetime::settled`] after delivering the response. Dropping a
//! lifetime aborts whatever is still pending on it.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use tokio::task::JoinSet;
use tracing::warn;

use crate::types::{Request, Response};

/// Scoped "stay-alive" extension for one event.
#[derive(Default)]
pub struct EventLifetime {
    tasks: Mutex<JoinSet<()>>,
}

impl EventLifetime {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Keep the event alive until `work` completes.
    ///
    /// `work` starts running immediately on the tokio runtime; the caller
    /// does not wait for it.
    pub fn wait_until<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks().spawn(work);
    }

    /// Number of registered tasks that have not been collected yet.
    pub fn pending(&self) -> usize {
        self.tasks().len()
    }

    /// Wait for every registered task, including ones registered while
    /// waiting.
    pub async fn settled(&self) {
        loop {
            let mut set = std::mem::take(&mut *self.tasks());
            if set.is_empty() {
                return;
            }
            while let Some(joined) = set.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "background task of event did not complete");
                }
            }
        }
    }
}

impl std::fmt::Debug for EventLifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLifetime")
            .field("pending", &self.pending())
            .finish()
    }
}

/// An intercepted request.
#[derive(Debug)]
pub struct FetchEvent {
    request: Request,
    lifetime: EventLifetime,
}

impl FetchEvent {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            lifetime: EventLifetime::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn lifetime(&self) -> &EventLifetime {
        &self.lifetime
    }

    /// Wait for background work started while handling this event.
    pub async fn settled(&self) {
        self.lifetime.settled().await
    }
}

/// How the worker answered a [`FetchEvent`]. Exactly one per event.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted: the host performs the request itself.
    PassThrough,
    /// Answered by the worker (network, cache, or fallback).
    Respond(Response),
}

impl FetchOutcome {
    pub fn is_pass_through(&self) -> bool {
        matches!(self, FetchOutcome::PassThrough)
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Respond(response) => Some(response),
            FetchOutcome::PassThrough => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Respond(response) => Some(response),
            FetchOutcome::PassThrough => None,
        }
    }
}

/// Well-known tag of the connectivity-restored trigger.
pub const SYNC_ACTIONS_TAG: &str = "sync-actions";

/// Connectivity-restored signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub tag: String,
}

impl SyncEvent {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

/// Inbound push message.
#[derive(Debug, Clone, Default)]
pub struct PushEvent {
    pub data: Option<Bytes>,
}

impl PushEvent {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }

    /// A push with no payload.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn json(value: &serde_json::Value) -> Self {
        Self::new(value.to_string())
    }
}
