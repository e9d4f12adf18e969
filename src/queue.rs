//! Deferred-write queue: mutating requests held until connectivity returns.
//!
//! The application enqueues writes it could not send while offline. On a
//! connectivity-restored trigger the queue is replayed in FIFO order:
//!
//! - delivered records are removed;
//! - the first failure increments that record's retry count and ends the
//!   cycle, leaving it and everything behind it in place.
//!
//! A record counts as delivered when the server answered with any status
//! other than a transient one (408, 429, 5xx). A 4xx rejection is final;
//! replaying it again would not change the answer.
//!
//! # Durability
//!
//! A queue opened with [`DeferredQueue::open`] persists every mutation to a
//! JSON file before the call returns (tmp file + rename, so a crash never
//! leaves a truncated queue). [`DeferredQueue::in_memory`] keeps records for
//! the lifetime of the process only.
//!
//! # Concurrency
//!
//! Replays are serialized: a second trigger waits for the running cycle.
//! Enqueues are never blocked by a replay in progress and land behind it.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::Method;
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::is_transient_status;
use crate::network::Network;
use crate::telemetry;
use crate::types::Request;
use crate::{HifadhiError, Result};

/// Queue file format version.
const QUEUE_FORMAT_VERSION: u32 = 1;

/// Default queue file: `~/.local/share/hifadhi/queue.json`.
pub fn default_queue_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("hifadhi")
        .join("queue.json")
}

/// Serializable copy of a request, enough to send it again later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default, with = "crate::types::base64_body::option")]
    pub body: Option<Bytes>,
}

impl RequestDescriptor {
    pub fn from_request(request: &Request) -> Self {
        Self {
            method: request.method().as_str().to_string(),
            url: request.url().to_string(),
            headers: request
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
            body: request.body_bytes().cloned(),
        }
    }

    /// Rebuild the request.
    pub fn to_request(&self) -> Result<Request> {
        let method = Method::from_bytes(self.method.as_bytes()).map_err(|e| {
            HifadhiError::InvalidRequest(format!("invalid method '{}': {e}", self.method))
        })?;
        let mut request = Request::parse(method, &self.url)?;
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| HifadhiError::InvalidRequest(format!("invalid header '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| HifadhiError::InvalidRequest(format!("invalid header value: {e}")))?;
            request = request.header(name, value);
        }
        if let Some(body) = &self.body {
            request = request.body(body.clone());
        }
        Ok(request)
    }
}

/// One queued write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredWrite {
    /// Queue-unique id, assigned at enqueue.
    pub id: u64,
    pub request: RequestDescriptor,
    pub enqueued_at: DateTime<Utc>,
    /// Failed delivery attempts so far.
    #[serde(default)]
    pub retry_count: u32,
}

/// Why a replay cycle stopped early.
#[derive(Debug)]
pub struct ReplayFailure {
    pub id: u64,
    pub error: HifadhiError,
}

/// Outcome of one replay cycle.
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// Records delivered and removed, in order.
    pub delivered: Vec<u64>,
    /// Records dropped because they could not be rebuilt into a request.
    pub discarded: Vec<u64>,
    /// The record that failed, ending the cycle.
    pub failure: Option<ReplayFailure>,
    /// Records left in the queue after the cycle.
    pub remaining: usize,
}

impl ReplayReport {
    /// Whether the cycle drained the queue.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && self.remaining == 0
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueState {
    version: u32,
    next_id: u64,
    records: VecDeque<DeferredWrite>,
}

/// FIFO queue of deferred writes.
pub struct DeferredQueue {
    path: Option<PathBuf>,
    state: Mutex<QueueState>,
    replay_lock: Mutex<()>,
}

impl DeferredQueue {
    /// A queue that is not persisted.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(QueueState {
                version: QUEUE_FORMAT_VERSION,
                ..QueueState::default()
            }),
            replay_lock: Mutex::new(()),
        }
    }

    /// Open the queue stored at `path`, creating an empty one if the file
    /// does not exist. A corrupt file is an error, not an empty queue.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(raw) => {
                let state: QueueState = serde_json::from_slice(&raw).map_err(|e| {
                    HifadhiError::Store(format!("corrupt queue file {}: {e}", path.display()))
                })?;
                if state.version > QUEUE_FORMAT_VERSION {
                    return Err(HifadhiError::Configuration(format!(
                        "unsupported queue version {} (max supported: {QUEUE_FORMAT_VERSION})",
                        state.version
                    )));
                }
                state
            }
            Err(e) if e.kind() == ErrorKind::NotFound => QueueState {
                version: QUEUE_FORMAT_VERSION,
                ..QueueState::default()
            },
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), records = state.records.len(), "opened deferred queue");
        metrics::gauge!(telemetry::QUEUE_DEPTH).set(state.records.len() as f64);
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
            replay_lock: Mutex::new(()),
        })
    }

    /// Backing file, if persisted.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Queue `request` for later delivery. Returns the record id.
    ///
    /// Only mutating requests are accepted; reads are served by the caching
    /// strategies instead.
    pub async fn enqueue(&self, request: &Request) -> Result<u64> {
        if request.is_retrieval() {
            return Err(HifadhiError::InvalidRequest(format!(
                "{} requests are not deferred",
                request.method()
            )));
        }
        let mut state = self.state.lock().await;
        let id = state.next_id;
        state.records.push_back(DeferredWrite {
            id,
            request: RequestDescriptor::from_request(request),
            enqueued_at: Utc::now(),
            retry_count: 0,
        });
        state.next_id += 1;

        if let Err(e) = self.persist(&state).await {
            state.records.pop_back();
            state.next_id -= 1;
            return Err(e);
        }
        info!(id, method = %request.method(), url = %request.url(), "deferred write queued");
        metrics::counter!(telemetry::QUEUE_ENQUEUED_TOTAL).increment(1);
        metrics::gauge!(telemetry::QUEUE_DEPTH).set(state.records.len() as f64);
        Ok(id)
    }

    /// Snapshot of the queued records, head first.
    pub async fn list(&self) -> Vec<DeferredWrite> {
        self.state.lock().await.records.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Replay the queue through `network`.
    ///
    /// Returns `Err` only when the queue file could not be updated; delivery
    /// failures are reported in [`ReplayReport::failure`].
    pub async fn replay(&self, network: &dyn Network) -> Result<ReplayReport> {
        let _cycle = self.replay_lock.lock().await;
        let mut report = ReplayReport::default();

        loop {
            let head = self.state.lock().await.records.front().cloned();
            let Some(record) = head else {
                break;
            };

            let request = match record.request.to_request() {
                Ok(request) => request,
                Err(e) => {
                    warn!(id = record.id, error = %e, "discarding undeliverable deferred write");
                    self.remove(record.id).await?;
                    report.discarded.push(record.id);
                    continue;
                }
            };

            match deliver(network, record.id, &request).await {
                Ok(status) => {
                    debug!(id = record.id, status, "deferred write delivered");
                    metrics::counter!(telemetry::QUEUE_DELIVERIES_TOTAL, "status" => "delivered")
                        .increment(1);
                    self.remove(record.id).await?;
                    report.delivered.push(record.id);
                }
                Err(e) => {
                    warn!(id = record.id, error = %e, "deferred write failed, stopping replay");
                    metrics::counter!(telemetry::QUEUE_DELIVERIES_TOTAL, "status" => "failed")
                        .increment(1);
                    self.mark_failed(record.id).await?;
                    report.failure = Some(ReplayFailure {
                        id: record.id,
                        error: e,
                    });
                    break;
                }
            }
        }

        report.remaining = self.len().await;
        info!(
            delivered = report.delivered.len(),
            remaining = report.remaining,
            "replay cycle finished"
        );
        Ok(report)
    }

    async fn remove(&self, id: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(pos) = state.records.iter().position(|r| r.id == id) else {
            return Ok(());
        };
        if let Some(record) = state.records.remove(pos) {
            if let Err(e) = self.persist(&state).await {
                state.records.insert(pos, record);
                return Err(e);
            }
        }
        metrics::gauge!(telemetry::QUEUE_DEPTH).set(state.records.len() as f64);
        Ok(())
    }

    async fn mark_failed(&self, id: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(record) = state.records.iter_mut().find(|r| r.id == id) {
            record.retry_count += 1;
        }
        self.persist(&state).await
    }

    /// Write the queue file (tmp + rename). No-op for in-memory queues.
    async fn persist(&self, state: &QueueState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                HifadhiError::Store(format!(
                    "failed to create queue dir {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let json = serde_json::to_vec_pretty(state)?;
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json).await.map_err(|e| {
            HifadhiError::Store(format!(
                "failed to write queue file {}: {e}",
                tmp_path.display()
            ))
        })?;
        tokio::fs::rename(&tmp_path, path).await.map_err(|e| {
            HifadhiError::Store(format!(
                "failed to rename queue file {} → {}: {e}",
                tmp_path.display(),
                path.display()
            ))
        })?;
        Ok(())
    }
}

/// Send one record. Returns the status on delivery.
async fn deliver(network: &dyn Network, id: u64, request: &Request) -> Result<u16> {
    let response = network
        .fetch(request)
        .await
        .map_err(|e| HifadhiError::ReplayDelivery {
            id,
            reason: e.to_string(),
        })?;
    let status = response.status().as_u16();
    if is_transient_status(status) {
        return Err(HifadhiError::ReplayDelivery {
            id,
            reason: format!("server answered {status}"),
        });
    }
    Ok(status)
}
