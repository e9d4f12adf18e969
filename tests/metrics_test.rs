//! Tests for metrics integration.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter. Store writes happen
//! on spawned tasks outside the local recorder scope, so only metrics
//! recorded inline by the handlers are asserted here.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use reqwest::StatusCode;

use hifadhi::store::{CacheStorage, MemoryStorage, Store};
use hifadhi::strategy::{Bypass, Strategy};
use hifadhi::telemetry;
use hifadhi::{
    EventLifetime, FetchEvent, HifadhiError, Network, OfflineWorker, Request, Response, Result,
    RetryConfig, RetryingNetwork, Snapshot,
};

const ORIGIN: &str = "https://harambee.example";

// ============================================================================
// Mock network
// ============================================================================

#[derive(Default)]
struct SwitchableNetwork {
    offline: AtomicBool,
}

#[async_trait]
impl Network for SwitchableNetwork {
    async fn fetch(&self, _request: &Request) -> Result<Response> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(HifadhiError::Network("no route to host".into()));
        }
        Ok(Response::new(StatusCode::OK, "fresh"))
    }
}

/// Fails the first call, then succeeds.
#[derive(Default)]
struct FlakyNetwork {
    calls: AtomicU32,
}

#[async_trait]
impl Network for FlakyNetwork {
    async fn fetch(&self, _request: &Request) -> Result<Response> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(HifadhiError::Network("connection reset".into()));
        }
        Ok(Response::new(StatusCode::OK, "ok"))
    }
}

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

// ============================================================================
// Helpers
// ============================================================================

/// Sum all counter values matching a given metric name.
fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    counter_where(snapshot, name, |_| true)
}

/// Sum counter values of `name` carrying `label = value`.
fn counter_labelled(snapshot: &SnapshotVec, name: &str, label: &str, value: &str) -> u64 {
    counter_where(snapshot, name, |key| {
        key.labels()
            .any(|l| l.key() == label && l.value() == value)
    })
}

fn counter_where(
    snapshot: &SnapshotVec,
    name: &str,
    filter: impl Fn(&metrics::Key) -> bool,
) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| {
            key.kind() == MetricKind::Counter && key.key().name() == name && filter(key.key())
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Check if any histogram entries exist for a given metric name.
fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

/// A resumed worker whose static store already holds the shell.
async fn resumed_worker(network: Arc<SwitchableNetwork>) -> OfflineWorker {
    let storage = Arc::new(MemoryStorage::new());
    let shell = Snapshot::capture(&Response::new(StatusCode::OK, "<html/>")).unwrap();
    storage
        .open("hifadhi-v1")
        .await
        .unwrap()
        .put(get("/index.html").key().unwrap(), shell)
        .await
        .unwrap();

    let worker = OfflineWorker::builder()
        .origin(ORIGIN)
        .storage(storage)
        .network(network)
        .build()
        .unwrap();
    worker.resume().await.unwrap();
    worker
}

fn get(path: &str) -> Request {
    Request::get(&format!("{ORIGIN}{path}")).unwrap()
}

// ============================================================================
// Tests
// ============================================================================

/// Runs async code within a local recorder scope on the multi-thread runtime.
///
/// `block_in_place` ensures the sync `with_local_recorder` closure stays
/// on the current thread while `block_on` drives the inner async work.
#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn cache_hit_records_metrics() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let served_from_cache = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let worker = resumed_worker(Arc::new(SwitchableNetwork::default())).await;
                let outcome = worker.handle_fetch(&FetchEvent::new(get("/index.html"))).await;
                outcome.response().map(|r| r.source().as_str())
            })
        })
    });
    assert_eq!(served_from_cache, Some("cache"));

    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL), 1);
    assert_eq!(
        counter_labelled(&snapshot, telemetry::REQUESTS_TOTAL, "route", "static"),
        1
    );
    assert_eq!(
        counter_labelled(&snapshot, telemetry::CACHE_HITS_TOTAL, "store", "static"),
        1
    );
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL), 0);
    assert!(
        has_histogram(&snapshot, telemetry::REQUEST_DURATION_SECONDS),
        "expected a duration histogram entry"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn offline_api_request_records_fallback() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let network = Arc::new(SwitchableNetwork::default());
                network.offline.store(true, Ordering::SeqCst);
                let worker = resumed_worker(network).await;
                worker
                    .handle_fetch(&FetchEvent::new(get("/api/standings")))
                    .await;
            })
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(
        counter_labelled(&snapshot, telemetry::REQUESTS_TOTAL, "source", "fallback"),
        1
    );
    assert_eq!(
        counter_labelled(&snapshot, telemetry::CACHE_MISSES_TOTAL, "store", "api"),
        1
    );
    assert_eq!(
        counter_labelled(&snapshot, telemetry::FALLBACKS_TOTAL, "kind", "offline_json"),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn offline_navigation_records_shell_fallback() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let network = Arc::new(SwitchableNetwork::default());
                network.offline.store(true, Ordering::SeqCst);
                let worker = resumed_worker(network).await;
                let navigation = Request::navigate(&format!("{ORIGIN}/clubs/3")).unwrap();
                worker.handle_fetch(&FetchEvent::new(navigation)).await;
            })
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(
        counter_labelled(&snapshot, telemetry::FALLBACKS_TOTAL, "kind", "shell"),
        1
    );
    assert_eq!(
        counter_labelled(&snapshot, telemetry::REQUESTS_TOTAL, "source", "cache"),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn ignored_request_is_counted_as_passthrough() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let worker = resumed_worker(Arc::new(SwitchableNetwork::default())).await;
                worker
                    .handle_fetch(&FetchEvent::new(get("/api/matches/9/events")))
                    .await;
            })
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(
        counter_labelled(&snapshot, telemetry::REQUESTS_TOTAL, "source", "passthrough"),
        1
    );
    assert!(!has_histogram(
        &snapshot,
        telemetry::REQUEST_DURATION_SECONDS
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn failed_bypass_is_not_counted_as_fallback() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let status = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let network = Arc::new(SwitchableNetwork::default());
                network.offline.store(true, Ordering::SeqCst);
                Bypass::new(network)
                    .respond(&get("/live/scores"), &EventLifetime::new())
                    .await
                    .status()
            })
        })
    });
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::FALLBACKS_TOTAL), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn retries_are_labelled_by_operation() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let result = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let network = RetryingNetwork::new(
                    Arc::new(FlakyNetwork::default()),
                    RetryConfig::new().initial_delay(Duration::from_millis(1)),
                );
                network.fetch(&get("/index.html")).await.map(|r| r.status())
            })
        })
    });
    assert_eq!(result.unwrap(), StatusCode::OK);

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_labelled(&snapshot, telemetry::RETRIES_TOTAL, "operation", "fetch"),
        1
    );
}

#[tokio::test]
async fn metrics_are_noop_without_recorder() {
    // Verify no panics when no recorder is installed.
    let worker = resumed_worker(Arc::new(SwitchableNetwork::default())).await;
    let event = FetchEvent::new(get("/css/app.css"));
    worker.handle_fetch(&event).await;
    event.settled().await;
}
