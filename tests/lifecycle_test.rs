//! Worker lifecycle: install, activate, interception and retirement.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hifadhi::store::{CacheStorage, DiskStorage, MemoryStorage, Store};
use hifadhi::{
    AssetManifest, FetchEvent, HifadhiError, LifecycleState, Network, OfflineWorker, Request,
    Response, ResponseSource, Result, RetryConfig,
};
use reqwest::{Method, StatusCode};
use tempfile::TempDir;
use tokio::sync::Notify;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ORIGIN: &str = "https://harambee.example";

#[derive(Default)]
struct MockNetwork {
    routes: Mutex<HashMap<String, (u16, &'static str)>>,
    offline: AtomicBool,
    calls: AtomicU32,
}

impl MockNetwork {
    fn with_routes(routes: &[(&str, u16, &'static str)]) -> Arc<Self> {
        let network = Self::default();
        {
            let mut map = network.routes.lock().unwrap();
            for (path, status, body) in routes {
                map.insert(path.to_string(), (*status, *body));
            }
        }
        Arc::new(network)
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(HifadhiError::Network("connection refused".into()));
        }
        let found = self.routes.lock().unwrap().get(request.path()).copied();
        let (status, body) = found.unwrap_or((404, "not found"));
        Ok(Response::new(StatusCode::from_u16(status).unwrap(), body))
    }
}

/// Storage that cannot open one particular store.
struct BrokenApiStorage {
    inner: MemoryStorage,
    broken: String,
}

#[async_trait]
impl CacheStorage for BrokenApiStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Store>> {
        if name == self.broken {
            return Err(HifadhiError::Store("quota exceeded".into()));
        }
        self.inner.open(name).await
    }
    async fn names(&self) -> Result<Vec<String>> {
        self.inner.names().await
    }
    async fn delete(&self, name: &str) -> Result<bool> {
        self.inner.delete(name).await
    }
}

/// Holds requests for one path until released; everything else goes
/// straight through.
struct GatedNetwork {
    inner: Arc<MockNetwork>,
    gated: &'static str,
    arrived: Notify,
    release: Notify,
}

#[async_trait]
impl Network for GatedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        if request.path() == self.gated {
            self.arrived.notify_one();
            self.release.notified().await;
        }
        self.inner.fetch(request).await
    }
}

fn shell_routes() -> Vec<(&'static str, u16, &'static str)> {
    vec![
        ("/", 200, "<html>home</html>"),
        ("/index.html", 200, "<html>shell</html>"),
        ("/css/style.css", 200, "body{}"),
        ("/js/compiled/main.js", 200, "main()"),
        ("/manifest.json", 200, "{}"),
    ]
}

fn worker(storage: Arc<dyn CacheStorage>, network: Arc<MockNetwork>) -> OfflineWorker {
    OfflineWorker::builder()
        .origin(ORIGIN)
        .store_prefix("harambee")
        .generation("v2")
        .storage(storage)
        .network(network)
        .install_retry(RetryConfig::disabled())
        .build()
        .unwrap()
}

fn get(path: &str) -> Request {
    Request::get(&format!("{ORIGIN}{path}")).unwrap()
}

async fn entry_count(storage: &dyn CacheStorage, name: &str) -> usize {
    storage.open(name).await.unwrap().keys().await.unwrap().len()
}

#[tokio::test]
async fn fetch_before_activation_passes_through() {
    let network = MockNetwork::with_routes(&shell_routes());
    let worker = worker(Arc::new(MemoryStorage::new()), network.clone());

    let outcome = worker.handle_fetch(&FetchEvent::new(get("/index.html"))).await;
    assert!(outcome.is_pass_through());

    worker.install(&AssetManifest::default()).await.unwrap();
    let outcome = worker.handle_fetch(&FetchEvent::new(get("/index.html"))).await;
    assert!(outcome.is_pass_through());
    assert_eq!(worker.state(), LifecycleState::Waiting);
}

#[tokio::test]
async fn install_caches_every_asset() {
    let storage = Arc::new(MemoryStorage::new());
    let network = MockNetwork::with_routes(&shell_routes());
    let worker = worker(storage.clone(), network.clone());

    let report = worker.install(&AssetManifest::default()).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.cached.len(), 5);
    assert_eq!(worker.state(), LifecycleState::Waiting);
    assert!(worker.skip_waiting());
    assert!(!worker.clients_claimed());
    assert_eq!(entry_count(storage.as_ref(), "harambee-v2").await, 5);

    let entry = storage
        .open("harambee-v2")
        .await
        .unwrap()
        .get(&get("/css/style.css").key().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&entry.body[..], b"body{}");
}

#[tokio::test]
async fn install_partial_failure_keeps_the_rest() {
    let storage = Arc::new(MemoryStorage::new());
    let mut routes = shell_routes();
    routes.retain(|(path, _, _)| *path != "/manifest.json");
    let worker = worker(storage.clone(), MockNetwork::with_routes(&routes));

    let report = worker.install(&AssetManifest::default()).await.unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.cached.len(), 4);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, "/manifest.json");
    assert!(matches!(
        report.failures[0].error,
        HifadhiError::InstallAssetFetch { .. }
    ));
    assert_eq!(worker.state(), LifecycleState::Waiting);
    assert_eq!(entry_count(storage.as_ref(), "harambee-v2").await, 4);
}

#[tokio::test]
async fn install_while_offline_caches_nothing() {
    let storage = Arc::new(MemoryStorage::new());
    let network = MockNetwork::with_routes(&shell_routes());
    network.set_offline(true);
    let worker = worker(storage.clone(), network);

    let report = worker.install(&AssetManifest::default()).await.unwrap();
    assert!(report.cached.is_empty());
    assert_eq!(report.failures.len(), 5);
    assert_eq!(worker.state(), LifecycleState::Waiting);
}

#[tokio::test]
async fn install_twice_is_rejected() {
    let worker = worker(
        Arc::new(MemoryStorage::new()),
        MockNetwork::with_routes(&shell_routes()),
    );
    worker.install(&AssetManifest::default()).await.unwrap();
    let err = worker.install(&AssetManifest::default()).await.unwrap_err();
    assert!(matches!(err, HifadhiError::InvalidState("install")));
}

#[tokio::test]
async fn install_warms_api_store() {
    let storage = Arc::new(MemoryStorage::new());
    let mut routes = shell_routes();
    routes.push(("/api/clubs", 200, "[]"));
    let worker = worker(storage.clone(), MockNetwork::with_routes(&routes));

    let manifest = AssetManifest::default().api_endpoint("/api/clubs");
    let report = worker.install(&manifest).await.unwrap();

    assert_eq!(report.warmed, vec!["/api/clubs".to_string()]);
    assert_eq!(entry_count(storage.as_ref(), "harambee-api-v2").await, 1);
}

#[tokio::test]
async fn unavailable_store_is_reported_not_fatal() {
    let storage = Arc::new(BrokenApiStorage {
        inner: MemoryStorage::new(),
        broken: "harambee-api-v2".to_string(),
    });
    let mut routes = shell_routes();
    routes.push(("/api/clubs", 200, "[]"));
    let worker = worker(storage.clone(), MockNetwork::with_routes(&routes));

    let manifest = AssetManifest::default().api_endpoint("/api/clubs");
    let report = worker.install(&manifest).await.unwrap();

    assert_eq!(report.cached.len(), 5);
    assert!(report.warmed.is_empty());
    assert_eq!(report.store_errors.len(), 1);
    assert!(matches!(
        report.store_errors[0],
        HifadhiError::StoreOpen { .. }
    ));
    assert_eq!(worker.state(), LifecycleState::Waiting);
}

#[tokio::test]
async fn install_bypasses_http_caches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.html"))
        .and(header("cache-control", "no-cache"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html/>"))
        .expect(1)
        .mount(&server)
        .await;

    let worker = OfflineWorker::builder()
        .origin(server.uri())
        .install_retry(RetryConfig::disabled())
        .build()
        .unwrap();
    let report = worker
        .install(&AssetManifest::new(["/index.html"]))
        .await
        .unwrap();
    assert_eq!(report.cached, vec!["/index.html".to_string()]);
}

#[tokio::test]
async fn activate_evicts_older_generations() {
    let storage = Arc::new(MemoryStorage::new());
    for stale in ["harambee-v1", "harambee-api-v1", "leftover"] {
        storage.open(stale).await.unwrap();
    }
    let worker = worker(storage.clone(), MockNetwork::with_routes(&shell_routes()));
    worker.install(&AssetManifest::default()).await.unwrap();

    let report = worker.activate().await.unwrap();
    let mut deleted = report.deleted.clone();
    deleted.sort();
    assert_eq!(deleted, vec!["harambee-api-v1", "harambee-v1", "leftover"]);
    assert_eq!(worker.state(), LifecycleState::Active);
    assert!(worker.clients_claimed());

    let mut names = storage.names().await.unwrap();
    names.sort();
    assert_eq!(names, vec!["harambee-api-v2", "harambee-v2"]);

    // A second activation is harmless.
    let report = worker.activate().await.unwrap();
    assert!(report.deleted.is_empty());
    assert_eq!(worker.state(), LifecycleState::Active);
}

#[tokio::test]
async fn in_flight_fetch_does_not_recreate_evicted_store() {
    let dir = TempDir::new().unwrap();
    let storage: Arc<dyn CacheStorage> = Arc::new(DiskStorage::new(dir.path()));
    let mut routes = shell_routes();
    routes.push(("/css/new.css", 200, "h1{}"));
    let network = Arc::new(GatedNetwork {
        inner: MockNetwork::with_routes(&routes),
        gated: "/css/new.css",
        arrived: Notify::new(),
        release: Notify::new(),
    });

    let old = OfflineWorker::builder()
        .origin(ORIGIN)
        .store_prefix("harambee")
        .generation("v1")
        .storage(storage.clone())
        .network(network.clone())
        .install_retry(RetryConfig::disabled())
        .build()
        .unwrap();
    old.install(&AssetManifest::default()).await.unwrap();
    old.activate().await.unwrap();
    let new = worker(storage.clone(), network.inner.clone());

    // v2 takes over while v1 is still waiting on the network.
    let event = FetchEvent::new(get("/css/new.css"));
    let (outcome, ()) = tokio::join!(
        async {
            let outcome = old.handle_fetch(&event).await;
            event.settled().await;
            outcome
        },
        async {
            network.arrived.notified().await;
            new.install(&AssetManifest::default()).await.unwrap();
            new.activate().await.unwrap();
            network.release.notify_one();
        },
    );

    let response = outcome.into_response().unwrap();
    assert_eq!(response.source(), ResponseSource::Network);
    assert_eq!(response.text().await.unwrap(), "h1{}");

    let mut names = storage.names().await.unwrap();
    names.sort();
    assert_eq!(names, vec!["harambee-api-v2", "harambee-v2"]);
    assert!(!dir.path().join("harambee-v1").exists());
}

#[tokio::test]
async fn install_creates_both_live_stores() {
    let storage = Arc::new(MemoryStorage::new());
    let worker = worker(storage.clone(), MockNetwork::with_routes(&shell_routes()));
    worker.install(&AssetManifest::new(Vec::<String>::new())).await.unwrap();

    assert!(storage.has("harambee-v2").await.unwrap());
    assert!(storage.has("harambee-api-v2").await.unwrap());
}

#[tokio::test]
async fn activate_before_install_fails() {
    let worker = worker(
        Arc::new(MemoryStorage::new()),
        MockNetwork::with_routes(&shell_routes()),
    );
    let err = worker.activate().await.unwrap_err();
    assert!(matches!(err, HifadhiError::InvalidState("activate")));
    assert_eq!(worker.state(), LifecycleState::Parsed);
}

#[tokio::test]
async fn active_worker_serves_installed_assets_offline() {
    let network = MockNetwork::with_routes(&shell_routes());
    let worker = worker(Arc::new(MemoryStorage::new()), network.clone());
    worker.install(&AssetManifest::default()).await.unwrap();
    worker.activate().await.unwrap();
    network.set_offline(true);

    let outcome = worker
        .handle_fetch(&FetchEvent::new(get("/js/compiled/main.js")))
        .await;
    let response = outcome.into_response().unwrap();
    assert_eq!(response.source(), ResponseSource::Cache);
    assert_eq!(response.text().await.unwrap(), "main()");

    let navigation = Request::navigate(&format!("{ORIGIN}/matches/12")).unwrap();
    let response = worker
        .handle_fetch(&FetchEvent::new(navigation))
        .await
        .into_response()
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "<html>shell</html>");
}

#[tokio::test]
async fn mutating_and_streaming_requests_are_not_intercepted() {
    let network = MockNetwork::with_routes(&shell_routes());
    let worker = worker(Arc::new(MemoryStorage::new()), network.clone());
    worker.install(&AssetManifest::default()).await.unwrap();
    worker.activate().await.unwrap();
    let before = network.calls();

    let post = Request::parse(Method::POST, &format!("{ORIGIN}/api/predictions"))
        .unwrap()
        .body("{\"home\":2}");
    assert!(worker.handle_fetch(&FetchEvent::new(post)).await.is_pass_through());

    let events = get("/api/matches/7/events");
    assert!(worker.handle_fetch(&FetchEvent::new(events)).await.is_pass_through());

    assert_eq!(network.calls(), before);
}

#[tokio::test]
async fn api_requests_fall_back_to_offline_body() {
    let network = MockNetwork::with_routes(&shell_routes());
    let worker = worker(Arc::new(MemoryStorage::new()), network.clone());
    worker.install(&AssetManifest::default()).await.unwrap();
    worker.activate().await.unwrap();
    network.set_offline(true);

    let response = worker
        .handle_fetch(&FetchEvent::new(get("/api/standings")))
        .await
        .into_response()
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.source(), ResponseSource::Fallback);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["offline"], true);
}

#[tokio::test]
async fn fetched_assets_are_stored_after_settling() {
    let storage = Arc::new(MemoryStorage::new());
    let mut routes = shell_routes();
    routes.push(("/img/flag.png", 200, "png"));
    let worker = worker(storage.clone(), MockNetwork::with_routes(&routes));
    worker.install(&AssetManifest::default()).await.unwrap();
    worker.activate().await.unwrap();

    let event = FetchEvent::new(get("/img/flag.png"));
    let response = worker.handle_fetch(&event).await.into_response().unwrap();
    assert_eq!(response.source(), ResponseSource::Network);
    event.settled().await;

    assert_eq!(entry_count(storage.as_ref(), "harambee-v2").await, 6);
}

#[tokio::test]
async fn retired_worker_stops_intercepting() {
    let worker = worker(
        Arc::new(MemoryStorage::new()),
        MockNetwork::with_routes(&shell_routes()),
    );
    worker.install(&AssetManifest::default()).await.unwrap();
    worker.activate().await.unwrap();

    worker.retire();
    assert_eq!(worker.state(), LifecycleState::Redundant);
    assert!(!worker.clients_claimed());
    assert!(
        worker
            .handle_fetch(&FetchEvent::new(get("/index.html")))
            .await
            .is_pass_through()
    );
    assert!(worker.activate().await.is_err());
}

#[tokio::test]
async fn resume_requires_installed_generation() {
    let storage = Arc::new(MemoryStorage::new());
    let network = MockNetwork::with_routes(&shell_routes());

    let fresh = worker(storage.clone(), network.clone());
    assert!(matches!(
        fresh.resume().await,
        Err(HifadhiError::InvalidState("resume"))
    ));

    let installer = worker(storage.clone(), network.clone());
    installer.install(&AssetManifest::default()).await.unwrap();
    installer.activate().await.unwrap();

    let restarted = worker(storage.clone(), network);
    restarted.resume().await.unwrap();
    assert_eq!(restarted.state(), LifecycleState::Active);
    assert!(restarted.clients_claimed());
    let response = restarted
        .handle_fetch(&FetchEvent::new(get("/css/style.css")))
        .await
        .into_response()
        .unwrap();
    assert_eq!(response.source(), ResponseSource::Cache);
}
