//! Hifadhi - offline-first request interception and caching
//!
//! This crate sits between an application and the network. Every outgoing
//! request is classified by a [`RouteTable`] and answered by a caching
//! strategy, so the application keeps working on flaky or absent
//! connectivity:
//!
//! - static assets are served cache-first from a versioned store,
//! - API reads go network-first with the last good answer as fallback,
//! - streaming endpoints bypass caching entirely,
//! - mutating requests made while offline can be queued and replayed.
//!
//! # Example
//!
//! ```rust,no_run
//! use hifadhi::{AssetManifest, FetchEvent, FetchOutcome, OfflineWorker, Request};
//!
//! #[tokio::main]
//! async fn main() -> hifadhi::Result<()> {
//!     let worker = OfflineWorker::builder()
//!         .origin("https://harambee.example")
//!         .store_prefix("harambee")
//!         .build()?;
//!
//!     worker.install(&AssetManifest::default()).await?;
//!     worker.activate().await?;
//!
//!     let event = FetchEvent::new(Request::get("https://harambee.example/api/matches")?);
//!     match worker.handle_fetch(&event).await {
//!         FetchOutcome::Respond(response) => {
//!             println!("{} from {}", response.status(), response.source().as_str());
//!         }
//!         FetchOutcome::PassThrough => println!("not intercepted"),
//!     }
//!     // Store writes started by the fetch finish here.
//!     event.settled().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod fallback;
pub mod network;
pub mod notification;
pub mod queue;
pub mod router;
pub mod store;
pub mod strategy;
pub mod telemetry;
pub mod types;
mod version;
pub mod worker;

// Re-export main types at crate root
pub use config::Config;
pub use error::{HifadhiError, Result};
pub use event::{EventLifetime, FetchEvent, FetchOutcome, PushEvent, SyncEvent};
pub use fallback::OfflineFallback;
pub use network::{HttpNetwork, Network, RetryConfig, RetryingNetwork};
pub use notification::{LogNotifier, Notification, Notifier};
pub use queue::{DeferredQueue, DeferredWrite, ReplayReport};
pub use router::{PolicyClass, Route, RouteTable};
pub use store::{CacheStorage, DiskStorage, MemoryStorage, Store, StoreSet};
pub use strategy::Strategy;
pub use version::{GIT_BRANCH, GIT_SHA, PKG_VERSION, version_string};
pub use worker::{
    ActivateReport, AssetManifest, InstallReport, LifecycleState, OfflineWorker,
    OfflineWorkerBuilder,
};

// Re-export all types
pub use types::{
    Body, Destination, Request, RequestKey, Response, ResponseSource, Snapshot,
};
