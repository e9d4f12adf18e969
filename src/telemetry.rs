//! Telemetry metric name constants.
//!
//! Centralised metric names for hifadhi operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `hifadhi_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `route`: policy class ("static", "api", "bypass", "ignore")
//! - `source`: where a response came from ("network", "cache", "fallback",
//!   or "passthrough" for ignored requests)
//! - `store`: store kind ("static", "api")
//! - `kind`: fallback kind ("offline_json", "shell", "unavailable"). Failed
//!   streaming requests are not fallbacks and are not counted.

/// Total fetch events handled by the worker.
///
/// Labels: `route`, `source`.
pub const REQUESTS_TOTAL: &str = "hifadhi_requests_total";

/// Time spent producing a response, in seconds.
///
/// Labels: `route`.
pub const REQUEST_DURATION_SECONDS: &str = "hifadhi_request_duration_seconds";

/// Total store lookups that found an entry.
///
/// Labels: `store`.
pub const CACHE_HITS_TOTAL: &str = "hifadhi_cache_hits_total";

/// Total store lookups that found nothing.
///
/// Labels: `store`.
pub const CACHE_MISSES_TOTAL: &str = "hifadhi_cache_misses_total";

/// Total snapshots written into a store.
///
/// Labels: `store`, `status` ("ok" | "error" | "skipped"). Writes are
/// skipped when the store no longer exists.
pub const STORE_WRITES_TOTAL: &str = "hifadhi_store_writes_total";

/// Total synthesized responses.
///
/// Labels: `kind`.
pub const FALLBACKS_TOTAL: &str = "hifadhi_fallbacks_total";

/// Total stores deleted during activation.
pub const STORES_EVICTED_TOTAL: &str = "hifadhi_stores_evicted_total";

/// Total install asset fetches.
///
/// Labels: `status` ("ok" | "error").
pub const INSTALL_ASSETS_TOTAL: &str = "hifadhi_install_assets_total";

/// Total retry attempts on the network (not counting the initial request).
///
/// Labels: `operation` ("fetch").
pub const RETRIES_TOTAL: &str = "hifadhi_retries_total";

/// Total deferred writes accepted into the queue.
pub const QUEUE_ENQUEUED_TOTAL: &str = "hifadhi_queue_enqueued_total";

/// Total deferred write delivery attempts during replay.
///
/// Labels: `status` ("delivered" | "failed").
pub const QUEUE_DELIVERIES_TOTAL: &str = "hifadhi_queue_deliveries_total";

/// Number of records waiting in the deferred write queue.
pub const QUEUE_DEPTH: &str = "hifadhi_queue_depth";
