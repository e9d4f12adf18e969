//! Hifadhi error types

use std::time::Duration;

/// Hifadhi error types
#[derive(Debug, thiserror::Error)]
pub enum HifadhiError {
    // Network errors
    /// The network could not be reached (DNS, connect, timeout, reset).
    /// This is the expected offline condition and drives the fallback chains.
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    // Lifecycle errors
    #[error("failed to fetch install asset {url}: {reason}")]
    InstallAssetFetch { url: String, reason: String },

    #[error("failed to open store '{name}': {reason}")]
    StoreOpen { name: String, reason: String },

    #[error("deferred write {id} not delivered: {reason}")]
    ReplayDelivery { id: u64, reason: String },

    // Storage errors
    #[error("store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("stream error: {0}")]
    Stream(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("worker is not in a state that allows {0}")]
    InvalidState(&'static str),
}

impl HifadhiError {
    /// Whether the error is worth retrying later.
    ///
    /// Transport failures, timeouts, rate limiting and server-side statuses
    /// (408, 429, 5xx) are transient. Everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            HifadhiError::Network(_) | HifadhiError::Http(_) | HifadhiError::RateLimited { .. } => {
                true
            }
            HifadhiError::Api { status, .. } => is_transient_status(*status),
            _ => false,
        }
    }

    /// Server-provided retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            HifadhiError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Whether this error means the network is unreachable (as opposed to an
    /// HTTP-level rejection).
    pub fn is_offline(&self) -> bool {
        matches!(self, HifadhiError::Network(_) | HifadhiError::Http(_))
    }
}

/// HTTP statuses that indicate the server may accept the same request later.
pub(crate) fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

impl From<reqwest::Error> for HifadhiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            HifadhiError::Network(err.to_string())
        } else if let Some(status) = err.status() {
            HifadhiError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            HifadhiError::Http(err.to_string())
        }
    }
}

/// Result type alias for Hifadhi operations
pub type Result<T> = std::result::Result<T, HifadhiError>;
