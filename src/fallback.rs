//! Offline fallback responses.
//!
//! When neither the network nor a store can answer, the engine synthesizes
//! a response instead of failing. API callers get a structured JSON body
//! they can detect:
//!
//! ```json
//! {"offline": true, "error": "Uko nje ya mtandao. ...", "error_en": "You are offline. ..."}
//! ```
//!
//! Everything else gets a minimal plain-text "unavailable" response.

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::telemetry;
use crate::types::{Response, ResponseSource};

/// Default localized message (Swahili).
pub const DEFAULT_MESSAGE: &str = "Uko nje ya mtandao. Data iliyohifadhiwa inaonyeshwa.";

/// Default English message.
pub const DEFAULT_MESSAGE_EN: &str = "You are offline. Showing cached data.";

/// Body of the generic unavailable response.
pub const UNAVAILABLE_BODY: &str = "Offline";

/// JSON body returned to API callers while offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineBody {
    pub offline: bool,
    pub error: String,
    pub error_en: String,
}

/// Generator for synthesized offline responses.
///
/// ```rust
/// # use hifadhi::fallback::OfflineFallback;
/// let fallback = OfflineFallback::new().message("Offline kabisa");
/// assert_eq!(fallback.status, 503);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OfflineFallback {
    /// Status of every synthesized response. Default: 503.
    pub status: u16,
    /// Localized human-readable message.
    pub message: String,
    /// English message.
    pub message_en: String,
}

impl Default for OfflineFallback {
    fn default() -> Self {
        Self {
            status: 503,
            message: DEFAULT_MESSAGE.to_string(),
            message_en: DEFAULT_MESSAGE_EN.to_string(),
        }
    }
}

impl OfflineFallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn message_en(mut self, message: impl Into<String>) -> Self {
        self.message_en = message.into();
        self
    }

    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
    }

    /// The structured offline response for API requests.
    pub fn offline_response(&self) -> Response {
        metrics::counter!(telemetry::FALLBACKS_TOTAL, "kind" => "offline_json").increment(1);
        let body = OfflineBody {
            offline: true,
            error: self.message.clone(),
            error_en: self.message_en.clone(),
        };
        // Serializing three plain fields cannot fail.
        let json = serde_json::to_vec(&body).unwrap_or_default();
        Response::new(self.status_code(), json)
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_source(ResponseSource::Fallback)
    }

    /// The generic unavailable response for everything else.
    pub fn unavailable_response(&self) -> Response {
        metrics::counter!(telemetry::FALLBACKS_TOTAL, "kind" => "unavailable").increment(1);
        self.unavailable()
    }

    /// The unavailable response without counting it as a fallback. Used
    /// where a transport failure is reported rather than papered over.
    pub(crate) fn unavailable(&self) -> Response {
        Response::new(self.status_code(), UNAVAILABLE_BODY)
            .with_header(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )
            .with_source(ResponseSource::Fallback)
    }
}
