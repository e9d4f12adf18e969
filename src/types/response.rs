//! Responses, bodies, and stored snapshots

use std::fmt;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{HifadhiError, Result};

/// A streamed response body.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Response body: either fully buffered or a live stream.
///
/// Network responses arrive as [`Body::Stream`]. The caching strategies
/// buffer them before storing; the bypass strategy hands the stream on
/// untouched.
pub enum Body {
    Full(Bytes),
    Stream(BodyStream),
}

impl Body {
    pub fn empty() -> Self {
        Body::Full(Bytes::new())
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Body::Stream(_))
    }

    /// The buffered bytes, if the body is not a stream.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Body::Full(bytes) => Some(bytes),
            Body::Stream(_) => None,
        }
    }

    /// Collect the whole body.
    pub async fn into_bytes(self) -> Result<Bytes> {
        match self {
            Body::Full(bytes) => Ok(bytes),
            Body::Stream(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Full(bytes)
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::Full(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Full(Bytes::from(s))
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Body::Full(Bytes::from(v))
    }
}

/// Where a response handed back to the client came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Fetched from the network during this event.
    Network,
    /// Served from a store entry.
    Cache,
    /// Synthesized by the engine.
    Fallback,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::Fallback => "fallback",
        }
    }
}

/// A response returned to the intercepted client.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
    source: ResponseSource,
}

impl Response {
    /// A network response.
    pub fn new(status: StatusCode, body: impl Into<Body>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            source: ResponseSource::Network,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_source(mut self, source: ResponseSource) -> Self {
        self.source = source;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn source(&self) -> ResponseSource {
        self.source
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    /// Buffer a streamed body so the response can be snapshotted.
    pub async fn buffered(self) -> Result<Self> {
        if !self.body.is_stream() {
            return Ok(self);
        }
        let bytes = self.body.into_bytes().await?;
        Ok(Self {
            status: self.status,
            headers: self.headers,
            body: Body::Full(bytes),
            source: self.source,
        })
    }

    /// Collect the body as UTF-8 text.
    pub async fn text(self) -> Result<String> {
        let bytes = self.body.into_bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| HifadhiError::Stream(format!("body is not UTF-8: {e}")))
    }

    /// Collect the body and parse it as JSON.
    pub async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        let bytes = self.body.into_bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Immutable copy of a response as stored in a [`Store`](crate::store::Store).
///
/// Shares the body buffer with the response it was captured from, so the
/// stored copy and the returned response are independent readers of the same
/// bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(with = "super::base64_body")]
    pub body: Bytes,
    pub stored_at: DateTime<Utc>,
}

impl Snapshot {
    /// Capture a buffered response. Returns `None` for streamed bodies.
    pub fn capture(response: &Response) -> Option<Self> {
        let body = response.body.as_bytes()?.clone();
        let headers = response
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        Some(Self {
            status: response.status.as_u16(),
            headers,
            body,
            stored_at: Utc::now(),
        })
    }

    /// Rebuild a response marked as served from cache.
    pub fn to_response(&self) -> Response {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => debug!(header = %name, "dropping unrepresentable stored header"),
            }
        }
        Response {
            status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            headers,
            body: Body::Full(self.body.clone()),
            source: ResponseSource::Cache,
        }
    }
}
