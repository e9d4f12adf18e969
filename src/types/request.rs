//! Intercepted request and its normalized store identity

use std::fmt;

use bytes::Bytes;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

use crate::{HifadhiError, Result};

/// Methods whose responses may be stored and served back.
fn is_retrieval_method(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

/// What kind of resource the client expects back.
///
/// Mirrors the `Sec-Fetch-Dest` vocabulary, collapsed to the variants the
/// engine distinguishes. Only [`Destination::Document`] changes behaviour:
/// document requests may be answered with the cached application shell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    #[default]
    Empty,
}

impl Destination {
    /// Parse a `Sec-Fetch-Dest` header value.
    pub fn from_fetch_dest(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" | "iframe" | "frame" => Destination::Document,
            "script" | "worker" | "sharedworker" => Destination::Script,
            "style" => Destination::Style,
            "image" => Destination::Image,
            "font" => Destination::Font,
            "manifest" => Destination::Manifest,
            _ => Destination::Empty,
        }
    }

    /// Infer the destination from request headers.
    ///
    /// `Sec-Fetch-Dest` wins when present; otherwise an `Accept` header
    /// asking for HTML marks a document request.
    pub fn infer(headers: &HeaderMap) -> Self {
        if let Some(dest) = headers
            .get("sec-fetch-dest")
            .and_then(|v| v.to_str().ok())
        {
            return Self::from_fetch_dest(dest);
        }
        let wants_html = headers
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains("text/html"));
        if wants_html {
            Destination::Document
        } else {
            Destination::Empty
        }
    }
}

/// An outgoing request seen by the worker.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    destination: Destination,
    body: Option<Bytes>,
}

impl Request {
    /// Create a request with no headers and no body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            destination: Destination::Empty,
            body: None,
        }
    }

    /// Parse `url` and create a request for it.
    pub fn parse(method: Method, url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| HifadhiError::InvalidRequest(format!("invalid URL '{url}': {e}")))?;
        Ok(Self::new(method, url))
    }

    /// Shorthand for a `GET` request.
    pub fn get(url: &str) -> Result<Self> {
        Self::parse(Method::GET, url)
    }

    /// A top-level navigation: `GET` with an HTML `Accept` header.
    pub fn navigate(url: &str) -> Result<Self> {
        Ok(Self::get(url)?
            .header(ACCEPT, HeaderValue::from_static("text/html"))
            .destination(Destination::Document))
    }

    /// Add a header. Re-infers the destination unless one was set explicitly.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        if self.destination == Destination::Empty {
            self.destination = Destination::infer(&self.headers);
        }
        self
    }

    /// Set the expected destination.
    pub fn destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Attach a request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn expected_destination(&self) -> Destination {
        self.destination
    }

    pub fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Whether the request only reads (and may therefore be cached).
    ///
    /// Only `GET` qualifies for interception; `HEAD` is accepted as a store
    /// key but the router never instruments it.
    pub fn is_retrieval(&self) -> bool {
        self.method == Method::GET
    }

    /// The store identity of this request.
    pub fn key(&self) -> Result<RequestKey> {
        RequestKey::new(&self.method, &self.url)
    }
}

/// Normalized request identity used as the store key.
///
/// Method plus URL with the fragment dropped. Only retrieval-safe methods
/// can form a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    method: String,
    url: String,
}

impl RequestKey {
    /// Build a key, rejecting mutating methods.
    pub fn new(method: &Method, url: &Url) -> Result<Self> {
        if !is_retrieval_method(method) {
            return Err(HifadhiError::InvalidRequest(format!(
                "{method} requests cannot be stored"
            )));
        }
        let mut url = url.clone();
        url.set_fragment(None);
        Ok(Self {
            method: method.as_str().to_string(),
            url: url.into(),
        })
    }

    /// Key for a plain `GET` of `url`.
    pub fn get(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: Method::GET.as_str().to_string(),
            url: url.into(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
