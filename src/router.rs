//! Route classification: which policy handles a request.
//!
//! A [`RouteTable`] is an ordered list of [`RouteRule`]s; the first rule
//! whose method filter and path matcher both match decides the [`Route`].
//! If no rule matches, the request is ignored (passed straight through).
//!
//! The standard table, in priority order:
//!
//! 1. any non-`GET` method → [`Route::Ignore`]
//! 2. path contains a streaming pattern (default `/events`) → [`Route::Ignore`]
//! 3. extra rules from configuration, in order
//! 4. path starts with the API prefix (default `/api/`) → [`PolicyClass::ApiNetworkFirst`]
//! 5. everything else → [`PolicyClass::StaticCacheFirst`]
//!
//! Streaming paths are excluded before the API prefix is considered, so an
//! event stream under `/api/` is never buffered.

use serde::{Deserialize, Serialize};

use crate::types::Request;

/// Default API namespace prefix.
pub const DEFAULT_API_PREFIX: &str = "/api/";

/// Default live-streaming path pattern.
pub const DEFAULT_STREAMING_PATTERN: &str = "/events";

/// Caching strategy assigned to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyClass {
    /// Serve from the static store; fetch and store on miss.
    StaticCacheFirst,
    /// Fetch first; fall back to the API store, then to the offline body.
    ApiNetworkFirst,
    /// Forward to the network untouched.
    StreamingBypass,
}

impl PolicyClass {
    /// Short label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyClass::StaticCacheFirst => "static",
            PolicyClass::ApiNetworkFirst => "api",
            PolicyClass::StreamingBypass => "bypass",
        }
    }
}

/// Result of classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Handle with the given policy.
    Policy(PolicyClass),
    /// Do not intercept; the request goes to the network uninstrumented.
    Ignore,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Policy(policy) => policy.as_str(),
            Route::Ignore => "ignore",
        }
    }
}

/// Which request methods a rule applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodFilter {
    /// Any method.
    Any,
    /// Retrieval-safe requests only (`GET`).
    #[default]
    Retrieval,
    /// Everything that is not retrieval-safe.
    Mutating,
}

impl MethodFilter {
    fn matches(&self, request: &Request) -> bool {
        match self {
            MethodFilter::Any => true,
            MethodFilter::Retrieval => request.is_retrieval(),
            MethodFilter::Mutating => !request.is_retrieval(),
        }
    }
}

/// How a rule matches the URL path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathMatcher {
    Any,
    Prefix(String),
    Contains(String),
    Exact(String),
}

impl PathMatcher {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathMatcher::Any => true,
            PathMatcher::Prefix(prefix) => path.starts_with(prefix.as_str()),
            PathMatcher::Contains(needle) => path.contains(needle.as_str()),
            PathMatcher::Exact(exact) => path == exact,
        }
    }
}

/// One ordered classification rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub method: MethodFilter,
    pub path: PathMatcher,
    pub route: Route,
}

impl RouteRule {
    /// A rule for retrieval requests matching `path`.
    pub fn new(path: PathMatcher, route: Route) -> Self {
        Self {
            method: MethodFilter::Retrieval,
            path,
            route,
        }
    }

    /// Restrict the rule to a method filter.
    pub fn method(mut self, method: MethodFilter) -> Self {
        self.method = method;
        self
    }

    fn matches(&self, request: &Request) -> bool {
        self.method.matches(request) && self.path.matches(request.path())
    }
}

/// Ordered rule list. First match wins; no match means [`Route::Ignore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    /// A table with exactly these rules.
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    /// The standard table built from route configuration.
    pub fn from_config(config: &RoutesConfig) -> Self {
        let mut rules =
            vec![RouteRule::new(PathMatcher::Any, Route::Ignore).method(MethodFilter::Mutating)];
        rules.extend(config.streaming_patterns.iter().map(|pattern| {
            RouteRule::new(PathMatcher::Contains(pattern.clone()), Route::Ignore)
                .method(MethodFilter::Any)
        }));
        rules.extend(config.rules.iter().map(RuleConfig::to_rule));
        rules.push(RouteRule::new(
            PathMatcher::Prefix(config.api_prefix.clone()),
            Route::Policy(PolicyClass::ApiNetworkFirst),
        ));
        rules.push(RouteRule::new(
            PathMatcher::Any,
            Route::Policy(PolicyClass::StaticCacheFirst),
        ));
        Self { rules }
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Decide how to handle `request`.
    pub fn classify(&self, request: &Request) -> Route {
        self.rules
            .iter()
            .find(|rule| rule.matches(request))
            .map(|rule| rule.route)
            .unwrap_or(Route::Ignore)
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::from_config(&RoutesConfig::default())
    }
}

/// Route configuration.
///
/// ```toml
/// [routes]
/// api_prefix = "/api/"
/// streaming_patterns = ["/events"]
///
/// [[routes.rules]]
/// path = "/live/"
/// route = "streaming_bypass"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
    /// Path prefix of the API namespace.
    pub api_prefix: String,
    /// Substrings marking streaming/event-subscription paths.
    pub streaming_patterns: Vec<String>,
    /// Extra rules, checked after the streaming exclusions.
    pub rules: Vec<RuleConfig>,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            streaming_patterns: vec![DEFAULT_STREAMING_PATTERN.to_string()],
            rules: Vec::new(),
        }
    }
}

/// How a configured rule's `path` is compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathMatch {
    #[default]
    Prefix,
    Contains,
    Exact,
}

/// What a configured rule routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTarget {
    StaticCacheFirst,
    ApiNetworkFirst,
    StreamingBypass,
    Ignore,
}

/// A rule as written in configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub path: String,
    #[serde(default, rename = "match")]
    pub match_kind: PathMatch,
    #[serde(default)]
    pub method: MethodFilter,
    pub route: RuleTarget,
}

impl RuleConfig {
    fn to_rule(&self) -> RouteRule {
        let path = match self.match_kind {
            PathMatch::Prefix => PathMatcher::Prefix(self.path.clone()),
            PathMatch::Contains => PathMatcher::Contains(self.path.clone()),
            PathMatch::Exact => PathMatcher::Exact(self.path.clone()),
        };
        let route = match self.route {
            RuleTarget::StaticCacheFirst => Route::Policy(PolicyClass::StaticCacheFirst),
            RuleTarget::ApiNetworkFirst => Route::Policy(PolicyClass::ApiNetworkFirst),
            RuleTarget::StreamingBypass => Route::Policy(PolicyClass::StreamingBypass),
            RuleTarget::Ignore => Route::Ignore,
        };
        RouteRule::new(path, route).method(self.method)
    }
}
