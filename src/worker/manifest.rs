//! Install-time asset manifest.

use serde::Deserialize;

/// Resources fetched into the stores during install.
///
/// `assets` go to the static store. `api_endpoints` are optional warm-up
/// reads for the API store, so API screens have data on the first offline
/// visit. Both are resolved against the worker origin and fetched in
/// parallel, then written in list order.
///
/// ```toml
/// [install]
/// assets = ["/", "/index.html", "/css/style.css"]
/// api_endpoints = ["/api/clubs"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AssetManifest {
    pub assets: Vec<String>,
    pub api_endpoints: Vec<String>,
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self {
            assets: [
                "/",
                "/index.html",
                "/css/style.css",
                "/js/compiled/main.js",
                "/manifest.json",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            api_endpoints: Vec::new(),
        }
    }
}

impl AssetManifest {
    /// A manifest with exactly these static assets.
    pub fn new<I, S>(assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            assets: assets.into_iter().map(Into::into).collect(),
            api_endpoints: Vec::new(),
        }
    }

    /// An empty manifest.
    pub fn empty() -> Self {
        Self::new(Vec::<String>::new())
    }

    /// Add a static asset.
    pub fn asset(mut self, path: impl Into<String>) -> Self {
        self.assets.push(path.into());
        self
    }

    /// Add an API endpoint to warm during install.
    pub fn api_endpoint(mut self, path: impl Into<String>) -> Self {
        self.api_endpoints.push(path.into());
        self
    }

    pub fn len(&self) -> usize {
        self.assets.len() + self.api_endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty() && self.api_endpoints.is_empty()
    }
}
