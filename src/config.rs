//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. explicit path (`--config <path>` on the CLI)
//! 2. `~/.hifadhi/config.toml` (user)
//! 3. `/etc/hifadhi/config.toml` (system)
//!
//! Every field has a default, so a missing file (cases 2 and 3) yields
//! [`Config::default()`]. An explicit path that does not exist is an error.
//!
//! ```toml
//! [worker]
//! origin = "https://harambee.example"
//! generation = "v2"
//! store_prefix = "harambee"
//!
//! [routes]
//! api_prefix = "/api/"
//!
//! [install]
//! assets = ["/", "/index.html"]
//!
//! [install.retry]
//! max_attempts = 5
//!
//! [storage]
//! backend = "disk"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::event::SYNC_ACTIONS_TAG;
use crate::fallback::OfflineFallback;
use crate::network::RetryConfig;
use crate::notification::DEFAULT_APP_NAME;
use crate::router::RoutesConfig;
use crate::store::{DiskStorage, MemoryStorageConfig};
use crate::worker::AssetManifest;
use crate::{HifadhiError, Result};

/// Engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
    #[serde(default)]
    pub install: InstallConfig,
    #[serde(default)]
    pub fallback: OfflineFallback,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

/// Worker identity and generation.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Origin that relative asset paths resolve against
    /// (default: http://localhost:8080/).
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Generation tag of this worker (default: "v1").
    #[serde(default = "default_generation")]
    pub generation: String,
    /// Prefix of the store names (default: "hifadhi").
    #[serde(default = "default_store_prefix")]
    pub store_prefix: String,
    /// Shell document for offline navigations. Empty disables it
    /// (default: "/index.html").
    #[serde(default = "default_shell_path")]
    pub shell_path: String,
    /// Sync tag that triggers queue replay (default: "sync-actions").
    #[serde(default = "default_sync_tag")]
    pub sync_tag: String,
    /// Notification title when a push carries none.
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            generation: default_generation(),
            store_prefix: default_store_prefix(),
            shell_path: default_shell_path(),
            sync_tag: default_sync_tag(),
            app_name: default_app_name(),
        }
    }
}

fn default_origin() -> String {
    "http://localhost:8080/".to_string()
}

fn default_generation() -> String {
    "v1".to_string()
}

fn default_store_prefix() -> String {
    "hifadhi".to_string()
}

fn default_shell_path() -> String {
    crate::strategy::DEFAULT_SHELL_PATH.to_string()
}

fn default_sync_tag() -> String {
    SYNC_ACTIONS_TAG.to_string()
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

/// What to fetch at install, and how hard to try.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstallConfig {
    #[serde(flatten)]
    pub manifest: AssetManifest,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Store backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    Disk,
}

/// Store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// "memory" or "disk" (default: "disk").
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory of the disk backend (default: ~/.cache/hifadhi/stores).
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Entry bound per store of the memory backend (default: 10000).
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            dir: None,
            max_entries: default_max_entries(),
        }
    }
}

impl StorageConfig {
    /// Disk backend root, explicit or default.
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(DiskStorage::default_root)
    }

    pub fn memory_config(&self) -> MemoryStorageConfig {
        MemoryStorageConfig::new().max_entries(self.max_entries)
    }
}

fn default_max_entries() -> u64 {
    MemoryStorageConfig::default().max_entries
}

/// Deferred-write queue configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueConfig {
    /// Queue file (default: ~/.local/share/hifadhi/queue.json).
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl QueueConfig {
    pub fn path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(crate::queue::default_queue_path)
    }
}

/// Network client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Connection timeout in seconds (default: 10).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Time allowed for a complete response on cached routes, in seconds
    /// (default: 30). Streaming routes are not bounded.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    crate::network::DEFAULT_CONNECT_TIMEOUT.as_secs()
}

fn default_fetch_timeout() -> u64 {
    crate::strategy::DEFAULT_FETCH_TIMEOUT.as_secs()
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.hifadhi/config.toml`
    /// 3. `/etc/hifadhi/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Parse a configuration file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HifadhiError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            HifadhiError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| HifadhiError::Configuration(e.to_string()))
    }

    /// Resolve the config file path. `Ok(None)` when no file exists.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(HifadhiError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".hifadhi").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/hifadhi/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}
