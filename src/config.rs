//! Configuration types for the imagefeed client.
//!
//! Loaded from TOML. Every section and field has a default, so an empty
//! file (or no file) yields a working configuration.
//!
//! ```toml
//! [search.cache]
//! max_size = 50
//! ttl_ms = 300000
//! per_query_max = 10
//!
//! [feed]
//! base_url = "https://gallery.example"
//! request_cache_ttl_ms = 5000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use imagefeed_search::SearchConfig;
use serde::{Deserialize, Serialize};

use crate::error::{FeedError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Search session knobs: page cache, pagination timing, duplicate window.
    pub search: SearchConfig,
    /// Gallery API and feed loading.
    pub feed: FeedSettings,
}

/// Gallery API endpoints and feed-loading behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    /// Origin of the gallery API, without a trailing path.
    pub base_url: String,
    /// Path of the search endpoint (`?q=&page=`).
    pub search_endpoint: String,
    /// Path of the feed endpoint (`?filter=&page=&tags=`).
    pub feed_endpoint: String,
    /// How long a normalized feed response is reused.
    pub request_cache_ttl_ms: u64,
    /// Maximum number of cached feed responses.
    pub request_cache_capacity: u64,
    /// Polling period of the leaked-content monitor.
    pub monitor_interval_ms: u64,
    /// HTTP request timeout.
    pub timeout_secs: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_owned(),
            search_endpoint: "/api/images/search".to_owned(),
            feed_endpoint: "/api/images/feed".to_owned(),
            request_cache_ttl_ms: 5_000,
            request_cache_capacity: 64,
            monitor_interval_ms: 500,
            timeout_secs: 15,
        }
    }
}

impl FeedSettings {
    pub fn request_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.request_cache_ttl_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl FeedConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| FeedError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| FeedError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Returns the default config file path: `~/.config/imagefeed/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("imagefeed").join("config.toml")
        } else {
            dirs::config_dir()
                .map(|d| d.join("imagefeed").join("config.toml"))
                .unwrap_or_else(|| PathBuf::from("/tmp/imagefeed-config/config.toml"))
        }
    }

    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.search
            .validate()
            .map_err(|e| FeedError::Config(e.to_string()))?;

        let feed = &self.feed;
        url::Url::parse(&feed.base_url)
            .map_err(|e| FeedError::Config(format!("feed.base_url: {e}")))?;
        for (name, path) in [
            ("feed.search_endpoint", &feed.search_endpoint),
            ("feed.feed_endpoint", &feed.feed_endpoint),
        ] {
            if !path.starts_with('/') {
                return Err(FeedError::Config(format!("{name} must start with '/'")));
            }
        }
        for (name, value) in [
            ("feed.request_cache_ttl_ms", feed.request_cache_ttl_ms),
            ("feed.request_cache_capacity", feed.request_cache_capacity),
            ("feed.monitor_interval_ms", feed.monitor_interval_ms),
            ("feed.timeout_secs", feed.timeout_secs),
        ] {
            if value == 0 {
                return Err(FeedError::Config(format!("{name} must be greater than 0")));
            }
        }
        Ok(())
    }
}
