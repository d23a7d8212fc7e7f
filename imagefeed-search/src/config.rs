//! Search configuration with sensible defaults.
//!
//! [`SearchConfig`] groups the knobs of the three stateful components:
//! the page cache, the pagination throttle and auto-load loop, and the
//! duplicate-search suppression window. All values are plain positive
//! numbers; [`SearchConfig::validate`] rejects zeros.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Page cache sizing and expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached pages across all queries.
    pub max_size: usize,
    /// How long a cached page stays valid after insertion, in milliseconds.
    pub ttl_ms: u64,
    /// Maximum number of cached pages for a single query.
    pub per_query_max: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 50,
            ttl_ms: 5 * 60 * 1000,
            per_query_max: 10,
        }
    }
}

impl CacheConfig {
    /// TTL as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Infinite-scroll pagination behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Minimum spacing between two page loads, in milliseconds.
    pub throttle_ms: u64,
    /// Upper bound on pages loaded by one auto-load-until-visible run.
    pub auto_load_max_attempts: u32,
    /// Delay before checking whether the viewport still needs filling.
    pub fill_to_bottom_delay_ms: u64,
    /// Pause between auto-load iterations so rendering can catch up.
    pub auto_load_yield_ms: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            throttle_ms: 500,
            auto_load_max_attempts: 5,
            fill_to_bottom_delay_ms: 300,
            auto_load_yield_ms: 50,
        }
    }
}

impl PaginationConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn fill_to_bottom_delay(&self) -> Duration {
        Duration::from_millis(self.fill_to_bottom_delay_ms)
    }

    pub fn auto_load_yield(&self) -> Duration {
        Duration::from_millis(self.auto_load_yield_ms)
    }
}

/// Search session state settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Window in which repeating the active query is treated as a duplicate.
    pub duplicate_search_ttl_ms: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            duplicate_search_ttl_ms: 1000,
        }
    }
}

impl StateConfig {
    pub fn duplicate_search_ttl(&self) -> Duration {
        Duration::from_millis(self.duplicate_search_ttl_ms)
    }
}

/// Configuration for the search subsystem.
///
/// Use [`Default::default()`] for sensible defaults, or construct with
/// field overrides for custom behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub cache: CacheConfig,
    pub pagination: PaginationConfig,
    pub state: StateConfig,
}

impl SearchConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Every numeric knob must be greater than zero, and the per-query cap
    /// may not exceed the global cache size.
    pub fn validate(&self) -> Result<(), SearchError> {
        let positive: [(&str, u64); 8] = [
            ("cache.max_size", self.cache.max_size as u64),
            ("cache.ttl_ms", self.cache.ttl_ms),
            ("cache.per_query_max", self.cache.per_query_max as u64),
            ("pagination.throttle_ms", self.pagination.throttle_ms),
            (
                "pagination.auto_load_max_attempts",
                u64::from(self.pagination.auto_load_max_attempts),
            ),
            (
                "pagination.fill_to_bottom_delay_ms",
                self.pagination.fill_to_bottom_delay_ms,
            ),
            ("pagination.auto_load_yield_ms", self.pagination.auto_load_yield_ms),
            (
                "state.duplicate_search_ttl_ms",
                self.state.duplicate_search_ttl_ms,
            ),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(SearchError::Config(format!("{name} must be greater than 0")));
        }
        if self.cache.per_query_max > self.cache.max_size {
            return Err(SearchError::Config(
                "cache.per_query_max must be <= cache.max_size".into(),
            ));
        }
        Ok(())
    }
}
