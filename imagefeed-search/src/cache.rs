//! In-memory LRU cache for search result pages.
//!
//! Entries are keyed by `normalised query + "::" + page`. Three limits
//! apply at once:
//!
//! - **TTL**: an entry expires `ttl` after it was *inserted*. Reads do not
//!   extend its life.
//! - **Per-query cap**: at most `per_query_max` pages of one query are kept;
//!   the page inserted first is evicted.
//! - **Global cap**: at most `max_size` entries in total; the least recently
//!   used entry is evicted.
//!
//! [`CacheManager`] is a cheap-clone handle. Every clone shares the same
//! storage, so a single instance can be handed to several controllers.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::config::CacheConfig;

/// Separator between the normalised query and the page number.
pub const KEY_DELIMITER: &str = "::";

/// Normalise a query for keying and duplicate detection: trim + lowercase.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Build the cache key for a `(query, page)` pair.
pub fn cache_key(query: &str, page: u32) -> String {
    format!("{}{KEY_DELIMITER}{page}", normalize_query(query))
}

/// Extract the query prefix from a cache key.
///
/// Splits on the *last* delimiter so that queries which themselves contain
/// `::` still map back to the right prefix.
pub fn query_prefix(key: &str) -> &str {
    key.rsplit_once(KEY_DELIMITER)
        .map_or(key, |(prefix, _page)| prefix)
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    /// Monotonic insertion sequence, breaks ties between equal timestamps.
    seq: u64,
}

struct CacheInner<V> {
    entries: LruCache<String, CacheEntry<V>>,
    max_size: usize,
    per_query_max: usize,
    ttl: Duration,
    next_seq: u64,
}

impl<V> CacheInner<V> {
    fn is_expired(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted_at) > self.ttl
    }

    /// Evict the oldest-inserted entry of `prefix` if the query is at its cap.
    fn enforce_per_query_cap(&mut self, prefix: &str, incoming_key: &str) {
        let mut count = 0usize;
        let mut oldest: Option<(&String, Instant, u64)> = None;
        for (key, entry) in self.entries.iter() {
            if key == incoming_key || query_prefix(key) != prefix {
                continue;
            }
            count += 1;
            let older = oldest.is_none_or(|(_, at, seq)| (entry.inserted_at, entry.seq) < (at, seq));
            if older {
                oldest = Some((key, entry.inserted_at, entry.seq));
            }
        }

        if count < self.per_query_max {
            return;
        }
        if let Some(key) = oldest.map(|(key, _, _)| key.clone()) {
            self.entries.pop(&key);
            tracing::trace!(%key, "evicted oldest page for query");
        }
    }

    fn enforce_global_cap(&mut self) {
        while self.entries.len() >= self.max_size {
            match self.entries.pop_lru() {
                Some((key, _)) => tracing::trace!(%key, "evicted least recently used page"),
                None => break,
            }
        }
    }
}

/// Query + page keyed cache with TTL, per-query cap and LRU eviction.
pub struct CacheManager<V> {
    inner: Arc<Mutex<CacheInner<V>>>,
}

impl<V> Clone for CacheManager<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Clone> CacheManager<V> {
    /// Create an empty cache with the given limits.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: LruCache::unbounded(),
                max_size: config.max_size.max(1),
                per_query_max: config.per_query_max.max(1),
                ttl: config.ttl(),
                next_seq: 0,
            })),
        }
    }

    /// Look up a cached page.
    ///
    /// Returns `None` on a miss or if the entry has outlived its TTL, in
    /// which case it is evicted. A hit marks the entry most recently used
    /// without touching its insertion time.
    pub fn get(&self, query: &str, page: u32) -> Option<V> {
        let key = cache_key(query, page);
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let expired = match inner.entries.peek(&key) {
            None => return None,
            Some(entry) => inner.is_expired(entry, now),
        };
        if expired {
            inner.entries.pop(&key);
            tracing::trace!(%key, "cache entry expired");
            return None;
        }

        inner.entries.get(&key).map(|entry| entry.value.clone())
    }

    /// Insert a page, evicting as needed to respect both caps.
    pub fn put(&self, query: &str, page: u32, value: V) {
        let key = cache_key(query, page);
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        // Re-inserting an existing key replaces it rather than competing with it.
        inner.entries.pop(&key);

        let prefix = query_prefix(&key).to_owned();
        inner.enforce_per_query_cap(&prefix, &key);
        inner.enforce_global_cap();

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.put(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                seq,
            },
        );
    }

    /// Remove every page cached for `query`.
    pub fn invalidate(&self, query: &str) {
        let prefix = normalize_query(query);
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let doomed: Vec<String> = inner
            .entries
            .iter()
            .filter(|(key, _)| query_prefix(key) == prefix)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            inner.entries.pop(key);
        }
        tracing::debug!(removed = doomed.len(), "invalidated cached query");
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| inner.is_expired(entry, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.entries.pop(key);
        }
        expired.len()
    }

    /// Empty the cache.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.clear();
        inner.next_seq = 0;
    }

    /// Number of resident entries, expired ones included until touched.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a key is resident, without promoting it or checking expiry.
    pub fn contains(&self, query: &str, page: u32) -> bool {
        let key = cache_key(query, page);
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .contains(&key)
    }

    /// Resident keys ordered from most to least recently used.
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }
}
