//! Sharing of search page fetches that are still on the wire.
//!
//! Two controllers (or a controller and its own trailing "load more") can
//! ask for the same `(query, page)` before the first response has landed.
//! [`InFlightFetches`] keys outstanding fetches exactly like the page cache
//! so the second caller joins the first fetch instead of starting another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tracing::{debug, trace};

use crate::cache::{cache_key, CacheManager};
use crate::error::Result;
use crate::fetcher::SearchFetcher;
use crate::types::SearchPage;

type SharedFetch = Shared<BoxFuture<'static, Result<Value>>>;
type FetchMap = Mutex<HashMap<String, SharedFetch>>;

/// Map of outstanding page fetches, keyed by [`cache_key`].
///
/// Cheap to clone; clones share the map.
#[derive(Clone, Default)]
pub struct InFlightFetches {
    fetches: Arc<FetchMap>,
}

impl InFlightFetches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the raw payload for `(query, page)`.
    ///
    /// Checks `cache` first, then joins a matching fetch already in flight,
    /// and only then calls `fetcher`. A fetched payload is cached once it
    /// validates as a result page; failures are never cached and every
    /// caller joined to the fetch sees the same error.
    ///
    /// # Errors
    ///
    /// Propagates fetcher errors and [`SearchError::Validation`] for
    /// malformed payloads.
    ///
    /// [`SearchError::Validation`]: crate::error::SearchError::Validation
    pub async fn fetch_page<F: SearchFetcher>(
        &self,
        fetcher: &Arc<F>,
        cache: &CacheManager<Value>,
        query: &str,
        page: u32,
    ) -> Result<Value> {
        if let Some(raw) = cache.get(query, page) {
            trace!(page, "page served from cache");
            return Ok(raw);
        }

        let key = cache_key(query, page);
        let shared = {
            let mut fetches = lock(&self.fetches);
            match fetches.get(&key) {
                Some(existing) => {
                    debug!(page, "joining in-flight page fetch");
                    existing.clone()
                }
                None => {
                    let fetch = self.start(key.clone(), fetcher, cache, query, page);
                    fetches.insert(key, fetch.clone());
                    fetch
                }
            }
        };
        shared.await
    }

    /// Number of distinct fetches currently in flight.
    pub fn len(&self) -> usize {
        lock(&self.fetches).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The returned future removes its own entry on completion. Nothing
    /// else inserts under `key` while it is registered.
    fn start<F: SearchFetcher>(
        &self,
        key: String,
        fetcher: &Arc<F>,
        cache: &CacheManager<Value>,
        query: &str,
        page: u32,
    ) -> SharedFetch {
        let fetcher = Arc::clone(fetcher);
        let cache = cache.clone();
        let query = query.to_owned();
        let fetches: Weak<FetchMap> = Arc::downgrade(&self.fetches);

        async move {
            let result = fetch_validated(fetcher.as_ref(), &cache, &query, page).await;
            if let Some(fetches) = fetches.upgrade() {
                lock(&fetches).remove(&key);
            }
            result
        }
        .boxed()
        .shared()
    }
}

async fn fetch_validated<F: SearchFetcher>(
    fetcher: &F,
    cache: &CacheManager<Value>,
    query: &str,
    page: u32,
) -> Result<Value> {
    // Populated by a fetch that finished between the caller's cache check
    // and its registration.
    if let Some(raw) = cache.get(query, page) {
        return Ok(raw);
    }
    trace!(query = %query, page, "fetching page");
    let raw = fetcher.fetch(query, page).await?;
    SearchPage::from_payload(&raw)?;
    cache.put(query, page, raw.clone());
    Ok(raw)
}

fn lock(fetches: &FetchMap) -> MutexGuard<'_, HashMap<String, SharedFetch>> {
    fetches.lock().unwrap_or_else(|e| e.into_inner())
}
