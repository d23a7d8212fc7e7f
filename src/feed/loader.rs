//! Deduplicated, briefly-cached feed page loading.
//!
//! A feed page is typically requested by several widgets at once (the grid,
//! the prefetcher, a tag sidebar). [`FeedLoader`] makes sure identical
//! requests share one network call while it is in flight, and reuses the
//! normalized response for a few seconds afterwards.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use moka::future::Cache;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::FeedSettings;
use crate::error::Result;
use crate::feed::envelope::{FeedPage, normalize_feed_response};

/// Parameters of one feed page request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FeedRequest {
    pub filter: String,
    /// 1-based page number.
    pub page: u32,
    pub tags: Vec<String>,
    /// API path the request is sent to.
    pub endpoint: String,
}

impl FeedRequest {
    pub fn new(filter: impl Into<String>, page: u32) -> Self {
        Self {
            filter: filter.into(),
            page,
            tags: Vec::new(),
            endpoint: FeedSettings::default().feed_endpoint,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Key shared by the in-flight map and the response cache.
    pub fn cache_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.endpoint,
            self.filter,
            self.page,
            self.tags.join(",")
        )
    }
}

/// Source of raw feed responses.
pub trait FeedFetcher: Send + Sync + 'static {
    /// Fetch the raw response for `request`.
    ///
    /// # Errors
    ///
    /// Returns a network error for transport failures and non-2xx responses.
    fn fetch(&self, request: &FeedRequest) -> impl Future<Output = Result<Value>> + Send;
}

type SharedLoad = Shared<BoxFuture<'static, Result<FeedPage>>>;
type InFlight = Mutex<HashMap<String, SharedLoad>>;

/// Loads feed pages with in-flight deduplication and a short response cache.
///
/// Cheap to clone; clones share the in-flight map and the cache.
pub struct FeedLoader<F> {
    fetcher: Arc<F>,
    responses: Cache<String, FeedPage>,
    in_flight: Arc<InFlight>,
}

impl<F> Clone for FeedLoader<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            responses: self.responses.clone(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<F: FeedFetcher> FeedLoader<F> {
    pub fn new(fetcher: Arc<F>, settings: &FeedSettings) -> Self {
        let responses = Cache::builder()
            .max_capacity(settings.request_cache_capacity)
            .time_to_live(settings.request_cache_ttl())
            .build();
        Self {
            fetcher,
            responses,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Load and normalize one feed page.
    ///
    /// Concurrent calls with the same [`FeedRequest::cache_key`] share a
    /// single fetch and observe the same result. Successful pages are
    /// reused until the response TTL elapses; failures are never cached.
    ///
    /// # Errors
    ///
    /// Propagates fetch failures and envelope/validation errors.
    pub async fn load(&self, request: &FeedRequest) -> Result<FeedPage> {
        let key = request.cache_key();
        if let Some(page) = self.responses.get(&key).await {
            trace!(key = %key, "feed page served from cache");
            return Ok(page);
        }

        let shared = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(&key) {
                Some(existing) => {
                    debug!(
                        filter = %request.filter,
                        page = request.page,
                        "joining in-flight feed request"
                    );
                    existing.clone()
                }
                None => {
                    let load = self.start(key.clone(), request.clone());
                    in_flight.insert(key, load.clone());
                    load
                }
            }
        };
        shared.await
    }

    /// Drop every cached response. In-flight requests are unaffected.
    pub fn invalidate_all(&self) {
        self.responses.invalidate_all();
    }

    /// Number of distinct requests currently in flight.
    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Build the shared future for `key`.
    ///
    /// The future removes its own map entry when it completes. Nothing else
    /// inserts under `key` while it is registered, so the removal can only
    /// hit this entry.
    fn start(&self, key: String, request: FeedRequest) -> SharedLoad {
        let fetcher = Arc::clone(&self.fetcher);
        let responses = self.responses.clone();
        let in_flight: Weak<InFlight> = Arc::downgrade(&self.in_flight);

        async move {
            let result = fetch_normalized(fetcher.as_ref(), &responses, &key, &request).await;
            if let Some(in_flight) = in_flight.upgrade() {
                lock(&in_flight).remove(&key);
            }
            result
        }
        .boxed()
        .shared()
    }
}

async fn fetch_normalized<F: FeedFetcher>(
    fetcher: &F,
    responses: &Cache<String, FeedPage>,
    key: &str,
    request: &FeedRequest,
) -> Result<FeedPage> {
    // A request that finished between the caller's cache check and its
    // registration has already populated the cache.
    if let Some(page) = responses.get(key).await {
        return Ok(page);
    }
    debug!(
        filter = %request.filter,
        page = request.page,
        tags = ?request.tags,
        "fetching feed page"
    );
    let raw = fetcher.fetch(request).await?;
    let page = normalize_feed_response(&raw)?;
    responses.insert(key.to_owned(), page.clone()).await;
    Ok(page)
}

fn lock(in_flight: &InFlight) -> MutexGuard<'_, HashMap<String, SharedLoad>> {
    in_flight.lock().unwrap_or_else(|e| e.into_inner())
}
