//! Search session driver.
//!
//! [`SearchController`] composes state, cache, pagination and result
//! processing into the operations a UI calls: start a search, load more on
//! scroll, recover when nothing is visible, and clear.

use std::sync::{Arc, Mutex};

use futures::FutureExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::cache::CacheManager;
use crate::config::{CacheConfig, SearchConfig};
use crate::error::{Result, SearchError};
use crate::fetcher::{ResultDisplay, SearchFetcher, VisibilityProbe};
use crate::inflight::InFlightFetches;
use crate::pagination::{
    AutoLoadOutcome, ErrorHandler, LoadMoreDecision, LoadPageFn, PaginationManager, SeenIds,
};
use crate::processor::{ErrorDisposition, PageFetch, ResultProcessor};
use crate::state::{RequestId, SearchState, StateManager};

/// Shared resources handed to a controller.
///
/// Constructed by the caller so that the session state can be observed
/// from outside the controller (a display monitor, a status bar) and so
/// that several controllers can share one page cache and one map of
/// in-flight fetches. Share `cache` and `in_flight` together.
#[derive(Clone)]
pub struct SearchResources {
    pub state: StateManager,
    pub cache: CacheManager<Value>,
    pub in_flight: InFlightFetches,
    pub seen: SeenIds,
}

impl SearchResources {
    pub fn new(cache: &CacheConfig) -> Self {
        Self {
            state: StateManager::new(),
            cache: CacheManager::new(cache),
            in_flight: InFlightFetches::new(),
            seen: SeenIds::new(),
        }
    }
}

/// Result of [`SearchController::search`].
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// The first page is on screen.
    Displayed {
        request_id: RequestId,
        total: usize,
        visible: usize,
        has_more: bool,
    },
    /// Empty query; the session was cleared.
    Cleared,
    /// The same search is already active and recent.
    Duplicate,
    /// A newer search started before this one finished.
    Stale,
    /// The first page could not be loaded or was malformed.
    Failed {
        error: SearchError,
        disposition: ErrorDisposition,
    },
}

struct ControllerInner<F, D> {
    config: SearchConfig,
    fetcher: Arc<F>,
    display: Arc<D>,
    state: StateManager,
    cache: CacheManager<Value>,
    in_flight: InFlightFetches,
    pagination: PaginationManager,
    processor: ResultProcessor,
    session: Mutex<CancellationToken>,
}

/// Drives one search session.
///
/// Cheap to clone; clones drive the same session.
pub struct SearchController<F, D> {
    inner: Arc<ControllerInner<F, D>>,
}

impl<F, D> Clone for SearchController<F, D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: SearchFetcher, D: ResultDisplay> SearchController<F, D> {
    /// Build a controller.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if `config` fails validation.
    pub fn new(
        config: SearchConfig,
        fetcher: Arc<F>,
        display: Arc<D>,
        resources: SearchResources,
    ) -> Result<Self> {
        config.validate()?;
        let state = resources.state;
        let pagination = PaginationManager::new(config.pagination.clone(), resources.seen);
        let processor = ResultProcessor::new(
            state.clone(),
            pagination.clone(),
            resources.cache.clone(),
            resources.in_flight.clone(),
        );
        Ok(Self {
            inner: Arc::new(ControllerInner {
                config,
                fetcher,
                display,
                state,
                cache: resources.cache,
                in_flight: resources.in_flight,
                pagination,
                processor,
                session: Mutex::new(CancellationToken::new()),
            }),
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.inner.config
    }

    pub fn state(&self) -> &StateManager {
        &self.inner.state
    }

    pub fn cache(&self) -> &CacheManager<Value> {
        &self.inner.cache
    }

    pub fn seen(&self) -> &SeenIds {
        self.inner.pagination.seen()
    }

    pub fn snapshot(&self) -> SearchState {
        self.inner.state.snapshot()
    }

    /// Liveness token of the current session.
    pub fn session_token(&self) -> CancellationToken {
        self.lock_session().clone()
    }

    /// Start a search for `query` and display its first page.
    ///
    /// An empty (or whitespace) query clears the session. Repeating the
    /// active query within the duplicate window does nothing.
    pub async fn search(&self, query: &str) -> SearchOutcome {
        let inner = &self.inner;
        let query = query.trim();
        if query.is_empty() {
            self.clear();
            return SearchOutcome::Cleared;
        }
        if inner
            .state
            .is_duplicate_search(query, inner.config.state.duplicate_search_ttl())
        {
            debug!(query = %query, "duplicate search suppressed");
            return SearchOutcome::Duplicate;
        }

        inner.pagination.cleanup();
        self.renew_session();
        let request_id = inner.state.initialize_search(query);
        trace!(%request_id, query = %query, "search started");

        let fetched = inner
            .in_flight
            .fetch_page(&inner.fetcher, &inner.cache, query, 1)
            .await;
        let raw = match fetched {
            Ok(raw) => raw,
            Err(error) => return self.fail(error, query, request_id),
        };

        if inner.state.is_stale_response(request_id) {
            debug!(%request_id, "first page for superseded search dropped");
            return SearchOutcome::Stale;
        }

        let page = match inner
            .processor
            .process_results(&raw, query, inner.display.as_ref())
        {
            Ok(page) => page,
            Err(error) => return self.fail(error, query, request_id),
        };
        inner.processor.finalize_search(request_id);

        let counts = inner.state.snapshot().search_counts;
        SearchOutcome::Displayed {
            request_id,
            total: counts.total,
            visible: counts.visible,
            has_more: page.has_more_or_default(),
        }
    }

    /// Request the next page (throttled).
    pub async fn load_more(&self) -> LoadMoreDecision {
        let Some(request_id) = self.inner.state.current_request() else {
            return LoadMoreDecision::Skipped;
        };
        self.inner
            .pagination
            .load_more(
                &self.inner.state,
                self.page_loader(request_id),
                self.load_error_handler(request_id),
            )
            .await
    }

    /// Keep loading until something is visible. See
    /// [`PaginationManager::auto_load_until_visible`].
    pub async fn auto_load_until_visible(&self) -> AutoLoadOutcome {
        let Some(request_id) = self.inner.state.current_request() else {
            return AutoLoadOutcome::Cancelled;
        };
        let alive = self.session_token();
        self.inner
            .pagination
            .auto_load_until_visible(
                &self.inner.state,
                self.page_loader(request_id),
                self.load_error_handler(request_id),
                &alive,
            )
            .await
    }

    /// After a short delay, load more if the last rendered result is in view.
    ///
    /// Used after rendering a short page that does not fill the viewport,
    /// where no scroll event will ever fire.
    pub fn schedule_fill_to_bottom(&self, probe: Arc<dyn VisibilityProbe>) {
        let this = self.clone();
        let alive = self.session_token();
        self.inner.pagination.schedule_fill_to_bottom(
            move || async move {
                if !PaginationManager::can_load_more(&this.inner.state.snapshot()) {
                    return;
                }
                let Some(last_id) = this.inner.display.last_rendered_id() else {
                    return;
                };
                if probe.is_in_viewport(&last_id) {
                    trace!(last_id = %last_id, "viewport not filled, loading more");
                    this.load_more().await;
                }
            },
            alive,
        );
    }

    /// End the session: cancel timers and background work, forget seen ids,
    /// reset state. The page cache is kept.
    pub fn clear(&self) {
        self.inner.pagination.cleanup();
        self.lock_session().cancel();
        self.inner.state.reset_state();
        debug!("search session cleared");
    }

    fn fail(&self, error: SearchError, query: &str, request_id: RequestId) -> SearchOutcome {
        let disposition = self.inner.processor.handle_search_error(
            &error,
            query,
            request_id,
            self.inner.display.as_ref(),
        );
        self.inner.processor.finalize_search(request_id);
        SearchOutcome::Failed { error, disposition }
    }

    fn page_loader(&self, request_id: RequestId) -> LoadPageFn {
        let this = self.clone();
        Arc::new(move || {
            let this = this.clone();
            async move { this.load_page(request_id).await }.boxed()
        })
    }

    fn load_error_handler(&self, request_id: RequestId) -> ErrorHandler {
        let processor = self.inner.processor.clone();
        Arc::new(move |error| {
            processor.handle_load_more_error(&error, request_id);
        })
    }

    async fn load_page(&self, request_id: RequestId) -> Result<()> {
        let inner = &self.inner;
        match inner
            .processor
            .load_next_page(&inner.fetcher, request_id)
            .await?
        {
            PageFetch::Stale => Ok(()),
            PageFetch::Page { page, data } => {
                let outcome = inner.processor.process_page_results(
                    page,
                    data,
                    request_id,
                    inner.display.as_ref(),
                );
                trace!(%request_id, page, ?outcome, "page applied");
                Ok(())
            }
        }
    }

    fn renew_session(&self) {
        let mut session = self.lock_session();
        session.cancel();
        *session = CancellationToken::new();
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}
