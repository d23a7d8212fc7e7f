//! Validation and application of fetched pages.
//!
//! [`ResultProcessor`] sits between the fetcher and the display. It is the
//! place where staleness is checked at the page-fetch boundary, where
//! continuation (`has_more`) is decided, and where errors are mapped to
//! either an inline message or a log line.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::CacheManager;
use crate::error::{Result, SearchError};
use crate::fetcher::{ResultDisplay, SearchFetcher};
use crate::inflight::InFlightFetches;
use crate::pagination::PaginationManager;
use crate::state::{RequestId, StateManager, StateUpdate};
use crate::types::{SearchCounts, SearchPage};

/// Result of [`ResultProcessor::load_next_page`].
#[derive(Debug, Clone, PartialEq)]
pub enum PageFetch {
    /// The request was superseded; drop the response.
    Stale,
    /// A validated page, not yet applied to state or display.
    Page { page: u32, data: SearchPage },
}

/// Result of [`ResultProcessor::process_page_results`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Appended `appended` new images, of which `visible` made it on screen.
    Appended { appended: usize, visible: usize },
    /// The backend returned an empty page.
    Exhausted,
    /// Every image had already been rendered.
    AllDuplicates,
    /// The request was superseded before the page could be applied.
    Stale,
}

/// How an error was dealt with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Cancellation; logged at debug level only.
    Suppressed,
    /// The failing request is no longer current; logged only.
    Ignored,
    /// Logged as a diagnostic; nothing shown to the user.
    Logged,
    /// Shown to the user.
    Reported,
}

/// Applies pages to session state and display.
#[derive(Clone)]
pub struct ResultProcessor {
    state: StateManager,
    pagination: PaginationManager,
    cache: CacheManager<Value>,
    in_flight: InFlightFetches,
}

impl ResultProcessor {
    pub fn new(
        state: StateManager,
        pagination: PaginationManager,
        cache: CacheManager<Value>,
        in_flight: InFlightFetches,
    ) -> Self {
        Self {
            state,
            pagination,
            cache,
            in_flight,
        }
    }

    /// Validate and display the first page of a search.
    ///
    /// The page's images are deduplicated (registering their ids as seen)
    /// and handed to `display`. `has_more` becomes false if the page is
    /// empty or the backend did not report more.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Validation`] if `raw` is not a result page.
    pub fn process_results<D: ResultDisplay + ?Sized>(
        &self,
        raw: &Value,
        query: &str,
        display: &D,
    ) -> Result<SearchPage> {
        let page = SearchPage::from_payload(raw)?;
        let has_more = !page.images.is_empty() && page.has_more_or_default();

        let images = self.pagination.deduplicate(page.images);
        let visible = display.show_results(query, &images);

        let mut counts = SearchCounts::from_images(&images);
        counts.visible = visible;
        self.state.update_state(StateUpdate::default().has_more(has_more).counts(counts));
        debug!(total = counts.total, visible, has_more, "first page displayed");

        Ok(SearchPage {
            images,
            has_more: Some(has_more),
        })
    }

    /// Fetch the page after the current one under `request_id`.
    ///
    /// Served from the cache when possible, otherwise joined to or started
    /// as a shared in-flight fetch that caches the payload once it
    /// validates. The page counter only advances once a
    /// non-stale page has been obtained, so a failure leaves state as it
    /// was.
    ///
    /// # Errors
    ///
    /// Propagates fetcher errors and [`SearchError::Validation`] for
    /// malformed payloads. Nothing is cached in either case.
    pub async fn load_next_page<F: SearchFetcher>(
        &self,
        fetcher: &Arc<F>,
        request_id: RequestId,
    ) -> Result<PageFetch> {
        if self.state.is_stale_response(request_id) {
            return Ok(PageFetch::Stale);
        }
        let snapshot = self.state.snapshot();
        let query = snapshot.current_search_term;
        let next_page = snapshot.current_page + 1;

        let raw = self
            .in_flight
            .fetch_page(fetcher, &self.cache, &query, next_page)
            .await?;
        let data = SearchPage::from_payload(&raw)?;

        if self.state.is_stale_response(request_id) {
            debug!(%request_id, page = next_page, "discarding page for superseded search");
            return Ok(PageFetch::Stale);
        }

        self.state.update_state(StateUpdate::default().page(next_page));
        Ok(PageFetch::Page {
            page: next_page,
            data,
        })
    }

    /// Apply a page obtained by [`load_next_page`](Self::load_next_page).
    ///
    /// An empty page, or one made entirely of already-rendered images,
    /// ends pagination for the session.
    pub fn process_page_results<D: ResultDisplay + ?Sized>(
        &self,
        page: u32,
        data: SearchPage,
        request_id: RequestId,
        display: &D,
    ) -> PageOutcome {
        if self.state.is_stale_response(request_id) {
            return PageOutcome::Stale;
        }

        if data.images.is_empty() {
            self.state.update_state(StateUpdate::default().has_more(false));
            debug!(page, "empty page, pagination finished");
            return PageOutcome::Exhausted;
        }

        let has_more = data.has_more_or_default();
        // Dedup and append with no suspension in between so the seen set
        // reflects exactly what is on screen.
        let fresh = self.pagination.deduplicate(data.images);
        if fresh.is_empty() {
            self.state.update_state(StateUpdate::default().has_more(false));
            debug!(page, "page contained only already-rendered images, stopping");
            return PageOutcome::AllDuplicates;
        }

        let visible = display.append_results(&fresh, has_more, page);
        let mut added = SearchCounts::from_images(&fresh);
        added.visible = visible;
        self.state.update_counts(|counts| counts.absorb(added));
        self.state.update_state(StateUpdate::default().has_more(has_more));

        PageOutcome::Appended {
            appended: fresh.len(),
            visible,
        }
    }

    /// Deal with a failed initial search.
    pub fn handle_search_error<D: ResultDisplay + ?Sized>(
        &self,
        error: &SearchError,
        query: &str,
        request_id: RequestId,
        display: &D,
    ) -> ErrorDisposition {
        if error.is_abort() {
            debug!(%request_id, error = %error, "search aborted");
            return ErrorDisposition::Suppressed;
        }
        if self.state.is_stale_response(request_id) {
            debug!(%request_id, error = %error, "error from superseded search ignored");
            return ErrorDisposition::Ignored;
        }
        warn!(%request_id, query = %query, error = %error, "search failed");
        display.show_error(query, error);
        ErrorDisposition::Reported
    }

    /// Deal with a failed "load more".
    ///
    /// Previously loaded results and `has_more` are left untouched so the
    /// user can retry by scrolling again.
    pub fn handle_load_more_error(
        &self,
        error: &SearchError,
        request_id: RequestId,
    ) -> ErrorDisposition {
        if error.is_abort() {
            debug!(%request_id, error = %error, "load more aborted");
            return ErrorDisposition::Suppressed;
        }
        if self.state.is_stale_response(request_id) {
            debug!(%request_id, error = %error, "load more error from superseded search ignored");
            return ErrorDisposition::Ignored;
        }
        let snapshot = self.state.snapshot();
        warn!(
            %request_id,
            query = %snapshot.current_search_term,
            page = snapshot.current_page + 1,
            error = %error,
            "load more failed"
        );
        ErrorDisposition::Logged
    }

    /// Clear the loading flag if `request_id` is still current.
    ///
    /// Returns whether the flag was cleared.
    pub fn finalize_search(&self, request_id: RequestId) -> bool {
        if self.state.is_stale_response(request_id) {
            return false;
        }
        self.state.update_state(StateUpdate::default().loading(false));
        true
    }
}
