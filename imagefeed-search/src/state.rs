//! Search session state and request generations.
//!
//! [`StateManager`] owns the single live [`SearchState`] of a session and
//! the identity of the request that is allowed to write to it. Every search
//! mints a fresh [`RequestId`]; asynchronous continuations compare their id
//! against [`StateManager::is_stale_response`] before applying anything.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::cache::normalize_query;
use crate::types::SearchCounts;

/// Generation token identifying one search initiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestId(u64);

impl RequestId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Live state of a search session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchState {
    pub current_search_term: String,
    pub is_search_active: bool,
    /// 1-based page counter of the last applied page.
    pub current_page: u32,
    pub has_more: bool,
    pub is_loading: bool,
    pub auto_load_attempts: u32,
    pub search_counts: SearchCounts,
}

impl Default for SearchState {
    fn default() -> Self {
        Self {
            current_search_term: String::new(),
            is_search_active: false,
            current_page: 1,
            has_more: true,
            is_loading: false,
            auto_load_attempts: 0,
            search_counts: SearchCounts::default(),
        }
    }
}

/// Partial update merged into [`SearchState`]; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateUpdate {
    pub current_search_term: Option<String>,
    pub is_search_active: Option<bool>,
    pub current_page: Option<u32>,
    pub has_more: Option<bool>,
    pub is_loading: Option<bool>,
    pub auto_load_attempts: Option<u32>,
    pub search_counts: Option<SearchCounts>,
}

impl StateUpdate {
    pub fn loading(mut self, loading: bool) -> Self {
        self.is_loading = Some(loading);
        self
    }

    pub fn has_more(mut self, has_more: bool) -> Self {
        self.has_more = Some(has_more);
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.current_page = Some(page);
        self
    }

    pub fn auto_load_attempts(mut self, attempts: u32) -> Self {
        self.auto_load_attempts = Some(attempts);
        self
    }

    pub fn counts(mut self, counts: SearchCounts) -> Self {
        self.search_counts = Some(counts);
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.is_search_active = Some(active);
        self
    }

    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.current_search_term = Some(term.into());
        self
    }
}

impl SearchState {
    fn apply(&mut self, update: StateUpdate) {
        if let Some(term) = update.current_search_term {
            self.current_search_term = term;
        }
        if let Some(active) = update.is_search_active {
            self.is_search_active = active;
        }
        if let Some(page) = update.current_page {
            self.current_page = page;
        }
        if let Some(has_more) = update.has_more {
            self.has_more = has_more;
        }
        if let Some(loading) = update.is_loading {
            self.is_loading = loading;
        }
        if let Some(attempts) = update.auto_load_attempts {
            self.auto_load_attempts = attempts;
        }
        if let Some(counts) = update.search_counts {
            self.search_counts = counts;
        }
    }
}

#[derive(Debug)]
struct LastSearch {
    normalized_query: String,
    started_at: Instant,
}

#[derive(Debug, Default)]
struct StateInner {
    state: SearchState,
    current_request: Option<RequestId>,
    last_search: Option<LastSearch>,
}

/// Shared handle to the session state.
///
/// Clones refer to the same state. No lock is ever held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct StateManager {
    inner: Arc<Mutex<StateInner>>,
    next_request: Arc<AtomicU64>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SearchState {
        self.lock().state.clone()
    }

    /// Shallow-merge `update` into the live state.
    ///
    /// No validation is performed; callers keep the invariants.
    pub fn update_state(&self, update: StateUpdate) {
        self.lock().state.apply(update);
    }

    /// Mutate the result counts in place.
    pub fn update_counts(&self, f: impl FnOnce(&mut SearchCounts)) {
        f(&mut self.lock().state.search_counts);
    }

    /// Start a new search generation for `query` and make it current.
    pub fn initialize_search(&self, query: &str) -> RequestId {
        let id = RequestId(self.next_request.fetch_add(1, Ordering::Relaxed) + 1);
        let mut inner = self.lock();
        inner.current_request = Some(id);
        inner.last_search = Some(LastSearch {
            normalized_query: normalize_query(query),
            started_at: Instant::now(),
        });
        inner.state = SearchState {
            current_search_term: query.to_owned(),
            is_search_active: true,
            current_page: 1,
            has_more: true,
            is_loading: true,
            auto_load_attempts: 0,
            search_counts: SearchCounts::default(),
        };
        tracing::debug!(request_id = %id, "search initialised");
        id
    }

    /// The generation currently allowed to write state, if any.
    pub fn current_request(&self) -> Option<RequestId> {
        self.lock().current_request
    }

    /// Whether results tagged with `id` must be discarded.
    pub fn is_stale_response(&self, id: RequestId) -> bool {
        self.lock().current_request != Some(id)
    }

    /// Whether starting a search for `query` now would just repeat the active one.
    pub fn is_duplicate_search(&self, query: &str, ttl: Duration) -> bool {
        let inner = self.lock();
        if !inner.state.is_search_active {
            return false;
        }
        inner.last_search.as_ref().is_some_and(|last| {
            last.normalized_query == normalize_query(query) && last.started_at.elapsed() < ttl
        })
    }

    /// Restore defaults and forget the current generation.
    pub fn reset_state(&self) {
        let mut inner = self.lock();
        inner.state = SearchState::default();
        inner.current_request = None;
        inner.last_search = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
