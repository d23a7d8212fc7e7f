//! Infinite-scroll pagination: throttled loads, cross-page dedup, and
//! auto-load recovery.
//!
//! # Throttling
//!
//! [`PaginationManager::load_more`] is a leading+trailing edge throttle.
//! A call outside the cooldown window loads immediately. A call inside it
//! schedules one deferred load at the end of the window; further calls
//! while that load is pending are coalesced into it.
//!
//! ```text
//!  call   call call call              call
//!   │      │    │    │                 │
//!   ▼      ▼    ▼    ▼                 ▼
//!  load ───────────────► load         load
//!   |<── throttle ──>|  (trailing)    (leading)
//! ```
//!
//! # Auto-load
//!
//! When a page yields nothing visible (everything filtered client-side),
//! the scroll sentinel never comes into view and the user is stuck.
//! [`PaginationManager::auto_load_until_visible`] keeps loading until
//! something shows up, the backend runs out, or the attempt bound is hit.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::PaginationConfig;
use crate::error::{Result, SearchError};
use crate::state::{SearchState, StateManager, StateUpdate};
use crate::types::Image;

/// Loads the next page and applies it. Invoked once per executed load.
pub type LoadPageFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Receives errors from background page loads.
pub type ErrorHandler = Arc<dyn Fn(SearchError) + Send + Sync>;

/// Ids of images already rendered in the current session.
///
/// Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct SeenIds {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl SeenIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only images whose id has not been seen, recording them as seen.
    ///
    /// Input order is preserved. Duplicates within `images` itself are
    /// dropped after their first occurrence.
    pub fn filter_unseen(&self, images: Vec<Image>) -> Vec<Image> {
        let mut seen = self.lock();
        images
            .into_iter()
            .filter(|image| seen.insert(image.id.clone()))
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// What [`PaginationManager::load_more`] did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMoreDecision {
    /// The state does not allow loading right now.
    Skipped,
    /// Loaded immediately (leading edge).
    Executed,
    /// A trailing load was scheduled after the given delay.
    Scheduled(Duration),
    /// A trailing load was already pending; this call joined it.
    Coalesced,
}

/// Why [`PaginationManager::auto_load_until_visible`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoLoadOutcome {
    /// At least one result is visible.
    Visible,
    /// The backend reported no further pages.
    Exhausted,
    /// Another load is in progress.
    Busy,
    /// Gave up after this many attempts with nothing visible.
    LimitReached(u32),
    /// The session was torn down.
    Cancelled,
}

#[derive(Default)]
struct Timers {
    last_load: Option<Instant>,
    trailing: Option<JoinHandle<()>>,
    fill: Option<JoinHandle<()>>,
}

/// Coordinates page loads for one search session.
///
/// Clones share timers and the seen-id set.
#[derive(Clone)]
pub struct PaginationManager {
    config: PaginationConfig,
    seen: SeenIds,
    timers: Arc<Mutex<Timers>>,
}

impl PaginationManager {
    /// Create a manager that deduplicates against `seen`.
    pub fn new(config: PaginationConfig, seen: SeenIds) -> Self {
        Self {
            config,
            seen,
            timers: Arc::new(Mutex::new(Timers::default())),
        }
    }

    pub fn config(&self) -> &PaginationConfig {
        &self.config
    }

    pub fn seen(&self) -> &SeenIds {
        &self.seen
    }

    /// Whether another page may be requested in `state`.
    pub fn can_load_more(state: &SearchState) -> bool {
        state.is_search_active
            && !state.is_loading
            && state.has_more
            && !state.current_search_term.is_empty()
    }

    /// Request the next page, throttled.
    ///
    /// `load_page` runs with the loading flag set; the flag is cleared
    /// afterwards whether it succeeded or not, unless a newer search has
    /// started in the meantime. Failures go to `on_error`.
    pub async fn load_more(
        &self,
        state: &StateManager,
        load_page: LoadPageFn,
        on_error: ErrorHandler,
    ) -> LoadMoreDecision {
        if !Self::can_load_more(&state.snapshot()) {
            trace!("load more skipped: state does not allow loading");
            return LoadMoreDecision::Skipped;
        }

        let throttle = self.config.throttle();
        let now = Instant::now();
        {
            let mut timers = self.lock_timers();
            match timers.last_load.map(|at| now.saturating_duration_since(at)) {
                Some(elapsed) if elapsed < throttle => {
                    if timers.trailing.as_ref().is_some_and(|h| !h.is_finished()) {
                        trace!("load more coalesced into pending trailing load");
                        return LoadMoreDecision::Coalesced;
                    }
                    let delay = throttle - elapsed;
                    let this = self.clone();
                    let state = state.clone();
                    // Spawned under the lock so the task cannot clear its slot
                    // before the handle is stored.
                    timers.trailing = Some(tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        {
                            let mut timers = this.lock_timers();
                            timers.trailing = None;
                            timers.last_load = Some(Instant::now());
                        }
                        if Self::can_load_more(&state.snapshot()) {
                            Self::execute(&state, &load_page, &on_error).await;
                        } else {
                            trace!("trailing load dropped: state no longer allows loading");
                        }
                    }));
                    debug!(delay_ms = delay.as_millis() as u64, "trailing load scheduled");
                    return LoadMoreDecision::Scheduled(delay);
                }
                _ => timers.last_load = Some(now),
            }
        }

        Self::execute(state, &load_page, &on_error).await;
        LoadMoreDecision::Executed
    }

    /// Filter out already-rendered images, recording the rest as rendered.
    pub fn deduplicate(&self, images: Vec<Image>) -> Vec<Image> {
        let before = images.len();
        let fresh = self.seen.filter_unseen(images);
        if fresh.len() < before {
            trace!(dropped = before - fresh.len(), "dropped already-seen images");
        }
        fresh
    }

    /// Keep loading pages while nothing is visible.
    ///
    /// Stops when something is visible, the backend has no more pages,
    /// another load is in flight, `alive` is cancelled, or
    /// `auto_load_max_attempts` pages have been tried. The attempt counter
    /// lives in [`SearchState::auto_load_attempts`] and is reset whenever
    /// the session is back on page 1.
    pub async fn auto_load_until_visible(
        &self,
        state: &StateManager,
        load_page: LoadPageFn,
        on_error: ErrorHandler,
        alive: &CancellationToken,
    ) -> AutoLoadOutcome {
        if state.snapshot().current_page == 1 {
            state.update_state(StateUpdate::default().auto_load_attempts(0));
        }
        let max_attempts = self.config.auto_load_max_attempts;

        loop {
            if alive.is_cancelled() {
                return AutoLoadOutcome::Cancelled;
            }
            let snapshot = state.snapshot();
            if snapshot.search_counts.visible > 0 {
                return AutoLoadOutcome::Visible;
            }
            if !snapshot.has_more {
                return AutoLoadOutcome::Exhausted;
            }
            if snapshot.is_loading {
                return AutoLoadOutcome::Busy;
            }
            if snapshot.auto_load_attempts >= max_attempts {
                warn!(
                    attempts = snapshot.auto_load_attempts,
                    page = snapshot.current_page,
                    "auto-load gave up: backend keeps reporting more pages but none are visible"
                );
                return AutoLoadOutcome::LimitReached(snapshot.auto_load_attempts);
            }

            let attempt = snapshot.auto_load_attempts + 1;
            state.update_state(StateUpdate::default().auto_load_attempts(attempt));
            debug!(attempt, page = snapshot.current_page + 1, "auto-loading next page");
            Self::execute(state, &load_page, &on_error).await;

            tokio::select! {
                _ = alive.cancelled() => return AutoLoadOutcome::Cancelled,
                _ = tokio::time::sleep(self.config.auto_load_yield()) => {}
            }
        }
    }

    /// Run `check` once after `fill_to_bottom_delay_ms`, unless `alive` is
    /// cancelled first. Replaces any fill check that is still pending.
    pub fn schedule_fill_to_bottom<F, Fut>(&self, check: F, alive: CancellationToken)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = self.config.fill_to_bottom_delay();
        let mut timers = self.lock_timers();
        if let Some(previous) = timers.fill.take() {
            previous.abort();
        }
        timers.fill = Some(tokio::spawn(async move {
            tokio::select! {
                _ = alive.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if alive.is_cancelled() {
                return;
            }
            check().await;
        }));
    }

    /// Whether a trailing load is waiting to fire.
    pub fn has_pending_load(&self) -> bool {
        self.lock_timers()
            .trailing
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Whether a fill-to-bottom check is waiting to fire.
    pub fn has_pending_fill(&self) -> bool {
        self.lock_timers()
            .fill
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Cancel pending timers and forget seen ids. Safe to call repeatedly.
    pub fn cleanup(&self) {
        {
            let mut timers = self.lock_timers();
            if let Some(handle) = timers.trailing.take() {
                handle.abort();
            }
            if let Some(handle) = timers.fill.take() {
                handle.abort();
            }
            timers.last_load = None;
        }
        self.seen.clear();
    }

    async fn execute(state: &StateManager, load_page: &LoadPageFn, on_error: &ErrorHandler) {
        let generation = state.current_request();
        state.update_state(StateUpdate::default().loading(true));
        if let Err(err) = load_page().await {
            on_error(err);
        }
        // A search started meanwhile owns the flag now.
        if state.current_request() == generation {
            state.update_state(StateUpdate::default().loading(false));
        }
    }

    fn lock_timers(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn image(id: &str) -> Image {
        Image {
            id: id.into(),
            url: format!("https://cdn.example/{id}.png"),
            prompt: String::new(),
            is_public: true,
            tags: vec![],
        }
    }

    fn make_manager(throttle_ms: u64, max_attempts: u32) -> PaginationManager {
        PaginationManager::new(
            PaginationConfig {
                throttle_ms,
                auto_load_max_attempts: max_attempts,
                fill_to_bottom_delay_ms: 20,
                auto_load_yield_ms: 1,
            },
            SeenIds::new(),
        )
    }

    fn active_state() -> StateManager {
        let state = StateManager::new();
        state.initialize_search("fox");
        state.update_state(StateUpdate::default().loading(false));
        state
    }

    fn counting_loader(calls: &Arc<AtomicUsize>) -> LoadPageFn {
        let calls = Arc::clone(calls);
        Arc::new(move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<(), SearchError>(())
            }
            .boxed()
        })
    }

    fn ignore_errors() -> ErrorHandler {
        Arc::new(|_| {})
    }

    #[test]
    fn can_load_more_requires_all_conditions() {
        let mut state = SearchState {
            current_search_term: "fox".into(),
            is_search_active: true,
            has_more: true,
            ..SearchState::default()
        };
        assert!(PaginationManager::can_load_more(&state));

        state.is_loading = true;
        assert!(!PaginationManager::can_load_more(&state));
        state.is_loading = false;

        state.has_more = false;
        assert!(!PaginationManager::can_load_more(&state));
        state.has_more = true;

        state.current_search_term.clear();
        assert!(!PaginationManager::can_load_more(&state));
        state.current_search_term = "fox".into();

        state.is_search_active = false;
        assert!(!PaginationManager::can_load_more(&state));
    }

    #[test]
    fn deduplicate_preserves_order_and_is_idempotent() {
        let manager = make_manager(100, 3);
        let batch = vec![image("a"), image("b"), image("a"), image("c")];
        let first = manager.deduplicate(batch.clone());
        let ids: Vec<&str> = first.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(manager.deduplicate(batch).is_empty());
    }

    #[test]
    fn seen_ids_shared_between_clones() {
        let seen = SeenIds::new();
        let manager = PaginationManager::new(PaginationConfig::default(), seen.clone());
        manager.deduplicate(vec![image("x")]);
        assert!(seen.contains("x"));
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn first_call_executes_immediately() {
        let manager = make_manager(100, 3);
        let state = active_state();
        let calls = Arc::new(AtomicUsize::new(0));
        let decision = manager
            .load_more(&state, counting_loader(&calls), ignore_errors())
            .await;
        assert_eq!(decision, LoadMoreDecision::Executed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!state.snapshot().is_loading);
    }

    #[tokio::test]
    async fn calls_within_window_produce_one_trailing_load() {
        let manager = make_manager(150, 3);
        let state = active_state();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = manager
            .load_more(&state, counting_loader(&calls), ignore_errors())
            .await;
        let second = manager
            .load_more(&state, counting_loader(&calls), ignore_errors())
            .await;
        let third = manager
            .load_more(&state, counting_loader(&calls), ignore_errors())
            .await;

        assert_eq!(first, LoadMoreDecision::Executed);
        assert!(matches!(second, LoadMoreDecision::Scheduled(_)));
        assert_eq!(third, LoadMoreDecision::Coalesced);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(manager.has_pending_load());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!manager.has_pending_load());
    }

    #[tokio::test]
    async fn skipped_when_state_disallows() {
        let manager = make_manager(100, 3);
        let state = StateManager::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let decision = manager
            .load_more(&state, counting_loader(&calls), ignore_errors())
            .await;
        assert_eq!(decision, LoadMoreDecision::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn errors_are_forwarded_and_loading_cleared() {
        let manager = make_manager(100, 3);
        let state = active_state();
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&errors);
        let failing: LoadPageFn =
            Arc::new(|| async { Err::<(), _>(SearchError::Network("offline".into())) }.boxed());
        let on_error: ErrorHandler = Arc::new(move |err| {
            assert!(err.to_string().contains("offline"));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.load_more(&state, failing, on_error).await;
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(!state.snapshot().is_loading);
    }

    #[tokio::test]
    async fn cleanup_cancels_trailing_load() {
        let manager = make_manager(100, 3);
        let state = active_state();
        let calls = Arc::new(AtomicUsize::new(0));
        manager
            .load_more(&state, counting_loader(&calls), ignore_errors())
            .await;
        manager
            .load_more(&state, counting_loader(&calls), ignore_errors())
            .await;
        manager.cleanup();
        manager.cleanup();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn auto_load_stops_at_attempt_bound() {
        let manager = make_manager(10, 4);
        let state = active_state();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader: LoadPageFn = {
            let calls = Arc::clone(&calls);
            let state = state.clone();
            Arc::new(move || {
                let calls = Arc::clone(&calls);
                let state = state.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let page = state.snapshot().current_page + 1;
                    state.update_state(StateUpdate::default().page(page).has_more(true));
                    Ok::<(), SearchError>(())
                }
                .boxed()
            })
        };

        let outcome = manager
            .auto_load_until_visible(&state, loader, ignore_errors(), &CancellationToken::new())
            .await;
        assert_eq!(outcome, AutoLoadOutcome::LimitReached(4));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn auto_load_stops_once_something_is_visible() {
        let manager = make_manager(10, 10);
        let state = active_state();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader: LoadPageFn = {
            let calls = Arc::clone(&calls);
            let state = state.clone();
            Arc::new(move || {
                let calls = Arc::clone(&calls);
                let state = state.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 1 {
                        state.update_counts(|counts| counts.visible = 2);
                    }
                    Ok::<(), SearchError>(())
                }
                .boxed()
            })
        };

        let outcome = manager
            .auto_load_until_visible(&state, loader, ignore_errors(), &CancellationToken::new())
            .await;
        assert_eq!(outcome, AutoLoadOutcome::Visible);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn auto_load_exhausted_without_loading() {
        let manager = make_manager(10, 10);
        let state = active_state();
        state.update_state(StateUpdate::default().has_more(false));
        let calls = Arc::new(AtomicUsize::new(0));
        let outcome = manager
            .auto_load_until_visible(
                &state,
                counting_loader(&calls),
                ignore_errors(),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(outcome, AutoLoadOutcome::Exhausted);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn auto_load_respects_cancelled_session() {
        let manager = make_manager(10, 10);
        let state = active_state();
        let alive = CancellationToken::new();
        alive.cancel();
        let calls = Arc::new(AtomicUsize::new(0));
        let outcome = manager
            .auto_load_until_visible(&state, counting_loader(&calls), ignore_errors(), &alive)
            .await;
        assert_eq!(outcome, AutoLoadOutcome::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn auto_load_attempts_reset_on_first_page() {
        let manager = make_manager(10, 2);
        let state = active_state();
        state.update_state(StateUpdate::default().auto_load_attempts(2));
        let calls = Arc::new(AtomicUsize::new(0));
        let outcome = manager
            .auto_load_until_visible(
                &state,
                counting_loader(&calls),
                ignore_errors(),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(outcome, AutoLoadOutcome::LimitReached(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fill_to_bottom_runs_once_after_delay() {
        let manager = make_manager(10, 3);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        manager.schedule_fill_to_bottom(
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            CancellationToken::new(),
        );
        assert!(manager.has_pending_fill());
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fill_to_bottom_skipped_when_session_dies() {
        let manager = make_manager(10, 3);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let alive = CancellationToken::new();
        manager.schedule_fill_to_bottom(
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            alive.clone(),
        );
        alive.cancel();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rescheduling_fill_replaces_pending_check() {
        let manager = make_manager(10, 3);
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = Arc::clone(&calls);
            manager.schedule_fill_to_bottom(
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                CancellationToken::new(),
            );
        }
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cleanup_clears_seen_ids_and_is_idempotent() {
        let manager = make_manager(10, 3);
        manager.deduplicate(vec![image("a"), image("b")]);
        manager.cleanup();
        manager.cleanup();
        assert!(manager.seen().is_empty());
        assert_eq!(manager.deduplicate(vec![image("a")]).len(), 1);
    }

    #[tokio::test]
    async fn superseded_load_leaves_new_search_loading() {
        let manager = make_manager(10, 3);
        let state = active_state();
        let inner_state = state.clone();
        let loader: LoadPageFn = Arc::new(move || {
            let state = inner_state.clone();
            async move {
                state.initialize_search("owl");
                Ok::<(), SearchError>(())
            }
            .boxed()
        });
        manager.load_more(&state, loader, ignore_errors()).await;
        let snapshot = state.snapshot();
        assert_eq!(snapshot.current_search_term, "owl");
        assert!(snapshot.is_loading);
    }
}
