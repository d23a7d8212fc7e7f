//! Feed visibility during an active search.
//!
//! While a search is showing, the regular feed stays rendered but hidden.
//! [`DisplayManager`] hides it on entry, runs a monitor that re-hides any
//! feed items that slip back into view (late renders, infinite-scroll
//! prefetch), and restores exactly what it hid on exit.
//!
//! # Monitor
//!
//! The monitor wakes on a [`MonitorStrategy`]: a fixed polling interval,
//! or every [`RenderEvent`] broadcast by the feed renderer. It stops on its
//! own once the search is no longer active.
//!
//! ```rust,ignore
//! let display = DisplayManager::new(view, controller.state().clone(), MonitorStrategy::polling(interval));
//! display.enter_search();
//! // ...
//! display.exit_search();
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use imagefeed_search::StateManager;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::FeedSettings;

/// The non-search part of the rendered page.
pub trait FeedView: Send + Sync + 'static {
    /// Ids of feed items that are currently shown.
    fn visible_feed_items(&self) -> Vec<String>;

    /// Hide (without removing) the given items.
    fn hide_items(&self, ids: &[String]);

    /// Show the given items again.
    fn show_items(&self, ids: &[String]);
}

/// Notification from the feed renderer that the page changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    /// Items were added to the feed.
    ItemsAdded { count: usize },
    /// The feed was re-rendered from scratch.
    Reset,
}

/// What wakes the leaked-content monitor.
#[derive(Debug, Clone)]
pub enum MonitorStrategy {
    /// Check at a fixed interval.
    Polling { interval: Duration },
    /// Check after every render event.
    RenderEvents(broadcast::Sender<RenderEvent>),
}

impl MonitorStrategy {
    pub fn polling(interval: Duration) -> Self {
        Self::Polling { interval }
    }

    pub fn from_settings(settings: &FeedSettings) -> Self {
        Self::polling(settings.monitor_interval())
    }

    fn trigger(&self) -> Trigger {
        match self {
            Self::Polling { interval } => {
                let mut ticker = tokio::time::interval(*interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Trigger::Interval(ticker)
            }
            Self::RenderEvents(tx) => Trigger::Events(tx.subscribe()),
        }
    }
}

enum Trigger {
    Interval(Interval),
    Events(broadcast::Receiver<RenderEvent>),
}

impl Trigger {
    /// Wait for the next wake-up. Returns `false` when the source is gone.
    async fn next_tick(&mut self) -> bool {
        match self {
            Self::Interval(ticker) => {
                ticker.tick().await;
                true
            }
            Self::Events(rx) => match rx.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => true,
                Err(RecvError::Closed) => false,
            },
        }
    }
}

#[derive(Default)]
struct DisplaySession {
    /// Set by `enter_search`, cleared by `exit_search`.
    active: bool,
    /// Items hidden by us, in hiding order.
    hidden: Vec<String>,
    monitor: Option<(CancellationToken, JoinHandle<()>)>,
}

struct DisplayInner<V> {
    view: Arc<V>,
    state: StateManager,
    strategy: MonitorStrategy,
    session: Mutex<DisplaySession>,
}

/// Hides and restores regular feed content around a search.
///
/// Cheap to clone; clones share the session.
pub struct DisplayManager<V> {
    inner: Arc<DisplayInner<V>>,
}

impl<V> Clone for DisplayManager<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: FeedView> DisplayManager<V> {
    /// `state` is the search session whose activity gates the monitor.
    pub fn new(view: Arc<V>, state: StateManager, strategy: MonitorStrategy) -> Self {
        Self {
            inner: Arc::new(DisplayInner {
                view,
                state,
                strategy,
                session: Mutex::new(DisplaySession::default()),
            }),
        }
    }

    /// Hide visible feed content and start the monitor.
    ///
    /// Calling this again while a search is shown only re-hides leaked
    /// items. Returns how many items were newly hidden.
    pub fn enter_search(&self) -> usize {
        let mut session = self.lock();
        session.active = true;
        let hidden = self.hide_visible(&mut session);
        let running = session
            .monitor
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished());
        if !running {
            session.monitor = Some(self.spawn_monitor());
        }
        hidden
    }

    /// Hide any feed item that is visible right now.
    ///
    /// Returns how many items were hidden. Does nothing outside a search.
    pub fn rehide_leaked(&self) -> usize {
        let mut session = self.lock();
        if !session.active {
            return 0;
        }
        self.hide_visible(&mut session)
    }

    /// Hide and record visible items. The session lock is held throughout
    /// so a concurrent exit either sees them recorded or runs after us.
    fn hide_visible(&self, session: &mut DisplaySession) -> usize {
        let leaked = self.inner.view.visible_feed_items();
        if leaked.is_empty() {
            return 0;
        }
        self.inner.view.hide_items(&leaked);
        for id in &leaked {
            if !session.hidden.contains(id) {
                session.hidden.push(id.clone());
            }
        }
        leaked.len()
    }

    /// Stop the monitor and show exactly the items hidden since
    /// [`enter_search`](Self::enter_search).
    ///
    /// Returns how many items were restored. Safe to call when no search
    /// is shown.
    pub fn exit_search(&self) -> usize {
        let (hidden, monitor) = {
            let mut session = self.lock();
            session.active = false;
            (
                std::mem::take(&mut session.hidden),
                session.monitor.take(),
            )
        };
        if let Some((token, _handle)) = monitor {
            token.cancel();
        }
        if !hidden.is_empty() {
            self.inner.view.show_items(&hidden);
            debug!(restored = hidden.len(), "feed content restored");
        }
        hidden.len()
    }

    /// Number of items currently hidden by this manager.
    pub fn hidden_count(&self) -> usize {
        self.lock().hidden.len()
    }

    /// Whether the leaked-content monitor is running.
    pub fn is_monitoring(&self) -> bool {
        self.lock()
            .monitor
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
    }

    fn spawn_monitor(&self) -> (CancellationToken, JoinHandle<()>) {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let this = self.clone();
        let mut trigger = self.inner.strategy.trigger();

        let handle = tokio::spawn(async move {
            trace!("feed monitor started");
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    alive = trigger.next_tick() => {
                        if token.is_cancelled() {
                            break;
                        }
                        if !alive {
                            debug!("render event source closed, feed monitor stopping");
                            break;
                        }
                        if !this.inner.state.snapshot().is_search_active {
                            debug!("search no longer active, feed monitor stopping");
                            break;
                        }
                        let leaked = this.rehide_leaked();
                        if leaked > 0 {
                            debug!(leaked, "re-hid feed content that leaked into view");
                        }
                    }
                }
            }
            trace!("feed monitor stopped");
        });
        (cancel, handle)
    }

    fn lock(&self) -> MutexGuard<'_, DisplaySession> {
        self.inner.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::collections::BTreeMap;

    /// Feed with per-item visibility.
    #[derive(Default)]
    struct FakeFeed {
        items: Mutex<BTreeMap<String, bool>>,
    }

    impl FakeFeed {
        fn with_items(visible: &[&str], hidden: &[&str]) -> Self {
            let feed = Self::default();
            {
                let mut items = feed.items.lock().unwrap();
                for id in visible {
                    items.insert((*id).to_owned(), true);
                }
                for id in hidden {
                    items.insert((*id).to_owned(), false);
                }
            }
            feed
        }

        fn render(&self, id: &str) {
            self.items.lock().unwrap().insert(id.to_owned(), true);
        }

        fn visible(&self) -> Vec<String> {
            self.visible_feed_items()
        }
    }

    impl FeedView for FakeFeed {
        fn visible_feed_items(&self) -> Vec<String> {
            self.items
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, shown)| **shown)
                .map(|(id, _)| id.clone())
                .collect()
        }

        fn hide_items(&self, ids: &[String]) {
            let mut items = self.items.lock().unwrap();
            for id in ids {
                items.insert(id.clone(), false);
            }
        }

        fn show_items(&self, ids: &[String]) {
            let mut items = self.items.lock().unwrap();
            for id in ids {
                items.insert(id.clone(), true);
            }
        }
    }

    fn active_state() -> StateManager {
        let state = StateManager::new();
        state.initialize_search("cat");
        state
    }

    #[tokio::test]
    async fn exit_restores_exactly_what_was_hidden() {
        let feed = Arc::new(FakeFeed::with_items(&["a", "b"], &["already-hidden"]));
        let display = DisplayManager::new(
            Arc::clone(&feed),
            active_state(),
            MonitorStrategy::polling(Duration::from_secs(60)),
        );

        assert_eq!(display.enter_search(), 2);
        assert!(feed.visible().is_empty());
        assert_eq!(display.exit_search(), 2);
        assert_eq!(feed.visible(), vec!["a", "b"]);
        assert!(!display.is_monitoring());
    }

    #[tokio::test]
    async fn polling_monitor_rehides_leaked_items() {
        let feed = Arc::new(FakeFeed::with_items(&["a"], &[]));
        let display = DisplayManager::new(
            Arc::clone(&feed),
            active_state(),
            MonitorStrategy::polling(Duration::from_millis(10)),
        );
        display.enter_search();
        feed.render("late");
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(feed.visible().is_empty());
        assert_eq!(display.hidden_count(), 2);

        display.exit_search();
        assert_eq!(feed.visible(), vec!["a", "late"]);
    }

    #[tokio::test]
    async fn render_event_monitor_rehides_on_event() {
        let feed = Arc::new(FakeFeed::with_items(&[], &[]));
        let (tx, _rx) = broadcast::channel(8);
        let display = DisplayManager::new(
            Arc::clone(&feed),
            active_state(),
            MonitorStrategy::RenderEvents(tx.clone()),
        );
        display.enter_search();
        tokio::task::yield_now().await;

        feed.render("x");
        tx.send(RenderEvent::ItemsAdded { count: 1 }).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(feed.visible().is_empty());
        assert_eq!(display.hidden_count(), 1);
    }

    #[tokio::test]
    async fn monitor_stops_when_search_ends() {
        let feed = Arc::new(FakeFeed::default());
        let state = active_state();
        let display = DisplayManager::new(
            Arc::clone(&feed),
            state.clone(),
            MonitorStrategy::polling(Duration::from_millis(10)),
        );
        display.enter_search();
        assert!(display.is_monitoring());

        state.reset_state();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!display.is_monitoring());

        // Items rendered after the monitor stopped stay visible.
        feed.render("y");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(feed.visible(), vec!["y"]);
    }

    #[tokio::test]
    async fn repeated_enter_keeps_single_monitor() {
        let feed = Arc::new(FakeFeed::with_items(&["a"], &[]));
        let display = DisplayManager::new(
            Arc::clone(&feed),
            active_state(),
            MonitorStrategy::polling(Duration::from_secs(60)),
        );
        assert_eq!(display.enter_search(), 1);
        assert_eq!(display.enter_search(), 0);
        assert_eq!(display.hidden_count(), 1);
        assert_eq!(display.exit_search(), 1);
        assert_eq!(display.exit_search(), 0);
    }

    #[tokio::test]
    async fn due_tick_after_exit_does_not_rehide() {
        for _ in 0..20 {
            let feed = Arc::new(FakeFeed::with_items(&["a"], &[]));
            let display = DisplayManager::new(
                Arc::clone(&feed),
                active_state(),
                MonitorStrategy::polling(Duration::from_millis(5)),
            );
            display.enter_search();
            tokio::task::yield_now().await;
            // Block the runtime so a tick is already due when exit runs.
            std::thread::sleep(Duration::from_millis(20));
            assert_eq!(display.exit_search(), 1);

            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(feed.visible(), vec!["a"]);
            assert_eq!(display.hidden_count(), 0);
        }
    }

    #[test]
    fn rehide_outside_search_is_a_no_op() {
        let feed = Arc::new(FakeFeed::with_items(&["a"], &[]));
        let display = DisplayManager::new(
            Arc::clone(&feed),
            StateManager::new(),
            MonitorStrategy::polling(Duration::from_secs(60)),
        );
        assert_eq!(display.rehide_leaked(), 0);
        assert_eq!(feed.visible(), vec!["a"]);
    }

    #[test]
    fn strategy_from_settings_polls_at_configured_interval() {
        let strategy = MonitorStrategy::from_settings(&FeedSettings::default());
        assert!(matches!(
            strategy,
            MonitorStrategy::Polling { interval } if interval == Duration::from_millis(500)
        ));
    }
}
