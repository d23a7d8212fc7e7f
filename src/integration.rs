//! Bridge from the search pipeline to the rendered feed.
//!
//! [`FeedIntegration`] is the [`ResultDisplay`] handed to a
//! [`SearchController`](imagefeed_search::SearchController). It applies the
//! client-side visibility policy, draws results through a
//! [`FeedRenderer`], and keeps the regular feed hidden while results are
//! shown.

use std::sync::Arc;

use imagefeed_search::{Image, ResultDisplay, SearchError};
use serde::{Deserialize, Serialize};

use crate::display::{DisplayManager, FeedView};

/// Inline status shown in place of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ResultStatus {
    NoResults { query: String },
    Error { query: String, message: String },
}

/// Draws search results.
pub trait FeedRenderer: Send + Sync + 'static {
    /// Remove any rendered results and status.
    fn clear_results(&self);

    /// Append `images` to the result grid.
    fn render_images(&self, images: &[Image]);

    fn render_status(&self, status: &ResultStatus);

    /// Show or hide the "load more" sentinel.
    fn set_load_more(&self, has_more: bool);

    fn last_rendered_id(&self) -> Option<String>;
}

/// Which results may be drawn for the current viewer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityPolicy {
    /// Draw private images (the viewer owns them or is an admin).
    pub show_private: bool,
}

impl VisibilityPolicy {
    pub fn allows(&self, image: &Image) -> bool {
        image.is_public || self.show_private
    }
}

/// [`ResultDisplay`] that draws into the gallery feed.
pub struct FeedIntegration<R, V> {
    renderer: Arc<R>,
    display: DisplayManager<V>,
    policy: VisibilityPolicy,
}

impl<R: FeedRenderer, V: FeedView> FeedIntegration<R, V> {
    pub fn new(renderer: Arc<R>, display: DisplayManager<V>, policy: VisibilityPolicy) -> Self {
        Self {
            renderer,
            display,
            policy,
        }
    }

    pub fn display(&self) -> &DisplayManager<V> {
        &self.display
    }

    /// Leave search mode: clear results and bring the feed back.
    pub fn exit_search(&self) -> usize {
        self.renderer.clear_results();
        self.renderer.set_load_more(false);
        self.display.exit_search()
    }

    fn render_allowed(&self, images: &[Image]) -> usize {
        let allowed: Vec<Image> = images
            .iter()
            .filter(|image| self.policy.allows(image))
            .cloned()
            .collect();
        if !allowed.is_empty() {
            self.renderer.render_images(&allowed);
        }
        if allowed.len() < images.len() {
            tracing::trace!(
                filtered = images.len() - allowed.len(),
                "results hidden by visibility policy"
            );
        }
        allowed.len()
    }
}

impl<R: FeedRenderer, V: FeedView> ResultDisplay for FeedIntegration<R, V> {
    fn show_results(&self, query: &str, images: &[Image]) -> usize {
        self.display.enter_search();
        self.renderer.clear_results();
        if images.is_empty() {
            self.renderer.render_status(&ResultStatus::NoResults {
                query: query.to_owned(),
            });
            return 0;
        }
        self.render_allowed(images)
    }

    fn append_results(&self, images: &[Image], has_more: bool, _page: u32) -> usize {
        let visible = self.render_allowed(images);
        self.renderer.set_load_more(has_more);
        visible
    }

    fn show_error(&self, query: &str, error: &SearchError) {
        self.display.enter_search();
        self.renderer.clear_results();
        self.renderer.render_status(&ResultStatus::Error {
            query: query.to_owned(),
            message: error.user_message().to_owned(),
        });
    }

    fn last_rendered_id(&self) -> Option<String> {
        self.renderer.last_rendered_id()
    }
}
