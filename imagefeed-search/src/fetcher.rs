//! Trait definitions for the collaborators the search pipeline talks to.
//!
//! The pipeline never touches the network or the rendered page directly:
//!
//! - [`SearchFetcher`] retrieves one raw page of search results.
//! - [`ResultDisplay`] puts validated results on screen.
//! - [`VisibilityProbe`] answers whether a rendered item is in the viewport.

use serde_json::Value;

use crate::error::SearchError;
use crate::types::Image;

/// A paged search backend.
///
/// Implementations return the raw JSON payload; validation happens in the
/// [`ResultProcessor`](crate::processor::ResultProcessor) so that a
/// malformed page is never cached.
///
/// All implementations must be `Send + Sync` since page loads run on
/// spawned timer tasks.
pub trait SearchFetcher: Send + Sync + 'static {
    /// Fetch page `page` (1-based) of results for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Network`] for transport failures and non-2xx
    /// responses, or [`SearchError::Aborted`] if the request was cancelled.
    fn fetch(
        &self,
        query: &str,
        page: u32,
    ) -> impl std::future::Future<Output = Result<Value, SearchError>> + Send;
}

/// Rendering side of the search pipeline.
///
/// Methods are synchronous: by the time they return, the results are on
/// screen and later pagination decisions may rely on them.
pub trait ResultDisplay: Send + Sync + 'static {
    /// Replace any previous search results with the first page.
    ///
    /// Returns how many of `images` actually became visible.
    fn show_results(&self, query: &str, images: &[Image]) -> usize;

    /// Append a subsequent page. Returns how many became visible.
    fn append_results(&self, images: &[Image], has_more: bool, page: u32) -> usize;

    /// Show an inline error state for a failed search.
    fn show_error(&self, query: &str, error: &SearchError);

    /// Id of the last rendered result, used to decide whether the viewport
    /// still needs filling.
    fn last_rendered_id(&self) -> Option<String> {
        None
    }
}

/// Viewport intersection test for rendered items.
pub trait VisibilityProbe: Send + Sync + 'static {
    fn is_in_viewport(&self, image_id: &str) -> bool;
}
