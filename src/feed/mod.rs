//! Feed page loading.
//!
//! - [`envelope`] reduces the feed API's response shapes to a [`FeedPage`]
//! - [`loader`] shares in-flight requests and caches normalized pages

pub mod envelope;
pub mod loader;

pub use envelope::{FeedPage, normalize_feed_response};
pub use loader::{FeedFetcher, FeedLoader, FeedRequest};
