//! imagefeed: gallery feed client core.
//!
//! This crate wires the search session core (`imagefeed-search`) to the
//! gallery API and to the rendered feed:
//! Search box → SearchController → HTTP fetcher → FeedIntegration → Grid
//!
//! # Architecture
//!
//! - **Search sessions**: [`imagefeed_search::SearchController`] owns state,
//!   page cache, throttled pagination and result processing
//! - **Feed loading**: [`feed::FeedLoader`] shares in-flight feed requests
//!   and caches normalized pages for a few seconds
//! - **Display**: [`display::DisplayManager`] hides the regular feed while a
//!   search is shown and restores it afterwards
//! - **Integration**: [`integration::FeedIntegration`] renders search results
//!   under the viewer's visibility policy
//! - **HTTP**: [`http`] fetchers built on `reqwest`

pub mod config;
pub mod display;
pub mod error;
pub mod feed;
pub mod http;
pub mod integration;

pub use config::{FeedConfig, FeedSettings};
pub use display::{DisplayManager, FeedView, MonitorStrategy, RenderEvent};
pub use error::{FeedError, Result};
pub use feed::{FeedFetcher, FeedLoader, FeedPage, FeedRequest};
pub use http::{HttpFeedFetcher, HttpSearchFetcher};
pub use integration::{FeedIntegration, FeedRenderer, ResultStatus, VisibilityPolicy};
