//! # imagefeed-search
//!
//! Search session core for the imagefeed gallery client.
//!
//! This crate owns everything between "the user typed a query" and "results
//! are on screen": who is allowed to write session state, which pages are
//! cached, when the next page may load, and what to do with a page once it
//! arrives. Networking and rendering are supplied by the caller through the
//! traits in [`fetcher`].
//!
//! ## Design
//!
//! - Every search mints a [`RequestId`]; responses carrying an older id are
//!   dropped at fetch return, result processing and finalisation
//! - `(query, page)` cache with TTL, global LRU and a per-query cap
//! - Concurrent fetches of the same `(query, page)` share one request
//! - Leading+trailing throttle for "load more"
//! - Cross-page dedup by image id
//! - Bounded auto-load when a page renders nothing visible
//! - Shared resources ([`SearchResources`]) are built by the caller and
//!   injected, never global
//!
//! ## Logging
//!
//! Queries are logged at trace/debug level only. Failed loads are logged at
//! warn; cancelled loads at debug.

pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod fetcher;
pub mod inflight;
pub mod pagination;
pub mod processor;
pub mod state;
pub mod types;

pub use cache::CacheManager;
pub use config::SearchConfig;
pub use controller::{SearchController, SearchOutcome, SearchResources};
pub use error::{ErrorKind, Result, SearchError};
pub use fetcher::{ResultDisplay, SearchFetcher, VisibilityProbe};
pub use inflight::InFlightFetches;
pub use pagination::{AutoLoadOutcome, LoadMoreDecision, PaginationManager, SeenIds};
pub use processor::{ErrorDisposition, PageOutcome, ResultProcessor};
pub use state::{RequestId, SearchState, StateManager, StateUpdate};
pub use types::{Image, SearchCounts, SearchPage};
