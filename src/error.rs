//! Error types for the imagefeed client.

use std::sync::Arc;

use imagefeed_search::{ErrorKind, SearchError};

/// Top-level error type for feed loading and display.
///
/// `Clone` so that one failed shared feed request can be handed to every
/// caller that joined it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FeedError {
    /// Search pipeline error (fetch, validation, abort).
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Feed response did not match any known envelope shape.
    #[error("feed envelope error: {0}")]
    Envelope(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for FeedError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl FeedError {
    /// Classify this error using the search taxonomy.
    ///
    /// Envelope errors are validation failures; I/O errors count as
    /// unknown.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Search(err) => err.kind(),
            Self::Envelope(_) => ErrorKind::Validation,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Unknown,
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Search(err) if err.is_abort())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, FeedError>;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn search_errors_keep_their_kind() {
        let err: FeedError = SearchError::Network("reset".into()).into();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(err.to_string(), "network error: reset");
    }

    #[test]
    fn envelope_errors_are_validation() {
        let err = FeedError::Envelope("no images".into());
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.is_abort());
    }

    #[test]
    fn io_errors_convert_and_clone() {
        let err: FeedError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        let copy = err.clone();
        assert!(copy.to_string().contains("gone"));
        assert_eq!(copy.kind(), ErrorKind::Unknown);
    }

    #[test]
    fn abort_detected_through_wrapper() {
        let err = FeedError::from(SearchError::Aborted("navigated away".into()));
        assert!(err.is_abort());
    }
}
