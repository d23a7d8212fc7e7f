//! Error types for the imagefeed-search crate.
//!
//! Every failure in the search pipeline is classified into one of a small
//! number of kinds so that callers can decide whether to surface it to the
//! user, retry on the next scroll event, or silently drop it.

/// Errors that can occur while fetching or applying search pages.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    /// The page payload did not have the expected shape.
    #[error("validation error: {0}")]
    Validation(String),

    /// Transport failure or non-success HTTP status.
    #[error("network error: {0}")]
    Network(String),

    /// The request was explicitly cancelled.
    #[error("request aborted: {0}")]
    Aborted(String),

    /// Anything that does not fit the other categories.
    #[error("unexpected error: {0}")]
    Unknown(String),

    /// Invalid search configuration.
    #[error("config error: {0}")]
    Config(String),
}

/// Coarse classification of a [`SearchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Network,
    Aborted,
    Unknown,
    Config,
}

impl SearchError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Network(_) => ErrorKind::Network,
            Self::Aborted(_) => ErrorKind::Aborted,
            Self::Unknown(_) => ErrorKind::Unknown,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Returns the kind used when presenting this error to a user.
    ///
    /// Unknown failures are shown as network failures.
    pub fn display_kind(&self) -> ErrorKind {
        match self.kind() {
            ErrorKind::Unknown => ErrorKind::Network,
            other => other,
        }
    }

    /// Whether this error is a cancellation that must not reach the user.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }

    /// Whether the failed operation may succeed if simply tried again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.display_kind(), ErrorKind::Network)
    }

    /// Short, stable message suitable for an inline error state.
    pub fn user_message(&self) -> &'static str {
        match self.display_kind() {
            ErrorKind::Validation => "The server returned an unexpected response.",
            ErrorKind::Network | ErrorKind::Unknown => {
                "Search is unavailable right now. Please try again."
            }
            ErrorKind::Aborted => "Search was cancelled.",
            ErrorKind::Config => "Search is misconfigured.",
        }
    }
}

/// Convenience type alias for imagefeed-search results.
pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn display_validation() {
        let err = SearchError::Validation("missing images array".into());
        assert_eq!(err.to_string(), "validation error: missing images array");
    }

    #[test]
    fn display_network() {
        let err = SearchError::Network("connection refused".into());
        assert_eq!(err.to_string(), "network error: connection refused");
    }

    #[test]
    fn display_aborted() {
        let err = SearchError::Aborted("superseded".into());
        assert_eq!(err.to_string(), "request aborted: superseded");
    }

    #[test]
    fn unknown_is_displayed_as_network() {
        let err = SearchError::Unknown("boom".into());
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(err.display_kind(), ErrorKind::Network);
        assert!(err.is_recoverable());
    }

    #[test]
    fn only_aborted_is_abort() {
        assert!(SearchError::Aborted("x".into()).is_abort());
        assert!(!SearchError::Network("x".into()).is_abort());
        assert!(!SearchError::Validation("x".into()).is_abort());
    }

    #[test]
    fn validation_is_not_recoverable() {
        assert!(!SearchError::Validation("bad".into()).is_recoverable());
    }

    #[test]
    fn user_message_never_leaks_detail() {
        let err = SearchError::Network("10.0.0.3:8080 refused".into());
        assert!(!err.user_message().contains("10.0.0.3"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SearchError>();
    }
}
