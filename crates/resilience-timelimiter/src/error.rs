//! Error types for time limiter.

use thiserror::Error;

/// Errors that can occur in the time limiter.
#[derive(Debug, Error)]
pub enum TimeLimiterError<E> {
    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,
    /// The inner service returned an error.
    #[error("inner service error: {0}")]
    Inner(E),
}

impl<E> TimeLimiterError<E> {
    /// Returns true if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimeLimiterError::Timeout)
    }

    /// Converts this error into the inner error, if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            TimeLimiterError::Timeout => None,
            TimeLimiterError::Inner(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_error_reports_no_inner() {
        let err: TimeLimiterError<&str> = TimeLimiterError::Timeout;
        assert!(err.is_timeout());
        assert_eq!(err.into_inner(), None);
    }

    #[test]
    fn inner_error_carries_through() {
        let err = TimeLimiterError::Inner("inner error");
        assert!(!err.is_timeout());
        assert_eq!(err.into_inner(), Some("inner error"));
    }

    #[test]
    fn display_distinguishes_timeout_from_inner() {
        let err: TimeLimiterError<&str> = TimeLimiterError::Timeout;
        assert_eq!(err.to_string(), "request timed out");

        let err = TimeLimiterError::Inner("test");
        assert_eq!(err.to_string(), "inner service error: test");
    }
}
