use resilience_core::ResilienceError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the `RateLimiter` service.
#[derive(Debug, Clone, Error)]
pub enum RateLimiterError {
    /// The reservation's computed wait would exceed `timeoutDuration`.
    #[error("rate limiter denied the request, retry after {retry_after:?}")]
    RequestNotPermitted {
        /// How long the caller would have had to wait.
        retry_after: Duration,
    },
}

impl<E> From<RateLimiterError> for ResilienceError<E> {
    fn from(err: RateLimiterError) -> Self {
        match err {
            RateLimiterError::RequestNotPermitted { retry_after } => {
                ResilienceError::RequestNotPermitted {
                    retry_after: Some(retry_after),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let error = RateLimiterError::RequestNotPermitted {
            retry_after: Duration::from_millis(50),
        };
        assert!(error.to_string().contains("50ms"));
    }
}
