//! The cross-primitive error taxonomy.
//!
//! [`ResilienceError<E>`] lets a service compose several resilience layers
//! without writing a `From` impl per layer error: each primitive crate
//! provides `From<XError> for ResilienceError<E>`, so stacking bulkhead +
//! circuit breaker + rate limiter + retry + time limiter needs only one
//! error type end to end.
//!
//! The six non-`Application` variants are exactly the exception taxonomy
//! every primitive's permission protocol can raise: `CallNotPermitted`
//! (circuit breaker), `BulkheadFull`, `RequestNotPermitted` (rate limiter),
//! `Timeout` (time limiter), `MaxRetriesExceeded`, and
//! `ConfigurationNotFound` (registry base-config lookups).
//!
//! ```
//! use resilience_core::ResilienceError;
//!
//! #[derive(Debug, Clone)]
//! enum AppError {
//!     DatabaseDown,
//! }
//!
//! impl std::fmt::Display for AppError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "database down")
//!     }
//! }
//!
//! impl std::error::Error for AppError {}
//!
//! type ServiceError = ResilienceError<AppError>;
//!
//! fn handle(err: ServiceError) {
//!     match err {
//!         ResilienceError::CallNotPermitted { name } => {
//!             eprintln!("circuit breaker {:?} denied the call", name);
//!         }
//!         ResilienceError::Application(app_err) => eprintln!("application error: {app_err}"),
//!         _ => {}
//!     }
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// A common error type that wraps every resilience layer's denial in one
/// enum, plus the wrapped service's own application error.
#[derive(Debug, Clone, Error)]
pub enum ResilienceError<E> {
    /// The time limiter's wait elapsed before the producer completed.
    #[error("timeout in {layer}")]
    Timeout {
        /// The layer that timed out (e.g. `"time_limiter"`, `"bulkhead"`).
        layer: &'static str,
    },

    /// The circuit breaker denied the call (`OPEN` or `FORCED_OPEN`).
    #[error("circuit breaker {name:?} denied the call")]
    CallNotPermitted {
        /// Circuit breaker instance name, if configured.
        name: Option<String>,
    },

    /// The bulkhead's wait for a permit timed out, or its queue rejected.
    #[error("bulkhead full ({concurrent_calls}/{max_concurrent})")]
    BulkheadFull {
        /// Current number of concurrent calls holding a permit.
        concurrent_calls: usize,
        /// Maximum concurrent calls the bulkhead allows.
        max_concurrent: usize,
    },

    /// The rate limiter could not reserve a permit within `timeoutDuration`.
    #[error("rate limiter denied the request, retry after {retry_after:?}")]
    RequestNotPermitted {
        /// How long the caller would have had to wait, if known.
        retry_after: Option<Duration>,
    },

    /// The retry policy exhausted `maxAttempts` without a success.
    #[error("retry exhausted after {attempts} attempts")]
    MaxRetriesExceeded {
        /// Total attempts made, including the first.
        attempts: usize,
    },

    /// A `baseConfig` name was referenced but not registered.
    #[error("configuration {0:?} not found")]
    ConfigurationNotFound(String),

    /// The underlying application service returned an error.
    #[error("application error: {0}")]
    Application(E),
}

impl<E> ResilienceError<E> {
    /// Returns `true` if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ResilienceError::Timeout { .. })
    }

    /// Returns `true` if this is a circuit breaker denial.
    pub fn is_call_not_permitted(&self) -> bool {
        matches!(self, ResilienceError::CallNotPermitted { .. })
    }

    /// Returns `true` if this is a bulkhead-full error.
    pub fn is_bulkhead_full(&self) -> bool {
        matches!(self, ResilienceError::BulkheadFull { .. })
    }

    /// Returns `true` if this is a rate-limiter denial.
    pub fn is_request_not_permitted(&self) -> bool {
        matches!(self, ResilienceError::RequestNotPermitted { .. })
    }

    /// Returns `true` if this is a retry-exhaustion error.
    pub fn is_max_retries_exceeded(&self) -> bool {
        matches!(self, ResilienceError::MaxRetriesExceeded { .. })
    }

    /// Returns `true` if this is a missing-configuration error.
    pub fn is_configuration_not_found(&self) -> bool {
        matches!(self, ResilienceError::ConfigurationNotFound(_))
    }

    /// Returns `true` if this is an application error.
    pub fn is_application(&self) -> bool {
        matches!(self, ResilienceError::Application(_))
    }

    /// Extracts the application error, if this is an `Application` variant.
    pub fn application_error(self) -> Option<E> {
        match self {
            ResilienceError::Application(e) => Some(e),
            _ => None,
        }
    }

    /// Maps the application error using a function, leaving every other
    /// variant untouched.
    ///
    /// ```
    /// use resilience_core::ResilienceError;
    ///
    /// let err: ResilienceError<String> = ResilienceError::Application("error".to_string());
    /// let mapped: ResilienceError<usize> = err.map_application(|s| s.len());
    /// assert_eq!(mapped.application_error(), Some(5));
    /// ```
    pub fn map_application<F, T>(self, f: F) -> ResilienceError<T>
    where
        F: FnOnce(E) -> T,
    {
        match self {
            ResilienceError::Timeout { layer } => ResilienceError::Timeout { layer },
            ResilienceError::CallNotPermitted { name } => ResilienceError::CallNotPermitted { name },
            ResilienceError::BulkheadFull {
                concurrent_calls,
                max_concurrent,
            } => ResilienceError::BulkheadFull {
                concurrent_calls,
                max_concurrent,
            },
            ResilienceError::RequestNotPermitted { retry_after } => {
                ResilienceError::RequestNotPermitted { retry_after }
            }
            ResilienceError::MaxRetriesExceeded { attempts } => {
                ResilienceError::MaxRetriesExceeded { attempts }
            }
            ResilienceError::ConfigurationNotFound(name) => {
                ResilienceError::ConfigurationNotFound(name)
            }
            ResilienceError::Application(e) => ResilienceError::Application(f(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct TestError;

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error")
        }
    }

    impl std::error::Error for TestError {}

    const _: () = {
        const fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<ResilienceError<TestError>>();
    };

    #[test]
    fn test_into_box_error() {
        let err: ResilienceError<TestError> = ResilienceError::Timeout { layer: "test" };
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(err);
        assert!(boxed.to_string().contains("timeout"));
    }

    #[test]
    fn test_application_error_into_box_error() {
        let err: ResilienceError<TestError> = ResilienceError::Application(TestError);
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(err);
        assert!(boxed.to_string().contains("test error"));
    }

    #[test]
    fn test_configuration_not_found() {
        let err: ResilienceError<TestError> =
            ResilienceError::ConfigurationNotFound("payments".to_string());
        assert!(err.is_configuration_not_found());
        assert!(err.to_string().contains("payments"));
    }
}
