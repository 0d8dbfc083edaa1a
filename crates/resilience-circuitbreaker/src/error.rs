use thiserror::Error;

/// Errors returned by the `CircuitBreaker` service, matching the
/// `CallNotPermitted` exception taxonomy entry.
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The circuit denied the call: `OPEN` (wait not elapsed) or
    /// `FORCED_OPEN`.
    #[error("circuit breaker {name:?} denied the call")]
    CallNotPermitted { name: String },

    /// An error returned by the inner service.
    #[error("inner service error: {0}")]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    /// Returns true if the error indicates the circuit denied the call.
    pub fn is_call_not_permitted(&self) -> bool {
        matches!(self, CircuitBreakerError::CallNotPermitted { .. })
    }

    /// Returns the inner error if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_helpers() {
        let err: CircuitBreakerError<&str> = CircuitBreakerError::CallNotPermitted {
            name: "payments".into(),
        };
        assert!(err.is_call_not_permitted());
        assert_eq!(err.into_inner(), None);

        let err2 = CircuitBreakerError::Inner("fail");
        assert!(!err2.is_call_not_permitted());
        assert_eq!(err2.into_inner(), Some("fail"));
    }
}
