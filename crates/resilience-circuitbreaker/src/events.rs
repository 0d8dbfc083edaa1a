//! Events published by the circuit breaker.

use crate::state::CircuitState;
use resilience_core::ResilienceEvent;
use std::time::{Duration, Instant};

/// Lifecycle events emitted by a circuit breaker instance.
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// A call completed successfully and was recorded.
    Success {
        pattern_name: String,
        timestamp: Instant,
        state: CircuitState,
        duration: Duration,
    },
    /// A call failed and was recorded against the failure rate.
    Error {
        pattern_name: String,
        timestamp: Instant,
        state: CircuitState,
        duration: Duration,
    },
    /// A call's error matched `ignoreExceptions`/`ignoreExceptionPredicate` and
    /// was excluded from the failure-rate calculation.
    IgnoredError {
        pattern_name: String,
        timestamp: Instant,
        state: CircuitState,
        duration: Duration,
    },
    /// A call exceeded `slowCallDurationThreshold`.
    SlowCallDetected {
        pattern_name: String,
        timestamp: Instant,
        state: CircuitState,
        duration: Duration,
    },
    /// A call was denied a permission (`OPEN` or `FORCED_OPEN`).
    NotPermitted {
        pattern_name: String,
        timestamp: Instant,
    },
    /// The circuit moved from one state to another.
    StateTransition {
        pattern_name: String,
        timestamp: Instant,
        from_state: CircuitState,
        to_state: CircuitState,
    },
    /// The circuit was manually reset to `CLOSED`.
    Reset {
        pattern_name: String,
        timestamp: Instant,
    },
}

impl ResilienceEvent for CircuitBreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::Success { .. } => "success",
            CircuitBreakerEvent::Error { .. } => "error",
            CircuitBreakerEvent::IgnoredError { .. } => "ignored_error",
            CircuitBreakerEvent::SlowCallDetected { .. } => "slow_call_detected",
            CircuitBreakerEvent::NotPermitted { .. } => "not_permitted",
            CircuitBreakerEvent::StateTransition { .. } => "state_transition",
            CircuitBreakerEvent::Reset { .. } => "reset",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CircuitBreakerEvent::Success { timestamp, .. }
            | CircuitBreakerEvent::Error { timestamp, .. }
            | CircuitBreakerEvent::IgnoredError { timestamp, .. }
            | CircuitBreakerEvent::SlowCallDetected { timestamp, .. }
            | CircuitBreakerEvent::NotPermitted { timestamp, .. }
            | CircuitBreakerEvent::StateTransition { timestamp, .. }
            | CircuitBreakerEvent::Reset { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            CircuitBreakerEvent::Success { pattern_name, .. }
            | CircuitBreakerEvent::Error { pattern_name, .. }
            | CircuitBreakerEvent::IgnoredError { pattern_name, .. }
            | CircuitBreakerEvent::SlowCallDetected { pattern_name, .. }
            | CircuitBreakerEvent::NotPermitted { pattern_name, .. }
            | CircuitBreakerEvent::StateTransition { pattern_name, .. }
            | CircuitBreakerEvent::Reset { pattern_name, .. } => pattern_name,
        }
    }
}
