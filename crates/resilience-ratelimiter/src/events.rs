//! Events published by the rate limiter.

use resilience_core::ResilienceEvent;
use std::time::{Duration, Instant};

/// Lifecycle events emitted by a rate limiter instance.
#[derive(Debug, Clone)]
pub enum RateLimiterEvent {
    /// A permit was reserved, immediately or after a wait.
    PermitAcquired {
        pattern_name: String,
        timestamp: Instant,
        wait_duration: Duration,
    },
    /// A request was denied: the computed wait would exceed `timeoutDuration`.
    PermitRejected {
        pattern_name: String,
        timestamp: Instant,
        timeout_duration: Duration,
    },
}

impl ResilienceEvent for RateLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimiterEvent::PermitAcquired { .. } => "permit_acquired",
            RateLimiterEvent::PermitRejected { .. } => "permit_rejected",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimiterEvent::PermitAcquired { timestamp, .. }
            | RateLimiterEvent::PermitRejected { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            RateLimiterEvent::PermitAcquired { pattern_name, .. }
            | RateLimiterEvent::PermitRejected { pattern_name, .. } => pattern_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_matches_variant() {
        let e = RateLimiterEvent::PermitRejected {
            pattern_name: "rl".into(),
            timestamp: Instant::now(),
            timeout_duration: Duration::from_millis(10),
        };
        assert_eq!(e.event_type(), "permit_rejected");
        assert_eq!(e.pattern_name(), "rl");
    }
}
