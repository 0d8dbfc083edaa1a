use crate::classifier::Outcome;
use crate::config::CircuitBreakerConfig;
use crate::events::CircuitBreakerEvent;
#[cfg(feature = "metrics")]
use metrics::{counter, gauge, histogram};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// The circuit breaker's state set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Normal operation; calls are allowed and outcomes are recorded.
    Closed = 0,
    /// Calls are rejected until `waitDurationInOpenState` elapses.
    Open = 1,
    /// A limited number of probe calls are allowed through.
    HalfOpen = 2,
    /// Permits all calls and records nothing; a manual opt-out.
    Disabled = 3,
    /// Denies all calls and records nothing; a manual circuit-breaker trip.
    ForcedOpen = 4,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            3 => CircuitState::Disabled,
            4 => CircuitState::ForcedOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Point-in-time snapshot of a circuit breaker's sliding window.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitMetrics {
    pub state: CircuitState,
    pub total_calls: usize,
    pub failure_count: usize,
    pub success_count: usize,
    pub ignored_count: usize,
    pub slow_call_count: usize,
    pub not_permitted_count: u64,
    pub failure_rate: f64,
    pub slow_call_rate: f64,
    pub time_since_state_change: Duration,
}

#[derive(Debug, Clone, Copy)]
struct CallRecord {
    outcome: Outcome,
    is_slow: bool,
}

/// The mutable sliding-window state machine behind a circuit breaker
/// instance. Holds a true ring buffer (bounded `VecDeque`) whose capacity
/// switches between `ringBufferSizeInClosedState` and
/// `ringBufferSizeInHalfOpenState` depending on the current state.
pub(crate) struct Circuit {
    state: CircuitState,
    state_atomic: std::sync::Arc<AtomicU8>,
    last_state_change: Instant,
    records: VecDeque<CallRecord>,
    not_permitted_count: u64,
    /// Calls recorded since the window last started filling (reset on every
    /// state transition), unbounded by ring capacity. Distinguishes "the
    /// ring just reached capacity for the first time" from "the ring was
    /// already full and has since rolled over" — both read as
    /// `total == ring_buffer_size_in_closed_state` from the bounded window
    /// alone.
    calls_since_window_start: usize,
}

impl Circuit {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::new_with_atomic(std::sync::Arc::new(AtomicU8::new(CircuitState::Closed as u8)))
    }

    pub(crate) fn new_with_atomic(state_atomic: std::sync::Arc<AtomicU8>) -> Self {
        Self {
            state: CircuitState::Closed,
            state_atomic,
            last_state_change: Instant::now(),
            records: VecDeque::new(),
            not_permitted_count: 0,
            calls_since_window_start: 0,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    fn capacity(&self, config: &CircuitBreakerConfig<impl Sized, impl Sized>) -> usize {
        match self.state {
            CircuitState::HalfOpen => config.ring_buffer_size_in_half_open_state,
            _ => config.ring_buffer_size_in_closed_state,
        }
    }

    fn counts(&self) -> (usize, usize, usize, usize) {
        let mut success = 0;
        let mut failure = 0;
        let mut ignored = 0;
        let mut slow = 0;
        for record in &self.records {
            match record.outcome {
                Outcome::Success => success += 1,
                Outcome::Failure => failure += 1,
                Outcome::Ignored => ignored += 1,
            }
            if record.is_slow {
                slow += 1;
            }
        }
        (success, failure, ignored, slow)
    }

    pub fn metrics(&self, config: &CircuitBreakerConfig<impl Sized, impl Sized>) -> CircuitMetrics {
        let (success_count, failure_count, ignored_count, slow_call_count) = self.counts();
        let total_calls = success_count + failure_count;
        let failure_rate = if total_calls > 0 {
            failure_count as f64 / total_calls as f64
        } else {
            0.0
        };
        let slow_call_rate = if total_calls > 0 {
            slow_call_count as f64 / total_calls as f64
        } else {
            0.0
        };

        CircuitMetrics {
            state: self.state,
            total_calls,
            failure_count,
            success_count,
            ignored_count,
            slow_call_count,
            not_permitted_count: self.not_permitted_count,
            failure_rate,
            slow_call_rate,
            time_since_state_change: self.last_state_change.elapsed(),
        }
    }

    fn push_record(&mut self, config: &CircuitBreakerConfig<impl Sized, impl Sized>, record: CallRecord) {
        let capacity = self.capacity(config);
        self.records.push_back(record);
        while self.records.len() > capacity {
            self.records.pop_front();
        }
    }

    /// Records an outcome obtained while holding a permission, per
    /// spec.md §4.2's `onSuccess`/`onError`.
    pub fn record_outcome(
        &mut self,
        config: &CircuitBreakerConfig<impl Sized, impl Sized>,
        outcome: Outcome,
        duration: Duration,
    ) {
        if matches!(self.state, CircuitState::Disabled | CircuitState::ForcedOpen) {
            return;
        }

        let is_slow = config
            .slow_call_duration_threshold
            .map(|threshold| duration >= threshold)
            .unwrap_or(false);

        self.push_record(config, CallRecord { outcome, is_slow });

        let event = match outcome {
            Outcome::Success => CircuitBreakerEvent::Success {
                pattern_name: config.name.clone(),
                timestamp: Instant::now(),
                state: self.state,
                duration,
            },
            Outcome::Failure => CircuitBreakerEvent::Error {
                pattern_name: config.name.clone(),
                timestamp: Instant::now(),
                state: self.state,
                duration,
            },
            Outcome::Ignored => CircuitBreakerEvent::IgnoredError {
                pattern_name: config.name.clone(),
                timestamp: Instant::now(),
                state: self.state,
                duration,
            },
        };
        config.event_listeners.emit(&event);

        if is_slow {
            config
                .event_listeners
                .emit(&CircuitBreakerEvent::SlowCallDetected {
                    pattern_name: config.name.clone(),
                    timestamp: Instant::now(),
                    state: self.state,
                    duration,
                });
            #[cfg(feature = "metrics")]
            counter!("circuitbreaker_slow_calls_total", "circuitbreaker" => config.name.clone())
                .increment(1);
        }

        #[cfg(feature = "metrics")]
        {
            let outcome_label = match outcome {
                Outcome::Success => "success",
                Outcome::Failure => "failure",
                Outcome::Ignored => "ignored",
            };
            counter!("circuitbreaker_calls_total", "circuitbreaker" => config.name.clone(), "outcome" => outcome_label)
                .increment(1);
            histogram!("circuitbreaker_call_duration_seconds", "circuitbreaker" => config.name.clone())
                .record(duration.as_secs_f64());
        }

        match self.state {
            CircuitState::HalfOpen => {
                let (success, failure, _ignored, _slow) = self.counts();
                if success + failure >= config.ring_buffer_size_in_half_open_state {
                    self.evaluate_half_open(config);
                }
            }
            CircuitState::Closed => {
                self.calls_since_window_start += 1;
                self.evaluate_closed(config);
            }
            CircuitState::Disabled | CircuitState::ForcedOpen | CircuitState::Open => {}
        }
    }

    /// Implements `tryAcquirePermission`/`acquirePermission`: returns whether
    /// the call is allowed, performing the lazy OPEN→HALF_OPEN transition
    /// when the wait has elapsed.
    pub fn try_acquire(&mut self, config: &CircuitBreakerConfig<impl Sized, impl Sized>) -> bool {
        let permitted = match self.state {
            CircuitState::Closed | CircuitState::Disabled => true,
            CircuitState::ForcedOpen => false,
            CircuitState::Open => {
                if self.last_state_change.elapsed() >= config.wait_duration_in_open_state {
                    self.transition_to(CircuitState::HalfOpen, config);
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                let (success, failure, _ignored, _slow) = self.counts();
                success + failure < config.ring_buffer_size_in_half_open_state
            }
        };

        if !permitted {
            self.not_permitted_count += 1;
            config
                .event_listeners
                .emit(&CircuitBreakerEvent::NotPermitted {
                    pattern_name: config.name.clone(),
                    timestamp: Instant::now(),
                });
            #[cfg(feature = "metrics")]
            counter!("circuitbreaker_calls_total", "circuitbreaker" => config.name.clone(), "outcome" => "not_permitted")
                .increment(1);
        }

        permitted
    }

    pub fn force_open(&mut self, config: &CircuitBreakerConfig<impl Sized, impl Sized>) {
        self.transition_to(CircuitState::ForcedOpen, config);
    }

    pub fn disable(&mut self, config: &CircuitBreakerConfig<impl Sized, impl Sized>) {
        self.transition_to(CircuitState::Disabled, config);
    }

    pub fn reset(&mut self, config: &CircuitBreakerConfig<impl Sized, impl Sized>) {
        self.transition_to(CircuitState::Closed, config);
        config.event_listeners.emit(&CircuitBreakerEvent::Reset {
            pattern_name: config.name.clone(),
            timestamp: Instant::now(),
        });
    }

    /// Called by the background timer (when
    /// `automaticTransitionFromOpenToHalfOpenEnabled` is set) so monitoring
    /// observes the transition even without traffic.
    pub fn try_automatic_transition(&mut self, config: &CircuitBreakerConfig<impl Sized, impl Sized>) {
        if self.state == CircuitState::Open
            && self.last_state_change.elapsed() >= config.wait_duration_in_open_state
        {
            self.transition_to(CircuitState::HalfOpen, config);
        }
    }

    fn evaluate_closed(&mut self, config: &CircuitBreakerConfig<impl Sized, impl Sized>) {
        let (success, failure, _ignored, slow) = self.counts();
        let total = success + failure;

        if total < config.minimum_number_of_calls {
            return;
        }
        if total < config.ring_buffer_size_in_closed_state {
            return;
        }
        // The call that first fills the ring must not trigger a transition;
        // only once the window has rolled over (evicted its first entry)
        // is the computed rate evaluated against a fully turned-over window.
        if self.calls_since_window_start <= config.ring_buffer_size_in_closed_state {
            return;
        }

        let failure_rate = failure as f64 / total as f64;
        let slow_call_rate = slow as f64 / total as f64;

        let should_open = failure_rate >= config.failure_rate_threshold
            || (config.slow_call_duration_threshold.is_some()
                && slow_call_rate >= config.slow_call_rate_threshold);

        if should_open {
            self.transition_to(CircuitState::Open, config);
        }
    }

    fn evaluate_half_open(&mut self, config: &CircuitBreakerConfig<impl Sized, impl Sized>) {
        let (success, failure, _ignored, slow) = self.counts();
        let total = success + failure;
        if total == 0 {
            return;
        }
        let failure_rate = failure as f64 / total as f64;
        let slow_call_rate = slow as f64 / total as f64;

        let should_reopen = failure_rate >= config.failure_rate_threshold
            || (config.slow_call_duration_threshold.is_some()
                && slow_call_rate >= config.slow_call_rate_threshold);

        if should_reopen {
            self.transition_to(CircuitState::Open, config);
        } else {
            self.transition_to(CircuitState::Closed, config);
        }
    }

    fn transition_to(
        &mut self,
        state: CircuitState,
        config: &CircuitBreakerConfig<impl Sized, impl Sized>,
    ) {
        if self.state == state {
            return;
        }
        let from_state = self.state;

        config
            .event_listeners
            .emit(&CircuitBreakerEvent::StateTransition {
                pattern_name: config.name.clone(),
                timestamp: Instant::now(),
                from_state,
                to_state: state,
            });

        #[cfg(feature = "tracing")]
        tracing::info!(circuitbreaker = %config.name, from = ?from_state, to = ?state, "circuit breaker state transition");

        #[cfg(feature = "metrics")]
        {
            let label = |s: CircuitState| match s {
                CircuitState::Closed => "closed",
                CircuitState::Open => "open",
                CircuitState::HalfOpen => "half_open",
                CircuitState::Disabled => "disabled",
                CircuitState::ForcedOpen => "forced_open",
            };
            counter!(
                "circuitbreaker_transitions_total",
                "circuitbreaker" => config.name.clone(),
                "from" => label(from_state),
                "to" => label(state)
            )
            .increment(1);
            gauge!("circuitbreaker_state", "circuitbreaker" => config.name.clone(), "state" => label(state)).set(1.0);
        }

        self.state = state;
        self.state_atomic.store(state as u8, Ordering::Release);
        self.last_state_change = Instant::now();
        self.records.clear();
        self.calls_since_window_start = 0;
    }
}
