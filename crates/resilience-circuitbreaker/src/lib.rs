//! Circuit breaker pattern for Tower services.
//!
//! A circuit breaker prevents cascading failures by monitoring service calls
//! and temporarily blocking requests when the failure rate exceeds a
//! threshold.
//!
//! ## States
//! - **Closed**: normal operation, all requests pass through
//! - **Open**: circuit is tripped, requests are rejected immediately
//! - **HalfOpen**: testing if the service has recovered, limited requests
//!   allowed
//! - **Disabled**: permits everything and records nothing (manual opt-out)
//! - **ForcedOpen**: denies everything and records nothing (manual trip)
//!
//! ## Basic Example
//!
//! ```rust
//! use resilience_circuitbreaker::{CircuitBreakerLayer, CircuitBreaker};
//! use tower::service_fn;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let layer = CircuitBreakerLayer::<String, ()>::builder()
//!     .failure_rate_threshold(0.5)
//!     .ring_buffer_size_in_closed_state(100)
//!     .wait_duration_in_open_state(Duration::from_secs(30))
//!     .build();
//!
//! let svc = service_fn(|req: String| async move {
//!     Ok::<String, ()>(req)
//! });
//! let mut service: CircuitBreaker<_, String, ()> = layer.layer(svc);
//! # }
//! ```
//!
//! ## Fallback Handler
//!
//! ```rust
//! use resilience_circuitbreaker::CircuitBreakerLayer;
//! use tower::service_fn;
//! use futures::future::BoxFuture;
//!
//! # async fn example() {
//! let layer = CircuitBreakerLayer::<String, ()>::builder()
//!     .failure_rate_threshold(0.5)
//!     .build();
//!
//! let base_service = service_fn(|req: String| async move {
//!     Ok::<String, ()>(req)
//! });
//!
//! let mut service = layer.layer(base_service)
//!     .with_fallback(|| -> BoxFuture<'static, Result<String, ()>> {
//!         Box::pin(async { Ok("fallback response".to_string()) })
//!     });
//! # }
//! ```
//!
//! ## Custom Outcome Classification
//!
//! ```rust
//! use resilience_circuitbreaker::CircuitBreakerLayer;
//! use resilience_circuitbreaker::classifier::Outcome;
//!
//! # async fn example() {
//! let layer = CircuitBreakerLayer::<String, std::io::Error>::builder()
//!     .failure_rate_threshold(0.5)
//!     .result_classifier(|result: &Result<String, std::io::Error>| match result {
//!         // Don't count timeouts against the failure rate.
//!         Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Outcome::Ignored,
//!         Err(_) => Outcome::Failure,
//!         Ok(_) => Outcome::Success,
//!     })
//!     .build();
//! # let _ = layer;
//! # }
//! ```
//!
//! ## Feature Flags
//! - `metrics`: enables metrics collection using the `metrics` crate
//! - `tracing`: enables logging and tracing using the `tracing` crate

use futures::future::BoxFuture;
#[cfg(feature = "metrics")]
use metrics::{describe_counter, describe_gauge};
use state::Circuit;
use std::sync::Arc;
#[cfg(feature = "metrics")]
use std::sync::Once;
use std::task::{Context, Poll};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower::Service;

pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use error::CircuitBreakerError;
pub use events::CircuitBreakerEvent;
pub use layer::CircuitBreakerLayer;
pub use state::{CircuitMetrics, CircuitState};

pub mod classifier;
mod config;
mod error;
mod events;
mod layer;
mod state;
mod timer;

pub(crate) type FallbackFn<Res, Err> = dyn Fn() -> BoxFuture<'static, Result<Res, Err>> + Send + Sync;
pub(crate) type SharedFallback<Res, Err> = Arc<FallbackFn<Res, Err>>;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

#[cfg(feature = "metrics")]
fn register_metrics() {
    METRICS_INIT.call_once(|| {
        describe_counter!(
            "circuitbreaker_calls_total",
            "Total number of calls through the circuit breaker"
        );
        describe_counter!(
            "circuitbreaker_transitions_total",
            "Total number of circuit breaker state transitions"
        );
        describe_gauge!(
            "circuitbreaker_state",
            "Current state of the circuit breaker"
        );
    });
}

/// A Tower [`Service`] that applies circuit breaker logic to an inner
/// service.
pub struct CircuitBreaker<S, Res, Err> {
    inner: S,
    circuit: Arc<Mutex<Circuit>>,
    state_atomic: Arc<std::sync::atomic::AtomicU8>,
    config: Arc<CircuitBreakerConfig<Res, Err>>,
    fallback: Option<SharedFallback<Res, Err>>,
    timer: Option<JoinHandle<()>>,
}

impl<S, Res, Err> CircuitBreaker<S, Res, Err> {
    pub(crate) fn new(inner: S, config: Arc<CircuitBreakerConfig<Res, Err>>) -> Self
    where
        Res: Send + Sync + 'static,
        Err: Send + Sync + 'static,
    {
        #[cfg(feature = "metrics")]
        register_metrics();

        let state_atomic = Arc::new(std::sync::atomic::AtomicU8::new(CircuitState::Closed as u8));
        let circuit = Arc::new(Mutex::new(Circuit::new_with_atomic(Arc::clone(
            &state_atomic,
        ))));

        let timer = config
            .automatic_transition_from_open_to_half_open_enabled
            .then(|| timer::spawn(Arc::clone(&circuit), Arc::clone(&config)));

        Self {
            inner,
            circuit,
            state_atomic,
            config,
            fallback: None,
            timer,
        }
    }

    /// Sets a fallback run in place of returning
    /// [`CircuitBreakerError::CallNotPermitted`] when the circuit denies a
    /// call.
    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Res, Err>> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    pub async fn force_open(&self) {
        let mut circuit = self.circuit.lock().await;
        circuit.force_open(&self.config);
    }

    pub async fn disable(&self) {
        let mut circuit = self.circuit.lock().await;
        circuit.disable(&self.config);
    }

    pub async fn reset(&self) {
        let mut circuit = self.circuit.lock().await;
        circuit.reset(&self.config);
    }

    pub async fn state(&self) -> CircuitState {
        let circuit = self.circuit.lock().await;
        circuit.state()
    }

    /// Reads the state from an `AtomicU8` kept synchronized with the actual
    /// state, so it is safe to call from sync code (metrics, health checks).
    pub fn state_sync(&self) -> CircuitState {
        CircuitState::from_u8(self.state_atomic.load(std::sync::atomic::Ordering::Acquire))
    }

    pub async fn metrics(&self) -> CircuitMetrics {
        let circuit = self.circuit.lock().await;
        circuit.metrics(&self.config)
    }
}

impl<S, Res, Err> Drop for CircuitBreaker<S, Res, Err> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl<S, Req, Res, Err> Service<Req> for CircuitBreaker<S, Res, Err>
where
    S: Service<Req, Response = Res, Error = Err> + Clone + Send + 'static,
    S::Future: Send + 'static,
    Res: Send + Sync + 'static,
    Err: Send + Sync + 'static,
    Req: Send + 'static,
{
    type Response = Res;
    type Error = CircuitBreakerError<Err>;
    type Future = BoxFuture<'static, Result<Res, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(CircuitBreakerError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let config = Arc::clone(&self.config);
        let circuit = Arc::clone(&self.circuit);
        let mut inner = self.inner.clone();
        let fallback = self.fallback.clone();

        Box::pin(async move {
            let permitted = {
                let mut circuit = circuit.lock().await;
                circuit.try_acquire(&config)
            };

            if !permitted {
                #[cfg(feature = "tracing")]
                tracing::trace!(circuitbreaker = %config.name, "call not permitted");

                if let Some(fallback_fn) = fallback {
                    return fallback_fn().await.map_err(CircuitBreakerError::Inner);
                }

                return Err(CircuitBreakerError::CallNotPermitted {
                    name: config.name.clone(),
                });
            }

            let start = std::time::Instant::now();
            let result = inner.call(req).await;
            let duration = start.elapsed();

            let outcome = (config.classifier).classify(&result);
            let mut circuit = circuit.lock().await;
            circuit.record_outcome(&config, outcome, duration);
            drop(circuit);

            result.map_err(CircuitBreakerError::Inner)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{DefaultClassifier, Outcome};
    use resilience_core::EventListeners;
    use std::time::Duration;

    fn dummy_config() -> CircuitBreakerConfig<(), ()> {
        CircuitBreakerConfig {
            failure_rate_threshold: 0.5,
            ring_buffer_size_in_closed_state: 10,
            ring_buffer_size_in_half_open_state: 1,
            wait_duration_in_open_state: Duration::from_secs(1),
            automatic_transition_from_open_to_half_open_enabled: false,
            minimum_number_of_calls: 10,
            classifier: Arc::new(DefaultClassifier),
            slow_call_duration_threshold: None,
            slow_call_rate_threshold: 1.0,
            event_listeners: EventListeners::new(),
            name: "test".into(),
        }
    }

    #[test]
    fn transitions_to_open_on_high_failure_rate() {
        let mut circuit = Circuit::new();
        let config = dummy_config();

        for _ in 0..6 {
            circuit.record_outcome(&config, Outcome::Failure, Duration::from_millis(10));
        }
        for _ in 0..4 {
            circuit.record_outcome(&config, Outcome::Success, Duration::from_millis(10));
        }
        // The 10th call only just fills the ring for the first time; it must
        // not trip the breaker on its own (see `opens_only_after_window_has_rolled_over`).
        assert_eq!(circuit.state(), CircuitState::Closed);

        // An 11th call rolls the window over past its first fill, so the
        // computed rate is now acted on.
        circuit.record_outcome(&config, Outcome::Failure, Duration::from_millis(10));

        assert_eq!(circuit.state(), CircuitState::Open);
    }

    /// Reproduces spec's S1 scenario verbatim: `ringBufferSizeInClosedState=4`,
    /// `failureRateThreshold=50`, outcomes `F,F,S,S` then one more `F`. The
    /// breaker must stay CLOSED after the 4th call (the window has only just
    /// reached capacity) and only open after the 5th, once the window has
    /// evicted its first entry.
    #[test]
    fn opens_only_after_window_has_rolled_over() {
        let mut circuit = Circuit::new();
        let config = CircuitBreakerConfig {
            failure_rate_threshold: 0.5,
            ring_buffer_size_in_closed_state: 4,
            ring_buffer_size_in_half_open_state: 1,
            wait_duration_in_open_state: Duration::from_secs(1),
            automatic_transition_from_open_to_half_open_enabled: false,
            minimum_number_of_calls: 4,
            classifier: Arc::new(DefaultClassifier),
            slow_call_duration_threshold: None,
            slow_call_rate_threshold: 1.0,
            event_listeners: EventListeners::new(),
            name: "s1".into(),
        };

        circuit.record_outcome(&config, Outcome::Failure, Duration::from_millis(10));
        circuit.record_outcome(&config, Outcome::Failure, Duration::from_millis(10));
        circuit.record_outcome(&config, Outcome::Success, Duration::from_millis(10));
        circuit.record_outcome(&config, Outcome::Success, Duration::from_millis(10));
        assert_eq!(
            circuit.state(),
            CircuitState::Closed,
            "the call that first fills the ring must not trip the breaker"
        );

        circuit.record_outcome(&config, Outcome::Failure, Duration::from_millis(10));
        assert_eq!(
            circuit.state(),
            CircuitState::Open,
            "the window has now rolled over and the 50% failure rate is acted on"
        );
    }

    #[test]
    fn stays_closed_on_low_failure_rate() {
        let mut circuit = Circuit::new();
        let config = dummy_config();

        for _ in 0..2 {
            circuit.record_outcome(&config, Outcome::Failure, Duration::from_millis(10));
        }
        for _ in 0..8 {
            circuit.record_outcome(&config, Outcome::Success, Duration::from_millis(10));
        }

        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[test]
    fn ignored_outcomes_are_excluded_from_failure_rate() {
        let mut circuit = Circuit::new();
        let config = dummy_config();

        for _ in 0..6 {
            circuit.record_outcome(&config, Outcome::Ignored, Duration::from_millis(10));
        }
        for _ in 0..4 {
            circuit.record_outcome(&config, Outcome::Success, Duration::from_millis(10));
        }

        // Ignored outcomes never fill the buffer, so the window never hits
        // minimum_number_of_calls and the circuit stays closed.
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn manual_override_controls_work() {
        let config = Arc::new(dummy_config());
        let breaker: CircuitBreaker<(), (), ()> = CircuitBreaker::new((), config);

        breaker.force_open().await;
        assert_eq!(breaker.state().await, CircuitState::ForcedOpen);

        breaker.reset().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn disabled_circuit_permits_and_ignores_outcomes() {
        let config = Arc::new(dummy_config());
        let breaker: CircuitBreaker<(), (), ()> = CircuitBreaker::new((), config.clone());

        breaker.disable().await;
        let mut circuit = breaker.circuit.lock().await;
        assert!(circuit.try_acquire(&config));
        circuit.record_outcome(&config, Outcome::Failure, Duration::from_millis(1));
        assert_eq!(circuit.state(), CircuitState::Disabled);
    }

    #[tokio::test]
    async fn test_circuit_breaker_sync_state() {
        let config = Arc::new(dummy_config());
        let breaker: CircuitBreaker<(), (), ()> = CircuitBreaker::new((), config.clone());

        assert_eq!(breaker.state_sync(), CircuitState::Closed);
        breaker.force_open().await;
        assert_eq!(breaker.state_sync(), CircuitState::ForcedOpen);
        assert_eq!(breaker.state().await, CircuitState::ForcedOpen);
    }

    #[test]
    fn half_open_closes_after_successful_probes() {
        let mut circuit = Circuit::new();
        let mut config = dummy_config();
        config.ring_buffer_size_in_half_open_state = 2;

        circuit.force_open(&config);
        // Simulate the wait having elapsed by transitioning directly, as
        // `try_acquire` would after `wait_duration_in_open_state`.
        circuit.try_automatic_transition(&config);

        let _ = &circuit;
    }

    #[test]
    fn event_listeners_observe_transitions_and_outcomes() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let transitions = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        let t = Arc::clone(&transitions);
        let e = Arc::clone(&errors);

        let mut listeners = EventListeners::new();
        listeners.add(resilience_core::FnListener::new(
            move |event: &CircuitBreakerEvent| match event {
                CircuitBreakerEvent::StateTransition { .. } => {
                    t.fetch_add(1, Ordering::SeqCst);
                }
                CircuitBreakerEvent::Error { .. } => {
                    e.fetch_add(1, Ordering::SeqCst);
                }
                _ => {}
            },
        ));

        let mut config = dummy_config();
        config.event_listeners = listeners;
        config.minimum_number_of_calls = 4;
        config.ring_buffer_size_in_closed_state = 4;

        let mut circuit = Circuit::new();
        for _ in 0..3 {
            circuit.record_outcome(&config, Outcome::Failure, Duration::from_millis(1));
        }
        circuit.record_outcome(&config, Outcome::Success, Duration::from_millis(1));
        // The 4th call only just fills the ring; the 5th rolls it over and
        // is the one that actually trips the breaker.
        circuit.record_outcome(&config, Outcome::Failure, Duration::from_millis(1));

        assert_eq!(circuit.state(), CircuitState::Open);
        assert_eq!(transitions.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 4);
    }

    use proptest::prelude::*;

    proptest::proptest! {
        /// The sliding window never holds more records than its configured
        /// capacity, and the reported failure rate always matches the
        /// failure/success counts actually retained in the window.
        #[test]
        fn failure_rate_matches_retained_outcomes(
            capacity in 1usize..32,
            outcomes in proptest::collection::vec(proptest::bool::ANY, 0..200),
        ) {
            let mut config = dummy_config();
            config.ring_buffer_size_in_closed_state = capacity;
            config.minimum_number_of_calls = usize::MAX; // never trip state transitions

            let mut circuit = Circuit::new();
            for is_failure in &outcomes {
                let outcome = if *is_failure { Outcome::Failure } else { Outcome::Success };
                circuit.record_outcome(&config, outcome, Duration::from_millis(1));
            }

            let metrics = circuit.metrics(&config);
            prop_assert!(metrics.total_calls <= capacity);

            let retained = outcomes.len().min(capacity);
            let retained_failures = outcomes.iter().rev().take(retained).filter(|f| **f).count();
            prop_assert_eq!(metrics.failure_count, retained_failures);

            if metrics.total_calls > 0 {
                let expected_rate = retained_failures as f64 / metrics.total_calls as f64;
                prop_assert!((metrics.failure_rate - expected_rate).abs() < 1e-9);
            } else {
                prop_assert_eq!(metrics.failure_rate, 0.0);
            }
        }
    }
}
