use crate::classifier::{DefaultClassifier, Outcome, ResultClassifier};
use crate::events::CircuitBreakerEvent;
use resilience_core::EventListeners;
use std::sync::Arc;
use std::time::Duration;

pub(crate) type SharedClassifier<Res, Err> = Arc<dyn ResultClassifier<Res, Err>>;

/// Configuration for a circuit breaker instance.
///
/// Mirrors the external configuration shape: `failureRateThreshold`,
/// `slowCallRateThreshold`/`slowCallDurationThreshold`,
/// `ringBufferSizeInClosedState`, `ringBufferSizeInHalfOpenState`,
/// `waitDurationInOpenState`, and
/// `automaticTransitionFromOpenToHalfOpenEnabled`.
pub struct CircuitBreakerConfig<Res, Err> {
    pub(crate) failure_rate_threshold: f64,
    pub(crate) ring_buffer_size_in_closed_state: usize,
    pub(crate) ring_buffer_size_in_half_open_state: usize,
    pub(crate) wait_duration_in_open_state: Duration,
    pub(crate) automatic_transition_from_open_to_half_open_enabled: bool,
    pub(crate) minimum_number_of_calls: usize,
    pub(crate) classifier: SharedClassifier<Res, Err>,
    pub(crate) slow_call_duration_threshold: Option<Duration>,
    pub(crate) slow_call_rate_threshold: f64,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
    pub(crate) name: String,
}

impl<Res, Err> Clone for CircuitBreakerConfig<Res, Err> {
    fn clone(&self) -> Self {
        Self {
            failure_rate_threshold: self.failure_rate_threshold,
            ring_buffer_size_in_closed_state: self.ring_buffer_size_in_closed_state,
            ring_buffer_size_in_half_open_state: self.ring_buffer_size_in_half_open_state,
            wait_duration_in_open_state: self.wait_duration_in_open_state,
            automatic_transition_from_open_to_half_open_enabled: self
                .automatic_transition_from_open_to_half_open_enabled,
            minimum_number_of_calls: self.minimum_number_of_calls,
            classifier: Arc::clone(&self.classifier),
            slow_call_duration_threshold: self.slow_call_duration_threshold,
            slow_call_rate_threshold: self.slow_call_rate_threshold,
            event_listeners: self.event_listeners.clone(),
            name: self.name.clone(),
        }
    }
}

impl<Res, Err> CircuitBreakerConfig<Res, Err> {
    pub fn builder() -> CircuitBreakerConfigBuilder<Res, Err> {
        CircuitBreakerConfigBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Builder for a [`CircuitBreakerConfig`].
pub struct CircuitBreakerConfigBuilder<Res, Err> {
    failure_rate_threshold: f64,
    ring_buffer_size_in_closed_state: usize,
    ring_buffer_size_in_half_open_state: usize,
    wait_duration_in_open_state: Duration,
    automatic_transition_from_open_to_half_open_enabled: bool,
    minimum_number_of_calls: Option<usize>,
    classifier: SharedClassifier<Res, Err>,
    slow_call_duration_threshold: Option<Duration>,
    slow_call_rate_threshold: f64,
    event_listeners: EventListeners<CircuitBreakerEvent>,
    name: String,
}

impl<Res, Err> CircuitBreakerConfigBuilder<Res, Err>
where
    Res: 'static,
    Err: 'static,
{
    pub fn new() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            ring_buffer_size_in_closed_state: 100,
            ring_buffer_size_in_half_open_state: 10,
            wait_duration_in_open_state: Duration::from_secs(60),
            automatic_transition_from_open_to_half_open_enabled: false,
            minimum_number_of_calls: None,
            classifier: Arc::new(DefaultClassifier),
            slow_call_duration_threshold: None,
            slow_call_rate_threshold: 1.0,
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Default: 0.5 (50%).
    pub fn failure_rate_threshold(mut self, rate: f64) -> Self {
        self.failure_rate_threshold = rate;
        self
    }

    /// Default: 100.
    pub fn ring_buffer_size_in_closed_state(mut self, size: usize) -> Self {
        self.ring_buffer_size_in_closed_state = size;
        self
    }

    /// Default: 10.
    pub fn ring_buffer_size_in_half_open_state(mut self, size: usize) -> Self {
        self.ring_buffer_size_in_half_open_state = size;
        self
    }

    /// Default: 60 seconds.
    pub fn wait_duration_in_open_state(mut self, duration: Duration) -> Self {
        self.wait_duration_in_open_state = duration;
        self
    }

    /// When enabled, a background timer drives OPEN→HALF_OPEN so monitoring
    /// observes the transition even without traffic (spec §4.2 "Clock & wait").
    ///
    /// Default: false.
    pub fn automatic_transition_from_open_to_half_open_enabled(mut self, enabled: bool) -> Self {
        self.automatic_transition_from_open_to_half_open_enabled = enabled;
        self
    }

    /// Default: same as `ring_buffer_size_in_closed_state`.
    pub fn minimum_number_of_calls(mut self, n: usize) -> Self {
        self.minimum_number_of_calls = Some(n);
        self
    }

    /// Replaces the three-way outcome classifier (success/failure/ignored).
    ///
    /// Default: every `Err` is a failure, every `Ok` is a success.
    pub fn result_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&Result<Res, Err>) -> Outcome + Send + Sync + 'static,
    {
        self.classifier = Arc::new(crate::classifier::FnClassifier::new(classifier));
        self
    }

    /// Convenience over [`Self::result_classifier`]: every `predicate` match
    /// is ignored, every other `Err` is a failure (spec's `ignoreExceptions`).
    pub fn ignore_errors_matching<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Err) -> bool + Send + Sync + 'static,
        Res: Send + Sync,
        Err: Send + Sync,
    {
        self.classifier = Arc::new(crate::classifier::FnClassifier::new(
            move |result: &Result<Res, Err>| match result {
                Ok(_) => Outcome::Success,
                Err(e) if predicate(e) => Outcome::Ignored,
                Err(_) => Outcome::Failure,
            },
        ));
        self
    }

    /// Default: None (slow call detection disabled).
    pub fn slow_call_duration_threshold(mut self, duration: Duration) -> Self {
        self.slow_call_duration_threshold = Some(duration);
        self
    }

    /// Default: 1.0 (100%, effectively disabled).
    pub fn slow_call_rate_threshold(mut self, rate: f64) -> Self {
        self.slow_call_rate_threshold = rate;
        self
    }

    /// Default: `<unnamed>`.
    pub fn name<N: Into<String>>(mut self, n: N) -> Self {
        self.name = n.into();
        self
    }

    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(crate::CircuitState, crate::CircuitState) + Send + Sync + 'static,
    {
        use resilience_core::FnListener;
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::StateTransition {
                    from_state,
                    to_state,
                    ..
                } = event
                {
                    f(*from_state, *to_state);
                }
            }));
        self
    }

    pub fn on_not_permitted<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        use resilience_core::FnListener;
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if matches!(event, CircuitBreakerEvent::NotPermitted { .. }) {
                    f();
                }
            }));
        self
    }

    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(crate::CircuitState) + Send + Sync + 'static,
    {
        use resilience_core::FnListener;
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::Success { state, .. } = event {
                    f(*state);
                }
            }));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(crate::CircuitState) + Send + Sync + 'static,
    {
        use resilience_core::FnListener;
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::Error { state, .. } = event {
                    f(*state);
                }
            }));
        self
    }

    pub fn on_slow_call<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        use resilience_core::FnListener;
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::SlowCallDetected { duration, .. } = event {
                    f(*duration);
                }
            }));
        self
    }

    pub fn build(self) -> crate::layer::CircuitBreakerLayer<Res, Err> {
        let config = CircuitBreakerConfig {
            failure_rate_threshold: self.failure_rate_threshold,
            ring_buffer_size_in_closed_state: self.ring_buffer_size_in_closed_state,
            ring_buffer_size_in_half_open_state: self.ring_buffer_size_in_half_open_state,
            wait_duration_in_open_state: self.wait_duration_in_open_state,
            automatic_transition_from_open_to_half_open_enabled: self
                .automatic_transition_from_open_to_half_open_enabled,
            minimum_number_of_calls: self
                .minimum_number_of_calls
                .unwrap_or(self.ring_buffer_size_in_closed_state),
            classifier: self.classifier,
            slow_call_duration_threshold: self.slow_call_duration_threshold,
            slow_call_rate_threshold: self.slow_call_rate_threshold,
            event_listeners: self.event_listeners,
            name: self.name,
        };

        crate::layer::CircuitBreakerLayer::new(config)
    }
}

impl<Res, Err> Default for CircuitBreakerConfigBuilder<Res, Err>
where
    Res: 'static,
    Err: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
