use crate::config::CircuitBreakerConfig;
use crate::CircuitBreaker;
use std::sync::Arc;
use std::time::Duration;
use tower::Layer;

/// A Tower [`Layer`] that applies circuit breaker behavior to an inner
/// service.
#[derive(Clone)]
pub struct CircuitBreakerLayer<Res, Err> {
    config: Arc<CircuitBreakerConfig<Res, Err>>,
}

impl<Res, Err> CircuitBreakerLayer<Res, Err> {
    pub(crate) fn new(config: impl Into<Arc<CircuitBreakerConfig<Res, Err>>>) -> Self {
        Self {
            config: config.into(),
        }
    }

    pub fn builder() -> crate::CircuitBreakerConfigBuilder<Res, Err>
    where
        Res: 'static,
        Err: 'static,
    {
        crate::CircuitBreakerConfigBuilder::new()
    }

    /// Preset: balanced defaults for most services.
    ///
    /// 50% failure rate threshold, 100-call closed-state ring buffer,
    /// 10-call half-open ring buffer, 60s wait in open.
    pub fn standard() -> crate::CircuitBreakerConfigBuilder<Res, Err>
    where
        Res: 'static,
        Err: 'static,
    {
        Self::builder()
            .failure_rate_threshold(0.5)
            .ring_buffer_size_in_closed_state(100)
            .ring_buffer_size_in_half_open_state(10)
            .wait_duration_in_open_state(Duration::from_secs(60))
    }

    /// Preset: opens quickly and recovers fast; good for latency-sensitive
    /// calls to a flaky downstream.
    pub fn fast_fail() -> crate::CircuitBreakerConfigBuilder<Res, Err>
    where
        Res: 'static,
        Err: 'static,
    {
        Self::builder()
            .failure_rate_threshold(0.25)
            .ring_buffer_size_in_closed_state(20)
            .ring_buffer_size_in_half_open_state(5)
            .wait_duration_in_open_state(Duration::from_secs(10))
    }

    /// Preset: tolerates more failures before opening, suited to services
    /// with occasional transient blips.
    pub fn tolerant() -> crate::CircuitBreakerConfigBuilder<Res, Err>
    where
        Res: 'static,
        Err: 'static,
    {
        Self::builder()
            .failure_rate_threshold(0.75)
            .ring_buffer_size_in_closed_state(200)
            .ring_buffer_size_in_half_open_state(20)
            .wait_duration_in_open_state(Duration::from_secs(30))
    }
}

impl<S, Res, Err> Layer<S> for CircuitBreakerLayer<Res, Err>
where
    Res: Send + Sync + 'static,
    Err: Send + Sync + 'static,
{
    type Service = CircuitBreaker<S, Res, Err>;

    fn layer(&self, service: S) -> Self::Service {
        CircuitBreaker::new(service, Arc::clone(&self.config))
    }
}
