//! Semaphore-backed bulkhead core and its Tower service wrapper.

use crate::config::BulkheadConfig;
use crate::error::BulkheadError;
use crate::events::BulkheadEvent;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::Semaphore;
use tower::Service;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// The permission core behind a bulkhead: `tryAcquirePermission`,
/// `acquirePermission`, and `onComplete`, independent of any Tower
/// middleware. Permits are tracked with a raw semaphore rather than a
/// guard object, matching the explicit acquire/release contract.
pub struct BulkheadCore {
    semaphore: Arc<Semaphore>,
    config: Arc<BulkheadConfig>,
}

impl BulkheadCore {
    /// Creates a new core with `config.max_concurrent_calls` permits.
    pub fn new(config: Arc<BulkheadConfig>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_calls)),
            config,
        }
    }

    /// Current number of outstanding (acquired, not yet completed) calls.
    pub fn concurrent_calls(&self) -> usize {
        self.config.max_concurrent_calls - self.semaphore.available_permits()
    }

    fn emit_permitted(&self) {
        let event = BulkheadEvent::CallPermitted {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            concurrent_calls: self.concurrent_calls(),
        };
        self.config.event_listeners.emit(&event);

        #[cfg(feature = "metrics")]
        {
            counter!("bulkhead_calls_permitted_total", "bulkhead" => self.config.name.clone())
                .increment(1);
            gauge!("bulkhead_concurrent_calls", "bulkhead" => self.config.name.clone())
                .set(self.concurrent_calls() as f64);
        }
    }

    fn emit_rejected(&self) {
        let event = BulkheadEvent::CallRejected {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            max_concurrent_calls: self.config.max_concurrent_calls,
        };
        self.config.event_listeners.emit(&event);

        #[cfg(feature = "metrics")]
        counter!("bulkhead_calls_rejected_total", "bulkhead" => self.config.name.clone())
            .increment(1);
    }

    /// `tryAcquirePermission`: non-blocking attempt.
    pub fn try_acquire_permission(&self) -> bool {
        match self.semaphore.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.emit_permitted();
                true
            }
            Err(_) => {
                self.emit_rejected();
                false
            }
        }
    }

    /// `acquirePermission`: waits up to `maxWaitTime`, returning
    /// `BulkheadFull` on timeout or if the bulkhead is being torn down.
    pub async fn acquire_permission(&self) -> Result<(), BulkheadError> {
        if self.config.max_wait_duration.is_zero() {
            return if self.try_acquire_permission() {
                Ok(())
            } else {
                Err(BulkheadError::BulkheadFull {
                    max_concurrent_calls: self.config.max_concurrent_calls,
                })
            };
        }

        match tokio::time::timeout(self.config.max_wait_duration, self.semaphore.acquire()).await
        {
            Ok(Ok(permit)) => {
                permit.forget();
                self.emit_permitted();
                Ok(())
            }
            Ok(Err(_)) => {
                self.emit_rejected();
                Err(BulkheadError::BulkheadFull {
                    max_concurrent_calls: self.config.max_concurrent_calls,
                })
            }
            Err(_) => {
                self.emit_rejected();
                Err(BulkheadError::Timeout)
            }
        }
    }

    /// `onComplete`: releases one permit. Required on every path after a
    /// successful acquire, success or failure.
    pub fn on_complete(&self) {
        self.semaphore.add_permits(1);
    }

    fn emit_finished(&self, duration: std::time::Duration) {
        let event = BulkheadEvent::CallFinished {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            duration,
        };
        self.config.event_listeners.emit(&event);

        #[cfg(feature = "metrics")]
        counter!("bulkhead_calls_finished_total", "bulkhead" => self.config.name.clone())
            .increment(1);
    }

    fn emit_failed(&self, duration: std::time::Duration) {
        let event = BulkheadEvent::CallFailed {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            duration,
        };
        self.config.event_listeners.emit(&event);

        #[cfg(feature = "metrics")]
        counter!("bulkhead_calls_failed_total", "bulkhead" => self.config.name.clone())
            .increment(1);
    }
}

/// Bulkhead service that limits concurrent calls through the inner service.
#[derive(Clone)]
pub struct Bulkhead<S> {
    inner: S,
    core: Arc<BulkheadCore>,
}

impl<S> Bulkhead<S> {
    /// Creates a new bulkhead service.
    pub(crate) fn new(inner: S, config: Arc<BulkheadConfig>) -> Self {
        Self {
            inner,
            core: Arc::new(BulkheadCore::new(config)),
        }
    }
}

impl<S, Request> Service<Request> for Bulkhead<S>
where
    S: Service<Request> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: From<BulkheadError> + Send + 'static,
    Request: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let core = Arc::clone(&self.core);
        let mut inner = self.inner.clone();
        let start_time = Instant::now();

        Box::pin(async move {
            core.acquire_permission().await.map_err(S::Error::from)?;

            let result = inner.call(request).await;
            core.on_complete();

            let duration = start_time.elapsed();
            match &result {
                Ok(_) => core.emit_finished(duration),
                Err(_) => core.emit_failed(duration),
            }

            result
        })
    }
}
