//! Synchronous-shaped core behind the time limiter: `executeFutureSupplier`.

use crate::config::TimeLimiterConfig;
use crate::error::TimeLimiterError;
use crate::events::TimeLimiterEvent;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;

/// The deadline core behind a time limiter, independent of any Tower
/// middleware. `execute_future_supplier` mirrors Resilience4j's method of
/// the same name: given a request and a supplier that produces the future
/// to race against the deadline, it returns the supplier's result or a
/// timeout.
pub struct TimeLimiterCore<Req> {
    config: Arc<TimeLimiterConfig<Req>>,
}

impl<Req> TimeLimiterCore<Req> {
    /// Creates a new core bound to the given configuration.
    pub fn new(config: Arc<TimeLimiterConfig<Req>>) -> Self {
        Self { config }
    }

    /// Runs the future produced by `supplier` under the configured
    /// deadline for `req`. When `cancel_running_future` is true (the
    /// default) the future is raced directly against the deadline and
    /// dropped in place on timeout, cancelling it. When false, the future
    /// is spawned as a detached task instead, so it keeps running to
    /// completion in the background after a timeout is reported; its
    /// result is simply discarded.
    pub async fn execute_future_supplier<F, Fut, T, E>(
        &self,
        req: Req,
        supplier: F,
    ) -> Result<T, TimeLimiterError<E>>
    where
        F: FnOnce(Req) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
        Req: Send + 'static,
    {
        let timeout_duration = self.config.timeout_source.get_timeout(&req);
        let start = Instant::now();

        let outcome = if self.config.cancel_running_future {
            timeout(timeout_duration, supplier(req)).await
        } else {
            let (tx, rx) = tokio::sync::oneshot::channel();
            tokio::spawn(async move {
                let _ = tx.send(supplier(req).await);
            });
            timeout(timeout_duration, async move {
                rx.await.expect("background task dropped the result sender")
            })
            .await
        };

        match outcome {
            Ok(Ok(value)) => {
                self.emit(TimeLimiterEvent::Success {
                    pattern_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    duration: start.elapsed(),
                });
                Ok(value)
            }
            Ok(Err(err)) => {
                self.emit(TimeLimiterEvent::Error {
                    pattern_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    duration: start.elapsed(),
                });
                Err(TimeLimiterError::Inner(err))
            }
            Err(_elapsed) => {
                self.emit(TimeLimiterEvent::Timeout {
                    pattern_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    timeout_duration,
                });
                Err(TimeLimiterError::Timeout)
            }
        }
    }

    fn emit(&self, event: TimeLimiterEvent) {
        self.config.event_listeners.emit(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TimeLimiterConfigBuilder;
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test]
    async fn execute_future_supplier_returns_supplier_output() {
        let config = Arc::new(
            TimeLimiterConfigBuilder::<()>::new()
                .timeout_duration(Duration::from_millis(50))
                .build_config(),
        );
        let core = TimeLimiterCore::new(config);

        let result: Result<_, TimeLimiterError<()>> = core
            .execute_future_supplier((), |_req| async { Ok::<_, ()>("done") })
            .await;

        assert_eq!(result.unwrap(), "done");
    }

    #[tokio::test]
    async fn execute_future_supplier_times_out() {
        let config = Arc::new(
            TimeLimiterConfigBuilder::<()>::new()
                .timeout_duration(Duration::from_millis(5))
                .build_config(),
        );
        let core = TimeLimiterCore::new(config);

        let result = core
            .execute_future_supplier((), |_req| async {
                sleep(Duration::from_millis(50)).await;
                Ok::<_, ()>("done")
            })
            .await;

        assert!(result.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn cancel_running_future_false_lets_the_background_task_finish() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let config = Arc::new(
            TimeLimiterConfigBuilder::<()>::new()
                .timeout_duration(Duration::from_millis(5))
                .cancel_running_future(false)
                .build_config(),
        );
        let core = TimeLimiterCore::new(config);

        let completed = Arc::new(AtomicBool::new(false));
        let completed_in_background = Arc::clone(&completed);

        let result = core
            .execute_future_supplier((), move |_req| async move {
                sleep(Duration::from_millis(30)).await;
                completed_in_background.store(true, Ordering::SeqCst);
                Ok::<_, ()>("done")
            })
            .await;

        assert!(result.unwrap_err().is_timeout());
        assert!(
            !completed.load(Ordering::SeqCst),
            "background task should not have finished yet"
        );

        sleep(Duration::from_millis(50)).await;
        assert!(
            completed.load(Ordering::SeqCst),
            "background task should keep running to completion after the timeout is reported"
        );
    }

    #[tokio::test]
    async fn cancel_running_future_true_drops_the_future_on_timeout() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let config = Arc::new(
            TimeLimiterConfigBuilder::<()>::new()
                .timeout_duration(Duration::from_millis(5))
                .cancel_running_future(true)
                .build_config(),
        );
        let core = TimeLimiterCore::new(config);

        let completed = Arc::new(AtomicBool::new(false));
        let completed_in_future = Arc::clone(&completed);

        let result = core
            .execute_future_supplier((), move |_req| async move {
                sleep(Duration::from_millis(30)).await;
                completed_in_future.store(true, Ordering::SeqCst);
                Ok::<_, ()>("done")
            })
            .await;

        assert!(result.unwrap_err().is_timeout());

        sleep(Duration::from_millis(50)).await;
        assert!(
            !completed.load(Ordering::SeqCst),
            "dropping the future in place should cancel it, not let it finish"
        );
    }
}
