//! Bounded worker pool bulkhead.
//!
//! Unlike the semaphore-backed [`crate::semaphore::Bulkhead`], which only
//! gates concurrency, `ThreadPoolBulkhead` accepts a unit of work directly:
//! it runs it now if a worker slot is free, queues it (bounded) if not, or
//! rejects it outright once the queue is also full. Submission never blocks
//! beyond the two non-blocking semaphore probes.

use crate::error::BulkheadError;
use crate::events::BulkheadEvent;
use resilience_core::{EventListeners, FnListener};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Configuration for [`ThreadPoolBulkhead`].
pub struct ThreadPoolBulkheadConfig {
    pub(crate) core_thread_pool_size: usize,
    pub(crate) max_thread_pool_size: usize,
    pub(crate) queue_capacity: usize,
    pub(crate) keep_alive_duration: Duration,
    pub(crate) name: String,
    pub(crate) event_listeners: EventListeners<BulkheadEvent>,
}

impl ThreadPoolBulkheadConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ThreadPoolBulkheadConfigBuilder {
        ThreadPoolBulkheadConfigBuilder::new()
    }
}

/// Builder for [`ThreadPoolBulkheadConfig`].
pub struct ThreadPoolBulkheadConfigBuilder {
    core_thread_pool_size: usize,
    max_thread_pool_size: usize,
    queue_capacity: usize,
    keep_alive_duration: Duration,
    name: String,
    event_listeners: EventListeners<BulkheadEvent>,
}

impl ThreadPoolBulkheadConfigBuilder {
    /// Creates a new builder with default values.
    ///
    /// Defaults: core=1, max=available_parallelism, queue=100, keep-alive=20s.
    pub fn new() -> Self {
        let max = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            core_thread_pool_size: 1,
            max_thread_pool_size: max,
            queue_capacity: 100,
            keep_alive_duration: Duration::from_secs(20),
            name: "thread-pool-bulkhead".to_string(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the standing worker count the pool keeps ready.
    ///
    /// Informational only: unlike a platform thread pool, tokio tasks are
    /// spawned on demand, so there is no idle worker to keep warm. The
    /// value is tracked for parity with the config surface and exposed via
    /// [`ThreadPoolBulkhead::core_thread_pool_size`].
    pub fn core_thread_pool_size(mut self, size: usize) -> Self {
        self.core_thread_pool_size = size;
        self
    }

    /// Sets the maximum number of tasks executing concurrently.
    pub fn max_thread_pool_size(mut self, size: usize) -> Self {
        self.max_thread_pool_size = size;
        self
    }

    /// Sets how many submissions may queue once the pool is saturated.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets how long a non-core worker may idle before being reclaimed.
    ///
    /// Informational only, for the reason given on
    /// [`core_thread_pool_size`](Self::core_thread_pool_size).
    pub fn keep_alive_duration(mut self, duration: Duration) -> Self {
        self.keep_alive_duration = duration;
        self
    }

    /// Sets the name for this pool (used in events).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback when a task is submitted and begins running
    /// immediately or after queueing.
    pub fn on_call_permitted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let BulkheadEvent::CallPermitted {
                concurrent_calls, ..
            } = event
            {
                f(*concurrent_calls);
            }
        }));
        self
    }

    /// Registers a callback when a submission is rejected because both the
    /// worker pool and the queue are full.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let BulkheadEvent::CallRejected {
                max_concurrent_calls,
                ..
            } = event
            {
                f(*max_concurrent_calls);
            }
        }));
        self
    }

    /// Builds the pool.
    pub fn build(self) -> ThreadPoolBulkhead {
        ThreadPoolBulkhead::new(Arc::new(ThreadPoolBulkheadConfig {
            core_thread_pool_size: self.core_thread_pool_size,
            max_thread_pool_size: self.max_thread_pool_size,
            queue_capacity: self.queue_capacity,
            keep_alive_duration: self.keep_alive_duration,
            name: self.name,
            event_listeners: self.event_listeners,
        }))
    }
}

impl Default for ThreadPoolBulkheadConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bounded worker pool: run now, queue, or reject.
pub struct ThreadPoolBulkhead {
    workers: Arc<Semaphore>,
    queue: Arc<Semaphore>,
    config: Arc<ThreadPoolBulkheadConfig>,
}

impl ThreadPoolBulkhead {
    fn new(config: Arc<ThreadPoolBulkheadConfig>) -> Self {
        Self {
            workers: Arc::new(Semaphore::new(config.max_thread_pool_size)),
            queue: Arc::new(Semaphore::new(config.queue_capacity)),
            config,
        }
    }

    /// The configured standing worker count.
    pub fn core_thread_pool_size(&self) -> usize {
        self.config.core_thread_pool_size
    }

    /// The configured idle-worker keep-alive.
    pub fn keep_alive_duration(&self) -> Duration {
        self.config.keep_alive_duration
    }

    fn concurrent_calls(&self) -> usize {
        self.config.max_thread_pool_size - self.workers.available_permits()
    }

    /// Submits a task for execution.
    ///
    /// Runs it immediately if a worker is free, queues it (bounded by
    /// `queueCapacity`) if every worker is busy, or rejects it with
    /// `BulkheadFull` if the queue is also full. Never blocks beyond the
    /// two non-blocking semaphore probes.
    pub fn submit<F>(&self, task: F) -> Result<JoinHandle<F::Output>, BulkheadError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if let Ok(permit) = Arc::clone(&self.workers).try_acquire_owned() {
            self.emit_permitted();
            return Ok(tokio::spawn(async move {
                let result = task.await;
                drop(permit);
                result
            }));
        }

        let queue_permit = match Arc::clone(&self.queue).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.emit_rejected();
                return Err(BulkheadError::BulkheadFull {
                    max_concurrent_calls: self.config.max_thread_pool_size,
                });
            }
        };

        self.emit_permitted();
        let workers = Arc::clone(&self.workers);
        Ok(tokio::spawn(async move {
            let worker_permit = workers
                .acquire_owned()
                .await
                .expect("worker semaphore is never closed");
            drop(queue_permit);
            let result = task.await;
            drop(worker_permit);
            result
        }))
    }

    fn emit_permitted(&self) {
        let event = BulkheadEvent::CallPermitted {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            concurrent_calls: self.concurrent_calls(),
        };
        self.config.event_listeners.emit(&event);
    }

    fn emit_rejected(&self) {
        let event = BulkheadEvent::CallRejected {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            max_concurrent_calls: self.config.max_thread_pool_size,
        };
        self.config.event_listeners.emit(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_immediately_when_a_worker_is_free() {
        let pool = ThreadPoolBulkheadConfig::builder()
            .max_thread_pool_size(2)
            .queue_capacity(0)
            .build();

        let handle = pool.submit(async { 42 }).unwrap();
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn queues_when_workers_are_busy_then_rejects_when_queue_is_full() {
        let pool = ThreadPoolBulkheadConfig::builder()
            .max_thread_pool_size(1)
            .queue_capacity(1)
            .build();

        let gate = Arc::new(tokio::sync::Notify::new());
        let gate_clone = Arc::clone(&gate);
        let _busy = pool
            .submit(async move {
                gate_clone.notified().await;
            })
            .unwrap();

        // Worker is occupied; this one should queue.
        let queued = pool.submit(async { 1 }).unwrap();

        // Queue is now full; this one must be rejected.
        let rejected = pool.submit(async { 2 });
        assert!(matches!(rejected, Err(BulkheadError::BulkheadFull { .. })));

        gate.notify_one();
        assert_eq!(queued.await.unwrap(), 1);
    }

    #[tokio::test]
    #[serial]
    async fn concurrent_submissions_never_exceed_the_worker_cap() {
        let pool = Arc::new(
            ThreadPoolBulkheadConfig::builder()
                .max_thread_pool_size(3)
                .queue_capacity(10)
                .build(),
        );
        let peak = Arc::new(AtomicUsize::new(0));
        let current = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let peak = Arc::clone(&peak);
            let current = Arc::clone(&current);
            let task = async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            };
            handles.push(pool.submit(task).unwrap());
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }
}
