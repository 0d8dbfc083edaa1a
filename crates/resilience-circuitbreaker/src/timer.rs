//! The optional background timer driving `OPEN`→`HALF_OPEN` so monitoring
//! observes the transition even without traffic
//! (`automaticTransitionFromOpenToHalfOpenEnabled`, spec.md §4.2 "Clock & wait").
//!
//! Uses `Instant`, a monotonic clock, per spec.md §9's open question about
//! wall-clock jumps: the wait is measured against a monotonic timestamp
//! taken at the OPEN transition, not against wall time.

use crate::config::CircuitBreakerConfig;
use crate::state::Circuit;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Spawns the background poller. The returned handle is owned by the
/// `CircuitBreaker` service and aborted when it is dropped.
pub(crate) fn spawn<Res, Err>(
    circuit: Arc<Mutex<Circuit>>,
    config: Arc<CircuitBreakerConfig<Res, Err>>,
) -> JoinHandle<()>
where
    Res: Send + Sync + 'static,
    Err: Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        loop {
            interval.tick().await;
            let mut circuit = circuit.lock().await;
            circuit.try_automatic_transition(&config);
        }
    })
}
