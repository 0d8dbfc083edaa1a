//! The atomic cycle-based permit record.
//!
//! Time is partitioned into fixed, non-overlapping cycles of
//! `limitRefreshPeriod` starting at the limiter's creation (`t0`). Each
//! reservation advances the record to the current cycle (resetting
//! `activePermissions` to `limitForPeriod` if the cycle has moved on),
//! decrements it, and reports how long the caller must sleep before the
//! permit becomes valid.
//!
//! A real lock-free CAS would need `(activeCycle, activePermissions)` packed
//! into one machine word; a `parking_lot::Mutex` guarding a two-field struct
//! gives the same externally-observable semantics (single atomic read-
//! modify-write per reservation, no lock held across a wait or a service
//! call) without an unsafe bit-packing scheme.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Outcome of a permit reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reservation {
    /// Sleep this long (possibly zero), then proceed.
    Wait(Duration),
    /// The wait would exceed `timeoutDuration`; the request is denied.
    Denied,
}

struct Cycle {
    active_cycle: u64,
    active_permissions: i64,
}

pub(crate) struct AtomicLimiter {
    t0: Instant,
    refresh_period: Duration,
    limit_for_period: AtomicU64,
    timeout_duration_nanos: AtomicU64,
    cycle: Mutex<Cycle>,
}

impl AtomicLimiter {
    pub(crate) fn new(limit_for_period: usize, refresh_period: Duration, timeout_duration: Duration) -> Self {
        Self {
            t0: Instant::now(),
            refresh_period,
            limit_for_period: AtomicU64::new(limit_for_period as u64),
            timeout_duration_nanos: AtomicU64::new(timeout_duration.as_nanos() as u64),
            cycle: Mutex::new(Cycle {
                active_cycle: 0,
                active_permissions: limit_for_period as i64,
            }),
        }
    }

    /// `changeLimitForPeriod`: visible to the next reservation onward.
    pub(crate) fn change_limit_for_period(&self, limit: usize) {
        self.limit_for_period.store(limit as u64, Ordering::Release);
    }

    /// `changeTimeoutDuration`: visible to the next reservation onward.
    pub(crate) fn change_timeout_duration(&self, timeout: Duration) {
        self.timeout_duration_nanos
            .store(timeout.as_nanos() as u64, Ordering::Release);
    }

    fn current_cycle(&self, elapsed: Duration) -> u64 {
        (elapsed.as_nanos() / self.refresh_period.as_nanos().max(1)) as u64
    }

    /// Reserves a permission per spec.md §4.3's cycle algorithm.
    pub(crate) fn reserve_permission(&self) -> Reservation {
        let elapsed = self.t0.elapsed();
        let cycle = self.current_cycle(elapsed);
        let limit = self.limit_for_period.load(Ordering::Acquire) as i64;

        let nanos_to_wait = {
            let mut state = self.cycle.lock();
            if cycle > state.active_cycle {
                state.active_cycle = cycle;
                state.active_permissions = limit;
            }
            state.active_permissions -= 1;

            if state.active_permissions >= 0 {
                0i64
            } else {
                let refresh_nanos = self.refresh_period.as_nanos().max(1) as i64;
                let cycles_to_wait = div_ceil(-state.active_permissions, limit.max(1));
                let elapsed_in_cycle = (elapsed.as_nanos() as i64) % refresh_nanos;
                cycles_to_wait * refresh_nanos - elapsed_in_cycle
            }
        };

        let timeout_nanos = self.timeout_duration_nanos.load(Ordering::Acquire) as i64;
        if nanos_to_wait > timeout_nanos {
            Reservation::Denied
        } else {
            Reservation::Wait(Duration::from_nanos(nanos_to_wait.max(0) as u64))
        }
    }

    /// Current permits available in the active cycle, for introspection.
    pub(crate) fn available_permits(&self) -> i64 {
        self.cycle.lock().active_permissions
    }
}

fn div_ceil(numerator: i64, denominator: i64) -> i64 {
    (numerator + denominator - 1) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_up_to_limit_immediately() {
        let limiter = AtomicLimiter::new(2, Duration::from_millis(100), Duration::ZERO);
        assert_eq!(limiter.reserve_permission(), Reservation::Wait(Duration::ZERO));
        assert_eq!(limiter.reserve_permission(), Reservation::Wait(Duration::ZERO));
    }

    #[test]
    fn denies_third_call_in_same_cycle_with_zero_timeout() {
        let limiter = AtomicLimiter::new(2, Duration::from_millis(100), Duration::ZERO);
        limiter.reserve_permission();
        limiter.reserve_permission();
        assert_eq!(limiter.reserve_permission(), Reservation::Denied);
    }

    #[test]
    fn waits_instead_of_denying_when_timeout_covers_the_remaining_cycle() {
        let limiter = AtomicLimiter::new(1, Duration::from_millis(50), Duration::from_secs(1));
        limiter.reserve_permission();
        match limiter.reserve_permission() {
            Reservation::Wait(d) => assert!(d <= Duration::from_millis(50)),
            Reservation::Denied => panic!("expected a wait, not a denial"),
        }
    }

    #[test]
    fn change_limit_for_period_is_visible_to_next_reservation() {
        let limiter = AtomicLimiter::new(1, Duration::from_millis(100), Duration::ZERO);
        limiter.reserve_permission();
        assert_eq!(limiter.reserve_permission(), Reservation::Denied);

        limiter.change_limit_for_period(5);
        limiter.change_timeout_duration(Duration::from_secs(1));
        // Still the same cycle, but the raised limit/timeout now admits a wait.
        assert!(matches!(limiter.reserve_permission(), Reservation::Wait(_)));
    }

    use proptest::prelude::*;

    proptest::proptest! {
        /// `div_ceil` is the building block the cycle-wait calculation relies
        /// on; it must match the textbook ceiling-division identity for every
        /// positive numerator/denominator pair.
        #[test]
        fn div_ceil_matches_ceiling_division(numerator in 1i64..1_000_000, denominator in 1i64..10_000) {
            let result = div_ceil(numerator, denominator);
            prop_assert!(result * denominator >= numerator);
            prop_assert!((result - 1) * denominator < numerator);
        }

        /// The current cycle index is non-decreasing as elapsed time grows,
        /// and doubling the elapsed time never more than doubles the cycle
        /// index (monotonic, bounded growth).
        #[test]
        fn current_cycle_is_monotonic(period_ms in 1u64..10_000, elapsed_ms in 0u64..1_000_000) {
            let limiter = AtomicLimiter::new(1, Duration::from_millis(period_ms), Duration::ZERO);
            let a = limiter.current_cycle(Duration::from_millis(elapsed_ms));
            let b = limiter.current_cycle(Duration::from_millis(elapsed_ms + period_ms));
            prop_assert!(b >= a);
            prop_assert!(b <= a + 1);
        }
    }
}
