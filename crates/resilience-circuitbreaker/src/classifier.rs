//! Outcome classification for circuit breaker decisions.
//!
//! A call result is classified into one of three outcomes before it reaches
//! the sliding window: [`Outcome::Success`], [`Outcome::Failure`], or
//! [`Outcome::Ignored`]. Ignored outcomes are excluded from both the
//! failure-rate calculation and the `minimumNumberOfCalls` buffer-fill count,
//! but are still counted in an `ignored` metric.

use std::sync::Arc;

/// The three-way result of classifying a call outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Counts toward the success tally.
    Success,
    /// Counts toward the failure tally and the failure rate.
    Failure,
    /// Excluded from the sliding window entirely.
    Ignored,
}

/// Classifies a `Result<Res, Err>` into an [`Outcome`].
///
/// Implementors encode `recordExceptions`/`ignoreExceptions`/predicate
/// matching; the default classifier treats every `Err` as a failure and
/// every `Ok` as a success, ignoring nothing.
pub trait ResultClassifier<Res, Err>: Send + Sync {
    /// Classifies the given result.
    fn classify(&self, result: &Result<Res, Err>) -> Outcome;
}

/// Default classifier: `Ok` is success, `Err` is failure, nothing is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl<Res, Err> ResultClassifier<Res, Err> for DefaultClassifier {
    fn classify(&self, result: &Result<Res, Err>) -> Outcome {
        match result {
            Ok(_) => Outcome::Success,
            Err(_) => Outcome::Failure,
        }
    }
}

/// A classifier backed by a closure, used to implement
/// `ignoreExceptions`/`recordExceptions`/predicate-based classification.
#[derive(Clone)]
pub struct FnClassifier<F> {
    f: Arc<F>,
}

impl<F> FnClassifier<F> {
    /// Creates a classifier from the given closure.
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl<F, Res, Err> ResultClassifier<Res, Err> for FnClassifier<F>
where
    F: Fn(&Result<Res, Err>) -> Outcome + Send + Sync,
{
    fn classify(&self, result: &Result<Res, Err>) -> Outcome {
        (self.f)(result)
    }
}

impl<F> std::fmt::Debug for FnClassifier<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnClassifier").finish_non_exhaustive()
    }
}
