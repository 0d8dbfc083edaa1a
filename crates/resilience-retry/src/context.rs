//! Per-call retry state, driven by the [`crate::Retry`] service as it loops.

/// Tracks how many attempts a single call has made and the most recent
/// error, so the retry loop has one place to update rather than threading
/// loose counters through each branch.
pub struct Context<E> {
    attempt: usize,
    last_error: Option<E>,
}

impl<E> Context<E> {
    /// Starts a fresh context before the first attempt.
    pub fn new() -> Self {
        Self {
            attempt: 0,
            last_error: None,
        }
    }

    /// Number of attempts made so far (0 before the first call completes).
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// The most recent error, if any attempt has failed.
    pub fn last_error(&self) -> Option<&E> {
        self.last_error.as_ref()
    }

    /// Records a failed attempt.
    pub fn on_error(&mut self, error: E) {
        self.last_error = Some(error);
        self.attempt += 1;
    }

    /// Records a successful attempt.
    pub fn on_success(&mut self) {
        self.attempt += 1;
    }
}

impl<E> Default for Context<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_attempt_count_across_errors_and_success() {
        let mut ctx: Context<&str> = Context::new();
        assert_eq!(ctx.attempt(), 0);
        assert!(ctx.last_error().is_none());

        ctx.on_error("boom");
        assert_eq!(ctx.attempt(), 1);
        assert_eq!(ctx.last_error(), Some(&"boom"));

        ctx.on_success();
        assert_eq!(ctx.attempt(), 2);
        // last_error is sticky until another failure overwrites it.
        assert_eq!(ctx.last_error(), Some(&"boom"));
    }
}
