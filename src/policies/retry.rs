//! # Retry policy.
//!
//! Re-runs everything beneath it until an attempt classifies as success, the
//! attempt budget is exhausted, or this layer (or an enclosing one) is
//! canceled. Delays between attempts come from a pluggable
//! [`BackoffStrategy`]; the sleep itself is interruptible by cancellation.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::ExecutionError;
use crate::execution::Execution;
use crate::policies::backoff::BackoffStrategy;
use crate::policy::{AttemptFn, BoxAttemptFuture, Policy, PolicyExecutor};
use crate::result::ExecutionResult;

type RetryPredicate = Arc<dyn Fn(&ExecutionError) -> bool + Send + Sync>;

/// Retries failed attempts up to a configured budget.
///
/// By default every error counts as retryable; narrow that with
/// [`handle_if`](RetryPolicy::handle_if). The policy honors cancellation from
/// its own layer outward: a timeout placed *outside* the retry collapses the
/// loop, while one placed *inside* merely fails individual attempts.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: BackoffStrategy,
    retry_when: Option<RetryPredicate>,
}

impl RetryPolicy {
    /// Creates a retry policy allowing `max_attempts` invocations in total
    /// (the first attempt included).
    ///
    /// # Panics
    /// Panics when `max_attempts` is zero.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        assert!(max_attempts >= 1, "a retry policy needs at least one attempt");
        Self {
            max_attempts,
            backoff: BackoffStrategy::default(),
            retry_when: None,
        }
    }

    /// Replaces the delay strategy applied between attempts.
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Convenience for a constant delay between attempts.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.with_backoff(BackoffStrategy::constant(delay))
    }

    /// Restricts retries to errors matching `pred`; anything else is
    /// surfaced immediately.
    pub fn handle_if<F>(mut self, pred: F) -> Self
    where
        F: Fn(&ExecutionError) -> bool + Send + Sync + 'static,
    {
        self.retry_when = Some(Arc::new(pred));
        self
    }
}

impl<R> Policy<R> for RetryPolicy
where
    R: Clone + Send + 'static,
{
    fn to_executor(&self, policy_index: usize) -> Box<dyn PolicyExecutor<R>> {
        Box::new(RetryExecutor {
            policy_index,
            config: self.clone(),
        })
    }
}

struct RetryExecutor {
    policy_index: usize,
    config: RetryPolicy,
}

impl RetryExecutor {
    /// The result adopted when this layer stops because of a cancellation:
    /// whatever the canceler stored, or `fallthrough` if the slot is somehow
    /// empty.
    fn adopt_canceled<R: Clone>(
        exec: &Execution<R>,
        fallthrough: ExecutionResult<R>,
    ) -> ExecutionResult<R> {
        exec.canceled_result().unwrap_or(fallthrough)
    }
}

impl<R> PolicyExecutor<R> for RetryExecutor
where
    R: Clone + Send + 'static,
{
    fn apply(&self, inner: AttemptFn<R>) -> AttemptFn<R> {
        let policy_index = self.policy_index;
        let config = self.config.clone();
        Arc::new(move |exec: Execution<R>| -> BoxAttemptFuture<R> {
            let inner = Arc::clone(&inner);
            let config = config.clone();
            Box::pin(async move {
                let this = RetryExecutor {
                    policy_index,
                    config,
                };
                let mut prev_delay: Option<Duration> = None;

                loop {
                    if !exec.initialize_attempt(Some(this.policy_index)) {
                        return RetryExecutor::adopt_canceled(
                            &exec,
                            ExecutionResult::failure(ExecutionError::Canceled),
                        );
                    }

                    let returned = inner(exec.clone()).await;

                    // A cancellation at this layer or outside it stops the
                    // loop immediately; the canceler's result is adopted.
                    if exec.is_canceled_for_policy(this.policy_index) {
                        return RetryExecutor::adopt_canceled(&exec, returned);
                    }

                    if !this.is_failure(&returned) {
                        return this.post_execute(returned);
                    }

                    let attempt = exec.attempts();
                    if attempt >= this.config.max_attempts {
                        debug!(
                            policy_index = this.policy_index,
                            attempts = attempt,
                            "retries exhausted"
                        );
                        return this.post_execute(returned);
                    }

                    exec.record_retry();
                    let delay = this.config.backoff.next(prev_delay);
                    prev_delay = Some(delay);
                    debug!(
                        policy_index = this.policy_index,
                        after_attempt = attempt,
                        ?delay,
                        "retry scheduled"
                    );

                    let failed = returned.with_failure();
                    let wake = tokio::time::Instant::now() + delay;
                    if exec.is_canceled() {
                        // Canceled beneath this layer only; the loop keeps
                        // going, so just sit out the delay.
                        tokio::time::sleep_until(wake).await;
                    } else {
                        tokio::select! {
                            _ = tokio::time::sleep_until(wake) => {}
                            _ = exec.canceled() => {
                                if exec.is_canceled_for_policy(this.policy_index) {
                                    return RetryExecutor::adopt_canceled(&exec, failed);
                                }
                                tokio::time::sleep_until(wake).await;
                            }
                        }
                    }
                }
            })
        })
    }

    fn is_failure(&self, result: &ExecutionResult<R>) -> bool {
        match &result.error {
            None => false,
            Some(error) => match &self.config.retry_when {
                None => true,
                Some(pred) => pred(error),
            },
        }
    }
}
