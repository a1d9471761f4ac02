//! # Timeout policy.
//!
//! Bounds one pass through everything beneath it. On entry the executor arms
//! a one-shot timer task and invokes the inner layer on the caller's task;
//! whichever finishes first adopts its result into a shared compare-and-swap
//! slot, and the loser's outcome is discarded.
//!
//! ```text
//!          ┌───────────────┐
//!          │ timer task    │── sleep(delay) ──┐
//!          └───────────────┘                  ▼
//!   apply ─┬──────────────────────────► adoption slot ──► post_execute
//!          │                                  ▲
//!          └── inner(exec).await ─────────────┘
//! ```
//!
//! When the timer wins it cancels the execution *at this policy's index*:
//! every layer beneath observes the cancellation through
//! [`is_canceled_for_policy`](crate::Execution::is_canceled_for_policy) and
//! collapses, while enclosing layers (e.g. an outer retry) are free to treat
//! the synthesized [`ExecutionError::TimeoutExceeded`] as retryable. A stale
//! timer that fires after the inner call won adoption is harmless: its swap
//! fails and it changes nothing.
//!
//! Cancellation stays cooperative — the inner call is awaited to completion
//! even after the timer fires; it is expected to notice the cancellation and
//! return promptly.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::debug;

use crate::error::ExecutionError;
use crate::event::{CompletionListener, ExecutionCompletedEvent};
use crate::execution::{CancelSource, Execution};
use crate::policy::{AttemptFn, BoxAttemptFuture, Policy, PolicyExecutor};
use crate::result::ExecutionResult;

/// Fails an execution attempt with [`ExecutionError::TimeoutExceeded`] when
/// it runs longer than the configured delay.
///
/// Placed outside a retry policy, the delay bounds the retries as a whole;
/// placed inside, each attempt gets the full delay to itself.
pub struct Timeout<R> {
    delay: Duration,
    on_timeout_exceeded: Option<CompletionListener<R>>,
}

impl<R> Timeout<R> {
    /// Creates a timeout policy with the given delay.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            on_timeout_exceeded: None,
        }
    }

    /// Registers the listener called when the timer wins the race. Fires on
    /// the timer task, at most once per execution attempt through this layer.
    pub fn on_timeout_exceeded<F>(mut self, listener: F) -> Self
    where
        F: Fn(ExecutionCompletedEvent<R>) + Send + Sync + 'static,
    {
        self.on_timeout_exceeded = Some(Arc::new(listener));
        self
    }
}

impl<R> Policy<R> for Timeout<R>
where
    R: Clone + Send + Sync + 'static,
{
    fn to_executor(&self, policy_index: usize) -> Box<dyn PolicyExecutor<R>> {
        Box::new(TimeoutExecutor {
            policy_index,
            delay: self.delay,
            on_timeout_exceeded: self.on_timeout_exceeded.clone(),
        })
    }
}

struct TimeoutExecutor<R> {
    policy_index: usize,
    delay: Duration,
    on_timeout_exceeded: Option<CompletionListener<R>>,
}

impl<R> Clone for TimeoutExecutor<R> {
    fn clone(&self) -> Self {
        Self {
            policy_index: self.policy_index,
            delay: self.delay,
            on_timeout_exceeded: self.on_timeout_exceeded.clone(),
        }
    }
}

impl<R> PolicyExecutor<R> for TimeoutExecutor<R>
where
    R: Clone + Send + Sync + 'static,
{
    fn apply(&self, inner: AttemptFn<R>) -> AttemptFn<R> {
        let this = self.clone();
        Arc::new(move |exec: Execution<R>| -> BoxAttemptFuture<R> {
            let inner = Arc::clone(&inner);
            let this = this.clone();
            Box::pin(async move {
                let slot: Arc<OnceLock<ExecutionResult<R>>> = Arc::new(OnceLock::new());

                let timer = tokio::spawn({
                    let slot = Arc::clone(&slot);
                    let exec = exec.clone();
                    let listener = this.on_timeout_exceeded.clone();
                    let policy_index = this.policy_index;
                    let delay = this.delay;
                    async move {
                        tokio::time::sleep(delay).await;
                        let timed_out =
                            ExecutionResult::failure(ExecutionError::TimeoutExceeded);
                        if slot.set(timed_out.clone()).is_ok() {
                            exec.cancel(CancelSource::Policy(policy_index), timed_out);
                            debug!(policy_index, ?delay, "timeout exceeded");
                            if let Some(listener) = &listener {
                                listener(ExecutionCompletedEvent {
                                    result: None,
                                    error: Some(ExecutionError::TimeoutExceeded),
                                    stats: exec.stats(),
                                });
                            }
                        }
                    }
                });

                let returned = inner(exec.clone()).await;
                if slot.set(returned).is_ok() {
                    timer.abort();
                }

                let adopted = slot
                    .get()
                    .cloned()
                    .expect("adoption slot is filled by the timer or the inner call");
                this.post_execute(adopted)
            })
        })
    }

    /// A timeout layer only claims its own synthesized failure; other errors
    /// pass through for enclosing layers to classify.
    fn is_failure(&self, result: &ExecutionResult<R>) -> bool {
        result.error.as_ref().is_some_and(ExecutionError::is_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use crate::policy::PolicyRef;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor_with_timeout(delay: Duration) -> Executor<u32> {
        Executor::with(Arc::new(Timeout::new(delay)) as PolicyRef<u32>)
    }

    #[tokio::test(start_paused = true)]
    async fn timer_wins_over_slow_operation() {
        let fired = Arc::new(AtomicU32::new(0));
        let policy = Timeout::new(Duration::from_millis(10)).on_timeout_exceeded({
            let fired = Arc::clone(&fired);
            move |event| {
                assert!(event.error.as_ref().is_some_and(ExecutionError::is_timeout));
                fired.fetch_add(1, Ordering::SeqCst);
            }
        });
        let executor = Executor::<u32>::with(Arc::new(policy) as PolicyRef<u32>);

        let err = executor
            .run(|| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await
            .expect_err("timeout should win");

        assert!(err.is_timeout());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_operation_wins_adoption() {
        let executor = executor_with_timeout(Duration::from_secs(5));
        let value = executor
            .get(|| async {
                tokio::time::sleep(Duration::from_millis(1)).await;
                Ok(21u32)
            })
            .await
            .expect("operation should win");
        assert_eq!(value, 21);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_fires_before_the_operation_finishes() {
        let executor = executor_with_timeout(Duration::ZERO);
        let err = executor
            .run(|| async {
                tokio::time::sleep(Duration::from_millis(1)).await;
                Ok(())
            })
            .await
            .expect_err("zero-duration timeout fires first");
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn operation_sees_indexed_cancellation() {
        let executor = executor_with_timeout(Duration::from_millis(10));
        let err = executor
            .run_with_execution(|exec| async move {
                exec.canceled().await;
                assert!(exec.is_canceled());
                assert!(exec.is_canceled_for_policy(0));
                Ok(())
            })
            .await
            .expect_err("timeout fired");
        assert!(err.is_timeout());
    }

    #[test]
    fn classifies_only_its_own_sentinel() {
        let executor = TimeoutExecutor::<u32> {
            policy_index: 0,
            delay: Duration::from_secs(1),
            on_timeout_exceeded: None,
        };
        assert!(executor.is_failure(&ExecutionResult::failure(ExecutionError::TimeoutExceeded)));
        assert!(!executor.is_failure(&ExecutionResult::failure(ExecutionError::message("boom"))));
        assert!(!executor.is_failure(&ExecutionResult::success(Some(1))));
    }
}
