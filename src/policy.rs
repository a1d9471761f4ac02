//! # Policy composition contract.
//!
//! A policy participates in composition by producing a [`PolicyExecutor`]
//! bound to its stack position. Executors are uniform decorators: each wraps
//! the function beneath it and returns a function of the same shape, so
//! policies stack in arbitrary order and cooperate on cancellation, retries,
//! and result classification.
//!
//! ```text
//!   Executor::with_policies(vec![fallback, retry, timeout])
//!
//!   fallback(retry(timeout(operation)))
//!      │        │       │
//!    index 0  index 1  index 2        (0 = outermost)
//! ```
//!
//! Results flow inside-out: the innermost wrapper produces the raw attempt
//! record, and each layer's [`post_execute`](PolicyExecutor::post_execute)
//! classifies it on the way back up.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::execution::Execution;
use crate::result::ExecutionResult;

/// Boxed future produced by one layer of the composed pipeline.
pub type BoxAttemptFuture<R> = Pin<Box<dyn Future<Output = ExecutionResult<R>> + Send + 'static>>;

/// One layer of the composed pipeline: takes the shared [`Execution`], drives
/// everything beneath it, and returns that sub-pipeline's result.
pub type AttemptFn<R> = Arc<dyn Fn(Execution<R>) -> BoxAttemptFuture<R> + Send + Sync + 'static>;

/// Shared handle to a policy, as stored by the [`Executor`](crate::Executor).
pub type PolicyRef<R> = Arc<dyn Policy<R>>;

/// A failure-handling strategy that can participate in composition.
///
/// The factory contract: given the position the policy will occupy in the
/// stack (`0` = outermost), produce the per-execution [`PolicyExecutor`]
/// bound to that position. The index is what ties a policy's cancellations to
/// the layers beneath it — see
/// [`Execution::is_canceled_for_policy`](crate::Execution::is_canceled_for_policy).
pub trait Policy<R>: Send + Sync {
    /// Binds this policy to its stack position.
    fn to_executor(&self, policy_index: usize) -> Box<dyn PolicyExecutor<R>>;
}

/// The per-execution binding of a [`Policy`] to its stack position.
pub trait PolicyExecutor<R>: Send + Sync {
    /// Wraps `inner`, returning a new layer of the same shape.
    fn apply(&self, inner: AttemptFn<R>) -> AttemptFn<R>;

    /// Layer-specific classification of an inner result.
    ///
    /// A timeout policy only treats its own sentinel as failure; a retry
    /// policy treats any error matching its predicate as failure; and so on.
    /// Classification drives [`post_execute`](PolicyExecutor::post_execute)
    /// and, transitively, listener routing at the top.
    fn is_failure(&self, result: &ExecutionResult<R>) -> bool;

    /// Uniform post-processing hook applied to the result a layer is about to
    /// return: clears `success`/`success_all` when
    /// [`is_failure`](PolicyExecutor::is_failure) matches, otherwise marks
    /// local success without touching a cleared `success_all`.
    fn post_execute(&self, result: ExecutionResult<R>) -> ExecutionResult<R> {
        if self.is_failure(&result) {
            result.with_failure()
        } else {
            result.with_success()
        }
    }
}
