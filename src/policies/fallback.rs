//! # Fallback policy.
//!
//! Substitutes an alternative outcome when the inner result classifies as
//! failure. Substitution produces a *fresh* result: a recovered execution is
//! a success for this layer and for listener routing, regardless of what the
//! discarded inner attempt looked like.

use std::sync::Arc;

use crate::error::ExecutionError;
use crate::execution::Execution;
use crate::policy::{AttemptFn, BoxAttemptFuture, Policy, PolicyExecutor};
use crate::result::ExecutionResult;

type FallbackFn<R> =
    Arc<dyn Fn(Option<R>, Option<ExecutionError>) -> Result<R, ExecutionError> + Send + Sync>;
type HandlePredicate = Arc<dyn Fn(&ExecutionError) -> bool + Send + Sync>;

/// Replaces failed results with a configured value or handler outcome.
pub struct Fallback<R> {
    handler: FallbackFn<R>,
    handle_when: Option<HandlePredicate>,
}

impl<R> Clone for Fallback<R> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            handle_when: self.handle_when.clone(),
        }
    }
}

impl<R> Fallback<R>
where
    R: Clone + Send + 'static,
{
    /// Always substitutes `value` for a failed result.
    pub fn with_result(value: R) -> Self
    where
        R: Sync,
    {
        Self::with_fn(move |_, _| Ok(value.clone()))
    }

    /// Substitutes the outcome of `handler`, which receives the failed
    /// attempt's value and error. Returning `Err` keeps the execution failed
    /// with the substituted error.
    pub fn with_fn<F>(handler: F) -> Self
    where
        F: Fn(Option<R>, Option<ExecutionError>) -> Result<R, ExecutionError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            handler: Arc::new(handler),
            handle_when: None,
        }
    }

    /// Restricts recovery to errors matching `pred`; anything else passes
    /// through untouched.
    pub fn handle_if<F>(mut self, pred: F) -> Self
    where
        F: Fn(&ExecutionError) -> bool + Send + Sync + 'static,
    {
        self.handle_when = Some(Arc::new(pred));
        self
    }
}

impl<R> Policy<R> for Fallback<R>
where
    R: Clone + Send + 'static,
{
    fn to_executor(&self, _policy_index: usize) -> Box<dyn PolicyExecutor<R>> {
        Box::new(FallbackExecutor {
            config: self.clone(),
        })
    }
}

struct FallbackExecutor<R> {
    config: Fallback<R>,
}

impl<R> PolicyExecutor<R> for FallbackExecutor<R>
where
    R: Clone + Send + 'static,
{
    fn apply(&self, inner: AttemptFn<R>) -> AttemptFn<R> {
        let config = self.config.clone();
        Arc::new(move |exec: Execution<R>| -> BoxAttemptFuture<R> {
            let inner = Arc::clone(&inner);
            let config = config.clone();
            Box::pin(async move {
                let this = FallbackExecutor { config };
                let returned = inner(exec.clone()).await;
                if !this.is_failure(&returned) {
                    return returned.with_success();
                }
                match (this.config.handler)(returned.value.clone(), returned.error.clone()) {
                    Ok(value) => ExecutionResult::success(Some(value)),
                    Err(error) => ExecutionResult::failure(error),
                }
            })
        })
    }

    fn is_failure(&self, result: &ExecutionResult<R>) -> bool {
        match (&result.error, &self.config.handle_when) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(error), Some(pred)) => pred(error),
        }
    }
}
