//! # Composes policies and drives executions.
//!
//! The [`Executor`] owns an ordered stack of policies (outermost first),
//! optionally an external cancellation token and completion listeners, and
//! exposes four entry shapes that all normalize onto one internal driver.
//!
//! # High-level architecture
//!
//! ```text
//!   run / run_with_execution / get / get_with_execution
//!                        │
//!                   execute()
//!                        │ composes innermost-first
//!                        ▼
//!        P0( P1( … Pn-1( attempt wrapper ) … ) )
//!                        │                ▲
//!          CancellationToken watcher ─────┘ (external cancel)
//!                        │
//!            terminal ExecutionResult
//!                        │
//!        on_success / on_failure, then on_complete
//! ```
//!
//! The executor is logically immutable: every builder method consumes and
//! returns it, and executions never mutate it, so one configured executor can
//! drive any number of concurrent calls.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ExecutionError;
use crate::event::{CompletionListener, ExecutionCompletedEvent};
use crate::execution::{CancelSource, Execution};
use crate::policy::{AttemptFn, BoxAttemptFuture, PolicyRef};
use crate::result::ExecutionResult;

type BoxOpFuture<R> = Pin<Box<dyn Future<Output = Result<R, ExecutionError>> + Send>>;
type OpFn<R> = Arc<dyn Fn(Execution<R>) -> BoxOpFuture<R> + Send + Sync>;

/// Drives an operation through a stack of failure-handling policies.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use palisade::{Executor, PolicyRef};
/// use palisade::policies::{RetryPolicy, Timeout};
///
/// # async fn demo() -> Result<(), palisade::ExecutionError> {
/// let executor = Executor::<u64>::with_policies(vec![
///     Arc::new(Timeout::new(Duration::from_secs(2))) as PolicyRef<u64>,
///     Arc::new(RetryPolicy::with_max_attempts(3)),
/// ])
/// .on_failure(|event| eprintln!("gave up: {:?}", event.error));
///
/// let balance = executor.get(|| async { Ok(42) }).await?;
/// # Ok(())
/// # }
/// ```
pub struct Executor<R> {
    policies: Vec<PolicyRef<R>>,
    cancellation: Option<CancellationToken>,
    on_complete: Option<CompletionListener<R>>,
    on_success: Option<CompletionListener<R>>,
    on_failure: Option<CompletionListener<R>>,
}

impl<R> Clone for Executor<R> {
    fn clone(&self) -> Self {
        Self {
            policies: self.policies.clone(),
            cancellation: self.cancellation.clone(),
            on_complete: self.on_complete.clone(),
            on_success: self.on_success.clone(),
            on_failure: self.on_failure.clone(),
        }
    }
}

impl<R> Executor<R>
where
    R: Clone + Default + Send + 'static,
{
    /// Creates an executor with a single (outermost) policy.
    pub fn with(outer: PolicyRef<R>) -> Self {
        Self::with_policies(vec![outer])
    }

    /// Creates an executor from an ordered policy stack, outermost first.
    ///
    /// # Panics
    /// Panics when `policies` is empty: an executor exists to wrap an
    /// operation in at least one policy.
    pub fn with_policies(policies: Vec<PolicyRef<R>>) -> Self {
        assert!(
            !policies.is_empty(),
            "an executor requires at least one policy"
        );
        Self {
            policies,
            cancellation: None,
            on_complete: None,
            on_success: None,
            on_failure: None,
        }
    }

    /// Appends one more policy as the new innermost layer.
    ///
    /// `Executor::with(a).compose(b).compose(c)` is equivalent to
    /// `Executor::with_policies(vec![a, b, c])`: the composition is
    /// `a(b(c(operation)))`.
    pub fn compose(mut self, inner: PolicyRef<R>) -> Self {
        self.policies.push(inner);
        self
    }

    /// Attaches an external cancellation scope.
    ///
    /// Each execution then spawns a watcher that, should `token` fire first,
    /// cancels the execution from outside every policy layer with
    /// [`ExecutionError::Canceled`]. Cancellation stays cooperative: a running
    /// operation is signaled, never aborted.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Registers the listener called after every execution. Overwrites any
    /// previously registered complete-listener.
    pub fn on_complete<F>(mut self, listener: F) -> Self
    where
        F: Fn(ExecutionCompletedEvent<R>) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(listener));
        self
    }

    /// Registers the listener called when every policy layer agreed the
    /// execution succeeded. Overwrites any previous success-listener.
    pub fn on_success<F>(mut self, listener: F) -> Self
    where
        F: Fn(ExecutionCompletedEvent<R>) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(listener));
        self
    }

    /// Registers the listener called when some policy classified the
    /// execution as failed. Overwrites any previous failure-listener.
    pub fn on_failure<F>(mut self, listener: F) -> Self
    where
        F: Fn(ExecutionCompletedEvent<R>) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(listener));
        self
    }

    /// Runs a value-less operation until it succeeds or the policies are
    /// exceeded.
    pub async fn run<F, Fut>(&self, op: F) -> Result<(), ExecutionError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ExecutionError>> + Send + 'static,
    {
        let op: OpFn<R> = Arc::new(move |_exec| -> BoxOpFuture<R> {
            let fut = op();
            Box::pin(async move { fut.await.map(|()| R::default()) })
        });
        self.execute(op).await.map(|_| ())
    }

    /// Like [`run`](Executor::run), passing the live [`Execution`] handle to
    /// the operation so it can observe attempts and cancellation.
    pub async fn run_with_execution<F, Fut>(&self, op: F) -> Result<(), ExecutionError>
    where
        F: Fn(Execution<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ExecutionError>> + Send + 'static,
    {
        let op: OpFn<R> = Arc::new(move |exec| -> BoxOpFuture<R> {
            let fut = op(exec);
            Box::pin(async move { fut.await.map(|()| R::default()) })
        });
        self.execute(op).await.map(|_| ())
    }

    /// Runs a value-producing operation until a successful result is returned
    /// or the policies are exceeded.
    pub async fn get<F, Fut>(&self, op: F) -> Result<R, ExecutionError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ExecutionError>> + Send + 'static,
    {
        let op: OpFn<R> = Arc::new(move |_exec| -> BoxOpFuture<R> { Box::pin(op()) });
        self.execute(op).await
    }

    /// Like [`get`](Executor::get), passing the live [`Execution`] handle to
    /// the operation.
    pub async fn get_with_execution<F, Fut>(&self, op: F) -> Result<R, ExecutionError>
    where
        F: Fn(Execution<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ExecutionError>> + Send + 'static,
    {
        let op: OpFn<R> = Arc::new(move |exec| -> BoxOpFuture<R> { Box::pin(op(exec)) });
        self.execute(op).await
    }

    /// Single-call driver shared by the four entry shapes.
    ///
    /// A panic in the operation or in a policy unwinds straight through the
    /// `.await` on the caller's task: no listener fires and the watcher is
    /// left to the token's own lifetime.
    async fn execute(&self, op: OpFn<R>) -> Result<R, ExecutionError> {
        // The attempt wrapper: invoke the operation, take a raw (unclassified)
        // attempt record, and account for the completed invocation.
        let attempt: AttemptFn<R> = Arc::new(move |exec: Execution<R>| -> BoxAttemptFuture<R> {
            let op = Arc::clone(&op);
            Box::pin(async move {
                let result = match op(exec.clone()).await {
                    Ok(value) => ExecutionResult::from_attempt(Some(value), None),
                    Err(error) => ExecutionResult::from_attempt(None, Some(error)),
                };
                exec.record_execution();
                exec.record(&result);
                result
            })
        });

        // Wrap innermost-first so the outermost policy (index 0) sees the
        // final outcome last. Indices are contiguous 0..n, 0 = outermost.
        let mut composed = attempt;
        for (policy_index, policy) in self.policies.iter().enumerate().rev() {
            composed = policy.to_executor(policy_index).apply(composed);
        }

        let exec: Execution<R> = Execution::new();

        // Propagate external cancellation. The watcher lives until either the
        // token fires or the execution raises `finished` on the way out.
        let finished = CancellationToken::new();
        if let Some(external) = self.cancellation.clone() {
            let watcher_exec = exec.clone();
            let watcher_finished = finished.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = external.cancelled() => {
                        watcher_exec.cancel(
                            CancelSource::External,
                            ExecutionResult::failure(ExecutionError::Canceled),
                        );
                    }
                    _ = watcher_finished.cancelled() => {}
                }
            });
        }

        exec.initialize_attempt(None);
        let terminal = composed(exec.clone()).await;
        finished.cancel();

        let stats = exec.stats();
        debug!(
            success_all = terminal.success_all,
            attempts = stats.attempts,
            executions = stats.executions,
            error = terminal.error.as_ref().map(|e| e.as_label()),
            "execution completed"
        );

        if terminal.success_all {
            if let Some(listener) = &self.on_success {
                listener(ExecutionCompletedEvent::from_result(&terminal, stats.clone()));
            }
        } else if let Some(listener) = &self.on_failure {
            listener(ExecutionCompletedEvent::from_result(&terminal, stats.clone()));
        }
        if let Some(listener) = &self.on_complete {
            listener(ExecutionCompletedEvent::from_result(&terminal, stats));
        }

        match terminal.error {
            Some(error) => Err(error),
            None => Ok(terminal.value.unwrap_or_default()),
        }
    }
}
