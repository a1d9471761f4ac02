//! # palisade
//!
//! **Palisade** wraps arbitrary async operations in a stack of composable
//! failure-handling *policies* — timeout, retry, fallback — and drives them
//! to a single terminal outcome, with cooperative cancellation, per-layer
//! result classification, and completion events.
//!
//! ## Features
//!
//! | Area            | Description                                                          | Key types / traits                        |
//! |-----------------|----------------------------------------------------------------------|-------------------------------------------|
//! | **Execution**   | Compose policies and drive one call through the stack.               | [`Executor`]                               |
//! | **Context**     | Per-call state shared with the operation and every policy layer.     | [`Execution`], [`ExecutionStats`]          |
//! | **Policies**    | Uniform decorator contract; built-in timeout/retry/fallback.         | [`Policy`], [`PolicyExecutor`], [`policies`] |
//! | **Events**      | Completion notification, one overwritable listener slot per kind.    | [`ExecutionCompletedEvent`]                |
//! | **Errors**      | One error currency with wrap-aware sentinel matching.                | [`ExecutionError`]                         |
//!
//! ## Composition model
//!
//! Policies are given outermost-first and compose like an onion: the first
//! policy handles the final result last. `with_policies(vec![fallback,
//! retry, timeout])` executes as `fallback(retry(timeout(operation)))` — the
//! timeout bounds each attempt, the retry re-runs timed-out attempts, and the
//! fallback recovers once the retries are spent. Swapping timeout and retry
//! instead bounds the retries as a whole.
//!
//! Cancellation follows the same shape. Each policy layer knows its stack
//! index (`0` = outermost); when a layer cancels, every layer beneath it
//! observes the cancellation and collapses, while enclosing layers keep
//! going. An external [`CancellationToken`](tokio_util::sync::CancellationToken)
//! cancels from outside every layer. Cancellation is always cooperative: a
//! running operation is signaled, never aborted.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use palisade::{Executor, PolicyRef};
//! use palisade::policies::{BackoffStrategy, RetryPolicy, Timeout};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), palisade::ExecutionError> {
//!     let executor = Executor::<String>::with_policies(vec![
//!         Arc::new(Timeout::new(Duration::from_secs(10))) as PolicyRef<String>,
//!         Arc::new(
//!             RetryPolicy::with_max_attempts(3)
//!                 .with_backoff(BackoffStrategy::exponential(
//!                     Duration::from_millis(50),
//!                     Duration::from_secs(1),
//!                 )),
//!         ),
//!     ])
//!     .on_failure(|event| eprintln!("lookup failed: {:?}", event.error));
//!
//!     let greeting = executor
//!         .get(|| async { Ok("hello".to_string()) })
//!         .await?;
//!     println!("{greeting}");
//!     Ok(())
//! }
//! ```

mod error;
mod event;
mod execution;
mod executor;
pub mod policies;
mod policy;
mod result;

// ---- Public re-exports ----

pub use error::{DynError, ExecutionError};
pub use event::{CompletionListener, ExecutionCompletedEvent};
pub use execution::{CancelSource, Execution, ExecutionStats};
pub use executor::Executor;
pub use policy::{AttemptFn, BoxAttemptFuture, Policy, PolicyExecutor, PolicyRef};
pub use result::ExecutionResult;
