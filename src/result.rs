//! # Outcome of one attempt, plus classification bits.
//!
//! An [`ExecutionResult`] flows inside-out through the composed pipeline: the
//! attempt wrapper produces one per invocation of the wrapped operation, each
//! policy layer may adopt, rewrite, or replace it, and exactly one terminal
//! result escapes the outermost layer.

use crate::error::ExecutionError;

/// Immutable record of one attempt's outcome.
///
/// The classification bits are layered:
/// - `complete` — the pipeline has reached a terminal state; no further
///   retries or recoveries may occur.
/// - `success` — the current policy layer considers this attempt a success. A
///   policy may hold this `true` while `error` is present (e.g. a policy that
///   does not classify that error as its own failure).
/// - `success_all` — every layer seen so far considered the attempt a
///   success; routes [`on_success`](crate::Executor::on_success) vs
///   [`on_failure`](crate::Executor::on_failure) at the top. Once cleared it
///   is never set again on the same result.
#[derive(Debug, Clone)]
pub struct ExecutionResult<R> {
    /// Typed value, when the operation (or a recovering policy) produced one.
    pub value: Option<R>,
    /// Failure cause, or `None`.
    pub error: Option<ExecutionError>,
    /// Terminal-state marker.
    pub complete: bool,
    /// Success according to the current layer.
    pub success: bool,
    /// Success according to every layer seen so far.
    pub success_all: bool,
}

impl<R> ExecutionResult<R> {
    /// Raw attempt record, before any policy layer has classified it.
    ///
    /// All bits start `true`; layers clear them through
    /// [`post_execute`](crate::PolicyExecutor::post_execute).
    pub fn from_attempt(value: Option<R>, error: Option<ExecutionError>) -> Self {
        Self {
            value,
            error,
            complete: true,
            success: true,
            success_all: true,
        }
    }

    /// Fully successful terminal result.
    pub fn success(value: Option<R>) -> Self {
        Self::from_attempt(value, None)
    }

    /// Failed terminal result, as synthesized by a policy (timeout,
    /// cancellation) or adopted from an exhausted retry loop.
    pub fn failure(error: ExecutionError) -> Self {
        Self {
            value: None,
            error: Some(error),
            complete: true,
            success: false,
            success_all: false,
        }
    }

    /// Returns the result with the terminal-state marker set to `complete`.
    pub fn with_complete(mut self, complete: bool) -> Self {
        self.complete = complete;
        self
    }

    /// Marks the result a failure for this layer and every layer above it.
    pub fn with_failure(mut self) -> Self {
        self.success = false;
        self.success_all = false;
        self
    }

    /// Marks the result a success for this layer.
    ///
    /// `success_all` is deliberately left alone: a layer can claim local
    /// success but cannot resurrect a verdict an inner layer already cleared.
    pub fn with_success(mut self) -> Self {
        self.success = true;
        self
    }
}
