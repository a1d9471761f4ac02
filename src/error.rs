//! # Error type carried through policy pipelines.
//!
//! [`ExecutionError`] is the single error currency of the crate. It has three
//! origins:
//!
//! - [`ExecutionError::Failure`] — whatever the wrapped operation returned,
//!   carried through unmodified (unless a policy recovers).
//! - [`ExecutionError::TimeoutExceeded`] — synthesized by the
//!   [`Timeout`](crate::policies::Timeout) policy when its timer wins the race.
//! - [`ExecutionError::Canceled`] — synthesized when the external
//!   [`CancellationToken`](tokio_util::sync::CancellationToken) attached via
//!   [`Executor::with_cancellation`](crate::Executor::with_cancellation) fires.
//!
//! The sentinel variants are identity-comparable through arbitrary wrapping:
//! [`is_timeout`](ExecutionError::is_timeout) and
//! [`is_canceled`](ExecutionError::is_canceled) walk the
//! [`source`](std::error::Error::source) chain, so an outer policy can still
//! classify a wrapped timeout as a timeout.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Shared handle to an arbitrary error value.
///
/// `Arc` rather than `Box` so that [`ExecutionResult`](crate::ExecutionResult)
/// snapshots stay cheaply cloneable while racing producers adopt them.
pub type DynError = Arc<dyn StdError + Send + Sync + 'static>;

/// Error produced by one execution of a policy-wrapped operation.
#[non_exhaustive]
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    /// An attempt outlived the delay configured on a [`Timeout`](crate::policies::Timeout) policy.
    #[error("timeout exceeded")]
    TimeoutExceeded,

    /// The execution was canceled from outside every policy layer.
    #[error("execution canceled")]
    Canceled,

    /// A failure returned by the wrapped operation itself.
    #[error(transparent)]
    Failure(#[from] DynError),
}

/// Plain-text failure reason, used by the `From<String>` conveniences.
#[derive(Debug, Error)]
#[error("{0}")]
struct Reason(String);

impl ExecutionError {
    /// Wraps an arbitrary error as a user-origin failure.
    pub fn failure<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        ExecutionError::Failure(Arc::new(err))
    }

    /// Builds a user-origin failure from a plain message.
    pub fn message(msg: impl Into<String>) -> Self {
        ExecutionError::Failure(Arc::new(Reason(msg.into())))
    }

    /// True if this error is, or wraps, the timeout sentinel.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutionError::TimeoutExceeded)
            || chain_has(self, |e| matches!(e, ExecutionError::TimeoutExceeded))
    }

    /// True if this error is, or wraps, the cancellation sentinel.
    pub fn is_canceled(&self) -> bool {
        matches!(self, ExecutionError::Canceled)
            || chain_has(self, |e| matches!(e, ExecutionError::Canceled))
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ExecutionError::TimeoutExceeded => "timeout_exceeded",
            ExecutionError::Canceled => "canceled",
            ExecutionError::Failure(_) => "failure",
        }
    }
}

impl From<String> for ExecutionError {
    fn from(msg: String) -> Self {
        ExecutionError::message(msg)
    }
}

impl From<&str> for ExecutionError {
    fn from(msg: &str) -> Self {
        ExecutionError::message(msg)
    }
}

/// Walks the `source` chain looking for an [`ExecutionError`] matching `pred`.
///
/// `Failure` is transparent: its `source()` forwards straight through the
/// payload, which would skip a sentinel wrapped directly inside it. The
/// payload is therefore probed before the chain walk, and every nested
/// [`ExecutionError`] found along the chain is probed the same way.
fn chain_has(err: &ExecutionError, pred: fn(&ExecutionError) -> bool) -> bool {
    if let ExecutionError::Failure(payload) = err {
        if let Some(inner) = payload.downcast_ref::<ExecutionError>() {
            if pred(inner) || chain_has(inner, pred) {
                return true;
            }
        }
    }
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(inner) = cause.downcast_ref::<ExecutionError>() {
            if pred(inner) || chain_has(inner, pred) {
                return true;
            }
        }
        source = cause.source();
    }
    false
}
