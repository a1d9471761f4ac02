//! # Completion events delivered to listeners.
//!
//! Listeners are plain single-argument functions held in one overwritable
//! slot per kind — there is no subscriber list. Multi-subscriber dispatch, if
//! a wrapper needs it, is built by combining functions before registration.

use std::sync::Arc;

use crate::error::ExecutionError;
use crate::execution::ExecutionStats;
use crate::result::ExecutionResult;

/// Value object describing a finished execution (or a policy-level event such
/// as a timeout firing).
#[derive(Debug, Clone)]
pub struct ExecutionCompletedEvent<R> {
    /// Terminal value, when one was produced.
    pub result: Option<R>,
    /// Terminal error, when the execution failed.
    pub error: Option<ExecutionError>,
    /// Snapshot of the execution's counters at dispatch time.
    pub stats: ExecutionStats,
}

impl<R: Clone> ExecutionCompletedEvent<R> {
    pub(crate) fn from_result(result: &ExecutionResult<R>, stats: ExecutionStats) -> Self {
        Self {
            result: result.value.clone(),
            error: result.error.clone(),
            stats,
        }
    }
}

/// Listener invoked with a completion event.
pub type CompletionListener<R> = Arc<dyn Fn(ExecutionCompletedEvent<R>) + Send + Sync>;
