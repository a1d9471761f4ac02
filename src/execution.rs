//! # Per-call execution state.
//!
//! An [`Execution`] is created for each call to one of the
//! [`Executor`](crate::Executor) entry points and shared — as a cheap-clone
//! handle — between the wrapped operation and every policy layer. It carries
//! attempt counters, timing anchors, the last attempt's outcome, and the
//! one-shot cancellation state.
//!
//! ## Cancellation protocol
//!
//! Cancellation is a single atomic transition: the first caller of
//! [`cancel`](Execution::cancel) records *who* canceled (a policy stack index
//! or the external token), stores the terminal result it wants adopted, and
//! closes the cancellation token. Later callers get `false` and change
//! nothing.
//!
//! Policy indices grow outermost → innermost, `0` being the outermost layer.
//! [`is_canceled_for_policy`](Execution::is_canceled_for_policy) answers "did
//! this layer, or anything enclosing it, cancel?": an inner policy must honor
//! a cancellation from any enclosing layer, while an outer policy is free to
//! keep going (and e.g. retry) when only a deeper frame was collapsed.
//!
//! Cancellation is cooperative throughout: the engine signals intent via the
//! token; it never aborts a running operation.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::ExecutionError;
use crate::result::ExecutionResult;

/// Not-yet-canceled marker for the atomic canceler index.
const NOT_CANCELED: i64 = -1;
/// Canceler index reserved for the external token: observed by every layer.
const CANCELED_EXTERNAL: i64 = i64::MAX;

/// Identifies who requested cancellation of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelSource {
    /// The policy at the given stack index (`0` = outermost).
    Policy(usize),
    /// The external token attached via
    /// [`Executor::with_cancellation`](crate::Executor::with_cancellation).
    External,
}

impl CancelSource {
    fn as_index(self) -> i64 {
        match self {
            CancelSource::Policy(index) => index as i64,
            CancelSource::External => CANCELED_EXTERNAL,
        }
    }

    fn from_index(index: i64) -> Option<Self> {
        match index {
            NOT_CANCELED => None,
            CANCELED_EXTERNAL => Some(CancelSource::External),
            index => Some(CancelSource::Policy(index as usize)),
        }
    }
}

/// Snapshot of an execution's observational counters.
#[derive(Debug, Clone)]
pub struct ExecutionStats {
    /// Attempts initialized so far (first attempt included).
    pub attempts: u32,
    /// Completed invocations of the wrapped operation.
    pub executions: u32,
    /// Retries scheduled by retry-style policies (advisory).
    pub retries: u32,
    /// Hedges spawned by hedging-style policies (advisory).
    pub hedges: u32,
    /// Wall-clock time since the execution started.
    pub elapsed: Duration,
}

struct Timing {
    start: Instant,
    attempt_start: Instant,
}

struct LastAttempt<R> {
    value: Option<R>,
    error: Option<ExecutionError>,
}

struct Shared<R> {
    attempts: AtomicU32,
    executions: AtomicU32,
    retries: AtomicU32,
    hedges: AtomicU32,
    /// Guards double-initialization when the driver and a retry loop both
    /// initialize the same attempt. Cleared by [`Execution::record_execution`].
    attempt_initialized: AtomicBool,
    timing: Mutex<Timing>,
    last: Mutex<LastAttempt<R>>,
    canceled_index: AtomicI64,
    /// Also serves as the transition mutex for [`Execution::cancel`].
    canceled_result: Mutex<Option<ExecutionResult<R>>>,
    canceled: CancellationToken,
}

/// Shared per-call state, exposed to the wrapped operation and to policies.
///
/// Cloning is cheap and every clone observes the same state.
pub struct Execution<R> {
    inner: Arc<Shared<R>>,
}

impl<R> Clone for Execution<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> fmt::Debug for Execution<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("attempts", &self.attempts())
            .field("executions", &self.executions())
            .field("canceled_by", &self.canceled_by())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<R> Execution<R> {
    pub(crate) fn new() -> Self {
        let now = Instant::now();
        Self {
            inner: Arc::new(Shared {
                attempts: AtomicU32::new(0),
                executions: AtomicU32::new(0),
                retries: AtomicU32::new(0),
                hedges: AtomicU32::new(0),
                attempt_initialized: AtomicBool::new(false),
                timing: Mutex::new(Timing {
                    start: now,
                    attempt_start: now,
                }),
                last: Mutex::new(LastAttempt {
                    value: None,
                    error: None,
                }),
                canceled_index: AtomicI64::new(NOT_CANCELED),
                canceled_result: Mutex::new(None),
                canceled: CancellationToken::new(),
            }),
        }
    }

    // ---- Observational API (wrapped operations) ----

    /// Attempts initialized so far, the in-flight one included.
    pub fn attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::Acquire)
    }

    /// Completed invocations of the wrapped operation.
    pub fn executions(&self) -> u32 {
        self.inner.executions.load(Ordering::Acquire)
    }

    /// Retries scheduled so far (advisory, maintained by retry policies).
    pub fn retries(&self) -> u32 {
        self.inner.retries.load(Ordering::Acquire)
    }

    /// Hedges spawned so far (advisory, maintained by hedging policies).
    pub fn hedges(&self) -> u32 {
        self.inner.hedges.load(Ordering::Acquire)
    }

    /// Wall-clock time since the execution started.
    pub fn elapsed(&self) -> Duration {
        lock(&self.inner.timing).start.elapsed()
    }

    /// Wall-clock time since the current attempt started.
    pub fn elapsed_attempt(&self) -> Duration {
        lock(&self.inner.timing).attempt_start.elapsed()
    }

    /// Error of the most recent completed attempt, if any.
    pub fn last_error(&self) -> Option<ExecutionError> {
        lock(&self.inner.last).error.clone()
    }

    /// True once any layer (or the external token) has canceled.
    ///
    /// Never blocks. Observation is advisory: a running operation keeps
    /// running until it chooses to stop.
    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.is_cancelled()
    }

    /// Waits until the execution is canceled.
    ///
    /// Completes immediately if cancellation already happened; pends forever
    /// on executions that complete without being canceled, so only ever race
    /// this against real work.
    pub async fn canceled(&self) {
        self.inner.canceled.cancelled().await;
    }

    /// Snapshot of the execution's counters.
    pub fn stats(&self) -> ExecutionStats {
        ExecutionStats {
            attempts: self.attempts(),
            executions: self.executions(),
            retries: self.retries(),
            hedges: self.hedges(),
            elapsed: self.elapsed(),
        }
    }

    // ---- Policy-facing API ----

    /// Requests cancellation on behalf of `source`, asking the pipeline to
    /// adopt `result` as its terminal outcome.
    ///
    /// Idempotent: only the first caller wins and returns `true`; the stored
    /// source and result are never overwritten.
    pub fn cancel(&self, source: CancelSource, result: ExecutionResult<R>) -> bool {
        let mut slot = lock(&self.inner.canceled_result);
        if self.inner.canceled_index.load(Ordering::Acquire) != NOT_CANCELED {
            return false;
        }
        *slot = Some(result);
        self.inner
            .canceled_index
            .store(source.as_index(), Ordering::Release);
        self.inner.canceled.cancel();
        true
    }

    /// True if the layer at `policy_index`, or anything enclosing it, has
    /// canceled. A cancellation raised by a *deeper* frame is not visible
    /// here: an outer policy may still retry past it.
    pub fn is_canceled_for_policy(&self, policy_index: usize) -> bool {
        match self.inner.canceled_index.load(Ordering::Acquire) {
            NOT_CANCELED => false,
            CANCELED_EXTERNAL => true,
            index => index <= policy_index as i64,
        }
    }

    /// Who canceled, if anyone.
    pub fn canceled_by(&self) -> Option<CancelSource> {
        CancelSource::from_index(self.inner.canceled_index.load(Ordering::Acquire))
    }

    /// Begins a new attempt: stamps the attempt timer and bumps the attempt
    /// counter, unless an enclosing layer of `policy_index` already canceled,
    /// in which case it returns `false` and the caller must not attempt.
    ///
    /// The driver initializes the first attempt before any policy runs;
    /// retry-style loops call this again before each inner call. The
    /// double-initialization guard makes the two callers coalesce on a single
    /// increment per actual attempt.
    pub fn initialize_attempt(&self, policy_index: Option<usize>) -> bool {
        if let Some(index) = policy_index {
            if self.is_canceled_for_policy(index) {
                return false;
            }
        }
        if self.inner.attempt_initialized.swap(true, Ordering::AcqRel) {
            return true;
        }
        let first = self.inner.attempts.fetch_add(1, Ordering::AcqRel) == 0;
        let now = Instant::now();
        let mut timing = lock(&self.inner.timing);
        if first {
            timing.start = now;
        }
        timing.attempt_start = now;
        true
    }

    /// Marks one invocation of the wrapped operation as completed.
    pub fn record_execution(&self) {
        self.inner.executions.fetch_add(1, Ordering::AcqRel);
        self.inner.attempt_initialized.store(false, Ordering::Release);
    }

    /// Counts one scheduled retry.
    pub fn record_retry(&self) {
        self.inner.retries.fetch_add(1, Ordering::AcqRel);
    }

    /// Counts one spawned hedge.
    pub fn record_hedge(&self) {
        self.inner.hedges.fetch_add(1, Ordering::AcqRel);
    }
}

impl<R: Clone> Execution<R> {
    /// Value of the most recent completed attempt, if any.
    pub fn last_result(&self) -> Option<R> {
        lock(&self.inner.last).value.clone()
    }

    /// Stores `result` as the most recent attempt's outcome, visible to the
    /// operation and to policies before the next attempt.
    pub fn record(&self, result: &ExecutionResult<R>) {
        let mut last = lock(&self.inner.last);
        last.value = result.value.clone();
        last.error = result.error.clone();
    }

    /// The terminal result stored by whoever canceled, if anyone did.
    pub fn canceled_result(&self) -> Option<ExecutionResult<R>> {
        lock(&self.inner.canceled_result).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeout_result() -> ExecutionResult<u32> {
        ExecutionResult::failure(ExecutionError::TimeoutExceeded)
    }

    #[test]
    fn cancel_is_idempotent_and_first_wins() {
        let exec: Execution<u32> = Execution::new();
        assert!(exec.cancel(CancelSource::Policy(1), timeout_result()));
        assert!(!exec.cancel(
            CancelSource::Policy(0),
            ExecutionResult::failure(ExecutionError::Canceled)
        ));
        assert_eq!(exec.canceled_by(), Some(CancelSource::Policy(1)));
        let adopted = exec.canceled_result().and_then(|r| r.error);
        assert!(adopted.is_some_and(|e| e.is_timeout()));
    }

    #[test]
    fn cancellation_is_visible_at_and_beneath_the_canceler() {
        let exec: Execution<u32> = Execution::new();
        assert!(!exec.is_canceled_for_policy(0));

        exec.cancel(CancelSource::Policy(1), timeout_result());
        // Outermost layer (index 0) is above the canceler and keeps going.
        assert!(!exec.is_canceled_for_policy(0));
        // The canceler itself and everything beneath it observe the cancel.
        assert!(exec.is_canceled_for_policy(1));
        assert!(exec.is_canceled_for_policy(2));
        assert!(exec.is_canceled());
    }

    #[test]
    fn external_cancellation_is_visible_everywhere() {
        let exec: Execution<u32> = Execution::new();
        exec.cancel(
            CancelSource::External,
            ExecutionResult::failure(ExecutionError::Canceled),
        );
        assert!(exec.is_canceled_for_policy(0));
        assert!(exec.is_canceled_for_policy(7));
        assert_eq!(exec.canceled_by(), Some(CancelSource::External));
    }

    #[test]
    fn initialize_attempt_refuses_after_relevant_cancel() {
        let exec: Execution<u32> = Execution::new();
        assert!(exec.initialize_attempt(Some(1)));
        exec.record_execution();

        exec.cancel(CancelSource::Policy(0), timeout_result());
        assert!(!exec.initialize_attempt(Some(1)));
        // A layer above the canceler may still initialize.
        // (Policy 0 canceled; there is no layer above 0, but unconditional
        // initialization is still allowed for the driver.)
        assert!(exec.initialize_attempt(None));
    }

    #[test]
    fn double_initialization_counts_one_attempt() {
        let exec: Execution<u32> = Execution::new();
        assert!(exec.initialize_attempt(None));
        assert!(exec.initialize_attempt(Some(0)));
        assert_eq!(exec.attempts(), 1);

        exec.record_execution();
        assert!(exec.initialize_attempt(Some(0)));
        assert_eq!(exec.attempts(), 2);
        assert_eq!(exec.executions(), 1);
    }

    #[test]
    fn record_populates_last_attempt() {
        let exec: Execution<u32> = Execution::new();
        exec.record(&ExecutionResult::from_attempt(
            Some(9),
            Some(ExecutionError::message("boom")),
        ));
        assert_eq!(exec.last_result(), Some(9));
        assert!(exec.last_error().is_some());
    }
}
