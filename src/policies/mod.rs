//! Built-in failure-handling policies:
//! - [`Timeout`] — bounds an attempt, racing a one-shot timer against the
//!   layers beneath it;
//! - [`RetryPolicy`] — re-runs failed attempts with a pluggable
//!   [`BackoffStrategy`];
//! - [`Fallback`] — substitutes an alternative outcome for a failed result.
//!
//! All of them implement the [`Policy`](crate::Policy) contract and can be
//! stacked in any order; see the crate-level docs for how ordering changes
//! behavior.

mod backoff;
mod fallback;
mod retry;
mod timeout;

pub use backoff::{BackoffStrategy, JitterStrategy};
pub use fallback::Fallback;
pub use retry::RetryPolicy;
pub use timeout::Timeout;
