//! Delay growth between retry attempts: capped multiplicative backoff with
//! optional jitter.

use std::time::Duration;

use rand::Rng;

/// Randomization applied to computed delays, spreading out synchronized
/// retries from many concurrent executions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterStrategy {
    /// Use the exact computed delay.
    #[default]
    None,
    /// Random delay in `[0, delay]`.
    Full,
    /// `delay/2 + random[0, delay/2]` — keeps ~75% of the backoff on average.
    Equal,
}

impl JitterStrategy {
    fn apply(self, delay: Duration) -> Duration {
        let ms = (delay.as_millis().min(u128::from(u64::MAX))) as u64;
        if ms == 0 {
            return delay;
        }
        let mut rng = rand::rng();
        match self {
            JitterStrategy::None => delay,
            JitterStrategy::Full => Duration::from_millis(rng.random_range(0..=ms)),
            JitterStrategy::Equal => {
                let half = ms / 2;
                let jitter = if half == 0 { 0 } else { rng.random_range(0..=half) };
                Duration::from_millis(half + jitter)
            }
        }
    }
}

/// Computes the next retry delay from the previous one.
#[derive(Clone, Copy, Debug)]
pub struct BackoffStrategy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Cap on the computed delay.
    pub max: Duration,
    /// Multiplicative growth factor (`1.0` = constant delay).
    pub factor: f64,
    /// Randomization applied after growth and capping.
    pub jitter: JitterStrategy,
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterStrategy::None,
        }
    }
}

impl BackoffStrategy {
    /// Constant delay: every retry waits exactly `delay`.
    pub fn constant(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterStrategy::None,
        }
    }

    /// Exponential growth from `first`, doubling per retry, capped at `max`.
    pub fn exponential(first: Duration, max: Duration) -> Self {
        Self {
            first,
            max,
            factor: 2.0,
            jitter: JitterStrategy::None,
        }
    }

    /// Returns the strategy with the given jitter.
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Computes the delay following `prev` (`None` for the first retry).
    pub fn next(&self, prev: Option<Duration>) -> Duration {
        let grown = match prev {
            None => self.first,
            Some(d) => {
                let mul = d.as_secs_f64() * self.factor;
                if mul.is_finite() {
                    d.mul_f64(self.factor)
                } else {
                    self.max
                }
            }
        };
        self.jitter.apply(grown.min(self.max))
    }
}
