//! Backoff retry logic for X API calls.
//!
//! A [`RetryPolicy`] is plain configuration. [`with_retry`] runs an async
//! attempt function under a policy, a cancellation token and a predicate that
//! decides which failures are worth another attempt. Every outbound call in
//! the crate goes through this one loop.
//!
//! - `REPOST`: 2 attempts, 5s base delay, linear growth, 10s cap
//! - `STANDARD`: 5 attempts, 5s base delay, doubling, 10s cap

use log::{info, warn};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `base * max(1, n)`
    Linear,
    /// `base * multiplier^n`
    Exponential { multiplier: f64 },
}

/// Configuration for a bounded retry loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    pub backoff: Backoff,

    /// Upper bound for any single delay.
    pub cap_delay: Duration,
}

impl RetryPolicy {
    /// Policy for reposts: few attempts, since a repost has a visible side effect.
    pub const REPOST: Self = Self {
        max_attempts: 2,
        base_delay: Duration::from_secs(5),
        backoff: Backoff::Linear,
        cap_delay: Duration::from_secs(10),
    };

    /// Policy for reads, quotes, posts and media uploads.
    pub const STANDARD: Self = Self {
        max_attempts: 5,
        base_delay: Duration::from_secs(5),
        backoff: Backoff::Exponential { multiplier: 2.0 },
        cap_delay: Duration::from_secs(10),
    };

    pub fn new(max_attempts: u32, base_delay: Duration, backoff: Backoff, cap_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff,
            cap_delay,
        }
    }

    /// Computes the wait after failed attempt `attempt` (0-indexed), capped at `cap_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = match self.backoff {
            Backoff::Linear => f64::from(attempt.max(1)),
            Backoff::Exponential { multiplier } => multiplier.powi(attempt as i32),
        };
        let delay_secs = self.base_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay_secs.min(self.cap_delay.as_secs_f64()))
    }

    /// Every wait the policy can produce, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts.saturating_sub(1)).map(|attempt| self.delay_for_attempt(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Terminal state of a retry loop.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// An attempt succeeded.
    Success(T),

    /// Every attempt failed with a retryable error.
    Exhausted { last_error: E, attempts: u32 },

    /// An attempt failed with an error the predicate refused to retry.
    Permanent { error: E, attempts: u32 },

    /// The token fired before, during or between attempts.
    Cancelled { attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Success(_))
    }
}

/// Executes an async operation under a retry policy.
///
/// # Arguments
///
/// * `policy` - Attempt count and delays
/// * `cancel` - Aborts the attempt in flight and the wait between attempts; no
///   attempt starts once it fires
/// * `is_retryable` - Classifies a failure as retryable or terminal
/// * `operation` - Called once per attempt with the 0-indexed attempt number
pub async fn with_retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    is_retryable: P,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            info!("Retry loop cancelled before attempt {}", attempt + 1);
            return RetryOutcome::Cancelled { attempts: attempt };
        }

        let result = tokio::select! {
            biased;
            result = operation(attempt) => result,
            _ = cancel.cancelled() => {
                info!("Retry loop cancelled during attempt {}", attempt + 1);
                return RetryOutcome::Cancelled { attempts: attempt + 1 };
            }
        };
        attempt += 1;

        let error = match result {
            Ok(value) => return RetryOutcome::Success(value),
            Err(e) => e,
        };

        if !is_retryable(&error) {
            return RetryOutcome::Permanent {
                error,
                attempts: attempt,
            };
        }

        if attempt >= max_attempts {
            return RetryOutcome::Exhausted {
                last_error: error,
                attempts: attempt,
            };
        }

        let delay = policy.delay_for_attempt(attempt - 1);
        warn!(
            "Attempt {}/{} failed with a retryable error, retrying in {:?}",
            attempt, max_attempts, delay
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Retry loop cancelled during backoff after {} attempt(s)", attempt);
                return RetryOutcome::Cancelled { attempts: attempt };
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
