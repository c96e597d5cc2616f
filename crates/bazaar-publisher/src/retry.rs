//! Bounded retries with exponential backoff.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{duration_ms, millis};
use crate::error::Transient;

/// Default base delay between attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Attempt budget and backoff for one class of pipeline step.
///
/// The delay before attempt `n + 1` is `base_delay × 2^(n-1)`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use bazaar_publisher::RetryPolicy;
///
/// let policy = RetryPolicy::new(4, Duration::from_secs(1));
/// assert_eq!(policy.delay_for(1), Duration::from_secs(1));
/// assert_eq!(policy.delay_for(3), Duration::from_secs(4));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    #[serde(with = "duration_ms", rename = "baseDelayMs")]
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, DEFAULT_BASE_DELAY)
    }
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Replaces the base delay.
    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Runs `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent. Each attempt is bounded by `timeout`; an elapsed
    /// attempt counts as a transient failure.
    ///
    /// On success returns the value and the number of attempts made.
    ///
    /// # Errors
    ///
    /// Returns [`Exhausted`] carrying the last error when no attempt succeeded.
    pub async fn run<T, E, F, Fut>(
        &self,
        name: &'static str,
        timeout: Duration,
        mut operation: F,
    ) -> Result<(T, u32), Exhausted<E>>
    where
        E: Transient,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match tokio::time::timeout(timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(E::timed_out(name, timeout)),
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = name, attempt, "Succeeded after retry");
                    }
                    return Ok((value, attempt));
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = name,
                        attempt,
                        max_attempts,
                        delay_ms = millis(delay),
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(operation = name, attempt, error = %e, "Giving up");
                    return Err(Exhausted {
                        last_error: e,
                        attempts: attempt,
                    });
                }
            }
        }
    }
}

/// The last error of a retried operation that never succeeded.
#[derive(Debug)]
pub struct Exhausted<E> {
    /// Error from the final attempt.
    pub last_error: E,
    /// Attempts made.
    pub attempts: u32,
}
