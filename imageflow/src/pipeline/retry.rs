//! Bounded retry with configurable delay between attempts.
//!
//! Used for teardown calls that commonly fail transiently (throttling,
//! dependency violations that clear after a few seconds). The number of
//! attempts and the total time spent waiting are always bounded.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Attempts made when deleting a resource during cleanup, including the first.
pub const DEFAULT_CLEANUP_ATTEMPTS: u32 = 5;

/// Delay between cleanup attempts in milliseconds.
pub const DEFAULT_CLEANUP_DELAY_MS: u64 = 5_000;

/// Largest attempt count a configured cleanup policy may use.
pub const MAX_CLEANUP_ATTEMPTS: u32 = 20;

/// Largest single delay a configured cleanup policy may use, in milliseconds.
pub const MAX_CLEANUP_DELAY_MS: u64 = 300_000;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base
    #[default]
    Constant,
    /// delay = base * attempt
    Linear,
    /// delay = base * 2^(attempt - 1)
    Exponential,
}

/// Jitter applied on top of the backoff delay.
///
/// Jitter only ever shortens a delay, so the worst-case wait of a policy
/// does not depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// Retry policy: how many attempts, and how long to wait between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds.
    pub delay_ms: u64,
    /// Cap on a single delay in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_CLEANUP_ATTEMPTS,
            delay_ms: DEFAULT_CLEANUP_DELAY_MS,
            max_delay_ms: 60_000,
            backoff: BackoffStrategy::Constant,
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryPolicy {
    /// Creates the default cleanup policy: 5 attempts, 5 seconds apart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that makes a single attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Returns the effective number of attempts.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Returns the un-jittered delay after the given failed attempt (1-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base = self.delay_ms;

        let delay = match self.backoff {
            BackoffStrategy::Constant => base,
            BackoffStrategy::Linear => base.saturating_mul(u64::from(attempt)),
            BackoffStrategy::Exponential => {
                base.saturating_mul(2u64.saturating_pow(attempt - 1))
            }
        };

        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Returns the longest total time `run` can spend sleeping.
    ///
    /// There is no delay after the final attempt. Saturates at
    /// `Duration::MAX` instead of overflowing.
    #[must_use]
    pub fn worst_case_wait(&self) -> Duration {
        (1..self.attempts())
            .map(|attempt| self.delay_for_attempt(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// Returns true if attempts and delays are within the cleanup limits.
    ///
    /// Within the limits, `worst_case_wait` is at most
    /// `(MAX_CLEANUP_ATTEMPTS - 1) * MAX_CLEANUP_DELAY_MS`.
    #[must_use]
    pub fn is_bounded(&self) -> bool {
        self.max_attempts <= MAX_CLEANUP_ATTEMPTS
            && self.delay_ms.min(self.max_delay_ms) <= MAX_CLEANUP_DELAY_MS
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = u64::try_from(self.delay_for_attempt(attempt).as_millis()).unwrap_or(u64::MAX);

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    (delay - half) + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }

    /// Runs an operation until it succeeds or the attempts are exhausted.
    ///
    /// Stops at the first success. Sleeps between failed attempts but not
    /// after the last one.
    ///
    /// # Errors
    ///
    /// Returns the last error and the number of attempts made once every
    /// attempt has failed.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let max_attempts = self.attempts();
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max_attempts => {
                    return Err(RetryError {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                Err(e) => {
                    let delay = self.jittered_delay(attempt);
                    tracing::debug!(
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Returned by [`RetryPolicy::run`] when every attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("gave up after {attempts} attempts: {last_error}")]
pub struct RetryError<E> {
    /// Number of attempts made.
    pub attempts: u32,
    /// Error returned by the final attempt.
    pub last_error: E,
}
