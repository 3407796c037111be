//! Retry with exponential backoff and proxy rotation.
//!
//! [`RetryPolicy::execute`] wraps a single-shot fetch closure with bounded
//! attempts. The delay before attempt k (k ≥ 2) is exactly
//! `base_delay * 2^(k-2)`; there is never a delay before the first attempt.
//! The schedule carries no jitter — it is part of the crate's observable
//! contract and the resume tests assert it to the millisecond.
//!
//! Failures that implicate the outbound network identity — HTTP 403, HTTP
//! 429, timeouts, and connection errors — trigger a [`ProxyPool`] rotation
//! before the next attempt. Other HTTP statuses (404, 500, ...) do not:
//! a missing page or a server bug looks the same from every proxy.

use std::time::Duration;

use tracing::{debug, warn};

use super::error::FetchError;
use super::proxy::ProxyPool;

/// Default maximum attempts (including the first).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for the backoff schedule.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Bounded-retry policy with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the initial one.
    max_attempts: u32,

    /// Delay before the second attempt; doubles each attempt after that.
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy. `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Returns the configured maximum attempts.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay applied before attempt `attempt` (1-indexed).
    ///
    /// Zero before the first attempt, `base_delay * 2^(attempt-2)` after.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        self.base_delay * 2u32.saturating_pow(attempt - 2)
    }

    /// Whether a failure implicates the current proxy identity.
    #[must_use]
    pub fn triggers_rotation(error: &FetchError) -> bool {
        match error {
            FetchError::HttpStatus { status, .. } => *status == 403 || *status == 429,
            FetchError::Timeout { .. } | FetchError::Connection { .. } => true,
            FetchError::Other { .. } => false,
        }
    }

    /// Runs `op` until it succeeds or attempts are exhausted.
    ///
    /// Rotation fires after an identity-correlated failure only when another
    /// attempt will follow; the final failure is returned as-is without a
    /// pointless identity switch.
    ///
    /// # Errors
    ///
    /// Returns the last failure once `max_attempts` attempts have failed.
    pub async fn execute<T, F, Fut>(&self, pool: &ProxyPool, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "fetch succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if attempt >= self.max_attempts {
                        warn!(attempt, error = %error, "fetch failed, attempts exhausted");
                        return Err(error);
                    }

                    if Self::triggers_rotation(&error) {
                        pool.rotate();
                    }

                    attempt += 1;
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
