//! Request spacing for the crawl.
//!
//! The crawler talks to exactly one host, so rate limiting is a single
//! shared slot rather than a per-domain map: every outbound request — page,
//! detail, or phone endpoint — waits until the configured minimum delay has
//! passed since the previous one.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Enforces a minimum delay between consecutive requests.
///
/// Designed to be wrapped in `Arc` and shared across worker tasks.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum time between requests. Zero disables limiting.
    delay: Duration,

    /// When the previous request was released. `None` until the first
    /// request, which proceeds immediately.
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a rate limiter with the given minimum delay.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_request: Mutex::new(None),
        }
    }

    /// Creates a limiter that applies no delay (`--rate-limit 0`).
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Returns true when no delay is applied.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.delay.is_zero()
    }

    /// The configured delay.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Waits until the minimum delay since the previous request has passed,
    /// then claims the slot.
    ///
    /// The lock is held across the sleep so concurrent callers queue up and
    /// release one per delay window rather than stampeding when the window
    /// opens.
    pub async fn acquire(&self) {
        if self.delay.is_zero() {
            return;
        }

        let mut last = self.last_request.lock().await;
        let now = Instant::now();

        if let Some(previous) = *last {
            let ready_at = previous + self.delay;
            if ready_at > now {
                let wait = ready_at - now;
                debug!(wait_ms = wait.as_millis() as u64, "rate limit wait");
                tokio::time::sleep(wait).await;
            }
        }

        *last = Some(Instant::now());
    }
}
