//! HTTP transport: single-shot fetches, retry/backoff, proxy rotation, and
//! request spacing.

mod client;
mod error;
mod proxy;
mod rate_limiter;
mod retry;

pub use client::{BROWSER_USER_AGENT, CONNECT_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS, Fetcher, FetcherConfig};
pub use error::FetchError;
pub use proxy::{ProxyCredentials, ProxyEndpoint, ProxyParseError, ProxyPool};
pub use rate_limiter::RateLimiter;
pub use retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, RetryPolicy};
