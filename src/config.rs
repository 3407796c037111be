//! Run configuration.
//!
//! Assembled once at startup from the CLI and immutable for the run.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::fetch::{ProxyEndpoint, ProxyParseError};

/// Error raised for an unusable configuration.
///
/// Configuration problems are fatal: the process reports them and exits
/// non-zero without touching the checkpoint.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The base URL did not parse.
    #[error("invalid base URL {url:?}: {detail}")]
    InvalidBaseUrl {
        /// The rejected input.
        url: String,
        /// Why it was rejected.
        detail: String,
    },

    /// A proxy endpoint did not parse.
    #[error(transparent)]
    InvalidProxy(#[from] ProxyParseError),

    /// Start page after end page.
    #[error("start page {start} is after end page {end}")]
    InvalidPageRange {
        /// First page.
        start: u32,
        /// Last page.
        end: u32,
    },
}

/// Immutable configuration for one crawl run.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// The listings search URL, filters included.
    pub base_url: Url,
    /// First page index (inclusive).
    pub start_page: u32,
    /// Last page index (inclusive).
    pub end_page: u32,
    /// Maximum concurrent item workers.
    pub concurrency: usize,
    /// Maximum fetch attempts per request (including the first).
    pub max_attempts: u32,
    /// Base delay of the retry backoff schedule.
    pub retry_base_delay: Duration,
    /// Minimum spacing between outbound requests; zero disables.
    pub request_delay: Duration,
    /// Total per-request timeout.
    pub timeout: Duration,
    /// Skip TLS certificate verification.
    pub accept_invalid_certs: bool,
    /// Upstream proxies, in rotation order; empty means direct.
    pub proxies: Vec<ProxyEndpoint>,
    /// Checkpoint file location.
    pub checkpoint_path: PathBuf,
    /// Checkpoint after this many item completions.
    pub checkpoint_every: usize,
    /// Output file for the JSON record export.
    pub output_path: PathBuf,
}

impl CrawlConfig {
    /// Parses and validates the pieces that arrive as strings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a bad base URL, a bad proxy string, or
    /// an inverted page range.
    pub fn validate(
        base_url: &str,
        start_page: u32,
        end_page: u32,
        proxy_strings: &[String],
    ) -> Result<(Url, Vec<ProxyEndpoint>), ConfigError> {
        let base_url = Url::parse(base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: base_url.to_string(),
            detail: e.to_string(),
        })?;

        if start_page > end_page {
            return Err(ConfigError::InvalidPageRange {
                start: start_page,
                end: end_page,
            });
        }

        let proxies = proxy_strings
            .iter()
            .map(|s| ProxyEndpoint::parse(s))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((base_url, proxies))
    }
}
