//! Error types for the fetch module.
//!
//! This module defines the closed set of failures a single HTTP round trip
//! can produce. Retry and rotation decisions are made one layer up, so each
//! variant carries enough context to classify without re-inspecting the
//! underlying transport error.

use thiserror::Error;

/// Errors that can occur during a single fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request timed out before a response arrived.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Connection-level error (DNS resolution, connection refused/reset, TLS).
    #[error("connection error fetching {url}: {detail}")]
    Connection {
        /// The URL that failed to connect.
        url: String,
        /// Description of the underlying transport error.
        detail: String,
    },

    /// HTTP error response (non-2xx status).
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Anything else (body decoding, malformed URL, unexpected payload).
    #[error("error fetching {url}: {detail}")]
    Other {
        /// The URL being fetched.
        url: String,
        /// Description of the failure.
        detail: String,
    },
}

impl FetchError {
    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a connection error.
    pub fn connection(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Connection {
            url: url.into(),
            detail: detail.into(),
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an error for failures outside the other variants.
    pub fn other(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Other {
            url: url.into(),
            detail: detail.into(),
        }
    }

    /// Classifies a `reqwest::Error` raised while sending a request.
    ///
    /// Timeouts and connect failures get their own variants since they feed
    /// the rotation trigger; everything else is `Other`.
    pub fn from_reqwest(url: impl Into<String>, source: &reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else if source.is_connect() {
            Self::Connection {
                url,
                detail: source.to_string(),
            }
        } else {
            Self::Other {
                url,
                detail: source.to_string(),
            }
        }
    }

    /// Returns the HTTP status code if this is a status error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// Note on From trait implementations:
// We intentionally do NOT implement `From<reqwest::Error>` because the
// variants require the request URL for context, which the source error does
// not reliably provide. `from_reqwest()` makes the caller supply it.
