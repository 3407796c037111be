//! Item processing: one work item → one record.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::fetch::{FetchError, Fetcher, ProxyPool, RateLimiter, RetryPolicy};
use crate::site::{self, DetailExtractor};

use super::item::WorkItem;
use super::record::ListingRecord;

/// Failure processing one work item.
///
/// Only a failed detail fetch is terminal for an item — the item then stays
/// pending and is retried by the next crawler invocation rather than inside
/// this run, which avoids hammering a possibly-banned identity. A markup
/// mismatch or a failed supplementary fetch still yields a (partial) record.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The detail page could not be fetched after all attempts.
    #[error("detail fetch failed for listing {listing_id}: {source}")]
    DetailFetchFailed {
        /// The listing that failed.
        listing_id: String,
        /// The final fetch failure.
        #[source]
        source: FetchError,
    },
}

/// Processes work items into listing records.
pub struct ItemWorker {
    fetcher: Fetcher,
    retry: RetryPolicy,
    pool: Arc<ProxyPool>,
    limiter: Arc<RateLimiter>,
    base_url: Url,
    extractor: Arc<dyn DetailExtractor>,
}

impl std::fmt::Debug for ItemWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemWorker")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ItemWorker {
    /// Creates a worker.
    #[must_use]
    pub fn new(
        fetcher: Fetcher,
        retry: RetryPolicy,
        pool: Arc<ProxyPool>,
        limiter: Arc<RateLimiter>,
        base_url: Url,
        extractor: Arc<dyn DetailExtractor>,
    ) -> Self {
        Self {
            fetcher,
            retry,
            pool,
            limiter,
            base_url,
            extractor,
        }
    }

    /// Resolves one work item into a record.
    ///
    /// Fetches the detail page, extracts its fields, then reveals the
    /// phone numbers through the token-gated endpoint. The reveal call
    /// carries the CSRF token embedded in the detail page plus the session
    /// cookies the detail fetch planted in the shared jar.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::DetailFetchFailed`] when the detail page is
    /// unreachable after all attempts.
    #[instrument(skip(self), fields(listing_id = %item.listing_id))]
    pub async fn process(&self, item: &WorkItem) -> Result<ListingRecord, ProcessError> {
        let html = self
            .retry
            .execute(&self.pool, || async {
                self.limiter.acquire().await;
                self.fetcher.fetch_text(&item.url).await
            })
            .await
            .map_err(|source| ProcessError::DetailFetchFailed {
                listing_id: item.listing_id.clone(),
                source,
            })?;

        let fields = self.extractor.extract(&html);
        if fields.is_empty() {
            warn!(
                listing_id = %item.listing_id,
                "detail markup did not match, keeping partial record"
            );
        }

        let supplementary = self.fetch_supplementary(item, &html).await;

        debug!(
            listing_id = %item.listing_id,
            fields = fields.len(),
            supplementary = supplementary.len(),
            "item processed"
        );
        Ok(ListingRecord::new(item, fields, supplementary))
    }

    /// Runs the phone-reveal fetch; failures leave the map empty.
    async fn fetch_supplementary(&self, item: &WorkItem, html: &str) -> BTreeMap<String, String> {
        let mut supplementary = BTreeMap::new();

        let endpoint = match self
            .base_url
            .join(&format!("/autos/{}/show_phones", item.listing_id))
        {
            Ok(url) => url,
            Err(e) => {
                warn!(listing_id = %item.listing_id, error = %e, "bad phone endpoint URL");
                return supplementary;
            }
        };

        let csrf_token = site::extract_csrf_token(html);
        let query = [("trigger_button", "main"), ("source_link", item.url.as_str())];

        let payload = self
            .retry
            .execute(&self.pool, || async {
                self.limiter.acquire().await;
                self.fetcher
                    .fetch_json(endpoint.as_str(), &query, &item.url, csrf_token.as_deref())
                    .await
            })
            .await;

        match payload {
            Ok(payload) => {
                let phones = site::parse_phone_payload(&payload);
                if !phones.is_empty() {
                    supplementary.insert("phones".to_string(), phones.join(" | "));
                }
            }
            Err(e) => {
                warn!(
                    listing_id = %item.listing_id,
                    error = %e,
                    "phone reveal failed, record kept without phones"
                );
            }
        }

        supplementary
    }
}
