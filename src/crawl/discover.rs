//! Page discovery: index page → work items.

use std::sync::Arc;

use tracing::{debug, instrument};
use url::Url;

use crate::fetch::{FetchError, Fetcher, ProxyPool, RateLimiter, RetryPolicy};
use crate::site;

use super::item::WorkItem;

/// Turns a page index into work items without touching detail pages.
///
/// Discovery fetches one listing-index page through the retry policy and
/// harvests the regular-listings cards, badges included, so downstream
/// consumers never need a second fetch just for card metadata.
#[derive(Debug, Clone)]
pub struct PageDiscoverer {
    fetcher: Fetcher,
    retry: RetryPolicy,
    pool: Arc<ProxyPool>,
    limiter: Arc<RateLimiter>,
    base_url: Url,
}

impl PageDiscoverer {
    /// Creates a discoverer rooted at `base_url` (the listings search URL,
    /// possibly carrying filter query parameters).
    #[must_use]
    pub fn new(
        fetcher: Fetcher,
        retry: RetryPolicy,
        pool: Arc<ProxyPool>,
        limiter: Arc<RateLimiter>,
        base_url: Url,
    ) -> Self {
        Self {
            fetcher,
            retry,
            pool,
            limiter,
            base_url,
        }
    }

    /// The URL for a page index. Page 1 is the bare base URL; later pages
    /// append to any filter parameters already present.
    #[must_use]
    pub fn page_url(&self, page: u32) -> Url {
        if page <= 1 {
            return self.base_url.clone();
        }
        let mut url = self.base_url.clone();
        url.query_pairs_mut().append_pair("page", &page.to_string());
        url
    }

    /// Discovers the work items on one index page.
    ///
    /// # Errors
    ///
    /// Returns the final [`FetchError`] when the page could not be fetched
    /// after all attempts. The caller decides what that means for the
    /// page's completion bookkeeping; an empty page that *fetched* is an
    /// `Ok(vec![])`, which is a different situation from a failure.
    #[instrument(skip(self))]
    pub async fn discover(&self, page: u32) -> Result<Vec<WorkItem>, FetchError> {
        let url = self.page_url(page);

        let html = self
            .retry
            .execute(&self.pool, || async {
                self.limiter.acquire().await;
                self.fetcher.fetch_text(url.as_str()).await
            })
            .await?;

        let cards = site::parse_listing_page(&html, &self.base_url);
        let items: Vec<WorkItem> = cards
            .into_iter()
            .filter_map(|card| WorkItem::from_url(card.url, card.badges))
            .collect();

        debug!(page, items = items.len(), "page discovered");
        Ok(items)
    }
}
