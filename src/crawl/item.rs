//! Work items: one listing awaiting its detail fetch.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Badge flags visible on a listing card.
///
/// Harvested during page discovery so consumers never need a second fetch
/// just to recover them. All default to false; `#[serde(default)]` keeps
/// old checkpoints readable when a flag is added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingBadges {
    /// Paid VIP placement.
    #[serde(default)]
    pub vip: bool,
    /// Featured placement.
    #[serde(default)]
    pub featured: bool,
    /// Posted by a dealer salon rather than a private seller.
    #[serde(default)]
    pub salon: bool,
    /// Financing available.
    #[serde(default)]
    pub credit: bool,
    /// Seller accepts barter.
    #[serde(default)]
    pub barter: bool,
    /// VIN is published.
    #[serde(default)]
    pub vin: bool,
}

/// One listing discovered from an index page, prior to its detail fetch.
///
/// Immutable once created; owned by the pending queue until a worker claims
/// it, then by that worker until it resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// The listing's numeric identifier, extracted from its URL.
    pub listing_id: String,
    /// Absolute URL of the listing's detail page.
    pub url: String,
    /// Badge flags from the listing card.
    #[serde(default)]
    pub badges: ListingBadges,
}

impl WorkItem {
    /// Builds a work item from a detail-page URL and card badges.
    ///
    /// Returns `None` when no listing id can be extracted from the URL.
    #[must_use]
    pub fn from_url(url: impl Into<String>, badges: ListingBadges) -> Option<Self> {
        let url = url.into();
        let listing_id = extract_listing_id(&url)?;
        Some(Self {
            listing_id,
            url,
            badges,
        })
    }
}

/// Extracts the numeric listing id from a detail-page URL.
///
/// Listing URLs look like `https://host/autos/9156031-bmw-328` — the id is
/// the digit run after `/autos/`.
#[must_use]
pub fn extract_listing_id(url: &str) -> Option<String> {
    static ID_RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)] // pattern is a literal, checked by tests
    let re = ID_RE.get_or_init(|| Regex::new(r"/autos/(\d+)").unwrap());
    re.captures(url).map(|caps| caps[1].to_string())
}
