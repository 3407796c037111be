//! Site-specific markup knowledge.
//!
//! Everything that knows what turbo.az HTML looks like lives here, behind
//! narrow seams: the crawl engine only ever sees work items, field maps, and
//! phone strings. Selectors and label tables are volatile by nature — when
//! the site reshuffles its markup, this module is the blast radius.

mod detail_page;
mod listing_page;
mod phones;

use std::collections::BTreeMap;

pub use detail_page::{TurboDetailExtractor, extract_csrf_token};
pub use listing_page::{DiscoveredCard, parse_listing_page};
pub use phones::parse_phone_payload;

/// Flat field map produced by a detail-page extraction.
pub type FieldMap = BTreeMap<String, String>;

/// Extracts a flat field map from a detail page's raw HTML.
///
/// Implementations may return any subset of keys; a page whose markup does
/// not match produces an empty (or partial) map, never an error — the
/// caller records what it got.
pub trait DetailExtractor: Send + Sync {
    /// Extracts fields from raw HTML.
    fn extract(&self, html: &str) -> FieldMap;
}

/// Collapses runs of whitespace and trims, matching how the site pads its
/// text nodes.
#[must_use]
pub(crate) fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
