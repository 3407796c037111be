//! Listing-index page parsing.
//!
//! An index page carries three product sections in order: the salons' VIP
//! block, the general VIP block, and the regular listings ("ELANLAR").
//! Only the regular section is harvested — the promoted blocks are paid
//! placements that repeat across pages and would skew any sample drawn from
//! the crawl.

use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use url::Url;

use crate::crawl::ListingBadges;

use super::clean_text;

/// One listing card found on an index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCard {
    /// Absolute detail-page URL.
    pub url: String,
    /// Badge flags read off the card.
    pub badges: ListingBadges,
}

/// Compiles a selector from a literal.
#[allow(clippy::expect_used)] // literals, exercised by every test below
fn sel(selector: &str) -> Selector {
    Selector::parse(selector).expect("static selector must parse")
}

/// Parses the regular-listings section of an index page into cards.
///
/// Card hrefs are joined against `base_url`. When the section markup cannot
/// be located (site layout change, block page), every card on the page is
/// used instead, with a warning — promoted noise beats silently dropping a
/// whole page.
#[must_use]
pub fn parse_listing_page(html: &str, base_url: &Url) -> Vec<DiscoveredCard> {
    let document = Html::parse_document(html);

    let card_sel = sel("div.products-i");
    let cards: Vec<ElementRef<'_>> = match find_regular_section(&document) {
        Some(section) => section.select(&card_sel).collect(),
        None => {
            let all: Vec<_> = document.select(&card_sel).collect();
            if !all.is_empty() {
                warn!("regular-listings section not found, falling back to all cards");
            }
            all
        }
    };

    let link_sel = sel("a.products-i__link");
    cards
        .iter()
        .filter_map(|card| {
            let href = card.select(&link_sel).next()?.value().attr("href")?;
            let url = base_url.join(href).ok()?;
            Some(DiscoveredCard {
                url: url.to_string(),
                badges: read_badges(card),
            })
        })
        .collect()
}

/// Finds the products container belonging to the "ELANLAR" section title
/// (and not one of the "VIP" titles that precede it).
fn find_regular_section(document: &Html) -> Option<ElementRef<'_>> {
    let title_sel = sel("div.section-title");
    let name_sel = sel("p.section-title_name");
    let products_sel = sel("div.products");

    for section in document.select(&title_sel) {
        let Some(name) = section.select(&name_sel).next() else {
            continue;
        };
        let text = clean_text(&name.text().collect::<String>());
        if !text.contains("ELANLAR") || text.contains("VIP") {
            continue;
        }

        // The products container lives in the sibling container that
        // follows the section title.
        for sibling in section.next_siblings().filter_map(ElementRef::wrap) {
            if let Some(products) = sibling.select(&products_sel).next() {
                return Some(products);
            }
            if products_sel.matches(&sibling) {
                return Some(sibling);
            }
        }
    }

    None
}

/// Reads the badge flags off one card.
fn read_badges(card: &ElementRef<'_>) -> ListingBadges {
    let has = |selector: &str| card.select(&sel(selector)).next().is_some();
    ListingBadges {
        vip: has("div.products-i__label--vip"),
        featured: has("div.products-i__label--featured"),
        salon: has("div.products-i__label--salon"),
        credit: has("div.products-i__icon--loan"),
        barter: has("div.products-i__icon--barter"),
        vin: has("div.products-i__label--vin"),
    }
}
