//! Fully resolved listing records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::item::{ListingBadges, WorkItem};

/// The resolved representation of one listing.
///
/// `fields` holds whatever the detail-page extractor recovered;
/// `supplementary` holds the fields revealed by the token-gated second
/// fetch (currently the phone numbers). Data the page did not carry is an
/// absent key — never an empty-string placeholder, so "present but blank"
/// and "not on the page" stay distinguishable downstream.
///
/// Created once per successful worker run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    /// Identifier, always equal to the originating work item's.
    pub listing_id: String,
    /// The detail-page URL the record was fetched from.
    pub url: String,
    /// Badge flags carried over from discovery.
    #[serde(default)]
    pub badges: ListingBadges,
    /// Extracted detail-page fields.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Fields from the supplementary reveal fetch; empty when that fetch
    /// failed or returned nothing.
    #[serde(default)]
    pub supplementary: BTreeMap<String, String>,
    /// When the record was assembled.
    pub fetched_at: DateTime<Utc>,
}

impl ListingRecord {
    /// Assembles a record for a work item.
    #[must_use]
    pub fn new(
        item: &WorkItem,
        fields: BTreeMap<String, String>,
        supplementary: BTreeMap<String, String>,
    ) -> Self {
        Self {
            listing_id: item.listing_id.clone(),
            url: item.url.clone(),
            badges: item.badges,
            fields,
            supplementary,
            fetched_at: Utc::now(),
        }
    }

    /// Looks up a field, checking the supplementary map after the primary.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .or_else(|| self.supplementary.get(key))
            .map(String::as_str)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn item() -> WorkItem {
        WorkItem::from_url("https://turbo.az/autos/555-lada-niva", ListingBadges::default())
            .unwrap()
    }

    #[test]
    fn test_record_inherits_item_identity() {
        let record = ListingRecord::new(&item(), BTreeMap::new(), BTreeMap::new());
        assert_eq!(record.listing_id, "555");
        assert_eq!(record.url, "https://turbo.az/autos/555-lada-niva");
    }

    #[test]
    fn test_field_lookup_falls_back_to_supplementary() {
        let mut fields = BTreeMap::new();
        fields.insert("make".to_string(), "Lada".to_string());
        let mut supplementary = BTreeMap::new();
        supplementary.insert("phones".to_string(), "(050) 123-45-67".to_string());

        let record = ListingRecord::new(&item(), fields, supplementary);
        assert_eq!(record.field("make"), Some("Lada"));
        assert_eq!(record.field("phones"), Some("(050) 123-45-67"));
        assert_eq!(record.field("color"), None);
    }

    #[test]
    fn test_record_serde_round_trip() {
        let mut fields = BTreeMap::new();
        fields.insert("price".to_string(), "15 500 AZN".to_string());
        let record = ListingRecord::new(&item(), fields, BTreeMap::new());

        let json = serde_json::to_string(&record).unwrap();
        let back: ListingRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
