//! Detail-page field extraction.
//!
//! The detail page lays its attributes out as label/value pairs in a
//! properties table, with the labels in Azerbaijani (English on the
//! language-switched variant). The extractor maps known labels onto stable
//! field keys; unknown labels are ignored rather than guessed at.

use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

use super::{DetailExtractor, FieldMap, clean_text};

/// Compiles a selector from a literal.
#[allow(clippy::expect_used)] // literals, exercised by every test below
fn sel(selector: &str) -> Selector {
    Selector::parse(selector).expect("static selector must parse")
}

/// Field extractor for turbo.az detail pages.
#[derive(Debug, Default, Clone, Copy)]
pub struct TurboDetailExtractor;

impl DetailExtractor for TurboDetailExtractor {
    fn extract(&self, html: &str) -> FieldMap {
        let document = Html::parse_document(html);
        let mut fields = FieldMap::new();

        let mut put = |key: &str, value: String| {
            if !value.is_empty() {
                fields.insert(key.to_string(), value);
            }
        };

        if let Some(title) = first_text(&document, "h1.product-title") {
            put("title", title);
        }
        if let Some(price) = first_text(&document, "div.product-price__i--bold") {
            put("price", price);
        }
        if let Some(description) = first_text(&document, "div.product-description__content") {
            put("description", description);
        }
        if let Some(seller) = first_text(&document, "div.product-owner__info-name") {
            put("seller_name", seller);
        }

        extract_properties(&document, &mut fields);
        extract_extras(&document, &mut fields);
        extract_statistics(&document, &mut fields);
        extract_images(&document, &mut fields);

        fields
    }
}

/// Text of the first element matching `selector`, cleaned.
fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = sel(selector);
    document
        .select(&selector)
        .next()
        .map(|el| clean_text(&el.text().collect::<String>()))
        .filter(|text| !text.is_empty())
}

/// Maps a properties-table label onto a field key.
///
/// "Yeni" is checked last: it is a substring of nothing else here, but the
/// year label contains "ili" and the match order mirrors the site's own
/// label list to stay predictable when labels evolve.
fn field_key_for_label(label: &str) -> Option<&'static str> {
    let lower = label.to_lowercase();
    if label.contains("Şəhər") || label.contains("City") {
        Some("city")
    } else if label.contains("Marka") || label.contains("Make") {
        Some("make")
    } else if label.contains("Model") {
        Some("model")
    } else if label.contains("Buraxılış ili") || lower.contains("year") {
        Some("year")
    } else if label.contains("Yürüş") || label.contains("Mileage") {
        Some("mileage")
    } else if label.contains("Mühərrik") || label.contains("Engine") {
        Some("engine")
    } else if label.contains("Sürətlər qutusu") || label.contains("Transmission") {
        Some("transmission")
    } else if label.contains("Ötürücü") || label.contains("Drivetrain") {
        Some("drivetrain")
    } else if label.contains("Ban növü") || label.contains("Body") {
        Some("body_type")
    } else if label.contains("Rəng") || label.contains("Color") {
        Some("color")
    } else if label.contains("Yerlərin sayı") || label.contains("Seats") {
        Some("seats_count")
    } else if label.contains("Vəziyyəti") || label.contains("Condition") {
        Some("condition")
    } else if label.contains("bazar üçün yığılıb") || label.contains("Market") {
        Some("market")
    } else if label.contains("Yeni") || label.contains("New") {
        Some("is_new")
    } else {
        None
    }
}

/// Walks the properties table, mapping labels onto field keys.
///
/// The engine value is a compound `volume / power / fuel` string and is
/// split into its parts.
fn extract_properties(document: &Html, fields: &mut FieldMap) {
    let row_sel = sel("div.product-properties__i");
    let label_sel = sel("label.product-properties__i-name");
    let value_sel = sel("span.product-properties__i-value");

    for row in document.select(&row_sel) {
        let Some(label_el) = row.select(&label_sel).next() else {
            continue;
        };
        let Some(value_el) = row.select(&value_sel).next() else {
            continue;
        };

        let label = clean_text(&label_el.text().collect::<String>());
        let value = clean_text(&value_el.text().collect::<String>());
        if value.is_empty() {
            continue;
        }

        match field_key_for_label(&label) {
            Some("engine") => {
                let mut parts = value.split('/').map(|part| clean_text(part));
                if let Some(volume) = parts.next() {
                    fields.insert("engine_volume".to_string(), volume);
                }
                if let Some(power) = parts.next() {
                    fields.insert("engine_power".to_string(), power);
                }
                if let Some(fuel) = parts.next() {
                    fields.insert("fuel_type".to_string(), fuel);
                }
            }
            Some(key) => {
                fields.insert(key.to_string(), value);
            }
            None => {}
        }
    }
}

/// Joins the equipment list into one field.
fn extract_extras(document: &Html, fields: &mut FieldMap) {
    let item_sel = sel("ul.product-extras li");
    let extras: Vec<String> = document
        .select(&item_sel)
        .map(|li| clean_text(&li.text().collect::<String>()))
        .filter(|text| !text.is_empty())
        .collect();
    if !extras.is_empty() {
        fields.insert("extras".to_string(), extras.join(" | "));
    }
}

/// Updated-date and view-count live in the statistics list as labeled text.
fn extract_statistics(document: &Html, fields: &mut FieldMap) {
    let stat_sel = sel("ul.product-statistics li");
    for stat in document.select(&stat_sel) {
        let text = clean_text(&stat.text().collect::<String>());
        if text.contains("Yeniləndi") || text.contains("Updated") {
            let value = text
                .replace("Yeniləndi:", "")
                .replace("Updated:", "")
                .trim()
                .to_string();
            if !value.is_empty() {
                fields.insert("updated_date".to_string(), value);
            }
        } else if text.contains("Baxışların sayı") || text.contains("Views") {
            static DIGITS_RE: OnceLock<Regex> = OnceLock::new();
            #[allow(clippy::unwrap_used)]
            let re = DIGITS_RE.get_or_init(|| Regex::new(r"\d+").unwrap());
            if let Some(m) = re.find(&text) {
                fields.insert("views".to_string(), m.as_str().to_string());
            }
        }
    }
}

/// Collects up to 10 full-resolution photo URLs from the CDN image tags.
fn extract_images(document: &Html, fields: &mut FieldMap) {
    let img_sel = sel("img");
    let mut urls: Vec<String> = Vec::new();
    for img in document.select(&img_sel) {
        let Some(src) = img.value().attr("src") else {
            continue;
        };
        if !(src.contains("turbo.azstatic.com") && src.contains("uploads")) {
            continue;
        }
        let full = src.replace("f460x343", "full").replace("f660x496", "full");
        if !urls.contains(&full) {
            urls.push(full);
        }
        if urls.len() == 10 {
            break;
        }
    }
    if !urls.is_empty() {
        fields.insert("image_urls".to_string(), urls.join(" | "));
    }
}

/// Extracts the short-lived CSRF token embedded in a detail page.
///
/// Tries the standard meta tag, then the hidden form input, then a raw
/// sweep of the page source — the token moved between all three homes
/// across past site deployments.
#[must_use]
pub fn extract_csrf_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let meta_sel = sel(r#"meta[name="csrf-token"]"#);
    if let Some(content) = document
        .select(&meta_sel)
        .next()
        .and_then(|el| el.value().attr("content"))
    {
        if !content.is_empty() {
            return Some(content.to_string());
        }
    }

    let input_sel = sel(r#"input[name="authenticity_token"]"#);
    if let Some(value) = document
        .select(&input_sel)
        .next()
        .and_then(|el| el.value().attr("value"))
    {
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }

    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    let re = TOKEN_RE.get_or_init(|| Regex::new(r#"authenticity_token[^>]*?value="([^"]+)""#).unwrap());
    re.captures(html).map(|caps| caps[1].to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn property_row(label: &str, value: &str) -> String {
        format!(
            r#"<div class="product-properties__i">
                 <label class="product-properties__i-name">{label}</label>
                 <span class="product-properties__i-value">{value}</span>
               </div>"#
        )
    }

    fn detail_page() -> String {
        format!(
            r#"<html><head><meta name="csrf-token" content="abc123tok"></head><body>
              <h1 class="product-title">BMW 328, 2.0 L, 1996 il</h1>
              <div class="product-price__i--bold">11 500 AZN</div>
              {city}{make}{model}{year}{engine}{new}
              <div class="product-description__content">
                Salam,  avtomobil   ideal vəziyyətdədir.
              </div>
              <ul class="product-extras">
                <li class="product-extras__i">Yüngül lehimli disklər</li>
                <li class="product-extras__i">Kondisioner</li>
              </ul>
              <div class="product-owner__info-name">Elvin</div>
              <ul class="product-statistics">
                <li class="product-statistics__i">Yeniləndi: 07.08.2026</li>
                <li class="product-statistics__i">Baxışların sayı: 1542</li>
              </ul>
              <img src="https://turbo.azstatic.com/uploads/f460x343/photo1.jpg">
              <img src="https://turbo.azstatic.com/uploads/f660x496/photo2.jpg">
              <img src="https://other.example.com/banner.jpg">
            </body></html>"#,
            city = property_row("Şəhər", "Bakı"),
            make = property_row("Marka", "BMW"),
            model = property_row("Model", "328"),
            year = property_row("Buraxılış ili", "1996"),
            engine = property_row("Mühərrik", "2.0 L / 150 a.g. / Benzin"),
            new = property_row("Yeni", "Xeyr"),
        )
    }

    #[test]
    fn test_extracts_mapped_properties() {
        let fields = TurboDetailExtractor.extract(&detail_page());
        assert_eq!(fields.get("city").map(String::as_str), Some("Bakı"));
        assert_eq!(fields.get("make").map(String::as_str), Some("BMW"));
        assert_eq!(fields.get("model").map(String::as_str), Some("328"));
        assert_eq!(fields.get("year").map(String::as_str), Some("1996"));
        assert_eq!(fields.get("is_new").map(String::as_str), Some("Xeyr"));
    }

    #[test]
    fn test_splits_engine_into_parts() {
        let fields = TurboDetailExtractor.extract(&detail_page());
        assert_eq!(fields.get("engine_volume").map(String::as_str), Some("2.0 L"));
        assert_eq!(
            fields.get("engine_power").map(String::as_str),
            Some("150 a.g.")
        );
        assert_eq!(fields.get("fuel_type").map(String::as_str), Some("Benzin"));
    }

    #[test]
    fn test_extracts_title_price_description() {
        let fields = TurboDetailExtractor.extract(&detail_page());
        assert_eq!(
            fields.get("title").map(String::as_str),
            Some("BMW 328, 2.0 L, 1996 il")
        );
        assert_eq!(fields.get("price").map(String::as_str), Some("11 500 AZN"));
        // Whitespace runs collapse.
        assert_eq!(
            fields.get("description").map(String::as_str),
            Some("Salam, avtomobil ideal vəziyyətdədir.")
        );
    }

    #[test]
    fn test_extracts_extras_statistics_and_images() {
        let fields = TurboDetailExtractor.extract(&detail_page());
        assert_eq!(
            fields.get("extras").map(String::as_str),
            Some("Yüngül lehimli disklər | Kondisioner")
        );
        assert_eq!(
            fields.get("updated_date").map(String::as_str),
            Some("07.08.2026")
        );
        assert_eq!(fields.get("views").map(String::as_str), Some("1542"));
        let images = fields.get("image_urls").unwrap();
        assert!(images.contains("uploads/full/photo1.jpg"));
        assert!(images.contains("uploads/full/photo2.jpg"));
        assert!(!images.contains("banner"));
    }

    #[test]
    fn test_unmatched_markup_yields_missing_keys_not_empties() {
        let fields = TurboDetailExtractor.extract("<html><body><p>blocked</p></body></html>");
        assert!(fields.is_empty());
    }

    #[test]
    fn test_csrf_token_from_meta_tag() {
        assert_eq!(
            extract_csrf_token(&detail_page()).as_deref(),
            Some("abc123tok")
        );
    }

    #[test]
    fn test_csrf_token_from_form_input() {
        let html = r#"<form><input name="authenticity_token" value="form-tok-9"></form>"#;
        assert_eq!(extract_csrf_token(html).as_deref(), Some("form-tok-9"));
    }

    #[test]
    fn test_csrf_token_absent() {
        assert_eq!(extract_csrf_token("<html><body></body></html>"), None);
    }
}
