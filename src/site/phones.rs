//! Phone-reveal payload parsing.

use serde_json::Value;

/// Pulls phone numbers out of the reveal endpoint's JSON payload.
///
/// The payload shape is `{"phones": [{"primary": "...", "raw": "..."}]}`;
/// `primary` is the display-formatted number and is preferred, with `raw`
/// as the fallback. Anything malformed yields an empty list.
#[must_use]
pub fn parse_phone_payload(payload: &Value) -> Vec<String> {
    let Some(phones) = payload.get("phones").and_then(Value::as_array) else {
        return Vec::new();
    };

    phones
        .iter()
        .filter_map(|entry| {
            entry
                .get("primary")
                .or_else(|| entry.get("raw"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prefers_primary_over_raw() {
        let payload = json!({
            "phones": [
                {"primary": "(050) 123-45-67", "raw": "+994501234567"},
                {"raw": "+994551112233"}
            ]
        });
        assert_eq!(
            parse_phone_payload(&payload),
            vec!["(050) 123-45-67", "+994551112233"]
        );
    }

    #[test]
    fn test_missing_phones_key_yields_empty() {
        assert!(parse_phone_payload(&json!({"ok": true})).is_empty());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let payload = json!({"phones": [{"primary": ""}, {"number": "x"}, 42]});
        assert!(parse_phone_payload(&payload).is_empty());
    }
}
