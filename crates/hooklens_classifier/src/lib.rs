//! Event-kind classification.
//!
//! A payload (plus optional request headers) is assigned a stable kind by an
//! ordered cascade; the first matching rule wins and later rules never run.
//! Rule order is part of the system contract: reordering is a breaking
//! change. Classification never fails; the bottom of the cascade is the
//! literal kind `Unknown`.
//!
//! The classifier always inspects the pre-redaction payload. Comparisons are
//! case-insensitive throughout.

pub mod keywords;
pub mod meta;
pub mod provider;
pub mod shapes;
pub mod zapi;

use hooklens_protocol::defaults::UNKNOWN_KIND;
use hooklens_protocol::{pascal_case, sanitize_kind};
use serde_json::Value;
use std::collections::BTreeMap;

/// Request headers as received; keys are matched case-insensitively.
pub type Headers = BTreeMap<String, String>;

/// Classifier tuning: the vendor markers consulted by the Z-API rule.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Exact (case-insensitive) `Server` header value marking the vendor.
    pub vendor_server_token: String,
    /// Substring of the `Origin` header marking the vendor.
    pub vendor_origin_host: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            vendor_server_token: "Z-API".to_string(),
            vendor_origin_host: "z-api.io".to_string(),
        }
    }
}

/// The event-kind classifier.
pub struct Classifier {
    config: ClassifierConfig,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Assign an event kind. Always returns a sanitized, non-empty kind.
    pub fn classify(&self, payload: &Value, headers: &Headers) -> String {
        let kind = zapi::classify(payload, headers, &self.config)
            .or_else(|| meta::classify(payload))
            .or_else(|| direct_tag(payload))
            .or_else(|| shapes::classify(payload))
            .or_else(|| keywords::classify(payload))
            .or_else(|| provider::classify(payload, headers))
            .unwrap_or_else(|| UNKNOWN_KIND.to_string());
        sanitize_kind(&kind)
    }
}

/// Cascade step 3: direct tag fields, checked in order.
fn direct_tag(payload: &Value) -> Option<String> {
    let candidates = [
        field_ci(payload, &["eventType"]),
        field_ci(payload, &["body", "eventType"]),
        field_ci(payload, &["body", "data", "type"]),
    ];
    for candidate in candidates {
        if let Some(tag) = candidate {
            if !tag.trim().is_empty() {
                return Some(pascal_case(tag));
            }
        }
    }
    None
}

/// Case-insensitive object member lookup.
pub(crate) fn get_ci<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let map = value.as_object()?;
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

/// Case-insensitive string lookup along a key path.
pub(crate) fn field_ci<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = get_ci(current, key)?;
    }
    current.as_str()
}

/// Case-insensitive header lookup.
pub(crate) fn header_ci<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// All nested object keys, lower-cased, joined with commas.
///
/// The keyword scan and the provider fallback both match against this view.
pub(crate) fn joined_keys(payload: &Value) -> String {
    let mut keys = Vec::new();
    collect_keys(payload, &mut keys);
    keys.join(",")
}

fn collect_keys(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                out.push(key.to_lowercase());
                collect_keys(child, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_keys(item, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify(payload: Value) -> String {
        Classifier::default().classify(&payload, &Headers::new())
    }

    #[test]
    fn direct_event_type_wins_over_shapes() {
        assert_eq!(classify(json!({"eventType": "Ping", "ts": 1})), "Ping");
        assert_eq!(
            classify(json!({"eventType": "message-received"})),
            "MessageReceived"
        );
    }

    #[test]
    fn nested_tag_fields_are_consulted_in_order() {
        assert_eq!(
            classify(json!({"body": {"eventType": "statusChange"}})),
            "StatusChange"
        );
        assert_eq!(
            classify(json!({"body": {"data": {"type": "order_created"}}})),
            "OrderCreated"
        );
        // body.eventType beats body.data.type.
        assert_eq!(
            classify(json!({
                "body": {"eventType": "winner", "data": {"type": "loser"}}
            })),
            "Winner"
        );
    }

    #[test]
    fn empty_tags_fall_through() {
        assert_eq!(classify(json!({"eventType": ""})), "Unknown");
    }

    #[test]
    fn everything_unmatched_is_unknown() {
        assert_eq!(classify(json!({"x": 1})), "Unknown");
        assert_eq!(classify(json!({})), "Unknown");
    }

    #[test]
    fn kinds_are_sanitized() {
        let kind = classify(json!({"eventType": "weird kind!"}));
        for segment in kind.split('/') {
            assert!(hooklens_protocol::naming::is_identifier_safe(segment));
        }
    }

    #[test]
    fn case_insensitive_field_lookup() {
        assert_eq!(classify(json!({"EVENTTYPE": "Ping"})), "Ping");
    }

    #[test]
    fn joined_keys_covers_nesting_and_arrays() {
        let keys = joined_keys(&json!({
            "Outer": {"Inner": 1},
            "list": [{"Element": true}],
        }));
        assert!(keys.contains("outer"));
        assert!(keys.contains("inner"));
        assert!(keys.contains("element"));
    }
}
