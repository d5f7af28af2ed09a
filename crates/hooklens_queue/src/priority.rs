//! Enqueue-time priority computation.
//!
//! Priorities are a latency hint only: a precedence table over well-known
//! type names, a keyword fallback over the serialized body, and a default of
//! 5. Computed from the raw payload before classification, so a wrongly
//! prioritized job is still processed correctly.

use hooklens_protocol::defaults::DEFAULT_PRIORITY;
use serde_json::Value;

/// Well-known type names mapped into `[1, 15]`, checked in order.
const TYPE_PRIORITIES: &[(&str, i64)] = &[
    ("qr", 12),
    ("pairsuccess", 12),
    ("receivedcallback", 10),
    ("message", 10),
    ("connectedcallback", 8),
    ("disconnectedcallback", 8),
    ("messagestatuscallback", 7),
    ("deliverycallback", 7),
    ("readcallback", 6),
    ("receipt", 6),
    ("picture", 4),
    ("presencechatcallback", 3),
    ("chatpresence", 3),
    ("presence", 3),
    ("historysync", 2),
];

/// Body keywords consulted when no type field resolves, checked in order.
const KEYWORD_PRIORITIES: &[(&str, i64)] = &[
    ("qrcode", 12),
    ("\"message\"", 9),
    ("conversation", 9),
    ("status", 7),
    ("receipt", 6),
    ("presence", 3),
    ("historysync", 2),
];

/// Fields probed, in order, for a type name.
const TYPE_FIELDS: &[&str] = &["type", "eventType", "event"];

pub fn compute_priority(payload: &Value) -> i64 {
    if let Some(map) = payload.as_object() {
        for field in TYPE_FIELDS {
            let value = map
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(field))
                .and_then(|(_, v)| v.as_str());
            if let Some(type_name) = value {
                let lowered = type_name.to_lowercase();
                if let Some((_, priority)) = TYPE_PRIORITIES
                    .iter()
                    .find(|(name, _)| lowered == *name)
                {
                    return (*priority).clamp(1, 15);
                }
            }
        }
    }

    let body = serde_json::to_string(payload)
        .unwrap_or_default()
        .to_lowercase();
    for (keyword, priority) in KEYWORD_PRIORITIES {
        if body.contains(keyword) {
            return (*priority).clamp(1, 15);
        }
    }

    DEFAULT_PRIORITY
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_type_names_use_the_table() {
        assert_eq!(
            compute_priority(&json!({"type": "ReceivedCallback", "x": 1})),
            10
        );
        assert_eq!(compute_priority(&json!({"type": "HistorySync"})), 2);
        assert_eq!(compute_priority(&json!({"eventType": "QR"})), 12);
    }

    #[test]
    fn keyword_fallback_scans_the_body() {
        assert_eq!(
            compute_priority(&json!({"payload": {"qrCode": "abc"}})),
            12
        );
        assert_eq!(
            compute_priority(&json!({"data": {"status": "SENT"}})),
            7
        );
    }

    #[test]
    fn unknown_payloads_default_to_five() {
        assert_eq!(compute_priority(&json!({"opaque": true})), DEFAULT_PRIORITY);
        assert_eq!(compute_priority(&json!(null)), DEFAULT_PRIORITY);
    }

    #[test]
    fn priorities_stay_in_range() {
        for (_, priority) in TYPE_PRIORITIES.iter().chain(KEYWORD_PRIORITIES) {
            assert!((1..=15).contains(priority));
        }
    }
}
