//! JSON value kind detection.

use hooklens_protocol::NodeKind;
use serde_json::Value;

/// Classify a JSON value into the closed kind set.
///
/// Never returns `union`; that kind only arises from merging. serde_json
/// cannot represent NaN or infinities, so every `Number` is finite.
pub fn detect(value: &Value) -> NodeKind {
    match value {
        Value::Null => NodeKind::Null,
        Value::Bool(_) => NodeKind::Boolean,
        Value::Number(_) => NodeKind::Number,
        Value::String(_) => NodeKind::String,
        Value::Array(_) => NodeKind::Array,
        Value::Object(_) => NodeKind::Object,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_every_primitive() {
        assert_eq!(detect(&json!(null)), NodeKind::Null);
        assert_eq!(detect(&json!(true)), NodeKind::Boolean);
        assert_eq!(detect(&json!(42)), NodeKind::Number);
        assert_eq!(detect(&json!(4.5)), NodeKind::Number);
        assert_eq!(detect(&json!("hi")), NodeKind::String);
        assert_eq!(detect(&json!([1, 2])), NodeKind::Array);
        assert_eq!(detect(&json!({"a": 1})), NodeKind::Object);
    }

    #[test]
    fn null_is_not_absence() {
        // A field explicitly set to null detects as null, which is a real
        // kind; absence is only representable by a missing key.
        let payload = json!({"present": null});
        assert_eq!(detect(&payload["present"]), NodeKind::Null);
    }
}
