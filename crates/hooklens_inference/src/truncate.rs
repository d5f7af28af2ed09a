//! Size-bounded field redaction.
//!
//! Walks a payload depth-first and shortens string values that either live
//! under a configured field name or are oversize base64 blobs. Structure is
//! always preserved: the redacted payload has exactly the original's paths,
//! and only terminal string values change.

use hooklens_protocol::defaults::TRUNCATION_SENTINEL;
use hooklens_protocol::{RedactedField, RedactionReport, RedactionTag, TruncatorConfig};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn base64_body() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9+/]+=*$").expect("static regex"))
}

/// The base64 heuristic: long enough, padded to a multiple of four, and
/// drawn from the standard alphabet.
pub fn looks_like_base64(s: &str) -> bool {
    s.len() >= 20 && s.len() % 4 == 0 && base64_body().is_match(s)
}

/// The JSON heuristic, used only to tag what a string held.
pub fn looks_like_json(s: &str) -> bool {
    matches!(
        serde_json::from_str::<Value>(s),
        Ok(Value::Object(_)) | Ok(Value::Array(_))
    )
}

/// Field redactor with a fixed configuration.
pub struct Truncator {
    config: TruncatorConfig,
}

impl Truncator {
    pub fn new(config: TruncatorConfig) -> Self {
        let config = TruncatorConfig {
            field_names: config
                .field_names
                .iter()
                .map(|name| name.to_lowercase())
                .collect(),
            ..config
        };
        Self { config }
    }

    /// Redact a payload, returning the redacted copy and what changed.
    pub fn truncate(&self, payload: &Value) -> (Value, RedactionReport) {
        let mut report = RedactionReport::default();
        let redacted = self.walk(payload, "", &mut report);
        (redacted, report)
    }

    fn walk(&self, value: &Value, path: &str, report: &mut RedactionReport) -> Value {
        match value {
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, child) in map {
                    let child_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{path}.{key}")
                    };
                    out.insert(key.clone(), self.walk(child, &child_path, report));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.walk(item, &format!("{path}[{i}]"), report))
                    .collect(),
            ),
            Value::String(s) => self.visit_string(s, path, report),
            other => other.clone(),
        }
    }

    fn visit_string(&self, s: &str, path: &str, report: &mut RedactionReport) -> Value {
        let char_count = s.chars().count();
        let name_listed = self.field_name_matches(path);
        let oversize_blob = char_count > 10 * self.config.max_length && looks_like_base64(s);

        // Listed fields are redacted once they exceed the retained length;
        // anything else only when it is an oversize base64 blob.
        let redact = (name_listed && char_count > self.config.max_length) || oversize_blob;
        if !redact {
            return Value::String(s.to_string());
        }

        let tag = if looks_like_base64(s) {
            RedactionTag::Base64
        } else if looks_like_json(s) {
            RedactionTag::Json
        } else {
            RedactionTag::Text
        };

        let mut shortened: String = s.chars().take(self.config.max_length).collect();
        shortened.push_str(TRUNCATION_SENTINEL);
        report.fields.push(RedactedField {
            path: path.to_string(),
            original_length: char_count,
            redacted_length: shortened.chars().count(),
            tag,
        });
        Value::String(shortened)
    }

    /// Case-insensitive substring match of configured names against the
    /// trailing segment of the path, array indices stripped.
    fn field_name_matches(&self, path: &str) -> bool {
        let trailing = trailing_segment(path).to_lowercase();
        if trailing.is_empty() {
            return false;
        }
        self.config
            .field_names
            .iter()
            .any(|name| trailing.contains(name.as_str()))
    }
}

fn trailing_segment(path: &str) -> &str {
    let without_indices = match path.rfind('[') {
        // Only trailing index groups matter: "a.b[0][1]" -> "a.b".
        Some(_) => path.trim_end_matches(|c: char| c == '[' || c == ']' || c.is_ascii_digit()),
        None => path,
    };
    without_indices
        .rsplit('.')
        .next()
        .unwrap_or(without_indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hooklens_protocol::defaults::TRUNCATE_MAX_LENGTH;
    use serde_json::json;

    fn truncator() -> Truncator {
        Truncator::new(TruncatorConfig::default())
    }

    fn collect_paths(value: &Value, path: &str, out: &mut Vec<String>) {
        out.push(path.to_string());
        match value {
            Value::Object(map) => {
                for (k, v) in map {
                    let p = if path.is_empty() {
                        k.clone()
                    } else {
                        format!("{path}.{k}")
                    };
                    collect_paths(v, &p, out);
                }
            }
            Value::Array(items) => {
                for (i, v) in items.iter().enumerate() {
                    collect_paths(v, &format!("{path}[{i}]"), out);
                }
            }
            _ => {}
        }
    }

    #[test]
    fn preserves_path_structure() {
        let payload = json!({
            "event": "pic",
            "nested": {"image": "A".repeat(500), "count": 3},
            "items": [{"thumbnail": "B".repeat(300)}, {"thumbnail": "ok"}],
        });
        let (redacted, report) = truncator().truncate(&payload);

        let mut before = Vec::new();
        let mut after = Vec::new();
        collect_paths(&payload, "", &mut before);
        collect_paths(&redacted, "", &mut after);
        assert_eq!(before, after);
        assert_eq!(report.len(), 2);
    }

    #[test]
    fn is_idempotent() {
        let payload = json!({
            "image": "C".repeat(4_000),
            "data": format!("{}==", "QUJD".repeat(300)),
            "note": "short",
        });
        let t = truncator();
        let (once, _) = t.truncate(&payload);
        let (twice, second_report) = t.truncate(&once);
        assert_eq!(once, twice);
        // The already-shortened values end with the sentinel and stay put.
        assert!(second_report
            .fields
            .iter()
            .all(|f| f.original_length == f.redacted_length));
    }

    #[test]
    fn exact_max_length_unlisted_field_is_unchanged() {
        let s = "x".repeat(TRUNCATE_MAX_LENGTH);
        let payload = json!({"note": s});
        let (redacted, report) = truncator().truncate(&payload);
        assert_eq!(redacted, payload);
        assert!(report.is_empty());
    }

    #[test]
    fn over_max_non_base64_unlisted_field_is_unchanged() {
        let s = "hello world ".repeat(20); // spaces rule out base64
        let payload = json!({"note": s});
        let (redacted, report) = truncator().truncate(&payload);
        assert_eq!(redacted, payload);
        assert!(report.is_empty());
    }

    #[test]
    fn oversize_base64_is_redacted_regardless_of_name() {
        // 10 * max + something, multiple of 4, base64 alphabet.
        let blob = "QUJd".repeat(10 * TRUNCATE_MAX_LENGTH / 4 + 3);
        let payload = json!({"innocuous": blob});
        let (redacted, report) = truncator().truncate(&payload);

        let value = redacted["innocuous"].as_str().unwrap();
        assert!(value.ends_with(TRUNCATION_SENTINEL));
        assert_eq!(report.len(), 1);
        assert_eq!(report.fields[0].tag, RedactionTag::Base64);
        assert_eq!(report.fields[0].path, "innocuous");
    }

    #[test]
    fn listed_field_matches_trailing_segment_after_indices() {
        let payload = json!({"album": [{"JPEGThumbnail": "D".repeat(500)}]});
        let (redacted, report) = truncator().truncate(&payload);
        assert!(redacted["album"][0]["JPEGThumbnail"]
            .as_str()
            .unwrap()
            .ends_with(TRUNCATION_SENTINEL));
        assert_eq!(report.fields[0].path, "album[0].JPEGThumbnail");
    }

    #[test]
    fn listed_name_matches_as_substring() {
        let payload = json!({"profileImageUrl": "E".repeat(500)});
        let (redacted, _) = truncator().truncate(&payload);
        assert!(redacted["profileImageUrl"]
            .as_str()
            .unwrap()
            .ends_with(TRUNCATION_SENTINEL));
    }

    #[test]
    fn numbers_and_booleans_are_never_touched() {
        let payload = json!({"image": 42, "data": true, "thumbnail": null});
        let (redacted, report) = truncator().truncate(&payload);
        assert_eq!(redacted, payload);
        assert!(report.is_empty());
    }

    #[test]
    fn json_strings_tag_as_json() {
        let inner = serde_json::to_string(&json!({"k": "v".repeat(200)})).unwrap();
        let payload = json!({"data": inner});
        let (_, report) = truncator().truncate(&payload);
        assert_eq!(report.fields[0].tag, RedactionTag::Json);
    }

    #[test]
    fn base64_heuristic_boundaries() {
        assert!(looks_like_base64(&"ABCD".repeat(5)));
        assert!(!looks_like_base64("ABC")); // too short
        assert!(!looks_like_base64(&"ABCDE".repeat(5))); // not a multiple of 4
        assert!(!looks_like_base64(&"AB D".repeat(5))); // bad alphabet
        assert!(looks_like_base64(&format!("{}==", "ABCD".repeat(5).trim_end_matches("CD"))));
    }
}
