//! Structural and payload fingerprints.
//!
//! Both are SHA-256 over a canonical UTF-8 serialization. The structure
//! fingerprint walks children in lexicographic order and ignores examples,
//! paths, and redaction marks; the payload fingerprint sorts object keys and
//! collapses oversize strings so near-duplicates hash identically.

use hooklens_protocol::defaults::{LARGE_STRING_BOUND, LARGE_STRING_SENTINEL};
use hooklens_protocol::TypeTree;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Stable hash of a tree's structure.
///
/// Retains kind, optionality, children (lexicographic), and item types;
/// excludes examples, paths, and redaction metadata. Equal digests mean the
/// trees are structurally indistinguishable.
pub fn structure_fingerprint(tree: &TypeTree) -> String {
    let mut canonical = String::new();
    write_canonical_tree(tree, &mut canonical);
    hex_digest(canonical.as_bytes())
}

fn write_canonical_tree(tree: &TypeTree, out: &mut String) {
    out.push_str(tree.kind.as_str());
    if tree.optional {
        out.push('?');
    }
    if !tree.children.is_empty() {
        out.push('{');
        // BTreeMap iteration is already lexicographic.
        for (name, child) in &tree.children {
            write_escaped(name, out);
            out.push(':');
            write_canonical_tree(child, out);
            out.push(',');
        }
        out.push('}');
    }
    if let Some(item) = tree.item_type.as_deref() {
        out.push('[');
        write_canonical_tree(item, out);
        out.push(']');
    }
}

/// Canonical hash of a payload's content.
///
/// Object keys are sorted at every level and strings beyond the generous
/// bound are replaced by a sentinel, so two events differing only in a
/// base64 blob fingerprint the same.
pub fn payload_fingerprint(payload: &Value) -> String {
    let mut canonical = String::new();
    write_canonical_value(payload, &mut canonical);
    hex_digest(canonical.as_bytes())
}

fn write_canonical_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            if s.chars().count() > LARGE_STRING_BOUND {
                write_escaped(LARGE_STRING_SENTINEL, out);
            } else {
                write_escaped(s, out);
            }
        }
        Value::Array(items) => {
            out.push('[');
            for item in items {
                write_canonical_value(item, out);
                out.push(',');
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for key in keys {
                write_escaped(key, out);
                out.push(':');
                write_canonical_value(&map[key], out);
                out.push(',');
            }
            out.push('}');
        }
    }
}

fn write_escaped(s: &str, out: &mut String) {
    // JSON string escaping keeps keys containing separators unambiguous.
    match serde_json::to_string(s) {
        Ok(escaped) => out.push_str(&escaped),
        Err(_) => out.push_str(s),
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// First 12 hex characters of a digest, for logs and descriptions.
pub fn short_id(fingerprint: &str) -> &str {
    &fingerprint[..fingerprint.len().min(12)]
}

/// Diagnostic similarity between two hex digests.
///
/// Hamming agreement over equal-length strings; 1.0 iff equal, 0.0 when the
/// lengths differ. Not used by the pipeline itself.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return if a == b { 1.0 } else { 0.0 };
    }
    let matching = a
        .bytes()
        .zip(b.bytes())
        .filter(|(x, y)| x == y)
        .count();
    matching as f64 / a.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use hooklens_protocol::NodeKind;
    use serde_json::json;

    fn leaf(path: &str, kind: NodeKind) -> TypeTree {
        TypeTree::new(path, kind)
    }

    #[test]
    fn structure_ignores_examples_and_paths() {
        let mut a = leaf("", NodeKind::String);
        a.examples = vec![json!("one")];
        let mut b = leaf("somewhere.else", NodeKind::String);
        b.examples = vec![json!("two"), json!("three")];
        b.redacted = true;
        assert_eq!(structure_fingerprint(&a), structure_fingerprint(&b));
    }

    #[test]
    fn structure_sees_optionality() {
        let required = leaf("", NodeKind::String);
        let mut optional = leaf("", NodeKind::String);
        optional.optional = true;
        assert_ne!(
            structure_fingerprint(&required),
            structure_fingerprint(&optional)
        );
    }

    #[test]
    fn structure_is_key_order_independent() {
        let mut a = leaf("", NodeKind::Object);
        a.children.insert("z".into(), leaf("z", NodeKind::Number));
        a.children.insert("a".into(), leaf("a", NodeKind::String));

        let mut b = leaf("", NodeKind::Object);
        b.children.insert("a".into(), leaf("a", NodeKind::String));
        b.children.insert("z".into(), leaf("z", NodeKind::Number));

        assert_eq!(structure_fingerprint(&a), structure_fingerprint(&b));
    }

    #[test]
    fn payload_sorts_keys() {
        let a = json!({"b": 1, "a": {"y": 2, "x": 3}});
        let b = json!({"a": {"x": 3, "y": 2}, "b": 1});
        assert_eq!(payload_fingerprint(&a), payload_fingerprint(&b));
    }

    #[test]
    fn payload_collapses_oversize_strings() {
        let blob_a = "A".repeat(20_000);
        let blob_b = "B".repeat(30_000);
        let a = json!({"event": "pic", "data": blob_a});
        let b = json!({"event": "pic", "data": blob_b});
        assert_eq!(payload_fingerprint(&a), payload_fingerprint(&b));

        let c = json!({"event": "pic", "data": "small"});
        assert_ne!(payload_fingerprint(&a), payload_fingerprint(&c));
    }

    #[test]
    fn payload_distinguishes_types() {
        assert_ne!(
            payload_fingerprint(&json!({"v": 1})),
            payload_fingerprint(&json!({"v": "1"}))
        );
    }

    #[test]
    fn short_id_is_a_prefix() {
        let fp = payload_fingerprint(&json!({"a": 1}));
        assert_eq!(fp.len(), 64);
        assert_eq!(short_id(&fp).len(), 12);
        assert!(fp.starts_with(short_id(&fp)));
    }

    #[test]
    fn similarity_is_one_iff_equal() {
        let a = payload_fingerprint(&json!(1));
        let b = payload_fingerprint(&json!(2));
        assert_eq!(similarity(&a, &a), 1.0);
        assert!(similarity(&a, &b) < 1.0);
        assert_eq!(similarity("abc", "abcd"), 0.0);
    }
}
