//! Tree merging — the schema-drift engine.
//!
//! `merge(prior, fresh)` folds new evidence into the persisted tree. The
//! operation is idempotent on identical inputs and associative/commutative
//! up to example ordering (structure fingerprints agree either way).

use crate::hash::payload_fingerprint;
use hooklens_protocol::{NodeKind, RedactionTag, TypeTree};
use serde_json::Value;
use std::collections::BTreeMap;

/// Merge two trees observed at the same position.
///
/// `max_examples` bounds every node's example list during the merge; the
/// persisted record applies its own, tighter cap.
pub fn merge(a: &TypeTree, b: &TypeTree, max_examples: usize) -> TypeTree {
    let mut out = if a.kind == b.kind {
        let mut node = TypeTree::new(a.path.clone(), a.kind);
        node.children = if a.kind == NodeKind::Union {
            // Union children are variants, not fields: absence of a variant
            // in one input is not optionality.
            merge_maps(&a.children, &b.children, max_examples, false)
        } else {
            merge_maps(&a.children, &b.children, max_examples, true)
        };
        node.item_type = merge_items(a, b, max_examples);
        node
    } else if a.kind == NodeKind::Union {
        absorb_into_union(a, b, max_examples)
    } else if b.kind == NodeKind::Union {
        absorb_into_union(b, a, max_examples)
    } else {
        // Two plain shapes disagree: the position becomes a union of both.
        let mut node = TypeTree::new(a.path.clone(), NodeKind::Union);
        node.children
            .insert(a.kind.as_str().to_string(), a.clone());
        node.children
            .insert(b.kind.as_str().to_string(), b.clone());
        node
    };

    out.optional = a.optional || b.optional;
    out.examples = merge_examples(&a.examples, &b.examples, max_examples);
    out.redacted = a.redacted || b.redacted;
    out.redacted_original_kind = merge_redaction_tag(a, b);
    out
}

/// Fold a non-union tree into an existing union's variant set.
fn absorb_into_union(union: &TypeTree, other: &TypeTree, max_examples: usize) -> TypeTree {
    let mut node = TypeTree::new(union.path.clone(), NodeKind::Union);
    node.children = union.children.clone();
    let key = other.kind.as_str().to_string();
    let variant = match node.children.get(&key) {
        Some(existing) => merge(existing, other, max_examples),
        None => other.clone(),
    };
    node.children.insert(key, variant);
    node.item_type = merge_items(union, other, max_examples);
    node
}

fn merge_items(a: &TypeTree, b: &TypeTree, max_examples: usize) -> Option<Box<TypeTree>> {
    match (a.item_type.as_deref(), b.item_type.as_deref()) {
        (Some(x), Some(y)) => Some(Box::new(merge(x, y, max_examples))),
        (Some(x), None) => Some(Box::new(x.clone())),
        (None, Some(y)) => Some(Box::new(y.clone())),
        (None, None) => None,
    }
}

fn merge_maps(
    a: &BTreeMap<String, TypeTree>,
    b: &BTreeMap<String, TypeTree>,
    max_examples: usize,
    mark_missing_optional: bool,
) -> BTreeMap<String, TypeTree> {
    let mut out = BTreeMap::new();
    for (key, child_a) in a {
        match b.get(key) {
            Some(child_b) => {
                out.insert(key.clone(), merge(child_a, child_b, max_examples));
            }
            None => {
                let mut carried = child_a.clone();
                if mark_missing_optional {
                    carried.optional = true;
                }
                out.insert(key.clone(), carried);
            }
        }
    }
    for (key, child_b) in b {
        if !a.contains_key(key) {
            let mut carried = child_b.clone();
            if mark_missing_optional {
                carried.optional = true;
            }
            out.insert(key.clone(), carried);
        }
    }
    out
}

/// Concatenate, dedupe by canonical serialization, keep the most recent.
fn merge_examples(a: &[Value], b: &[Value], cap: usize) -> Vec<Value> {
    let mut seen = std::collections::BTreeSet::new();
    let mut newest_first: Vec<Value> = Vec::new();
    for value in a.iter().chain(b.iter()).rev() {
        if seen.insert(payload_fingerprint(value)) {
            newest_first.push(value.clone());
        }
        if newest_first.len() == cap {
            break;
        }
    }
    newest_first.reverse();
    newest_first
}

fn merge_redaction_tag(a: &TypeTree, b: &TypeTree) -> Option<RedactionTag> {
    match (a.redacted_original_kind, b.redacted_original_kind) {
        // Older evidence wins unless the newer guess is base64, which is
        // strictly more informative.
        (Some(old), Some(new)) if old != new => {
            if new == RedactionTag::Base64 {
                Some(new)
            } else {
                Some(old)
            }
        }
        (Some(tag), _) => Some(tag),
        (None, tag) => tag,
    }
}
