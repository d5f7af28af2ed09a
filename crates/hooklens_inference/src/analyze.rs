//! Type-tree construction from a redacted payload.

use crate::detect::detect;
use hooklens_protocol::defaults::UNION_SAMPLE_CAP;
use hooklens_protocol::{NodeKind, RedactionReport, TypeTree};
use serde_json::Value;
use std::collections::BTreeSet;

/// Build a type tree from a redacted payload and its redaction report.
///
/// One node per encountered position, depth-first, with every node carrying
/// the value observed there as its first example. Optionality starts false
/// everywhere; it is only ever discovered by merging.
pub fn analyze(payload: &Value, report: &RedactionReport) -> TypeTree {
    build(payload, "", report)
}

fn build(value: &Value, path: &str, report: &RedactionReport) -> TypeTree {
    let mut node = TypeTree::new(path, detect(value));
    node.examples.push(value.clone());

    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                node.children
                    .insert(key.clone(), build(child, &child_path, report));
            }
        }
        Value::Array(items) if !items.is_empty() => {
            let kinds: BTreeSet<NodeKind> = items.iter().map(detect).collect();
            if kinds.len() == 1 {
                let item_path = format!("{path}[0]");
                node.item_type = Some(Box::new(build(&items[0], &item_path, report)));
            } else {
                // Heterogeneous: the position becomes a union and the item
                // node is a synthetic union over the element shapes.
                node.kind = NodeKind::Union;
                let item_path = format!("{path}[*]");
                let mut item = TypeTree::new(item_path.clone(), NodeKind::Union);
                for kind in kinds {
                    let representative = items
                        .iter()
                        .find(|el| detect(el) == kind)
                        .expect("kind came from items");
                    item.children
                        .insert(kind.as_str().to_string(), build(representative, &item_path, report));
                }
                item.examples = items.iter().take(UNION_SAMPLE_CAP).cloned().collect();
                node.item_type = Some(Box::new(item));
            }
        }
        _ => {}
    }

    if let Some(entry) = report.lookup(path) {
        node.redacted = true;
        node.redacted_original_kind = Some(entry.tag);
    }

    node
}
