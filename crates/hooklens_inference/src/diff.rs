//! Structural difference enumeration between two trees.
//!
//! Feeds operator-facing telemetry and tests; the merge itself never
//! consults it.

use hooklens_protocol::{NodeKind, TypeTree};
use std::fmt;

/// One structural difference between an old and a new tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Difference {
    TypeChange {
        path: String,
        old_kind: NodeKind,
        new_kind: NodeKind,
    },
    OptionalChange {
        path: String,
        was_optional: bool,
        is_optional: bool,
    },
    FieldAdded {
        path: String,
        field: String,
    },
    FieldRemoved {
        path: String,
        field: String,
    },
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difference::TypeChange {
                path,
                old_kind,
                new_kind,
            } => write!(f, "type change at '{path}': {old_kind} -> {new_kind}"),
            Difference::OptionalChange {
                path,
                was_optional,
                is_optional,
            } => write!(
                f,
                "optionality change at '{path}': {was_optional} -> {is_optional}"
            ),
            Difference::FieldAdded { path, field } => {
                write!(f, "field added at '{path}': {field}")
            }
            Difference::FieldRemoved { path, field } => {
                write!(f, "field removed at '{path}': {field}")
            }
        }
    }
}

/// Enumerate the differences between `old` and `new`.
pub fn diff(old: &TypeTree, new: &TypeTree) -> Vec<Difference> {
    let mut out = Vec::new();
    walk(old, new, &mut out);
    out
}

fn walk(old: &TypeTree, new: &TypeTree, out: &mut Vec<Difference>) {
    if old.kind != new.kind {
        out.push(Difference::TypeChange {
            path: node_path(old, new),
            old_kind: old.kind,
            new_kind: new.kind,
        });
    }
    if old.optional != new.optional {
        out.push(Difference::OptionalChange {
            path: node_path(old, new),
            was_optional: old.optional,
            is_optional: new.optional,
        });
    }

    for (key, old_child) in &old.children {
        match new.children.get(key) {
            Some(new_child) => walk(old_child, new_child, out),
            None => out.push(Difference::FieldRemoved {
                path: node_path(old, new),
                field: key.clone(),
            }),
        }
    }
    for key in new.children.keys() {
        if !old.children.contains_key(key) {
            out.push(Difference::FieldAdded {
                path: node_path(old, new),
                field: key.clone(),
            });
        }
    }

    match (old.item_type.as_deref(), new.item_type.as_deref()) {
        (Some(old_item), Some(new_item)) => walk(old_item, new_item, out),
        (Some(_), None) => out.push(Difference::FieldRemoved {
            path: node_path(old, new),
            field: "[]".to_string(),
        }),
        (None, Some(_)) => out.push(Difference::FieldAdded {
            path: node_path(old, new),
            field: "[]".to_string(),
        }),
        (None, None) => {}
    }
}

fn node_path(old: &TypeTree, new: &TypeTree) -> String {
    if old.path.is_empty() {
        new.path.clone()
    } else {
        old.path.clone()
    }
}

/// Diagnostic compatibility check.
///
/// True iff every required child of `sub` exists in `sup` with a compatible
/// kind, and `sup` never makes a position more optional than `sub` already
/// is. `union` is compatible with any kind.
pub fn is_subset(sub: &TypeTree, sup: &TypeTree) -> bool {
    if !kinds_compatible(sub.kind, sup.kind) {
        return false;
    }
    if sup.optional && !sub.optional {
        return false;
    }
    // A union's children are variants, not fields; compatibility is settled.
    if sub.kind == NodeKind::Union || sup.kind == NodeKind::Union {
        return true;
    }

    for (key, sub_child) in &sub.children {
        if sub_child.optional {
            continue;
        }
        match sup.children.get(key) {
            Some(sup_child) => {
                if !is_subset(sub_child, sup_child) {
                    return false;
                }
            }
            None => return false,
        }
    }

    match (sub.item_type.as_deref(), sup.item_type.as_deref()) {
        (Some(sub_item), Some(sup_item)) => is_subset(sub_item, sup_item),
        _ => true,
    }
}

fn kinds_compatible(a: NodeKind, b: NodeKind) -> bool {
    a == b || a == NodeKind::Union || b == NodeKind::Union
}
