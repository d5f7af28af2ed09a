//! TypeScript interface emission.
//!
//! The identifier is derived from the event kind; the body mirrors the tree
//! with optional markers and inline object literals. If the body cannot be
//! rendered, a degenerate any-shaped alias is emitted instead so persistence
//! still succeeds.

use hooklens_protocol::{interface_ident, NodeKind, TypeTree};
use std::fmt::Write;

/// Emit the interface declaration for a kind.
///
/// Returns the source and whether the degenerate fallback was used.
pub fn interface_source(kind: &str, tree: &TypeTree) -> (String, bool) {
    let ident = interface_ident(kind);
    match render(&ident, tree) {
        Ok(source) => (source, false),
        Err(_) => (format!("export type {ident} = unknown;\n"), true),
    }
}

fn render(ident: &str, tree: &TypeTree) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    if tree.kind == NodeKind::Object {
        writeln!(out, "export interface {ident} {{")?;
        write_members(&mut out, tree, 1)?;
        writeln!(out, "}}")?;
    } else {
        writeln!(out, "export type {ident} = {};", type_expr(tree, 0))?;
    }
    Ok(out)
}

fn write_members(out: &mut String, tree: &TypeTree, depth: usize) -> std::fmt::Result {
    let pad = "  ".repeat(depth);
    for (name, child) in &tree.children {
        let marker = if child.optional { "?" } else { "" };
        let annotation = redaction_note(child);
        writeln!(
            out,
            "{pad}{}{marker}: {};{annotation}",
            member_name(name),
            type_expr(child, depth)
        )?;
    }
    Ok(())
}

fn type_expr(tree: &TypeTree, depth: usize) -> String {
    match tree.kind {
        NodeKind::String => "string".to_string(),
        NodeKind::Number => "number".to_string(),
        NodeKind::Boolean => "boolean".to_string(),
        NodeKind::Null => "null".to_string(),
        NodeKind::Object => object_literal(tree, depth),
        NodeKind::Array => match tree.item_type.as_deref() {
            Some(item) => array_expr(item, depth),
            None => "unknown[]".to_string(),
        },
        NodeKind::Union => union_expr(tree, depth),
    }
}

fn object_literal(tree: &TypeTree, depth: usize) -> String {
    if tree.children.is_empty() {
        return "Record<string, unknown>".to_string();
    }
    let mut out = String::from("{\n");
    let _ = write_members(&mut out, tree, depth + 1);
    out.push_str(&"  ".repeat(depth));
    out.push('}');
    out
}

fn array_expr(item: &TypeTree, depth: usize) -> String {
    let inner = type_expr(item, depth);
    // Compound item types read better in the generic form.
    if matches!(item.kind, NodeKind::Object | NodeKind::Union) {
        format!("Array<{inner}>")
    } else {
        format!("{inner}[]")
    }
}

fn union_expr(tree: &TypeTree, depth: usize) -> String {
    let mut variants: Vec<String> = tree
        .children
        .values()
        .map(|variant| type_expr(variant, depth))
        .collect();
    if let Some(item) = tree.item_type.as_deref() {
        variants.push(array_expr(item, depth));
    }
    if variants.is_empty() {
        return "unknown".to_string();
    }
    variants.join(" | ")
}

fn member_name(name: &str) -> String {
    let plain_identifier = !name.is_empty()
        && !name.chars().next().is_some_and(|c| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if plain_identifier {
        name.to_string()
    } else {
        format!("{:?}", name)
    }
}

fn redaction_note(tree: &TypeTree) -> String {
    if !tree.redacted {
        return String::new();
    }
    let tag = tree
        .redacted_original_kind
        .map(|t| t.as_str())
        .unwrap_or("text");
    format!(" // redacted: {tag}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hooklens_inference::{analyze, merge, Truncator};
    use hooklens_protocol::{RedactionReport, TruncatorConfig};
    use serde_json::{json, Value};

    fn tree_of(payload: Value) -> TypeTree {
        analyze(&payload, &RedactionReport::default())
    }

    #[test]
    fn hierarchical_kind_derives_concatenated_ident() {
        let tree = tree_of(json!({"entry": [{"id": "1"}]}));
        let (source, degraded) =
            interface_source("whatsapp_business_account/messages_image", &tree);
        assert!(!degraded);
        assert!(source.contains("export interface WhatsappBusinessAccountMessagesImage {"));
    }

    #[test]
    fn members_mirror_the_tree() {
        let source = interface_source(
            "Ping",
            &tree_of(json!({"eventType": "Ping", "ts": 1, "flags": [true]})),
        )
        .0;
        assert!(source.contains("eventType: string;"));
        assert!(source.contains("ts: number;"));
        assert!(source.contains("flags: boolean[];"));
    }

    #[test]
    fn optional_members_get_question_marks() {
        let a = tree_of(json!({"eventType": "Ping", "ts": 1}));
        let b = tree_of(json!({"eventType": "Ping"}));
        let source = interface_source("Ping", &merge(&a, &b, 20)).0;
        assert!(source.contains("ts?: number;"));
        assert!(source.contains("eventType: string;"));
    }

    #[test]
    fn union_members_join_variants() {
        let a = tree_of(json!({"v": 1}));
        let b = tree_of(json!({"v": "one"}));
        let source = interface_source("X", &merge(&a, &b, 20)).0;
        assert!(source.contains("v: number | string;"));
    }

    #[test]
    fn redacted_members_carry_a_note() {
        let payload = json!({"image": "A".repeat(5_000)});
        let (redacted, report) = Truncator::new(TruncatorConfig::default()).truncate(&payload);
        let source = interface_source("Picture", &analyze(&redacted, &report)).0;
        assert!(source.contains("image: string; // redacted: base64"));
    }

    #[test]
    fn weird_member_names_are_quoted() {
        let source = interface_source("X", &tree_of(json!({"content-type": "a", "0day": 1}))).0;
        assert!(source.contains("\"content-type\": string;"));
        assert!(source.contains("\"0day\": number;"));
    }

    #[test]
    fn non_object_root_is_a_type_alias() {
        let source = interface_source("Numbers", &tree_of(json!([1, 2, 3]))).0;
        assert!(source.contains("export type Numbers = number[];"));
    }

    #[test]
    fn empty_object_root_renders_empty_interface() {
        let source = interface_source("Empty", &tree_of(json!({}))).0;
        assert!(source.contains("export interface Empty {"));
    }
}
