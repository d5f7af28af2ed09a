//! JSON Schema emission.

use hooklens_protocol::{interface_ident, NodeKind, TypeTree};
use serde_json::{json, Map, Value};

/// Emit the validator document for a kind.
///
/// Returns the source and whether emission degraded to the compact form.
pub fn validator_source(kind: &str, tree: &TypeTree) -> (String, bool) {
    let mut document = Map::new();
    document.insert(
        "$schema".to_string(),
        json!("https://json-schema.org/draft/2020-12/schema"),
    );
    document.insert("$id".to_string(), json!(format!("hooklens:{kind}")));
    document.insert("title".to_string(), json!(interface_ident(kind)));
    if let Value::Object(body) = schema_node(tree) {
        document.extend(body);
    }

    let document = Value::Object(document);
    match serde_json::to_string_pretty(&document) {
        Ok(pretty) => (pretty, false),
        Err(_) => (document.to_string(), true),
    }
}

fn schema_node(tree: &TypeTree) -> Value {
    let mut schema = match tree.kind {
        NodeKind::String => json!({"type": "string"}),
        NodeKind::Number => json!({"type": "number"}),
        NodeKind::Boolean => json!({"type": "boolean"}),
        NodeKind::Null => json!({"type": "null"}),
        NodeKind::Object => object_schema(tree),
        NodeKind::Array => array_schema(tree),
        NodeKind::Union => union_schema(tree),
    };

    if tree.redacted {
        if let Value::Object(map) = &mut schema {
            let tag = tree
                .redacted_original_kind
                .map(|t| t.as_str())
                .unwrap_or("text");
            map.insert(
                "description".to_string(),
                json!(format!("redacted at ingest; original looked like {tag}")),
            );
        }
    }
    schema
}

fn object_schema(tree: &TypeTree) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for (name, child) in &tree.children {
        properties.insert(name.clone(), schema_node(child));
        if !child.optional {
            required.push(Value::String(name.clone()));
        }
    }

    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), Value::Array(required));
    }
    schema.insert("additionalProperties".to_string(), json!(true));
    Value::Object(schema)
}

fn array_schema(tree: &TypeTree) -> Value {
    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("array"));
    if let Some(item) = tree.item_type.as_deref() {
        schema.insert("items".to_string(), schema_node(item));
    }
    Value::Object(schema)
}

fn union_schema(tree: &TypeTree) -> Value {
    let mut variants: Vec<Value> = tree.children.values().map(schema_node).collect();
    // A union that arose from a heterogeneous array also admits the array
    // form itself.
    if let Some(item) = tree.item_type.as_deref() {
        variants.push(json!({"type": "array", "items": schema_node(item)}));
    }
    if variants.is_empty() {
        return json!({});
    }
    json!({ "anyOf": variants })
}
