//! Payload type trees, schema records, and the queue job envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Structural tag of a type-tree node.
///
/// `null` is a kind of its own, distinct from absence. `union` marks a
/// position where more than one shape has been observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    String,
    Number,
    Boolean,
    Null,
    Object,
    Array,
    Union,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::String => "string",
            NodeKind::Number => "number",
            NodeKind::Boolean => "boolean",
            NodeKind::Null => "null",
            NodeKind::Object => "object",
            NodeKind::Array => "array",
            NodeKind::Union => "union",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(NodeKind::String),
            "number" => Some(NodeKind::Number),
            "boolean" => Some(NodeKind::Boolean),
            "null" => Some(NodeKind::Null),
            "object" => Some(NodeKind::Object),
            "array" => Some(NodeKind::Array),
            "union" => Some(NodeKind::Union),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Heuristic guess at what a truncated string originally held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedactionTag {
    Base64,
    Json,
    Text,
}

impl RedactionTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedactionTag::Base64 => "base64",
            RedactionTag::Json => "json",
            RedactionTag::Text => "text",
        }
    }
}

impl fmt::Display for RedactionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One string value the truncator shortened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactedField {
    /// Dot-and-bracket path of the shortened value.
    pub path: String,
    pub original_length: usize,
    pub redacted_length: usize,
    pub tag: RedactionTag,
}

/// Everything the truncator changed about one payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedactionReport {
    pub fields: Vec<RedactedField>,
}

impl RedactionReport {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Look up the redaction entry for a tree position.
    ///
    /// Array indices are ignored on both sides: a node built from element
    /// `[0]` must match a redaction that happened at element `[3]` of the
    /// same array.
    pub fn lookup(&self, node_path: &str) -> Option<&RedactedField> {
        let wanted = strip_indices(node_path);
        self.fields
            .iter()
            .find(|f| strip_indices(&f.path) == wanted)
    }
}

/// Drop `[...]` segments from a dotted path, keeping field names.
pub fn strip_indices(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut in_bracket = false;
    for ch in path.chars() {
        match ch {
            '[' => in_bracket = true,
            ']' => in_bracket = false,
            _ if in_bracket => {}
            _ => out.push(ch),
        }
    }
    out
}

/// Recursive structural description of every payload seen at one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeTree {
    /// Dot-and-bracket location from the root (`""` at the root).
    pub path: String,
    pub kind: NodeKind,
    /// Whether the position has been absent from at least one payload.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    /// Object fields, or union variants keyed by their kind tag.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, TypeTree>,
    /// Merged element tree for arrays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<Box<TypeTree>>,
    /// Most-recent distinct representatives, bounded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub redacted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacted_original_kind: Option<RedactionTag>,
}

impl TypeTree {
    pub fn new(path: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            optional: false,
            children: BTreeMap::new(),
            item_type: None,
            examples: Vec::new(),
            redacted: false,
            redacted_original_kind: None,
        }
    }

    /// Cap `examples` on every node, keeping the most recent (tail) entries.
    pub fn truncate_examples(&mut self, cap: usize) {
        if self.examples.len() > cap {
            self.examples.drain(..self.examples.len() - cap);
        }
        for child in self.children.values_mut() {
            child.truncate_examples(cap);
        }
        if let Some(item) = self.item_type.as_mut() {
            item.truncate_examples(cap);
        }
    }

    /// Partition every reachable path into required / optional / redacted.
    ///
    /// Union variants share the union node's path and are not recorded
    /// themselves, but their descendants are. If a path is seen both ways,
    /// optional wins (optionality is monotone).
    pub fn field_census(&self) -> FieldCensus {
        let mut census = FieldCensus::default();
        census_walk(self, true, &mut census);
        let FieldCensus {
            required, optional, ..
        } = &mut census;
        required.retain(|p| !optional.contains(p));
        census
    }

    /// Total node count, diagnostics only.
    pub fn node_count(&self) -> usize {
        let mut n = 1;
        n += self
            .children
            .values()
            .map(TypeTree::node_count)
            .sum::<usize>();
        if let Some(item) = self.item_type.as_deref() {
            n += item.node_count();
        }
        n
    }
}

fn census_walk(node: &TypeTree, is_root: bool, census: &mut FieldCensus) {
    if !is_root && !node.path.is_empty() {
        if node.optional {
            census.optional.insert(node.path.clone());
        } else {
            census.required.insert(node.path.clone());
        }
        if node.redacted {
            census.redacted.insert(node.path.clone());
        }
    }

    let children_are_variants = node.kind == NodeKind::Union;
    for child in node.children.values() {
        // Variant nodes sit at the union's own path; only their subtrees count.
        if children_are_variants {
            for grandchild in child.children.values() {
                census_walk(grandchild, false, census);
            }
            if let Some(item) = child.item_type.as_deref() {
                census_walk(item, false, census);
            }
        } else {
            census_walk(child, false, census);
        }
    }
    if let Some(item) = node.item_type.as_deref() {
        census_walk(item, false, census);
    }
}

/// Disjoint dotted-path sets describing one kind's fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCensus {
    pub required: BTreeSet<String>,
    pub optional: BTreeSet<String>,
    pub redacted: BTreeSet<String>,
}

impl FieldCensus {
    pub fn required_count(&self) -> usize {
        self.required.len()
    }

    pub fn optional_count(&self) -> usize {
        self.optional.len()
    }

    pub fn redacted_count(&self) -> usize {
        self.redacted.len()
    }
}

/// A historically observed distinct structure for a kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variation {
    pub fingerprint: String,
    pub count: u64,
    pub description: String,
}

/// The persisted per-kind state, serialized as `metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaRecord {
    pub kind: String,
    pub version: u32,
    pub structure_fingerprint: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub total_received: u64,
    pub fields: FieldCensus,
    /// Bounded, count-descending history of distinct structures.
    pub variations: Vec<Variation>,
    /// The tree itself; sufficient to reconstruct without other artifacts.
    pub saved_tree: TypeTree,
}

impl SchemaRecord {
    /// Record that a payload with the given analyzed-tree fingerprint was
    /// seen, bumping or inserting its variation entry. Keeps at most `cap`
    /// variations, count-descending.
    pub fn observe_variation(&mut self, fingerprint: &str, description: &str, cap: usize) {
        match self
            .variations
            .iter_mut()
            .find(|v| v.fingerprint == fingerprint)
        {
            Some(v) => v.count += 1,
            None => self.variations.push(Variation {
                fingerprint: fingerprint.to_string(),
                count: 1,
                description: description.to_string(),
            }),
        }
        self.variations.sort_by(|a, b| b.count.cmp(&a.count));
        self.variations.truncate(cap);
    }
}

/// One successfully processed event, appended to the relational log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    pub kind: String,
    pub payload_fingerprint: String,
    pub size_original: usize,
    pub size_redacted: usize,
    pub redacted_field_count: usize,
    pub received_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub processing_duration_ms: i64,
}

/// The envelope carried through the durable queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookJob {
    /// Idempotency key; re-enqueueing a seen id is a no-op.
    pub job_id: String,
    /// Request headers as received, lower-cased keys.
    pub headers: BTreeMap<String, String>,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}
