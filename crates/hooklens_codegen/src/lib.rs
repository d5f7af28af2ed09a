//! Artifact generation from inferred type trees.
//!
//! Pure string emission: a JSON Schema validator document, a TypeScript
//! interface declaration, and the bounded examples file. Emission never
//! aborts the pipeline; when a pretty form cannot be produced the generator
//! degrades to a minimal valid form and flags it so the worker can bump a
//! warning counter.

pub mod interface;
pub mod validator;

use hooklens_protocol::TypeTree;

/// Everything the generator hands the store for one kind.
#[derive(Debug, Clone)]
pub struct GeneratedArtifacts {
    pub validator_source: String,
    pub interface_source: String,
    pub examples_json: String,
    /// At least one artifact fell back to a degraded form.
    pub degraded: bool,
}

/// Generate all string artifacts for a kind.
pub fn generate(kind: &str, tree: &TypeTree) -> GeneratedArtifacts {
    let (validator_source, validator_degraded) = validator::validator_source(kind, tree);
    let (interface_source, interface_degraded) = interface::interface_source(kind, tree);
    let (examples_json, examples_degraded) = examples_json(tree);
    GeneratedArtifacts {
        validator_source,
        interface_source,
        examples_json,
        degraded: validator_degraded || interface_degraded || examples_degraded,
    }
}

/// The root node's bounded examples as a pretty JSON array.
pub fn examples_json(tree: &TypeTree) -> (String, bool) {
    match serde_json::to_string_pretty(&tree.examples) {
        Ok(pretty) => (pretty, false),
        Err(_) => match serde_json::to_string(&tree.examples) {
            Ok(plain) => (plain, true),
            Err(_) => ("[]".to_string(), true),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hooklens_inference::analyze;
    use hooklens_protocol::RedactionReport;
    use serde_json::json;

    #[test]
    fn generate_produces_all_artifacts() {
        let tree = analyze(
            &json!({"eventType": "Ping", "ts": 1}),
            &RedactionReport::default(),
        );
        let artifacts = generate("Ping", &tree);
        assert!(!artifacts.degraded);
        assert!(artifacts.validator_source.contains("\"type\": \"object\""));
        assert!(artifacts.interface_source.contains("export interface Ping"));

        let examples: Vec<serde_json::Value> =
            serde_json::from_str(&artifacts.examples_json).unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0], json!({"eventType": "Ping", "ts": 1}));
    }
}
