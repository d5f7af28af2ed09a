//! The per-job inference pipeline.
//!
//! redact -> classify -> analyze -> load prior -> merge -> generate ->
//! persist -> record. The classifier sees the original payload; the analyzer
//! sees the redacted one. All per-kind mutation happens under the store's
//! kind lock, and the version only advances when the merged structure
//! fingerprint actually changes.

use chrono::Utc;
use hooklens_classifier::Classifier;
use hooklens_codegen::generate;
use hooklens_inference::{analyze, diff, merge, structure_fingerprint, Truncator};
use hooklens_db::{DbError, EventLog};
use hooklens_protocol::defaults::PERSISTED_EXAMPLE_CAP;
use hooklens_protocol::{
    EventRow, NodeKind, SchemaRecord, StoreConfig, TruncatorConfig, TypeTree, WebhookJob,
};
use hooklens_store::{ArtifactSet, SchemaStore, StoreError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Variations kept per schema record.
const VARIATION_CAP: usize = 10;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Ingress should have rejected this; retrying cannot help.
    #[error("payload root is not a JSON object")]
    MalformedPayload,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl PipelineError {
    /// Permanent failures go straight to the failed set, no backoff.
    pub fn is_permanent(&self) -> bool {
        matches!(self, PipelineError::MalformedPayload)
    }
}

/// What processing one job did to its kind's record.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub kind: String,
    pub version: u32,
    pub new_kind: bool,
    /// False when the merge was structurally identical and only counters
    /// moved (no artifact regeneration).
    pub structure_changed: bool,
    pub redacted_fields: usize,
    pub duration_ms: i64,
}

/// The pipeline with its collaborators, wired once at startup.
pub struct Pipeline {
    truncator: Truncator,
    classifier: Classifier,
    store: Arc<SchemaStore>,
    log: Arc<EventLog>,
    max_examples: usize,
    degraded_emissions: AtomicU64,
}

impl Pipeline {
    pub fn new(
        truncator_config: TruncatorConfig,
        store_config: StoreConfig,
        classifier: Classifier,
        store: Arc<SchemaStore>,
        log: Arc<EventLog>,
    ) -> Self {
        Self {
            truncator: Truncator::new(truncator_config),
            classifier,
            store,
            log,
            max_examples: store_config.max_examples_per_schema,
            degraded_emissions: AtomicU64::new(0),
        }
    }

    /// Generator fallback count, surfaced through stats.
    pub fn degraded_emissions(&self) -> u64 {
        self.degraded_emissions.load(Ordering::Relaxed)
    }

    /// Process one dequeued job end to end.
    pub async fn process(&self, job: &WebhookJob) -> Result<ProcessOutcome, PipelineError> {
        let started = Instant::now();

        if !job.payload.is_object() {
            return Err(PipelineError::MalformedPayload);
        }

        let (redacted, report) = self.truncator.truncate(&job.payload);
        let kind = self.classifier.classify(&job.payload, &job.headers);
        let fresh = analyze(&redacted, &report);
        let fresh_fingerprint = structure_fingerprint(&fresh);

        let size_original = job.payload.to_string().len();
        let size_redacted = redacted.to_string().len();

        let outcome = {
            let _guard = self.store.lock_kind(&kind).await;
            let prior = self.store.load(&kind)?;
            let now = Utc::now();

            let (record, structure_changed, new_kind) = match prior {
                Some(prior) => {
                    let (record, changed) =
                        self.merge_into(prior, &fresh, &fresh_fingerprint, now);
                    (record, changed, false)
                }
                None => (
                    self.first_record(&kind, &fresh, &fresh_fingerprint, now),
                    true,
                    true,
                ),
            };

            if structure_changed {
                let artifacts = generate(&kind, &record.saved_tree);
                if artifacts.degraded {
                    self.degraded_emissions.fetch_add(1, Ordering::Relaxed);
                    warn!(kind = %kind, "artifact emission degraded to fallback form");
                }
                self.store.save(
                    &kind,
                    &record,
                    &ArtifactSet {
                        validator_source: artifacts.validator_source,
                        interface_source: artifacts.interface_source,
                        examples_json: artifacts.examples_json,
                    },
                    Some(&job.payload),
                )?;
            } else {
                self.store.save_metadata_only(&kind, &record)?;
                self.store.record_raw_sample(&kind, &job.payload);
            }

            self.log.upsert_schema_row(&record).await?;

            ProcessOutcome {
                kind: kind.clone(),
                version: record.version,
                new_kind,
                structure_changed,
                redacted_fields: report.len(),
                duration_ms: started.elapsed().as_millis() as i64,
            }
        };

        let processed_at = Utc::now();
        self.log
            .record_event(&EventRow {
                kind: outcome.kind.clone(),
                payload_fingerprint: hooklens_inference::payload_fingerprint(&job.payload),
                size_original,
                size_redacted,
                redacted_field_count: outcome.redacted_fields,
                received_at: job.received_at,
                processed_at,
                processing_duration_ms: outcome.duration_ms,
            })
            .await?;

        if outcome.new_kind {
            info!(kind = %outcome.kind, "new event kind discovered");
        } else {
            debug!(
                kind = %outcome.kind,
                version = outcome.version,
                changed = outcome.structure_changed,
                "processed event"
            );
        }
        Ok(outcome)
    }

    /// Merge fresh evidence into the prior record.
    fn merge_into(
        &self,
        mut record: SchemaRecord,
        fresh: &TypeTree,
        fresh_fingerprint: &str,
        now: chrono::DateTime<Utc>,
    ) -> (SchemaRecord, bool) {
        let mut merged = merge(&record.saved_tree, fresh, self.max_examples);
        let merged_fingerprint = structure_fingerprint(&merged);

        record.total_received += 1;
        record.last_seen = now;
        record.observe_variation(fresh_fingerprint, &describe_tree(fresh), VARIATION_CAP);

        if merged_fingerprint == record.structure_fingerprint {
            return (record, false);
        }

        let drift = diff(&record.saved_tree, &merged);
        info!(
            kind = %record.kind,
            differences = drift.len(),
            fingerprint_similarity =
                hooklens_inference::similarity(&record.structure_fingerprint, &merged_fingerprint),
            "structure drifted"
        );
        for difference in drift {
            debug!(kind = %record.kind, %difference, "schema drift detail");
        }

        merged.truncate_examples(PERSISTED_EXAMPLE_CAP);
        record.version += 1;
        record.structure_fingerprint = merged_fingerprint;
        record.last_modified = now;
        record.fields = merged.field_census();
        record.saved_tree = merged;
        (record, true)
    }

    /// Build the version-1 record for a kind's first payload.
    fn first_record(
        &self,
        kind: &str,
        fresh: &TypeTree,
        fresh_fingerprint: &str,
        now: chrono::DateTime<Utc>,
    ) -> SchemaRecord {
        let mut tree = fresh.clone();
        tree.truncate_examples(PERSISTED_EXAMPLE_CAP);
        let mut record = SchemaRecord {
            kind: kind.to_string(),
            version: 1,
            structure_fingerprint: fresh_fingerprint.to_string(),
            first_seen: now,
            last_seen: now,
            last_modified: now,
            total_received: 1,
            fields: tree.field_census(),
            variations: Vec::new(),
            saved_tree: tree,
        };
        record.observe_variation(fresh_fingerprint, &describe_tree(fresh), VARIATION_CAP);
        record
    }
}

/// Short human-readable shape description for the variations list.
fn describe_tree(tree: &TypeTree) -> String {
    if tree.kind == NodeKind::Object {
        let mut keys: Vec<&str> = tree.children.keys().map(String::as_str).collect();
        keys.truncate(6);
        if keys.is_empty() {
            "empty object".to_string()
        } else {
            format!("keys: {}", keys.join(", "))
        }
    } else {
        format!("{} root", tree.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hooklens_classifier::ClassifierConfig;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn job(payload: serde_json::Value) -> WebhookJob {
        WebhookJob {
            job_id: uuid::Uuid::new_v4().to_string(),
            headers: BTreeMap::new(),
            payload,
            received_at: Utc::now(),
        }
    }

    async fn pipeline(dir: &tempfile::TempDir) -> Pipeline {
        let store = Arc::new(SchemaStore::open(dir.path().join("schemas"), 10).unwrap());
        let log = Arc::new(EventLog::in_memory().await.unwrap());
        Pipeline::new(
            TruncatorConfig::default(),
            StoreConfig::default(),
            Classifier::new(ClassifierConfig::default()),
            store,
            log,
        )
    }

    #[tokio::test]
    async fn first_payload_creates_version_one() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(&dir).await;
        let outcome = p.process(&job(json!({"eventType": "Ping", "ts": 1}))).await.unwrap();
        assert_eq!(outcome.kind, "Ping");
        assert_eq!(outcome.version, 1);
        assert!(outcome.new_kind);
        assert!(outcome.structure_changed);
    }

    #[tokio::test]
    async fn identical_repeat_only_bumps_counters() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(&dir).await;
        let payload = json!({"eventType": "Ping", "ts": 1});
        p.process(&job(payload.clone())).await.unwrap();
        let second = p.process(&job(payload.clone())).await.unwrap();
        let third = p.process(&job(payload)).await.unwrap();

        assert_eq!(second.version, 1);
        assert!(!second.structure_changed);
        assert_eq!(third.version, 1);
    }

    #[tokio::test]
    async fn dropped_field_bumps_version_and_goes_optional() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(&dir).await;
        p.process(&job(json!({"eventType": "Ping", "ts": 1}))).await.unwrap();
        let outcome = p.process(&job(json!({"eventType": "Ping"}))).await.unwrap();
        assert_eq!(outcome.version, 2);
        assert!(outcome.structure_changed);
    }

    #[tokio::test]
    async fn malformed_root_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(&dir).await;
        let err = p.process(&job(json!(["array", "root"]))).await.unwrap_err();
        assert!(err.is_permanent());
    }
}
