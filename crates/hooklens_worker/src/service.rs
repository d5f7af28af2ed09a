//! Ingress entry point and the read-side facade.
//!
//! `submit_payload` is everything the HTTP ingress needs: it stamps a job
//! id, computes the enqueue priority, and acknowledges as soon as the queue
//! does. `ReadApi` is what the dashboard and query surfaces consume.

use anyhow::Result;
use chrono::Utc;
use hooklens_db::{EventLog, StoredEvent, TimelineBucket};
use hooklens_protocol::{SchemaRecord, WebhookJob};
use hooklens_queue::{compute_priority, FailedJob, JobQueue, QueueStats};
use hooklens_store::SchemaStore;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Enqueue a decoded payload for asynchronous processing.
///
/// Returns the job id and whether the queue actually accepted it (false
/// means the id was already seen; the ingress still acknowledges).
pub async fn submit_payload(
    queue: &JobQueue,
    headers: BTreeMap<String, String>,
    payload: Value,
) -> Result<(String, bool)> {
    let job = WebhookJob {
        job_id: uuid::Uuid::new_v4().to_string(),
        headers,
        payload,
        received_at: Utc::now(),
    };
    let priority = compute_priority(&job.payload);
    let accepted = queue.enqueue(&job, priority).await?;
    Ok((job.job_id, accepted))
}

/// Dashboard aggregates across the store, the log, and the queue.
#[derive(Debug, Clone, Default)]
pub struct Aggregates {
    pub total_events: i64,
    pub unique_kinds: i64,
    pub events_last_1h: i64,
    pub events_last_24h: i64,
    pub avg_processing_duration_ms: f64,
    pub queue_depth: i64,
    pub disk_bytes_by_section: BTreeMap<String, u64>,
}

/// Read-only view over persisted state; safe to use concurrently with
/// running workers.
pub struct ReadApi {
    store: Arc<SchemaStore>,
    log: Arc<EventLog>,
    queue: Arc<JobQueue>,
}

impl ReadApi {
    pub fn new(store: Arc<SchemaStore>, log: Arc<EventLog>, queue: Arc<JobQueue>) -> Self {
        Self { store, log, queue }
    }

    pub fn get_schema_record(&self, kind: &str) -> Result<Option<SchemaRecord>> {
        Ok(self.store.load(kind)?)
    }

    pub fn list_kinds(&self) -> Result<Vec<String>> {
        Ok(self.store.list_kinds()?)
    }

    pub async fn get_aggregates(&self) -> Result<Aggregates> {
        let log = self.log.aggregates().await?;
        let queue = self.queue.stats().await?;
        let disk = self.store.counters()?;

        let mut disk_bytes_by_section = BTreeMap::new();
        disk_bytes_by_section.insert("schemas".to_string(), disk.artifact_bytes);
        disk_bytes_by_section.insert("raw_samples".to_string(), disk.raw_sample_bytes);

        Ok(Aggregates {
            total_events: log.total_events,
            unique_kinds: log.unique_kinds,
            events_last_1h: log.events_last_1h,
            events_last_24h: log.events_last_24h,
            avg_processing_duration_ms: log.avg_processing_duration_ms,
            queue_depth: queue.depth(),
            disk_bytes_by_section,
        })
    }

    pub async fn get_recent_events(
        &self,
        limit: i64,
        kind_filter: Option<&str>,
    ) -> Result<Vec<StoredEvent>> {
        Ok(self.log.recent_events(limit, kind_filter).await?)
    }

    pub async fn get_hourly_timeline(
        &self,
        hours: i64,
        kind_filter: Option<&str>,
    ) -> Result<Vec<TimelineBucket>> {
        Ok(self.log.hourly_timeline(hours, kind_filter).await?)
    }

    pub async fn kind_counts(&self, limit: i64) -> Result<Vec<(String, i64)>> {
        Ok(self.log.kind_counts(limit).await?)
    }

    /// One of a kind's emitted artifacts, verbatim.
    pub fn read_artifact(&self, kind: &str, file: &str) -> Result<Option<String>> {
        Ok(self.store.read_artifact(kind, file)?)
    }

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        Ok(self.queue.stats().await?)
    }

    pub async fn failed_jobs(&self, limit: i64) -> Result<Vec<FailedJob>> {
        Ok(self.queue.failed_jobs(limit).await?)
    }
}
