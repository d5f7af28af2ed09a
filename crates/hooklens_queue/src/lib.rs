//! Durable job queue.
//!
//! SQLite-backed so enqueued work survives a restart. FIFO within a priority
//! band, higher priority first; claims are atomic via
//! `UPDATE ... WHERE status = 'queued'` inside a transaction. Failed
//! attempts re-run after exponential backoff until the attempt budget is
//! spent, then the job moves to a `failed` holding set retained for
//! inspection.

pub mod priority;

use chrono::Utc;
use hooklens_protocol::{QueueConfig, WebhookJob};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use priority::compute_priority;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Corrupt job envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}

/// A job claimed by a worker.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    /// Queue-internal row id, used to conclude the job.
    pub id: i64,
    pub job: WebhookJob,
    pub priority: i64,
    /// Attempts already spent before this claim.
    pub attempts: u32,
}

/// Waiting/active/completed/failed/delayed counts for telemetry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub waiting: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
    pub delayed: i64,
}

impl QueueStats {
    /// Jobs still owed processing.
    pub fn depth(&self) -> i64 {
        self.waiting + self.delayed + self.active
    }
}

/// One entry of the failed holding set.
#[derive(Debug, Clone)]
pub struct FailedJob {
    pub job_id: String,
    pub attempts: u32,
    pub last_error: Option<String>,
}

pub struct JobQueue {
    pool: SqlitePool,
    config: QueueConfig,
}

impl JobQueue {
    /// Open (creating if missing) a queue at the given SQLite path.
    pub async fn open(db_path: &Path, config: QueueConfig) -> Result<Self, QueueError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;
        Self::from_pool(pool, config).await
    }

    /// Share an existing pool (queue and event log live in one file).
    pub async fn from_pool(pool: SqlitePool, config: QueueConfig) -> Result<Self, QueueError> {
        let queue = Self { pool, config };
        queue.init_tables().await?;
        Ok(queue)
    }

    /// In-memory queue for tests.
    pub async fn in_memory(config: QueueConfig) -> Result<Self, QueueError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool, config).await
    }

    async fn init_tables(&self) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queue_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT NOT NULL UNIQUE,
                payload TEXT NOT NULL,
                headers TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 5,
                status TEXT NOT NULL DEFAULT 'queued',
                attempts INTEGER NOT NULL DEFAULT 0,
                run_at INTEGER,
                worker_id TEXT,
                claimed_at INTEGER,
                enqueued_at INTEGER NOT NULL,
                received_at INTEGER NOT NULL,
                finished_at INTEGER,
                last_error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_queue_jobs_claim
            ON queue_jobs(status, priority DESC, id ASC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Enqueue a job. Returns false when the job id was already seen
    /// (idempotent no-op).
    pub async fn enqueue(&self, job: &WebhookJob, priority: i64) -> Result<bool, QueueError> {
        let payload = serde_json::to_string(&job.payload)?;
        let headers = serde_json::to_string(&job.headers)?;
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO queue_jobs
                (job_id, payload, headers, priority, status, enqueued_at, received_at)
            VALUES (?, ?, ?, ?, 'queued', ?, ?)
            "#,
        )
        .bind(&job.job_id)
        .bind(payload)
        .bind(headers)
        .bind(priority.clamp(1, 15))
        .bind(Utc::now().timestamp_millis())
        .bind(job.received_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            debug!(job_id = %job.job_id, priority, "enqueued job");
        } else {
            debug!(job_id = %job.job_id, "duplicate job id ignored");
        }
        Ok(inserted)
    }

    /// Atomically claim the next runnable job.
    ///
    /// Highest priority first, FIFO within a band; delayed jobs become
    /// runnable once their backoff expires.
    pub async fn dequeue(&self, worker_id: &str) -> Result<Option<ClaimedJob>, QueueError> {
        let now = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let job_id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM queue_jobs
            WHERE status = 'queued'
               OR (status = 'delayed' AND run_at <= ?)
            ORDER BY priority DESC, id ASC
            LIMIT 1
            "#,
        )
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = job_id else {
            tx.commit().await?;
            return Ok(None);
        };

        let claimed = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET status = 'active', worker_id = ?, claimed_at = ?
            WHERE id = ? AND status IN ('queued', 'delayed')
            "#,
        )
        .bind(worker_id)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            // Raced with another worker; the caller just polls again.
            tx.commit().await?;
            return Ok(None);
        }

        let row = sqlx::query(
            "SELECT job_id, payload, headers, priority, attempts, received_at FROM queue_jobs WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        let payload_text: String = row.get("payload");
        let headers_text: String = row.get("headers");
        let attempts: i64 = row.get("attempts");
        let received_ms: i64 = row.get("received_at");

        let job = WebhookJob {
            job_id: row.get("job_id"),
            headers: serde_json::from_str(&headers_text)?,
            payload: serde_json::from_str(&payload_text)?,
            received_at: chrono::TimeZone::timestamp_millis_opt(&Utc, received_ms)
                .single()
                .unwrap_or_else(Utc::now),
        };

        debug!(job_id = %job.job_id, worker_id, "claimed job");
        Ok(Some(ClaimedJob {
            id,
            job,
            priority: row.get("priority"),
            attempts: attempts as u32,
        }))
    }

    /// Conclude a claimed job successfully.
    pub async fn complete(&self, id: i64) -> Result<(), QueueError> {
        sqlx::query(
            "UPDATE queue_jobs SET status = 'completed', finished_at = ? WHERE id = ?",
        )
        .bind(Utc::now().timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Conclude a claimed job with a transient failure.
    ///
    /// Re-runs after exponential backoff until attempts are exhausted, then
    /// parks the job in the failed set.
    pub async fn fail(&self, id: i64, error: &str) -> Result<(), QueueError> {
        self.conclude_failure(id, error, false).await
    }

    /// Park a job in the failed set immediately (malformed payloads and
    /// other permanent conditions; retrying cannot help).
    pub async fn fail_permanent(&self, id: i64, error: &str) -> Result<(), QueueError> {
        self.conclude_failure(id, error, true).await
    }

    async fn conclude_failure(
        &self,
        id: i64,
        error: &str,
        permanent: bool,
    ) -> Result<(), QueueError> {
        let now = Utc::now().timestamp_millis();
        let attempts: i64 =
            sqlx::query_scalar("SELECT attempts FROM queue_jobs WHERE id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        let attempts = attempts as u32 + 1;

        if permanent || attempts >= self.config.max_attempts {
            sqlx::query(
                r#"
                UPDATE queue_jobs
                SET status = 'failed', attempts = ?, last_error = ?, finished_at = ?
                WHERE id = ?
                "#,
            )
            .bind(attempts as i64)
            .bind(error)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            warn!(id, attempts, error, "job moved to failed set");
        } else {
            let backoff_ms =
                self.config.backoff_delay_ms.saturating_mul(1 << (attempts - 1));
            sqlx::query(
                r#"
                UPDATE queue_jobs
                SET status = 'delayed', attempts = ?, last_error = ?,
                    run_at = ?, worker_id = NULL, claimed_at = NULL
                WHERE id = ?
                "#,
            )
            .bind(attempts as i64)
            .bind(error)
            .bind(now + backoff_ms as i64)
            .bind(id)
            .execute(&self.pool)
            .await?;
            info!(id, attempts, backoff_ms, "job delayed for retry");
        }
        Ok(())
    }

    /// Return jobs left `active` by a crashed process to the runnable set.
    /// Call once at startup, before workers spin up.
    pub async fn recover_orphans(&self) -> Result<u64, QueueError> {
        let recovered = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET status = 'queued', worker_id = NULL, claimed_at = NULL
            WHERE status = 'active'
            "#,
        )
        .execute(&self.pool)
        .await?
        .rows_affected();
        if recovered > 0 {
            info!(recovered, "requeued orphaned jobs from previous run");
        }
        Ok(recovered)
    }

    /// Delete completed rows older than the retention window. Failed rows
    /// are kept; they are the inspection set.
    pub async fn purge_completed(&self, older_than_ms: i64) -> Result<u64, QueueError> {
        let cutoff = Utc::now().timestamp_millis() - older_than_ms;
        let purged = sqlx::query(
            "DELETE FROM queue_jobs WHERE status = 'completed' AND finished_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if purged > 0 {
            debug!(purged, "purged completed jobs");
        }
        Ok(purged)
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM queue_jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.get("status");
            let count: i64 = row.get("count");
            match status.as_str() {
                "queued" => stats.waiting = count,
                "active" => stats.active = count,
                "completed" => stats.completed = count,
                "failed" => stats.failed = count,
                "delayed" => stats.delayed = count,
                other => warn!(status = other, "unexpected queue status"),
            }
        }
        Ok(stats)
    }

    /// The failed holding set, most recent first.
    pub async fn failed_jobs(&self, limit: i64) -> Result<Vec<FailedJob>, QueueError> {
        let rows = sqlx::query(
            r#"
            SELECT job_id, attempts, last_error FROM queue_jobs
            WHERE status = 'failed'
            ORDER BY finished_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let attempts: i64 = row.get("attempts");
                FailedJob {
                    job_id: row.get("job_id"),
                    attempts: attempts as u32,
                    last_error: row.get("last_error"),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn job(id: &str, payload: serde_json::Value) -> WebhookJob {
        WebhookJob {
            job_id: id.to_string(),
            headers: BTreeMap::new(),
            payload,
            received_at: Utc::now(),
        }
    }

    async fn queue() -> JobQueue {
        JobQueue::in_memory(QueueConfig {
            concurrency: 1,
            max_attempts: 3,
            backoff_delay_ms: 50,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn fifo_within_band_priority_across() {
        let q = queue().await;
        q.enqueue(&job("low-1", json!({"n": 1})), 3).await.unwrap();
        q.enqueue(&job("low-2", json!({"n": 2})), 3).await.unwrap();
        q.enqueue(&job("high", json!({"n": 3})), 10).await.unwrap();

        let first = q.dequeue("w1").await.unwrap().unwrap();
        assert_eq!(first.job.job_id, "high");
        let second = q.dequeue("w1").await.unwrap().unwrap();
        assert_eq!(second.job.job_id, "low-1");
        let third = q.dequeue("w1").await.unwrap().unwrap();
        assert_eq!(third.job.job_id, "low-2");
        assert!(q.dequeue("w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_on_job_id() {
        let q = queue().await;
        assert!(q.enqueue(&job("same", json!({})), 5).await.unwrap());
        assert!(!q.enqueue(&job("same", json!({})), 5).await.unwrap());

        let stats = q.stats().await.unwrap();
        assert_eq!(stats.waiting, 1);
    }

    #[tokio::test]
    async fn envelope_round_trips() {
        let q = queue().await;
        let mut original = job("env", json!({"eventType": "Ping", "n": [1, 2]}));
        original
            .headers
            .insert("user-agent".to_string(), "test/1.0".to_string());
        q.enqueue(&original, 5).await.unwrap();

        let claimed = q.dequeue("w1").await.unwrap().unwrap();
        assert_eq!(claimed.job.payload, original.payload);
        assert_eq!(claimed.job.headers, original.headers);
        assert_eq!(claimed.priority, 5);
        assert_eq!(claimed.attempts, 0);
    }

    #[tokio::test]
    async fn transient_failure_delays_then_parks() {
        let q = queue().await;
        q.enqueue(&job("flaky", json!({})), 5).await.unwrap();

        // Attempt 1 fails: delayed, not yet runnable... except the backoff
        // is 50ms, so wait it out for each round.
        for attempt in 1..=2 {
            let claimed = q.dequeue("w1").await.unwrap().unwrap();
            q.fail(claimed.id, "boom").await.unwrap();
            let stats = q.stats().await.unwrap();
            assert_eq!(stats.delayed, 1, "attempt {attempt} should delay");
            tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        }

        // Third failure exhausts the budget.
        let claimed = q.dequeue("w1").await.unwrap().unwrap();
        assert_eq!(claimed.attempts, 2);
        q.fail(claimed.id, "boom again").await.unwrap();

        let stats = q.stats().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.delayed, 0);

        let failed = q.failed_jobs(10).await.unwrap();
        assert_eq!(failed[0].job_id, "flaky");
        assert_eq!(failed[0].attempts, 3);
        assert_eq!(failed[0].last_error.as_deref(), Some("boom again"));
    }

    #[tokio::test]
    async fn permanent_failure_skips_retries() {
        let q = queue().await;
        q.enqueue(&job("bad", json!("not an object")), 5).await.unwrap();
        let claimed = q.dequeue("w1").await.unwrap().unwrap();
        q.fail_permanent(claimed.id, "payload root is not an object")
            .await
            .unwrap();

        let stats = q.stats().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.delayed, 0);
    }

    #[tokio::test]
    async fn completion_is_terminal() {
        let q = queue().await;
        q.enqueue(&job("done", json!({})), 5).await.unwrap();
        let claimed = q.dequeue("w1").await.unwrap().unwrap();
        q.complete(claimed.id).await.unwrap();

        let stats = q.stats().await.unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.depth(), 0);
        assert!(q.dequeue("w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_drops_old_completed_but_keeps_failed() {
        let q = queue().await;
        q.enqueue(&job("done", json!({})), 5).await.unwrap();
        q.enqueue(&job("broken", json!({})), 5).await.unwrap();

        let done = q.dequeue("w1").await.unwrap().unwrap();
        q.complete(done.id).await.unwrap();
        let broken = q.dequeue("w1").await.unwrap().unwrap();
        q.fail_permanent(broken.id, "bad").await.unwrap();

        // Everything just finished, so a 1h window purges nothing.
        assert_eq!(q.purge_completed(3_600_000).await.unwrap(), 0);
        // A negative window treats everything as expired.
        assert_eq!(q.purge_completed(-1_000).await.unwrap(), 1);

        let stats = q.stats().await.unwrap();
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn orphan_recovery_requeues_active_jobs() {
        let q = queue().await;
        q.enqueue(&job("orphan", json!({})), 5).await.unwrap();
        let _claimed = q.dequeue("w1").await.unwrap().unwrap();
        assert_eq!(q.stats().await.unwrap().active, 1);

        let recovered = q.recover_orphans().await.unwrap();
        assert_eq!(recovered, 1);
        assert_eq!(q.stats().await.unwrap().waiting, 1);
        assert!(q.dequeue("w2").await.unwrap().is_some());
    }
}
