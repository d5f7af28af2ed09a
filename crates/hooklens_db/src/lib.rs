//! Relational side of the pipeline: the append-only event log and the
//! per-kind counter cache.
//!
//! The filesystem store is the source of truth for schema state; the
//! `schemas` table here is a denormalized cache that keeps the read-side SQL
//! cheap. Events are append-only, one row per successfully processed job.

use chrono::{DateTime, TimeZone, Utc};
use hooklens_protocol::{EventRow, SchemaRecord};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// One row of the `events` table as the read-side returns it.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub id: i64,
    pub kind: String,
    pub payload_fingerprint: String,
    pub size_original: i64,
    pub size_redacted: i64,
    pub redacted_field_count: i64,
    pub received_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub processing_duration_ms: i64,
}

/// One hour bucket of the processing timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineBucket {
    /// Hour in `YYYY-MM-DDTHH:00:00Z` form.
    pub hour: String,
    pub count: i64,
}

/// Aggregates computable from the relational side alone.
#[derive(Debug, Clone, Default)]
pub struct LogAggregates {
    pub total_events: i64,
    pub unique_kinds: i64,
    pub events_last_1h: i64,
    pub events_last_24h: i64,
    pub avg_processing_duration_ms: f64,
}

/// The event log database handle.
pub struct EventLog {
    pool: SqlitePool,
}

impl EventLog {
    /// Open (creating if missing) the log at the given path.
    pub async fn open(db_path: &Path) -> Result<Self, DbError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;
        let log = Self { pool };
        log.init_tables().await?;
        Ok(log)
    }

    /// In-memory log for tests.
    pub async fn in_memory() -> Result<Self, DbError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let log = Self { pool };
        log.init_tables().await?;
        Ok(log)
    }

    /// Reuse an existing pool (the queue shares the same file).
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn init_tables(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                payload_fp TEXT NOT NULL,
                size_original INTEGER NOT NULL,
                size_redacted INTEGER NOT NULL,
                redacted_flag INTEGER NOT NULL DEFAULT 0,
                redacted_field_count INTEGER NOT NULL DEFAULT 0,
                received_at INTEGER NOT NULL,
                processed_at INTEGER NOT NULL,
                processing_duration_ms INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_events_received
            ON events(received_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_events_kind
            ON events(kind, received_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schemas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL UNIQUE,
                version INTEGER NOT NULL,
                structure_fp TEXT NOT NULL,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                last_modified TEXT NOT NULL,
                total_received INTEGER NOT NULL,
                required_count INTEGER NOT NULL,
                optional_count INTEGER NOT NULL,
                redacted_count INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Append one processed-event row.
    pub async fn record_event(&self, row: &EventRow) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO events
                (kind, payload_fp, size_original, size_redacted, redacted_flag,
                 redacted_field_count, received_at, processed_at, processing_duration_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.kind)
        .bind(&row.payload_fingerprint)
        .bind(row.size_original as i64)
        .bind(row.size_redacted as i64)
        .bind(row.redacted_field_count > 0)
        .bind(row.redacted_field_count as i64)
        .bind(row.received_at.timestamp_millis())
        .bind(row.processed_at.timestamp_millis())
        .bind(row.processing_duration_ms)
        .execute(&self.pool)
        .await?;
        debug!(kind = %row.kind, "recorded event row");
        Ok(())
    }

    /// Refresh the denormalized per-kind counter row.
    pub async fn upsert_schema_row(&self, record: &SchemaRecord) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO schemas
                (kind, version, structure_fp, first_seen, last_seen, last_modified,
                 total_received, required_count, optional_count, redacted_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(kind) DO UPDATE SET
                version = excluded.version,
                structure_fp = excluded.structure_fp,
                last_seen = excluded.last_seen,
                last_modified = excluded.last_modified,
                total_received = excluded.total_received,
                required_count = excluded.required_count,
                optional_count = excluded.optional_count,
                redacted_count = excluded.redacted_count
            "#,
        )
        .bind(&record.kind)
        .bind(record.version as i64)
        .bind(&record.structure_fingerprint)
        .bind(record.first_seen.to_rfc3339())
        .bind(record.last_seen.to_rfc3339())
        .bind(record.last_modified.to_rfc3339())
        .bind(record.total_received as i64)
        .bind(record.fields.required_count() as i64)
        .bind(record.fields.optional_count() as i64)
        .bind(record.fields.redacted_count() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn aggregates(&self) -> Result<LogAggregates, DbError> {
        let now = Utc::now().timestamp_millis();
        let hour_ago = now - 3_600_000;
        let day_ago = now - 86_400_000;

        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(received_at >= ?), 0) AS last_1h,
                COALESCE(SUM(received_at >= ?), 0) AS last_24h,
                COALESCE(AVG(processing_duration_ms), 0.0) AS avg_ms
            FROM events
            "#,
        )
        .bind(hour_ago)
        .bind(day_ago)
        .fetch_one(&self.pool)
        .await?;

        let unique_kinds: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schemas")
            .fetch_one(&self.pool)
            .await?;

        Ok(LogAggregates {
            total_events: row.get("total"),
            unique_kinds,
            events_last_1h: row.get("last_1h"),
            events_last_24h: row.get("last_24h"),
            avg_processing_duration_ms: row.get("avg_ms"),
        })
    }

    /// Most recent events, optionally filtered by kind.
    pub async fn recent_events(
        &self,
        limit: i64,
        kind: Option<&str>,
    ) -> Result<Vec<StoredEvent>, DbError> {
        let rows = match kind {
            Some(kind) => {
                sqlx::query(
                    r#"
                    SELECT id, kind, payload_fp, size_original, size_redacted,
                           redacted_field_count, received_at, processed_at, processing_duration_ms
                    FROM events
                    WHERE kind = ?
                    ORDER BY id DESC
                    LIMIT ?
                    "#,
                )
                .bind(kind)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, kind, payload_fp, size_original, size_redacted,
                           redacted_field_count, received_at, processed_at, processing_duration_ms
                    FROM events
                    ORDER BY id DESC
                    LIMIT ?
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(row_to_event).collect()
    }

    /// Per-kind event totals, busiest first.
    pub async fn kind_counts(&self, limit: i64) -> Result<Vec<(String, i64)>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT kind, COUNT(*) AS count
            FROM events
            GROUP BY kind
            ORDER BY count DESC, kind ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get("kind"), row.get("count")))
            .collect())
    }

    /// Events-per-hour over the trailing window, oldest bucket first.
    /// Hours with no events are absent.
    pub async fn hourly_timeline(
        &self,
        hours: i64,
        kind: Option<&str>,
    ) -> Result<Vec<TimelineBucket>, DbError> {
        let since = Utc::now().timestamp_millis() - hours * 3_600_000;
        let rows = match kind {
            Some(kind) => {
                sqlx::query(
                    r#"
                    SELECT strftime('%Y-%m-%dT%H:00:00Z', received_at / 1000, 'unixepoch') AS hour,
                           COUNT(*) AS count
                    FROM events
                    WHERE received_at >= ? AND kind = ?
                    GROUP BY hour
                    ORDER BY hour ASC
                    "#,
                )
                .bind(since)
                .bind(kind)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT strftime('%Y-%m-%dT%H:00:00Z', received_at / 1000, 'unixepoch') AS hour,
                           COUNT(*) AS count
                    FROM events
                    WHERE received_at >= ?
                    GROUP BY hour
                    ORDER BY hour ASC
                    "#,
                )
                .bind(since)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|row| TimelineBucket {
                hour: row.get("hour"),
                count: row.get("count"),
            })
            .collect())
    }
}

fn row_to_event(row: sqlx::sqlite::SqliteRow) -> Result<StoredEvent, DbError> {
    let received_ms: i64 = row.get("received_at");
    let processed_ms: i64 = row.get("processed_at");
    Ok(StoredEvent {
        id: row.get("id"),
        kind: row.get("kind"),
        payload_fingerprint: row.get("payload_fp"),
        size_original: row.get("size_original"),
        size_redacted: row.get("size_redacted"),
        redacted_field_count: row.get("redacted_field_count"),
        received_at: ms_to_utc(received_ms),
        processed_at: ms_to_utc(processed_ms),
        processing_duration_ms: row.get("processing_duration_ms"),
    })
}

fn ms_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hooklens_protocol::{FieldCensus, NodeKind, TypeTree};

    fn event(kind: &str, received_at: DateTime<Utc>) -> EventRow {
        EventRow {
            kind: kind.to_string(),
            payload_fingerprint: "fp".to_string(),
            size_original: 120,
            size_redacted: 100,
            redacted_field_count: 1,
            received_at,
            processed_at: received_at,
            processing_duration_ms: 7,
        }
    }

    fn schema_record(kind: &str, version: u32, total: u64) -> SchemaRecord {
        SchemaRecord {
            kind: kind.to_string(),
            version,
            structure_fingerprint: format!("fp-{version}"),
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            last_modified: Utc::now(),
            total_received: total,
            fields: FieldCensus::default(),
            variations: Vec::new(),
            saved_tree: TypeTree::new("", NodeKind::Object),
        }
    }

    #[tokio::test]
    async fn record_and_read_back_events() {
        let log = EventLog::in_memory().await.unwrap();
        log.record_event(&event("Ping", Utc::now())).await.unwrap();
        log.record_event(&event("Pong", Utc::now())).await.unwrap();

        let recent = log.recent_events(10, None).await.unwrap();
        assert_eq!(recent.len(), 2);
        // Most recent first.
        assert_eq!(recent[0].kind, "Pong");
        assert_eq!(recent[1].kind, "Ping");

        let filtered = log.recent_events(10, Some("Ping")).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].redacted_field_count, 1);
    }

    #[tokio::test]
    async fn aggregates_count_windows() {
        let log = EventLog::in_memory().await.unwrap();
        let now = Utc::now();
        log.record_event(&event("A", now)).await.unwrap();
        log.record_event(&event("A", now - chrono::Duration::hours(2)))
            .await
            .unwrap();
        log.record_event(&event("A", now - chrono::Duration::days(3)))
            .await
            .unwrap();
        log.upsert_schema_row(&schema_record("A", 1, 3)).await.unwrap();

        let agg = log.aggregates().await.unwrap();
        assert_eq!(agg.total_events, 3);
        assert_eq!(agg.events_last_1h, 1);
        assert_eq!(agg.events_last_24h, 2);
        assert_eq!(agg.unique_kinds, 1);
        assert!(agg.avg_processing_duration_ms > 0.0);
    }

    #[tokio::test]
    async fn schema_rows_upsert_by_kind() {
        let log = EventLog::in_memory().await.unwrap();
        log.upsert_schema_row(&schema_record("Ping", 1, 1)).await.unwrap();
        log.upsert_schema_row(&schema_record("Ping", 2, 5)).await.unwrap();

        let (version, total): (i64, i64) =
            sqlx::query_as("SELECT version, total_received FROM schemas WHERE kind = 'Ping'")
                .fetch_one(log.pool())
                .await
                .unwrap();
        assert_eq!(version, 2);
        assert_eq!(total, 5);
    }

    #[tokio::test]
    async fn kind_counts_rank_by_volume() {
        let log = EventLog::in_memory().await.unwrap();
        let now = Utc::now();
        for _ in 0..3 {
            log.record_event(&event("Busy", now)).await.unwrap();
        }
        log.record_event(&event("Quiet", now)).await.unwrap();

        let counts = log.kind_counts(10).await.unwrap();
        assert_eq!(counts[0], ("Busy".to_string(), 3));
        assert_eq!(counts[1], ("Quiet".to_string(), 1));

        let limited = log.kind_counts(1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn timeline_buckets_by_hour() {
        let log = EventLog::in_memory().await.unwrap();
        let now = Utc::now();
        log.record_event(&event("A", now)).await.unwrap();
        log.record_event(&event("A", now)).await.unwrap();
        log.record_event(&event("B", now - chrono::Duration::hours(1)))
            .await
            .unwrap();

        let timeline = log.hourly_timeline(24, None).await.unwrap();
        assert_eq!(timeline.iter().map(|b| b.count).sum::<i64>(), 3);

        let only_a = log.hourly_timeline(24, Some("A")).await.unwrap();
        assert_eq!(only_a.iter().map(|b| b.count).sum::<i64>(), 2);
        assert!(only_a[0].hour.ends_with(":00:00Z"));
    }
}
