//! Command handlers wiring collaborators together at startup.

use crate::{ServeArgs, SubmitArgs};
use anyhow::{bail, Context, Result};
use hooklens_classifier::{Classifier, ClassifierConfig};
use hooklens_db::EventLog;
use hooklens_inference::short_id;
use hooklens_protocol::defaults::SHUTDOWN_GRACE_SECS;
use hooklens_protocol::{QueueConfig, StoreConfig, TruncatorConfig};
use hooklens_queue::JobQueue;
use hooklens_store::SchemaStore;
use hooklens_worker::{submit_payload, Pipeline, ReadApi, WorkerPool};
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

struct Services {
    store: Arc<SchemaStore>,
    log: Arc<EventLog>,
    queue: Arc<JobQueue>,
}

/// Open the store, the shared SQLite file, and the queue living inside it.
async fn open_services(max_raw_samples: usize, queue_config: QueueConfig) -> Result<Services> {
    let home = hooklens_logging::hooklens_home();
    std::fs::create_dir_all(&home)
        .with_context(|| format!("Failed to create data root: {}", home.display()))?;

    let store = Arc::new(SchemaStore::open(
        hooklens_logging::schemas_dir(),
        max_raw_samples,
    )?);
    let log = Arc::new(EventLog::open(&hooklens_logging::database_path()).await?);
    let queue = Arc::new(JobQueue::from_pool(log.pool().clone(), queue_config).await?);
    Ok(Services { store, log, queue })
}

pub async fn serve(args: ServeArgs) -> Result<()> {
    let queue_config = QueueConfig {
        concurrency: args.concurrency,
        max_attempts: args.max_attempts,
        backoff_delay_ms: args.backoff_delay_ms,
    };
    let services = open_services(args.max_raw_samples, queue_config.clone()).await?;

    let recovered = services.queue.recover_orphans().await?;
    if recovered > 0 {
        info!(recovered, "recovered jobs abandoned by a previous run");
    }
    // Completed rows older than a week are noise; failed rows are kept.
    services.queue.purge_completed(7 * 86_400_000).await?;

    let mut truncator_config = TruncatorConfig {
        max_length: args.truncate_max_length,
        ..TruncatorConfig::default()
    };
    if let Some(list) = args.truncate_fields.as_deref() {
        truncator_config = truncator_config.with_field_list(list);
    }

    let pipeline = Arc::new(Pipeline::new(
        truncator_config,
        StoreConfig {
            max_raw_samples: args.max_raw_samples,
            max_examples_per_schema: args.max_examples_per_schema,
        },
        Classifier::new(ClassifierConfig::default()),
        Arc::clone(&services.store),
        Arc::clone(&services.log),
    ));

    let pool = WorkerPool::new(
        Arc::clone(&services.queue),
        Arc::clone(&pipeline),
        queue_config.concurrency,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn(async move { pool.run(shutdown_rx).await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("shutdown requested; draining workers");
    shutdown_tx.send(true).ok();

    match tokio::time::timeout(Duration::from_secs(SHUTDOWN_GRACE_SECS), run).await {
        Ok(joined) => joined??,
        Err(_) => {
            // Past the grace deadline: abandon in-flight jobs. They stay
            // `active` in the queue and orphan recovery re-runs them on the
            // next start.
            warn!("drain deadline exceeded; abandoning in-flight jobs");
        }
    }

    let degraded = pipeline.degraded_emissions();
    if degraded > 0 {
        warn!(degraded, "artifact emissions degraded this run");
    }
    Ok(())
}

pub async fn submit(args: SubmitArgs) -> Result<()> {
    let raw = if args.payload == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        std::fs::read_to_string(&args.payload)
            .with_context(|| format!("Failed to read payload file: {}", args.payload))?
    };
    let payload: serde_json::Value =
        serde_json::from_str(&raw).context("Payload is not valid JSON")?;
    if !payload.is_object() {
        bail!("Payload root must be a JSON object");
    }

    let mut headers = BTreeMap::new();
    for pair in &args.headers {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("Invalid header (want NAME=VALUE): {pair}");
        };
        headers.insert(name.trim().to_lowercase(), value.trim().to_string());
    }

    let services = open_services(
        StoreConfig::default().max_raw_samples,
        QueueConfig::default(),
    )
    .await?;
    let (job_id, accepted) = submit_payload(&services.queue, headers, payload).await?;
    if accepted {
        println!("enqueued {job_id}");
    } else {
        println!("duplicate; already enqueued");
    }
    Ok(())
}

async fn read_api() -> Result<ReadApi> {
    let services = open_services(
        StoreConfig::default().max_raw_samples,
        QueueConfig::default(),
    )
    .await?;
    Ok(ReadApi::new(services.store, services.log, services.queue))
}

pub async fn kinds() -> Result<()> {
    let api = read_api().await?;
    let kinds = api.list_kinds()?;
    if kinds.is_empty() {
        println!("no kinds observed yet");
        return Ok(());
    }
    for kind in kinds {
        println!("{kind}");
    }
    Ok(())
}

pub async fn show(kind: &str, validator: bool, interface: bool) -> Result<()> {
    let api = read_api().await?;

    if validator || interface {
        let file = if validator {
            hooklens_store::VALIDATOR_FILE
        } else {
            hooklens_store::INTERFACE_FILE
        };
        let Some(source) = api.read_artifact(kind, file)? else {
            bail!("Unknown kind: {kind}");
        };
        print!("{source}");
        return Ok(());
    }

    let Some(record) = api.get_schema_record(kind)? else {
        bail!("Unknown kind: {kind}");
    };

    println!("kind:            {}", record.kind);
    println!("version:         {}", record.version);
    println!("fingerprint:     {}", short_id(&record.structure_fingerprint));
    println!("first seen:      {}", record.first_seen.to_rfc3339());
    println!("last seen:       {}", record.last_seen.to_rfc3339());
    println!("last modified:   {}", record.last_modified.to_rfc3339());
    println!("total received:  {}", record.total_received);
    println!(
        "fields:          {} required, {} optional, {} redacted",
        record.fields.required_count(),
        record.fields.optional_count(),
        record.fields.redacted_count()
    );
    if !record.fields.redacted.is_empty() {
        for path in &record.fields.redacted {
            println!("  redacted: {path}");
        }
    }
    if !record.variations.is_empty() {
        println!("variations:");
        for variation in &record.variations {
            println!(
                "  {} x{} ({})",
                short_id(&variation.fingerprint),
                variation.count,
                variation.description
            );
        }
    }
    Ok(())
}

pub async fn stats() -> Result<()> {
    let api = read_api().await?;
    let aggregates = api.get_aggregates().await?;
    let queue = api.queue_stats().await?;

    println!("events total:    {}", aggregates.total_events);
    println!("unique kinds:    {}", aggregates.unique_kinds);
    println!("last hour:       {}", aggregates.events_last_1h);
    println!("last 24h:        {}", aggregates.events_last_24h);
    println!(
        "avg duration:    {:.1} ms",
        aggregates.avg_processing_duration_ms
    );
    println!("queue depth:     {}", aggregates.queue_depth);
    println!(
        "queue:           {} waiting, {} active, {} delayed, {} completed, {} failed",
        queue.waiting, queue.active, queue.delayed, queue.completed, queue.failed
    );
    for (section, bytes) in &aggregates.disk_bytes_by_section {
        println!("disk {section}:    {bytes} bytes");
    }

    let busiest = api.kind_counts(5).await?;
    if !busiest.is_empty() {
        println!("busiest kinds:");
        for (kind, count) in busiest {
            println!("  {count:>8}  {kind}");
        }
    }

    let failed = api.failed_jobs(5).await?;
    if !failed.is_empty() {
        println!("recent failures:");
        for job in failed {
            println!(
                "  {} after {} attempts: {}",
                job.job_id,
                job.attempts,
                job.last_error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    Ok(())
}

pub async fn events(limit: i64, kind: Option<&str>) -> Result<()> {
    let api = read_api().await?;
    let events = api.get_recent_events(limit, kind).await?;
    if events.is_empty() {
        println!("no events recorded yet");
        return Ok(());
    }
    for event in events {
        println!(
            "{}  {:<40}  {}  {}B -> {}B  {}ms",
            event.received_at.to_rfc3339(),
            event.kind,
            hooklens_inference::short_id(&event.payload_fingerprint),
            event.size_original,
            event.size_redacted,
            event.processing_duration_ms
        );
    }
    Ok(())
}

pub async fn timeline(hours: i64, kind: Option<&str>) -> Result<()> {
    let api = read_api().await?;
    let buckets = api.get_hourly_timeline(hours, kind).await?;
    if buckets.is_empty() {
        println!("no events in the last {hours}h");
        return Ok(());
    }
    for bucket in buckets {
        println!("{}  {:>8}", bucket.hour, bucket.count);
    }
    Ok(())
}
