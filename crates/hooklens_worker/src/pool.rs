//! The bounded worker pool.

use crate::pipeline::Pipeline;
use anyhow::Result;
use hooklens_queue::{ClaimedJob, JobQueue};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Idle poll interval when the queue is empty.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct WorkerPool {
    queue: Arc<JobQueue>,
    pipeline: Arc<Pipeline>,
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(queue: Arc<JobQueue>, pipeline: Arc<Pipeline>, concurrency: usize) -> Self {
        Self {
            queue,
            pipeline,
            concurrency: concurrency.max(1),
        }
    }

    /// Run workers until the shutdown signal flips, then drain.
    ///
    /// Each worker finishes its in-flight job before exiting; the caller
    /// bounds the whole drain with a deadline and abandons past it (queue
    /// durability re-runs whatever was abandoned).
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(workers = self.concurrency, "starting worker pool");
        let mut handles = Vec::with_capacity(self.concurrency);
        for index in 0..self.concurrency {
            let worker_id = format!("worker-{index}");
            handles.push(tokio::spawn(worker_loop(
                Arc::clone(&self.queue),
                Arc::clone(&self.pipeline),
                worker_id,
                shutdown.clone(),
            )));
        }
        for handle in handles {
            handle.await?;
        }
        info!("worker pool drained");
        Ok(())
    }
}

async fn worker_loop(
    queue: Arc<JobQueue>,
    pipeline: Arc<Pipeline>,
    worker_id: String,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        match queue.dequeue(&worker_id).await {
            Ok(Some(claimed)) => {
                process_claimed(&queue, &pipeline, &worker_id, claimed).await;
            }
            Ok(None) => {
                // Nothing runnable; nap until work could exist or we drain.
                tokio::select! {
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                    _ = shutdown.changed() => {}
                }
            }
            Err(e) => {
                error!(worker_id, error = %e, "dequeue failed; backing off");
                tokio::time::sleep(POLL_INTERVAL * 10).await;
            }
        }
    }
}

async fn process_claimed(
    queue: &JobQueue,
    pipeline: &Pipeline,
    worker_id: &str,
    claimed: ClaimedJob,
) {
    let job_id = claimed.job.job_id.clone();
    let conclusion = match pipeline.process(&claimed.job).await {
        Ok(outcome) => {
            info!(
                worker_id,
                job_id = %job_id,
                kind = %outcome.kind,
                version = outcome.version,
                changed = outcome.structure_changed,
                duration_ms = outcome.duration_ms,
                "job succeeded"
            );
            queue.complete(claimed.id).await
        }
        Err(e) if e.is_permanent() => {
            error!(worker_id, job_id = %job_id, error = %e, "job failed permanently");
            queue.fail_permanent(claimed.id, &e.to_string()).await
        }
        Err(e) => {
            error!(worker_id, job_id = %job_id, error = %e, "job failed; will retry");
            queue.fail(claimed.id, &e.to_string()).await
        }
    };
    if let Err(e) = conclusion {
        // Concluding failed (queue backend trouble); the job stays active
        // and orphan recovery requeues it on next startup.
        error!(worker_id, job_id = %job_id, error = %e, "failed to conclude job");
    }
}
