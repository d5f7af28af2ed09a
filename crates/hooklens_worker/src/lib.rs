//! Worker pool and pipeline orchestration.
//!
//! A bounded pool of cooperative tasks pulls jobs from the durable queue and
//! drives each one through the inference pipeline. The pool drains on a
//! shutdown signal: in-flight jobs finish, new jobs stop being claimed, and
//! anything abandoned past the grace deadline is retried after restart
//! thanks to queue durability.

pub mod pipeline;
pub mod pool;
pub mod service;

pub use pipeline::{Pipeline, PipelineError, ProcessOutcome};
pub use pool::WorkerPool;
pub use service::{submit_payload, Aggregates, ReadApi};
