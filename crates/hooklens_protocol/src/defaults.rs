//! Default tuning values for the pipeline.

/// Characters of a truncated string that survive redaction.
pub const TRUNCATE_MAX_LENGTH: usize = 100;

/// Field-name substrings (lower-cased) whose string values are truncated.
pub const TRUNCATE_FIELDS: &[&str] = &["base64", "jpegthumbnail", "thumbnail", "data", "image"];

/// Appended to every truncated string value.
pub const TRUNCATION_SENTINEL: &str = "...[TRUNCATED]";

/// Unredacted payloads retained per kind.
pub const MAX_RAW_SAMPLES: usize = 10;

/// Example cap honored while merging trees.
pub const MAX_EXAMPLES_PER_SCHEMA: usize = 20;

/// Example cap on every persisted tree node.
pub const PERSISTED_EXAMPLE_CAP: usize = 10;

/// Elements sampled into a heterogeneous array's union item node.
pub const UNION_SAMPLE_CAP: usize = 5;

/// Worker pool size.
pub const QUEUE_CONCURRENCY: usize = 5;

/// Attempts before a job lands in the failed holding set.
pub const QUEUE_MAX_ATTEMPTS: u32 = 3;

/// Initial retry backoff in milliseconds; doubles per attempt.
pub const QUEUE_BACKOFF_DELAY_MS: u64 = 2_000;

/// Graceful-shutdown deadline for draining in-flight jobs.
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

/// Strings longer than this hash as a sentinel in the payload fingerprint.
pub const LARGE_STRING_BOUND: usize = 10_000;

/// Stand-in hashed for oversize strings in the payload fingerprint.
pub const LARGE_STRING_SENTINEL: &str = "<oversize-string>";

/// Queue priority assigned when no precedence rule matches.
pub const DEFAULT_PRIORITY: i64 = 5;

/// Kind assigned when every classifier rule falls through.
pub const UNKNOWN_KIND: &str = "Unknown";
