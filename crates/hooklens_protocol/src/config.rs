//! Pipeline configuration, wired explicitly at startup (no globals).

use crate::defaults;
use serde::{Deserialize, Serialize};

/// Truncator tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncatorConfig {
    /// Characters retained from a truncated string.
    pub max_length: usize,
    /// Lower-cased substrings matched against the trailing path segment.
    pub field_names: Vec<String>,
}

impl Default for TruncatorConfig {
    fn default() -> Self {
        Self {
            max_length: defaults::TRUNCATE_MAX_LENGTH,
            field_names: defaults::TRUNCATE_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl TruncatorConfig {
    /// Parse the `TRUNCATE_FIELDS` comma-list form.
    pub fn with_field_list(mut self, list: &str) -> Self {
        let names: Vec<String> = list
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if !names.is_empty() {
            self.field_names = names;
        }
        self
    }
}

/// Queue and worker-pool tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub max_attempts: u32,
    /// Initial backoff; doubles with each failed attempt.
    pub backoff_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::QUEUE_CONCURRENCY,
            max_attempts: defaults::QUEUE_MAX_ATTEMPTS,
            backoff_delay_ms: defaults::QUEUE_BACKOFF_DELAY_MS,
        }
    }
}

/// Store tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub max_raw_samples: usize,
    /// Merge-time example cap; the persisted record keeps fewer.
    pub max_examples_per_schema: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_raw_samples: defaults::MAX_RAW_SAMPLES,
            max_examples_per_schema: defaults::MAX_EXAMPLES_PER_SCHEMA,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub truncator: TruncatorConfig,
    pub queue: QueueConfig,
    pub store: StoreConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = Config::default();
        assert_eq!(config.truncator.max_length, 100);
        assert_eq!(config.queue.concurrency, 5);
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.queue.backoff_delay_ms, 2_000);
        assert_eq!(config.store.max_raw_samples, 10);
        assert_eq!(config.store.max_examples_per_schema, 20);
        assert!(config
            .truncator
            .field_names
            .contains(&"jpegthumbnail".to_string()));
    }

    #[test]
    fn field_list_is_lowercased_and_trimmed() {
        let config = TruncatorConfig::default().with_field_list("Base64, Avatar ,,");
        assert_eq!(config.field_names, vec!["base64", "avatar"]);
    }

    #[test]
    fn empty_field_list_keeps_defaults() {
        let config = TruncatorConfig::default().with_field_list(" , ");
        assert_eq!(config.field_names.len(), 5);
    }
}
