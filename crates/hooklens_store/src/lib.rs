//! Per-kind schema artifact store.
//!
//! One directory per kind (hierarchical kinds nest), four required artifacts
//! plus a bounded raw-sample archive. Writers must hold the kind's lock;
//! every artifact lands via write-to-temp-then-rename so readers never see a
//! torn file. A kind with any required artifact missing is treated as absent
//! and rebuilt from scratch by the next payload.

use hooklens_protocol::{sanitize_kind, SchemaRecord};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// The four files that make a persisted kind complete.
pub const VALIDATOR_FILE: &str = "schema.validator.json";
pub const INTERFACE_FILE: &str = "interface.d.ts";
pub const EXAMPLES_FILE: &str = "examples.json";
pub const METADATA_FILE: &str = "metadata.json";

const RAW_SAMPLES_DIR: &str = "raw-samples";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Aggregate disk usage, split the way the dashboard reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreCounters {
    pub kinds: usize,
    pub artifact_bytes: u64,
    pub raw_sample_bytes: u64,
}

/// String artifacts persisted alongside the metadata record.
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    pub validator_source: String,
    pub interface_source: String,
    pub examples_json: String,
}

/// Filesystem-backed store rooted at one schemas directory.
pub struct SchemaStore {
    root: PathBuf,
    max_raw_samples: usize,
    // Writer serialization per kind. The map itself is touched briefly; the
    // per-kind mutex is held across a whole load-merge-save window.
    kind_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SchemaStore {
    pub fn open(root: impl Into<PathBuf>, max_raw_samples: usize) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            max_raw_samples,
            kind_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Acquire the writer lock for a kind.
    ///
    /// Writers across distinct kinds proceed independently; two writers of
    /// the same kind serialize here.
    pub async fn lock_kind(&self, kind: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.kind_locks.lock().expect("kind lock map poisoned");
            Arc::clone(
                locks
                    .entry(sanitize_kind(kind))
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Directory holding a kind's artifacts; `/` nests.
    pub fn kind_dir(&self, kind: &str) -> PathBuf {
        let mut dir = self.root.clone();
        for segment in sanitize_kind(kind).split('/') {
            dir.push(segment);
        }
        dir
    }

    /// Load the persisted record for a kind.
    ///
    /// Returns `None` for unknown kinds and for kinds with an incomplete
    /// artifact set (e.g. a crash between renames); the caller rebuilds.
    pub fn load(&self, kind: &str) -> Result<Option<SchemaRecord>, StoreError> {
        let dir = self.kind_dir(kind);
        if !dir.join(METADATA_FILE).exists() {
            return Ok(None);
        }

        let required = [VALIDATOR_FILE, INTERFACE_FILE, EXAMPLES_FILE, METADATA_FILE];
        let missing: Vec<&str> = required
            .iter()
            .filter(|file| !dir.join(file).exists())
            .copied()
            .collect();
        if !missing.is_empty() {
            warn!(kind, ?missing, "incomplete artifact set; treating kind as absent");
            return Ok(None);
        }

        let raw = fs::read_to_string(dir.join(METADATA_FILE))?;
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(kind, error = %e, "unreadable metadata; treating kind as absent");
                Ok(None)
            }
        }
    }

    /// Persist a kind's full artifact set.
    ///
    /// The caller must hold the kind's writer lock. Each artifact is written
    /// to a temp file and renamed; metadata lands last so a crash mid-save
    /// leaves either the old complete set or a set the completeness check
    /// rejects.
    pub fn save(
        &self,
        kind: &str,
        record: &SchemaRecord,
        artifacts: &ArtifactSet,
        raw_sample: Option<&Value>,
    ) -> Result<(), StoreError> {
        let dir = self.kind_dir(kind);
        fs::create_dir_all(&dir)?;

        write_atomic(&dir.join(VALIDATOR_FILE), artifacts.validator_source.as_bytes())?;
        write_atomic(&dir.join(INTERFACE_FILE), artifacts.interface_source.as_bytes())?;
        write_atomic(&dir.join(EXAMPLES_FILE), artifacts.examples_json.as_bytes())?;
        let metadata = serde_json::to_string_pretty(record)?;
        write_atomic(&dir.join(METADATA_FILE), metadata.as_bytes())?;
        debug!(kind, version = record.version, "persisted schema artifacts");

        if let Some(sample) = raw_sample {
            self.record_raw_sample(kind, sample);
        }
        Ok(())
    }

    /// Best-effort raw-sample append; never fails the pipeline.
    pub fn record_raw_sample(&self, kind: &str, sample: &Value) {
        if let Err(e) = self.append_raw_sample(&self.kind_dir(kind), sample) {
            warn!(kind, error = %e, "failed to persist raw sample");
        }
    }

    /// Bump only the counting fields of an existing record.
    ///
    /// Used when a merge produced a structurally identical tree: artifacts
    /// are not regenerated, but the metadata's counters must advance.
    pub fn save_metadata_only(&self, kind: &str, record: &SchemaRecord) -> Result<(), StoreError> {
        let dir = self.kind_dir(kind);
        fs::create_dir_all(&dir)?;
        let metadata = serde_json::to_string_pretty(record)?;
        write_atomic(&dir.join(METADATA_FILE), metadata.as_bytes())?;
        Ok(())
    }

    /// Store an unredacted payload, pruning the oldest beyond the cap.
    fn append_raw_sample(&self, kind_dir: &Path, sample: &Value) -> Result<(), StoreError> {
        let samples_dir = kind_dir.join(RAW_SAMPLES_DIR);
        fs::create_dir_all(&samples_dir)?;

        let mut name = format!("{}.json", chrono::Utc::now().timestamp_millis());
        let mut counter = 0u32;
        while samples_dir.join(&name).exists() {
            counter += 1;
            name = format!(
                "{}-{counter}.json",
                chrono::Utc::now().timestamp_millis()
            );
        }
        write_atomic(&samples_dir.join(&name), serde_json::to_string_pretty(sample)?.as_bytes())?;

        let mut samples: Vec<PathBuf> = fs::read_dir(&samples_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        samples.sort();
        while samples.len() > self.max_raw_samples {
            let oldest = samples.remove(0);
            fs::remove_file(&oldest)?;
        }
        Ok(())
    }

    /// Read one of a kind's artifact files verbatim.
    pub fn read_artifact(&self, kind: &str, file: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.kind_dir(kind).join(file)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Every persisted kind, discovered by directory walk.
    pub fn list_kinds(&self) -> Result<Vec<String>, StoreError> {
        let mut kinds = Vec::new();
        walk_kinds(&self.root, &mut Vec::new(), &mut kinds)?;
        kinds.sort();
        Ok(kinds)
    }

    /// Disk usage split into artifact and raw-sample sections.
    pub fn counters(&self) -> Result<StoreCounters, StoreError> {
        let mut counters = StoreCounters::default();
        for kind in self.list_kinds()? {
            counters.kinds += 1;
            let dir = self.kind_dir(&kind);
            for file in [VALIDATOR_FILE, INTERFACE_FILE, EXAMPLES_FILE, METADATA_FILE] {
                if let Ok(meta) = fs::metadata(dir.join(file)) {
                    counters.artifact_bytes += meta.len();
                }
            }
            let samples_dir = dir.join(RAW_SAMPLES_DIR);
            if let Ok(entries) = fs::read_dir(&samples_dir) {
                for entry in entries.flatten() {
                    if let Ok(meta) = entry.metadata() {
                        counters.raw_sample_bytes += meta.len();
                    }
                }
            }
        }
        Ok(counters)
    }
}

fn walk_kinds(
    dir: &Path,
    segments: &mut Vec<String>,
    out: &mut Vec<String>,
) -> Result<(), StoreError> {
    if dir.join(METADATA_FILE).exists() && !segments.is_empty() {
        out.push(segments.join("/"));
    }
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name == RAW_SAMPLES_DIR {
            continue;
        }
        segments.push(name);
        walk_kinds(&entry.path(), segments, out)?;
        segments.pop();
    }
    Ok(())
}

/// Write via temp file + rename so readers see old or new, never partial.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
