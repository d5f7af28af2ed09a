//! Logging setup and home-directory resolution for hooklens binaries.
//!
//! File output rotates by size so a long-running observer never fills the
//! disk; stderr gets the same events unless `quiet` asks for warnings only.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str =
    "hooklens=info,hooklens_worker=info,hooklens_queue=info,hooklens_store=info";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// The hooklens data root: `$HOOKLENS_HOME` or `~/.hooklens`.
pub fn hooklens_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("HOOKLENS_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .expect("Could not determine home directory")
        .join(".hooklens")
}

/// Where log files live: `<home>/logs`.
pub fn logs_dir() -> PathBuf {
    hooklens_home().join("logs")
}

/// Where per-kind schema artifacts live: `<home>/schemas`.
pub fn schemas_dir() -> PathBuf {
    hooklens_home().join("schemas")
}

/// The shared SQLite file: `<home>/hooklens.db`.
pub fn database_path() -> PathBuf {
    hooklens_home().join("hooklens.db")
}

/// Initialize tracing with a size-rotated file writer plus stderr.
///
/// `quiet` limits stderr to warnings; the file always gets the full filter
/// (`RUST_LOG` overrides the default).
pub fn init_logging(app_name: &str, quiet: bool) -> Result<()> {
    let log_dir = logs_dir();
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let writer = RotatingWriter::open(log_dir, app_name)
        .context("Failed to initialize rotating log writer")?;

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    Ok(())
}

struct RotatingState {
    file: File,
    written: u64,
}

/// Size-rotated append-only log file, clone-shared across layers.
///
/// `app.log` is current; older generations are `app.log.1` .. `app.log.4`.
#[derive(Clone)]
pub struct RotatingWriter {
    dir: PathBuf,
    base: String,
    state: Arc<Mutex<RotatingState>>,
}

impl RotatingWriter {
    fn open(dir: PathBuf, app_name: &str) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let base: String = app_name
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        let path = dir.join(format!("{base}.log"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            dir,
            base,
            state: Arc::new(Mutex::new(RotatingState { file, written })),
        })
    }

    fn rotate(&self, state: &mut RotatingState) -> io::Result<()> {
        let _ = state.file.flush();

        let path_for = |index: usize| {
            if index == 0 {
                self.dir.join(format!("{}.log", self.base))
            } else {
                self.dir.join(format!("{}.log.{}", self.base, index))
            }
        };

        let oldest = path_for(MAX_LOG_FILES - 1);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (0..MAX_LOG_FILES - 1).rev() {
            let src = path_for(index);
            if src.exists() {
                fs::rename(&src, path_for(index + 1))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path_for(0))?;
        state.written = file.metadata()?.len();
        state.file = file;
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RotatingWriter {
    type Writer = RotatingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let state = Arc::clone(&self.state);
        let mut guard = state
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        if guard.written + buf.len() as u64 > MAX_LOG_FILE_SIZE {
            self.rotate(&mut guard)?;
        }
        let bytes = guard.file.write(buf)?;
        guard.written += bytes as u64;
        Ok(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_rotates_when_full() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = RotatingWriter::open(dir.path().to_path_buf(), "test-app").unwrap();

        // Force several rotations worth of data through a tiny window.
        let chunk = vec![b'x'; 1024];
        let mut total = 0u64;
        while total < MAX_LOG_FILE_SIZE + 4096 {
            writer.write(&chunk).unwrap();
            total += chunk.len() as u64;
        }
        writer.flush().unwrap();

        assert!(dir.path().join("test-app.log").exists());
        assert!(dir.path().join("test-app.log.1").exists());
    }

    #[test]
    fn app_name_is_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = RotatingWriter::open(dir.path().to_path_buf(), "weird app!").unwrap();
        writer.write(b"hello").unwrap();
        writer.flush().unwrap();
        assert!(dir.path().join("weird_app_.log").exists());
    }
}
