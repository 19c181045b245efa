//! Tracing setup for the arbiter's own log stream (SPEC_FULL.md §4.8):
//! stderr always, teed to an error logfile if configured. Grounded on the
//! teacher's own `init_tracing_with_file`/`init_tracing_stderr`
//! (`runner/src/main.rs`), generalized from a rotating file to a file the
//! process can reopen in place on `USR1` (SPEC_FULL.md §6).

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A timer that prints elapsed `[mm:ss:mmm]` since the process started,
/// matching the teacher's own format exactly.
pub struct Elapsed(Instant);

impl Default for Elapsed {
    fn default() -> Self {
        Self(Instant::now())
    }
}

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let total_secs = d.as_secs();
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        write!(w, "[{mins:02}:{secs:02}:{millis:03}]")
    }
}

struct ReopenableInner {
    path: PathBuf,
    file: File,
}

/// A file-backed tracing writer that can be closed and reopened at the
/// same path without tearing down the subscriber (SPEC_FULL.md §4.8:
/// "rotation is by reopen, never by truncation").
#[derive(Clone)]
pub struct ReopenableWriter {
    inner: Arc<Mutex<ReopenableInner>>,
}

impl ReopenableWriter {
    fn open(path: PathBuf) -> std::io::Result<Self> {
        let file = open_append(&path)?;
        Ok(Self { inner: Arc::new(Mutex::new(ReopenableInner { path, file })) })
    }

    pub fn reopen(&self) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        match open_append(&inner.path) {
            Ok(file) => inner.file = file,
            Err(e) => eprintln!("failed to reopen error logfile {}: {e}", inner.path.display()),
        }
    }
}

impl Write for ReopenableWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| std::io::Error::other("error logfile writer poisoned"))?;
        inner.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| std::io::Error::other("error logfile writer poisoned"))?;
        inner.file.flush()
    }
}

impl<'a> MakeWriter<'a> for ReopenableWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Holds everything that must stay alive for the subscriber installed by
/// [`init`] to keep working, plus the reopen hook wired into the
/// arbiter's `USR1` handling.
pub struct TracingHandle {
    _guard: Option<tracing_appender::non_blocking::WorkerGuard>,
    error_log: Option<ReopenableWriter>,
}

impl TracingHandle {
    pub fn reopen(&self) {
        if let Some(writer) = &self.error_log {
            writer.reopen();
        }
    }
}

/// Install the global `tracing` subscriber. `error_logfile` is optional;
/// without one the arbiter logs to stderr only.
pub fn init(log_level: &str, error_logfile: Option<&Path>) -> TracingHandle {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(path) = error_logfile else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(Elapsed::default())
            .init();
        return TracingHandle { _guard: None, error_log: None };
    };

    match ReopenableWriter::open(path.to_path_buf()) {
        Ok(writer) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(writer.clone());
            let out = std::io::stderr.and(non_blocking);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_timer(Elapsed::default())
                .with_writer(out)
                .with_ansi(false)
                .init();
            TracingHandle { _guard: Some(guard), error_log: Some(writer) }
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_timer(Elapsed::default())
                .init();
            tracing::warn!("error logfile {} unavailable, using stderr only: {e}", path.display());
            TracingHandle { _guard: None, error_log: None }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reopenable_writer_picks_up_a_path_rotated_away_from_under_us() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("error.log");
        let mut writer = ReopenableWriter::open(path.clone()).unwrap();
        writer.write_all(b"first\n").unwrap();
        std::fs::rename(&path, dir.path().join("error.log.1")).unwrap();
        writer.reopen();
        writer.write_all(b"second\n").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "second\n");
    }
}
