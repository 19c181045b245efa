//! Per-request access logging (SPEC_FULL.md §4.8): one line per completed
//! request, written by the owning worker independently of the arbiter's
//! own log sink. `USR1` closes and reopens the file without restarting
//! the worker — the same reopen-by-path idea as the teacher's rolling
//! file appender (`runner/src/main.rs`'s `init_tracing_with_file`),
//! applied here to a worker-owned line writer instead of a `tracing`
//! subscriber, since each worker needs its own fd per SPEC_FULL.md §5.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// One completed request, ready to be formatted as a line.
pub struct AccessRecord<'a> {
    pub remote_addr: Option<SocketAddr>,
    pub method: &'a str,
    pub path: &'a str,
    pub status: u16,
    pub bytes: usize,
    pub duration: Duration,
}

/// Appends to the configured access log file, or to stderr if none was
/// configured.
pub enum AccessLog {
    File { path: PathBuf, file: File },
    Stderr,
}

impl AccessLog {
    pub fn open(path: Option<&PathBuf>) -> std::io::Result<Self> {
        match path {
            Some(path) => Ok(Self::File {
                file: open_append(path)?,
                path: path.clone(),
            }),
            None => Ok(Self::Stderr),
        }
    }

    /// Close and reopen the file-backed writer at the same path (SPEC_FULL.md
    /// §4.8, §6: "reopen logs"). A no-op for the stderr fallback.
    pub fn reopen(&mut self) {
        if let Self::File { path, file } = self {
            match open_append(path) {
                Ok(new_file) => *file = new_file,
                Err(e) => warn!("failed to reopen access log {}: {e}", path.display()),
            }
        }
    }

    pub fn log(&mut self, record: &AccessRecord<'_>) {
        let remote = record
            .remote_addr
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string());
        let line = format!(
            "{remote} \"{} {}\" {} {} {:.3}\n",
            record.method,
            record.path,
            record.status,
            record.bytes,
            record.duration.as_secs_f64()
        );
        let result: std::io::Result<()> = match self {
            Self::File { file, .. } => file.write_all(line.as_bytes()),
            Self::Stderr => std::io::stderr().write_all(line.as_bytes()),
        };
        if let Err(e) = result {
            warn!("failed to write access log line: {e}");
        }
    }
}

fn open_append(path: &PathBuf) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_backed_log_appends_a_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        let mut log = AccessLog::open(Some(&path)).unwrap();
        log.log(&AccessRecord {
            remote_addr: None,
            method: "GET",
            path: "/ping",
            status: 200,
            bytes: 4,
            duration: Duration::from_millis(5),
        });
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("GET /ping"));
        assert!(content.contains("200"));
    }

    #[test]
    fn reopen_picks_up_a_path_rotated_away_from_under_us() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        let mut log = AccessLog::open(Some(&path)).unwrap();
        log.log(&AccessRecord {
            remote_addr: None,
            method: "GET",
            path: "/a",
            status: 200,
            bytes: 0,
            duration: Duration::from_millis(1),
        });
        std::fs::rename(&path, dir.path().join("access.log.1")).unwrap();
        log.reopen();
        log.log(&AccessRecord {
            remote_addr: None,
            method: "GET",
            path: "/b",
            status: 200,
            bytes: 0,
            duration: Duration::from_millis(1),
        });
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("/b"));
        assert!(!content.contains("/a"));
    }
}
