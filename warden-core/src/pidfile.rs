//! Pidfile handling (SPEC_FULL.md §6): a single file containing the
//! arbiter's decimal pid with a trailing newline, written atomically via
//! write-to-temp + rename, removed on clean exit.

use std::io::Write;
use std::path::{Path, PathBuf};

use nix::sys::signal::kill;
use nix::unistd::Pid;

use crate::error::CoreError;

#[derive(Debug)]
pub struct Pidfile {
    path: PathBuf,
}

impl Pidfile {
    /// Write `pid` to `path` atomically. If the file already exists and
    /// names a live process, returns [`CoreError::PidfileHeld`] — the
    /// caller must exit with code 1 without touching the existing file.
    pub fn acquire(path: PathBuf, pid: i32) -> Result<Self, CoreError> {
        if let Some(existing) = Self::read(&path)? {
            if process_is_alive(existing) {
                return Err(CoreError::PidfileHeld {
                    path: path.display().to_string(),
                    pid: existing,
                });
            }
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CoreError::Pidfile {
                path: path.display().to_string(),
                source,
            })?;
        }

        let tmp_path = path.with_extension("tmp");
        {
            let mut tmp = std::fs::File::create(&tmp_path).map_err(|source| CoreError::Pidfile {
                path: tmp_path.display().to_string(),
                source,
            })?;
            writeln!(tmp, "{pid}").map_err(|source| CoreError::Pidfile {
                path: tmp_path.display().to_string(),
                source,
            })?;
            tmp.sync_all().map_err(|source| CoreError::Pidfile {
                path: tmp_path.display().to_string(),
                source,
            })?;
        }
        std::fs::rename(&tmp_path, &path).map_err(|source| CoreError::Pidfile {
            path: path.display().to_string(),
            source,
        })?;

        Ok(Self { path })
    }

    /// Read the pid stored at `path`, if any file is there.
    pub fn read(path: &Path) -> Result<Option<i32>, CoreError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CoreError::Pidfile {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        Ok(content.trim().parse::<i32>().ok())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the pidfile (idempotent: a missing file is not an error).
    pub fn remove(self) -> Result<(), CoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) | Err(_) if !self.path.exists() => Ok(()),
            Err(source) => Err(CoreError::Pidfile {
                path: self.path.display().to_string(),
                source,
            }),
        }
    }
}

/// Whether `pid` names a process we can signal (SPEC_FULL.md §6: "the
/// file exists and names a live process").
///
/// `pid <= 0` has process-group-wide kill semantics that don't apply
/// here, so it is treated as "not a worker" rather than probed.
fn process_is_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    kill(Pid::from_raw(pid), None).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_writes_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.pid");
        let pidfile = Pidfile::acquire(path.clone(), std::process::id() as i32).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with('\n'));
        pidfile.remove().unwrap();
    }

    #[test]
    fn acquire_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("warden.pid");
        let pidfile = Pidfile::acquire(path.clone(), std::process::id() as i32).unwrap();
        assert!(path.exists());
        pidfile.remove().unwrap();
    }

    #[test]
    fn remove_deletes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.pid");
        let pidfile = Pidfile::acquire(path.clone(), std::process::id() as i32).unwrap();
        pidfile.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn acquire_rejects_when_live_pid_already_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.pid");
        std::fs::write(&path, format!("{}\n", std::process::id())).unwrap();
        let err = Pidfile::acquire(path, std::process::id() as i32).unwrap_err();
        assert!(matches!(err, CoreError::PidfileHeld { .. }));
    }

    #[test]
    fn acquire_reclaims_a_stale_pidfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.pid");
        // An arbitrary high pid that is vanishingly unlikely to be live.
        std::fs::write(&path, "999999\n").unwrap();
        let pidfile = Pidfile::acquire(path.clone(), std::process::id() as i32).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());
        pidfile.remove().unwrap();
    }
}
