use std::fs::{File, FileTimes};
use std::io;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::raw_fd;

/// A temp file unlinked immediately after open (SPEC_FULL.md §4.4:
/// "fallback mode"), kept alive only by the open fd — which `fork(2)`
/// duplicates into the child, just like the mmap page in
/// [`crate::MmapCounter`]. The worker advances its mtime on every
/// heartbeat; the parent `fstat`s the same fd to read it back.
///
/// "Never notified" is encoded as the mtime sentinel `UNIX_EPOCH`,
/// stamped at creation time, rather than a process-local flag — a flag
/// on this struct would not be visible across the fork boundary, while
/// the file's mtime, read through the fork-inherited fd, is.
#[derive(Debug)]
pub struct TempFileCounter {
    file: File,
}

impl TempFileCounter {
    pub fn create() -> io::Result<Self> {
        let file = tempfile::tempfile()?;
        file.set_times(FileTimes::new().set_modified(UNIX_EPOCH))?;
        Ok(Self { file })
    }

    /// Exposed for the parent side to `fstat` independently if desired;
    /// not required for [`Self::last_update_age`], which uses its own
    /// `metadata()` call.
    pub fn as_raw_fd(&self) -> std::os::fd::RawFd {
        raw_fd(&self.file)
    }

    pub fn notify(&self) {
        let now = SystemTime::now();
        // Matches the teacher's own `touch_mtime` pattern (runner/paths.rs):
        // `set_times` is the syscall-light mtime bump this mode requires.
        let _ = self.file.set_times(FileTimes::new().set_modified(now));
    }

    pub fn last_update_age(&self) -> Option<Duration> {
        let metadata = self.file.metadata().ok()?;
        let modified = metadata.modified().ok()?;
        if modified == UNIX_EPOCH {
            return None;
        }
        Some(
            SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_no_age_before_first_notify() {
        let counter = TempFileCounter::create().unwrap();
        assert_eq!(counter.last_update_age(), None);
    }

    #[test]
    fn notify_then_age_is_small() {
        let counter = TempFileCounter::create().unwrap();
        counter.notify();
        assert!(counter.last_update_age().unwrap() < Duration::from_secs(2));
    }
}
