//! The liveness counter (SPEC_FULL.md §4.4, C1): the only shared-mutable
//! state in this system. A worker writes a monotonically non-decreasing
//! value on every heartbeat; the arbiter reads it, lock-free, to decide
//! whether the worker is stuck.
//!
//! Two implementation modes, chosen once at creation time, are
//! functionally equivalent from the parent's point of view:
//!
//! - [`LivenessMode::Mmap`]: an anonymous `MAP_SHARED` page holding an
//!   `i32`, written with a relaxed atomic store. The page is mapped
//!   *before* `fork(2)`, so the child inherits the same physical mapping
//!   at the same virtual address — no handle-passing is required.
//! - [`LivenessMode::TempFile`]: a temp file unlinked immediately after
//!   open, kept alive only by the (fork-inherited) open file descriptor.
//!   The worker advances its mtime; the parent `fstat`s the same fd.
//!
//! The original `gunicorn/_counter.py` this contract replaces shipped
//! four mutually-inconsistent variants (a loadable native `.so`, an
//! mmap'd `int32`, a struct-packed fallback, and a lock-guarded
//! arithmetic type that *returns* values instead of updating shared
//! state). This crate fixes a single contract instead: monotonic
//! `notify()`, parent-observable `last_update_age()`.

use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

mod mmap_counter;
mod tempfile_counter;

pub use mmap_counter::MmapCounter;
pub use tempfile_counter::TempFileCounter;

/// Selects which shared-state mechanism backs a [`LivenessCounter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessMode {
    Mmap,
    TempFile,
}

/// A worker's liveness counter, created by the arbiter before forking
/// the worker that will own it.
#[derive(Debug)]
pub enum LivenessCounter {
    Mmap(MmapCounter),
    TempFile(TempFileCounter),
}

impl LivenessCounter {
    /// Create a counter using the requested mode.
    pub fn create(mode: LivenessMode) -> io::Result<Self> {
        match mode {
            LivenessMode::Mmap => Ok(Self::Mmap(MmapCounter::create()?)),
            LivenessMode::TempFile => Ok(Self::TempFile(TempFileCounter::create()?)),
        }
    }

    /// Try the preferred mmap mode; fall back to the temp-file mode if
    /// the platform refuses the anonymous mapping.
    pub fn create_preferred() -> io::Result<Self> {
        match MmapCounter::create() {
            Ok(counter) => Ok(Self::Mmap(counter)),
            Err(_) => Ok(Self::TempFile(TempFileCounter::create()?)),
        }
    }

    /// Advance the counter to a value strictly greater than any
    /// previously observed. Called from the worker's fast path: must not
    /// cost more than a memory write (mmap mode) or a single syscall
    /// (temp-file mode).
    pub fn notify(&self) {
        match self {
            Self::Mmap(c) => c.notify(),
            Self::TempFile(c) => c.notify(),
        }
    }

    /// Age, in seconds, since the last `notify()` — `None` if the
    /// counter has never been notified yet.
    pub fn last_update_age(&self) -> Option<Duration> {
        match self {
            Self::Mmap(c) => c.last_update_age(),
            Self::TempFile(c) => c.last_update_age(),
        }
    }
}

fn now_secs() -> i32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs() as i32
}

fn age_since(stamp: i32) -> Duration {
    let now = now_secs();
    let delta = now.saturating_sub(stamp);
    Duration::from_secs(delta.max(0) as u64)
}

/// Shared helper: an `AtomicI32` living at a raw pointer, used by the
/// mmap backend. Kept here so both backends can reuse `now_secs`/`age_since`.
pub(crate) fn atomic_at(ptr: *mut i32) -> &'static AtomicI32 {
    // SAFETY: callers guarantee `ptr` points at a live, properly aligned
    // `i32`-sized shared mapping for the lifetime of the counter.
    unsafe { &*ptr.cast::<AtomicI32>() }
}

pub(crate) fn raw_fd(file: &File) -> RawFd {
    file.as_raw_fd()
}
