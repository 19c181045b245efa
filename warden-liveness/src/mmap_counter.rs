use std::io;
use std::ptr;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::{age_since, atomic_at, now_secs};

const NEVER_NOTIFIED: i32 = i32::MIN;

/// An anonymous `MAP_SHARED` page holding one `i32`, written with an
/// atomic store and read by the parent without locking (SPEC_FULL.md
/// §4.4: "atomic counter mode").
///
/// Must be created *before* `fork(2)`: the mapping is then duplicated
/// into the child's address space at the same virtual address, so no
/// explicit handle-passing between arbiter and worker is needed.
#[derive(Debug)]
pub struct MmapCounter {
    ptr: *mut i32,
    len: usize,
}

// The pointer refers to a page shared at the OS level, not ordinary heap
// memory; all access goes through `AtomicI32`, so cross-process
// (and, if ever needed, cross-thread) access is sound.
unsafe impl Send for MmapCounter {}
unsafe impl Sync for MmapCounter {}

impl MmapCounter {
    pub fn create() -> io::Result<Self> {
        let len = std::mem::size_of::<i32>();
        // SAFETY: requesting an anonymous, shared mapping with no backing
        // fd; the returned pointer is checked against MAP_FAILED below.
        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let ptr = raw.cast::<i32>();
        atomic_at(ptr).store(NEVER_NOTIFIED, Ordering::SeqCst);
        Ok(Self { ptr, len })
    }

    pub fn notify(&self) {
        atomic_at(self.ptr).store(now_secs(), Ordering::SeqCst);
    }

    pub fn last_update_age(&self) -> Option<Duration> {
        let stamp = atomic_at(self.ptr).load(Ordering::SeqCst);
        if stamp == NEVER_NOTIFIED {
            None
        } else {
            Some(age_since(stamp))
        }
    }
}

impl Drop for MmapCounter {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` are exactly what `mmap` returned/was asked
        // for in `create`. Unmapping only affects this process's view.
        unsafe {
            libc::munmap(self.ptr.cast(), self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_advances_past_the_sentinel() {
        let counter = MmapCounter::create().unwrap();
        assert!(counter.last_update_age().is_none());
        counter.notify();
        assert!(counter.last_update_age().is_some());
    }

    #[test]
    fn repeated_notify_keeps_age_small() {
        let counter = MmapCounter::create().unwrap();
        counter.notify();
        counter.notify();
        assert!(counter.last_update_age().unwrap() < Duration::from_secs(1));
    }
}
