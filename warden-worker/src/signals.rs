//! Worker signal handling (SPEC_FULL.md §4.2, §4.5, §6): install
//! `sigaction` handlers for the small set of signals a worker honors,
//! clear everything else — in particular the worker must not inherit
//! the arbiter's SIGCHLD handler.

use warden_core::{SignalQueue, WorkerSignal};

static QUEUE: SignalQueue = SignalQueue::new();

/// Install handlers for every signal in [`WorkerSignal::RAW_SIGNALS`] and
/// reset everything else the arbiter may have installed (SIGCHLD above
/// all) back to the default disposition.
pub fn install() {
    for &sig in WorkerSignal::RAW_SIGNALS {
        set_handler(sig, handle as *const () as libc::sighandler_t);
    }
    // SAFETY: SIG_DFL is a valid handler constant; SIGCHLD is reset so
    // the worker does not reap on the arbiter's behalf.
    unsafe {
        libc::signal(libc::SIGCHLD, libc::SIG_DFL);
    }
}

fn set_handler(sig: libc::c_int, handler: libc::sighandler_t) {
    // SAFETY: zeroed sigaction is a valid starting point; sa_sigaction
    // and sa_flags are filled before use.
    let mut sa: libc::sigaction = unsafe { std::mem::zeroed() };
    sa.sa_sigaction = handler;
    sa.sa_flags = libc::SA_RESTART;
    // SAFETY: `sa` is fully initialized and `sig` is a valid signal number.
    unsafe {
        libc::sigaction(sig, &sa, std::ptr::null_mut());
    }
}

extern "C" fn handle(sig: libc::c_int) {
    QUEUE.push(sig);
}

/// Drain pending signals into their worker-level semantics, in arrival
/// order. Unmapped raw numbers are dropped.
pub fn drain() -> Vec<WorkerSignal> {
    QUEUE.drain().into_iter().filter_map(WorkerSignal::from_raw).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_maps_pushed_signals() {
        QUEUE.push(libc::SIGQUIT);
        QUEUE.push(libc::SIGPIPE);
        let drained = drain();
        assert_eq!(drained, vec![WorkerSignal::Graceful]);
    }
}
