//! Arbiter signal handling (SPEC_FULL.md §4.1, §4.5, §6): a `sigaction`
//! handler per signal in [`ArbiterSignal::RAW_SIGNALS`], draining into a
//! bounded queue the main loop polls once per supervisory tick.

use warden_core::{ArbiterSignal, SignalQueue};

static QUEUE: SignalQueue = SignalQueue::new();

/// Install handlers for every signal the arbiter understands. Must run
/// before the first fork so children start from a known disposition,
/// which the worker then resets for SIGCHLD (SPEC_FULL.md §6).
pub fn install() {
    for &sig in ArbiterSignal::RAW_SIGNALS {
        set_handler(sig, handle as *const () as libc::sighandler_t);
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

/// Drain pending signals into their arbiter-level semantics, in arrival
/// order (SPEC_FULL.md §4.5: "drains the queue ... dispatches each").
pub fn drain() -> Vec<ArbiterSignal> {
    QUEUE.drain().into_iter().filter_map(ArbiterSignal::from_raw).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_maps_pushed_signals() {
        QUEUE.push(libc::SIGHUP);
        QUEUE.push(libc::SIGPIPE);
        let drained = drain();
        assert_eq!(drained, vec![ArbiterSignal::Reload]);
    }
}
