//! A bounded, async-signal-safe signal queue (SPEC_FULL.md §4.5, C2).
//!
//! The OS signal handler may only touch atomics: no allocation, no
//! locks, no syscalls beyond what the kernel already guarantees safe.
//! [`SignalQueue::push`] is the only method called from handler context;
//! [`SignalQueue::drain`] runs on the normal main-loop thread.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

/// Capacity 8 (SPEC_FULL.md §4.5: "Capacity 8 is sufficient; overflow is
/// a silent drop because signals are idempotent at this layer.").
const CAPACITY: usize = 8;

pub struct SignalQueue {
    slots: [AtomicI32; CAPACITY],
    head: AtomicUsize,
    tail: AtomicUsize,
}

impl SignalQueue {
    pub const fn new() -> Self {
        Self {
            slots: [const { AtomicI32::new(0) }; CAPACITY],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Append `sig` if there's room. Signal-handler safe.
    pub fn push(&self, sig: i32) {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail.wrapping_sub(head) >= CAPACITY {
            return;
        }
        let Some(slot) = self.slots.get(tail % CAPACITY) else {
            return;
        };
        slot.store(sig, Ordering::Relaxed);
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
    }

    /// Drain every queued signal in enqueue order. Not signal-handler
    /// safe — called from the main loop only.
    pub fn drain(&self) -> Vec<i32> {
        let mut out = Vec::new();
        loop {
            let head = self.head.load(Ordering::Relaxed);
            let tail = self.tail.load(Ordering::Acquire);
            if head == tail {
                break;
            }
            let Some(slot) = self.slots.get(head % CAPACITY) else {
                break;
            };
            out.push(slot.load(Ordering::Relaxed));
            self.head.store(head.wrapping_add(1), Ordering::Release);
        }
        out
    }
}

impl Default for SignalQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_enqueue_order() {
        let q = SignalQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.drain(), vec![1, 2, 3]);
    }

    #[test]
    fn drain_empties_the_queue() {
        let q = SignalQueue::new();
        q.push(1);
        q.drain();
        assert!(q.drain().is_empty());
    }

    #[test]
    fn overflow_beyond_capacity_is_silently_dropped() {
        let q = SignalQueue::new();
        for i in 0..(CAPACITY as i32 + 3) {
            q.push(i);
        }
        let drained = q.drain();
        assert_eq!(drained.len(), CAPACITY);
        assert_eq!(drained, (0..CAPACITY as i32).collect::<Vec<_>>());
    }
}
