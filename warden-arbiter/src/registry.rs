//! The arbiter's worker bookkeeping (SPEC_FULL.md §3, §4.1): one entry per
//! live child, keyed by the stable [`WorkerId`] rather than the OS pid
//! (SPEC_FULL.md §9: "do not attempt to reuse pids as identifiers").

use std::collections::HashMap;
use std::time::Duration;

use warden_core::{Generation, WorkerId, WorkerRecord, WorkerState};
use warden_liveness::LivenessCounter;

/// One tracked child: its bookkeeping record plus the read side of its
/// liveness counter.
pub struct TrackedWorker {
    pub record: WorkerRecord,
    pub liveness: LivenessCounter,
}

/// Live worker table plus pid → id lookup for reaping.
#[derive(Default)]
pub struct WorkerTable {
    workers: HashMap<WorkerId, TrackedWorker>,
}

impl WorkerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: WorkerId, worker: TrackedWorker) {
        self.workers.insert(id, worker);
    }

    pub fn remove(&mut self, id: WorkerId) -> Option<TrackedWorker> {
        self.workers.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn get(&self, id: WorkerId) -> Option<&TrackedWorker> {
        self.workers.get(&id)
    }

    pub fn get_mut(&mut self, id: WorkerId) -> Option<&mut TrackedWorker> {
        self.workers.get_mut(&id)
    }

    pub fn ids(&self) -> Vec<WorkerId> {
        self.workers.keys().copied().collect()
    }

    /// The worker id owning `pid`, if any — used to translate a reaped
    /// pid back into the stable id the rest of the arbiter tracks.
    pub fn id_for_pid(&self, pid: i32) -> Option<WorkerId> {
        self.workers
            .iter()
            .find(|(_, w)| w.record.pid == pid)
            .map(|(id, _)| *id)
    }

    pub fn ids_in_generation(&self, generation: Generation) -> Vec<WorkerId> {
        self.workers
            .iter()
            .filter(|(_, w)| w.record.generation == generation)
            .map(|(id, _)| *id)
            .collect()
    }

    /// The `n` oldest workers by spawn time, oldest first (SPEC_FULL.md
    /// §4.1: "terminates the oldest workers first").
    pub fn oldest_n(&self, n: usize) -> Vec<WorkerId> {
        let mut ids: Vec<(WorkerId, std::time::Instant)> = self
            .workers
            .iter()
            .map(|(id, w)| (*id, w.record.spawned_at))
            .collect();
        ids.sort_by_key(|(_, spawned_at)| *spawned_at);
        ids.into_iter().take(n).map(|(id, _)| id).collect()
    }

    /// Same as [`Self::oldest_n`], restricted to one generation — used
    /// for scale-down within the currently-serving generation, leaving
    /// any already-draining generation untouched.
    pub fn oldest_n_in_generation(&self, generation: Generation, n: usize) -> Vec<WorkerId> {
        let mut ids: Vec<(WorkerId, std::time::Instant)> = self
            .workers
            .iter()
            .filter(|(_, w)| w.record.generation == generation)
            .map(|(id, w)| (*id, w.record.spawned_at))
            .collect();
        ids.sort_by_key(|(_, spawned_at)| *spawned_at);
        ids.into_iter().take(n).map(|(id, _)| id).collect()
    }

    /// Workers whose liveness counter has not advanced within `timeout`,
    /// oldest-stale-first (SPEC_FULL.md §4.1: "kill order is by age
    /// ascending (oldest first)" — here "age" is how long the worker has
    /// been stale, so the worker stuck longest is killed first).
    pub fn stale(&self, timeout: Duration) -> Vec<WorkerId> {
        let mut stale: Vec<(WorkerId, Duration)> = self
            .workers
            .iter()
            .filter_map(|(id, w)| {
                let age = w.liveness.last_update_age().unwrap_or(w.record.age());
                (age > timeout).then_some((*id, age))
            })
            .collect();
        stale.sort_by_key(|(_, age)| std::cmp::Reverse(*age));
        stale.into_iter().map(|(id, _)| id).collect()
    }

    pub fn mark_state(&mut self, id: WorkerId, state: WorkerState) {
        if let Some(worker) = self.workers.get_mut(&id) {
            worker.record.state = state;
        }
    }
}
