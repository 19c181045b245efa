//! The arbiter (SPEC_FULL.md §4.1, C5): binds listeners, forks and
//! supervises workers, and turns signals into lifecycle transitions.
//! Grounded on the teacher's PID-1 reaper (`guest-init/src/main.rs` +
//! `src/pid1.rs`): a fork/wait/sigaction supervisory loop, generalized
//! here from "one watched child" to "a target headcount of workers,
//! reconciled every tick".

pub mod error;
pub mod listeners;
pub mod privs;
pub mod reload;
pub mod registry;
pub mod signals;
pub mod spawn;
pub mod state;

use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, error, info, warn};

use warden_core::{
    ArbiterSignal, ConfigError, ConfigSnapshot, Generation, IdAllocator, Pidfile, WorkerId,
    WorkerState,
};
use warden_http::AppHandler;
use warden_worker::Listener;

pub use error::ArbiterError;
pub use registry::{TrackedWorker, WorkerTable};
pub use state::ArbiterState;

/// Upper bound on the supervisory sleep between ticks (SPEC_FULL.md §5:
/// "a supervisory timeout ≤1 s").
const SUPERVISORY_TICK: Duration = Duration::from_millis(250);

/// Re-runs the merge-and-validate configuration pipeline from scratch
/// (SPEC_FULL.md §4.7); supplied by the binary so this crate stays
/// agnostic of where configuration actually comes from (CLI/file path).
pub type ReloadFn = Box<dyn FnMut() -> Result<ConfigSnapshot, ConfigError> + Send>;

struct Draining {
    generation: Generation,
    deadline: Instant,
}

/// Reopens the arbiter's own file-backed log sink in place (SPEC_FULL.md
/// §4.8, §6 "reopen logs"); supplied by the binary, which owns the
/// `tracing` subscriber this crate never constructs itself.
pub type ReopenLogsFn = Box<dyn FnMut() + Send>;

pub struct Arbiter {
    /// A fresh id per arbiter process, independent of pid reuse, for
    /// correlating log lines across an exec reload (teacher pattern:
    /// `sandbox-fc/src/factory.rs`'s `Uuid::new_v4()` per spawned
    /// instance).
    instance_id: uuid::Uuid,
    pid: i32,
    config: Arc<ConfigSnapshot>,
    app: Arc<dyn AppHandler>,
    listeners: Vec<Listener>,
    workers: WorkerTable,
    ids: IdAllocator,
    generation: Generation,
    target: u32,
    state: ArbiterState,
    pidfile: Option<Pidfile>,
    draining: Vec<Draining>,
    stop_deadline: Option<Instant>,
    reload_fn: Option<ReloadFn>,
    on_reopen_logs: Option<ReopenLogsFn>,
}

impl Arbiter {
    /// Bind listeners (or adopt them across an exec reload), drop
    /// privileges, and install signal handlers. Nothing is forked yet and
    /// the pidfile is not acquired yet (SPEC_FULL.md §8: absent in INIT
    /// before fork) — that happens in [`Self::run`].
    pub fn new(
        config: ConfigSnapshot,
        app: Arc<dyn AppHandler>,
        reload_fn: Option<ReloadFn>,
        on_reopen_logs: Option<ReopenLogsFn>,
    ) -> Result<Self, ArbiterError> {
        let pid = nix::unistd::getpid().as_raw();

        let listeners = match std::env::var(listeners::LISTEN_FDS_VAR) {
            Ok(raw) => {
                let fds = listeners::decode_listen_fds(&raw);
                listeners::adopt_inherited(&fds).map_err(ArbiterError::Bind)?
            }
            Err(_) => listeners::bind_all(&config.bind)?,
        };

        privs::apply(config.user.as_deref(), config.group.as_deref(), config.umask)?;

        signals::install();

        let mut ids = IdAllocator::new();
        let generation = ids.next_generation();
        let target = config.workers;

        Ok(Self {
            instance_id: uuid::Uuid::new_v4(),
            pid,
            config: Arc::new(config),
            app,
            listeners,
            workers: WorkerTable::new(),
            ids,
            generation,
            target,
            state: ArbiterState::Init,
            pidfile: None,
            draining: Vec::new(),
            stop_deadline: None,
            reload_fn,
            on_reopen_logs,
        })
    }

    /// Run to completion: bring the initial generation up to `target`,
    /// acquire the pidfile now that the first workers are live, then loop
    /// draining signals, reaping, killing stale workers, and reconciling
    /// headcount until a stop signal drives the arbiter to `HALTED`
    /// (SPEC_FULL.md §4.1 "Main loop").
    pub fn run(mut self) -> Result<(), ArbiterError> {
        self.scale_up(self.target as usize)?;
        if let Some(path) = self.config.pidfile.clone() {
            self.pidfile = Some(Pidfile::acquire(path, self.pid)?);
        }
        self.state = ArbiterState::Running;
        info!(instance = %self.instance_id, target = self.target, "arbiter running");

        while self.state != ArbiterState::Halted {
            for signal in signals::drain() {
                self.handle_signal(signal)?;
            }
            self.reap();
            self.kill_stale();
            self.service_draining();

            if matches!(self.state, ArbiterState::Running | ArbiterState::Reloading) {
                self.converge_target()?;
            }

            if self.state == ArbiterState::Stopping {
                self.service_stop();
            }

            if self.state != ArbiterState::Halted {
                std::thread::sleep(SUPERVISORY_TICK);
            }
        }

        if let Some(pidfile) = self.pidfile.take() {
            pidfile.remove()?;
        }
        info!("arbiter halted");
        Ok(())
    }

    fn handle_signal(&mut self, signal: ArbiterSignal) -> Result<(), ArbiterError> {
        match signal {
            ArbiterSignal::IncreaseWorkers => {
                self.target += 1;
                info!(target = self.target, "increased worker target");
            }
            ArbiterSignal::DecreaseWorkers => {
                self.target = self.target.saturating_sub(1).max(1);
                info!(target = self.target, "decreased worker target");
            }
            ArbiterSignal::Reload => self.soft_reload()?,
            ArbiterSignal::ExecReload => self.exec_reload(),
            ArbiterSignal::GracefulStop => self.begin_stop(Signal::SIGQUIT),
            ArbiterSignal::HardStop => self.begin_stop(Signal::SIGTERM),
            ArbiterSignal::GracefulStopWorkers => self.stop_generation(self.generation, Signal::SIGQUIT),
            ArbiterSignal::Reap => {}
            ArbiterSignal::ReopenLogs => {
                debug!("reopening the arbiter's own log sink");
                if let Some(reopen) = self.on_reopen_logs.as_mut() {
                    reopen();
                }
            }
        }
        Ok(())
    }

    /// SPEC_FULL.md §4.6a: spawn a fresh generation under newly merged
    /// configuration, then ask the previous generation to drain.
    fn soft_reload(&mut self) -> Result<(), ArbiterError> {
        let Some(reload_fn) = self.reload_fn.as_mut() else {
            warn!("reload requested but no reload source is configured; ignoring");
            return Ok(());
        };
        let new_config = match reload_fn() {
            Ok(config) => config,
            Err(e) => {
                error!("reload aborted, keeping the running generation: {e}");
                return Ok(());
            }
        };

        // Listen addresses are part of the per-generation snapshot
        // (SPEC_FULL.md §3); rebind only if they actually changed, so the
        // common case (reload for unrelated config) never risks
        // `EADDRINUSE` against the still-open old-generation sockets.
        if new_config.bind != self.config.bind {
            match listeners::bind_all(&new_config.bind) {
                Ok(new_listeners) => self.listeners = new_listeners,
                Err(e) => {
                    error!("reload aborted, new bind addresses rejected: {e}");
                    return Ok(());
                }
            }
        }

        let old_generation = self.generation;
        self.config = Arc::new(new_config);
        self.generation = self.ids.next_generation();
        self.target = self.config.workers;
        self.state = ArbiterState::Reloading;
        info!(generation = self.generation.0, "starting new generation");

        self.scale_up(self.target as usize)?;
        self.stop_generation(old_generation, Signal::SIGQUIT);
        self.draining.push(Draining {
            generation: old_generation,
            deadline: Instant::now() + Duration::from_secs(self.config.graceful_timeout),
        });
        Ok(())
    }

    /// SPEC_FULL.md §4.6b: exec ourselves with the listener fds
    /// preserved. Only returns (to the caller) on failure.
    fn exec_reload(&mut self) {
        match reload::exec_reload(&self.listeners) {
            Ok(never) => match never {},
            Err(e) => error!("exec reload failed, continuing under the current image: {e}"),
        }
    }

    fn begin_stop(&mut self, worker_signal: Signal) {
        self.state = ArbiterState::Stopping;
        self.stop_deadline = Some(Instant::now() + Duration::from_secs(self.config.graceful_timeout));
        for generation in self.generations_in_flight() {
            self.stop_generation(generation, worker_signal);
        }
        info!("stopping all workers");
    }

    fn generations_in_flight(&self) -> Vec<Generation> {
        let mut gens = vec![self.generation];
        gens.extend(self.draining.iter().map(|d| d.generation));
        gens
    }

    fn stop_generation(&mut self, generation: Generation, sig: Signal) {
        for id in self.workers.ids_in_generation(generation) {
            self.signal_worker(id, sig);
            self.workers.mark_state(id, WorkerState::Stopping);
        }
    }

    fn signal_worker(&self, id: WorkerId, sig: Signal) {
        let Some(worker) = self.workers.get(id) else {
            return;
        };
        if let Err(e) = kill(Pid::from_raw(worker.record.pid), sig) {
            debug!(pid = worker.record.pid, "signal delivery failed (likely already exited): {e}");
        }
    }

    /// Non-blocking reap of every exited child (SPEC_FULL.md §4.1 step 2).
    fn reap(&mut self) {
        loop {
            let status = match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(status) => status,
                Err(_) => break,
            };
            let (pid, exited) = match status {
                WaitStatus::Exited(pid, code) => (pid, Some(code)),
                WaitStatus::Signaled(pid, sig, _) => (pid, Some(128 + sig as i32)),
                _ => break,
            };
            let Some(id) = self.workers.id_for_pid(pid.as_raw()) else {
                continue;
            };
            self.workers.remove(id);
            info!(pid = pid.as_raw(), code = exited, "worker exited");
        }
    }

    /// Kill workers whose liveness counter has gone stale beyond
    /// `timeout` (SPEC_FULL.md §3 invariant, §4.1 step 3).
    fn kill_stale(&mut self) {
        let timeout = Duration::from_secs(self.config.timeout);
        for id in self.workers.stale(timeout) {
            if let Some(worker) = self.workers.get(id) {
                warn!(pid = worker.record.pid, "worker liveness timed out, killing");
                let _ = kill(Pid::from_raw(worker.record.pid), Signal::SIGKILL);
            }
        }
    }

    /// Bring the current generation up to `target`, or ask the oldest
    /// excess workers to exit if over it (SPEC_FULL.md §4.1 steps 4-5).
    fn converge_target(&mut self) -> Result<(), ArbiterError> {
        let alive = self.workers.ids_in_generation(self.generation).len();
        let target = self.target as usize;
        if alive < target {
            self.scale_up(target - alive)?;
        } else if alive > target {
            let to_stop = self.workers.oldest_n_in_generation(self.generation, alive - target);
            for id in to_stop {
                self.signal_worker(id, Signal::SIGQUIT);
                self.workers.mark_state(id, WorkerState::Stopping);
            }
        }
        Ok(())
    }

    fn scale_up(&mut self, n: usize) -> Result<(), ArbiterError> {
        for _ in 0..n {
            let id = self.ids.next_worker_id();
            let worker = spawn::spawn_worker(
                id,
                self.generation,
                &self.listeners,
                self.app.clone(),
                self.config.clone(),
                self.pid,
            )?;
            info!(pid = worker.record.pid, "spawned worker");
            self.workers.insert(id, worker);
        }
        Ok(())
    }

    /// SIGKILL any draining generation past its `graceful_timeout`
    /// deadline, and drop generations that have fully drained
    /// (SPEC_FULL.md §4.6a).
    fn service_draining(&mut self) {
        let mut remaining = Vec::new();
        for entry in std::mem::take(&mut self.draining) {
            let ids = self.workers.ids_in_generation(entry.generation);
            if ids.is_empty() {
                continue;
            }
            if Instant::now() >= entry.deadline {
                for id in &ids {
                    self.signal_worker(*id, Signal::SIGKILL);
                }
            } else {
                remaining.push(entry);
            }
        }
        self.draining = remaining;
        if self.state == ArbiterState::Reloading && self.draining.is_empty() {
            self.state = ArbiterState::Running;
            info!("reload complete");
        }
    }

    /// SPEC_FULL.md §4.1 STOPPING→HALTED: escalate to SIGKILL once
    /// `graceful_timeout` elapses, and transition once every child is
    /// reaped.
    fn service_stop(&mut self) {
        if self.workers.is_empty() {
            self.state = ArbiterState::Halted;
            return;
        }
        if let Some(deadline) = self.stop_deadline {
            if Instant::now() >= deadline {
                for id in self.workers.ids() {
                    self.signal_worker(id, Signal::SIGKILL);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{BindAddress, RawConfig, WorkerRecord};

    fn tracked(pid: i32, generation: Generation) -> TrackedWorker {
        TrackedWorker {
            record: WorkerRecord {
                id: WorkerId(0),
                pid,
                generation,
                spawned_at: Instant::now(),
                state: WorkerState::Running,
            },
            liveness: warden_liveness::LivenessCounter::create_preferred().unwrap(),
        }
    }

    fn snapshot(bind: &str) -> ConfigSnapshot {
        let mut raw = RawConfig::default();
        raw.bind = Some(vec![bind.to_string()]);
        raw.into_snapshot(0).unwrap()
    }

    /// A bare arbiter with no real listeners, bypassing `Arbiter::new`'s
    /// bind/privs/signal-install side effects so the state machine can be
    /// driven directly. No worker is ever actually forked by these tests.
    fn test_arbiter(target: u32) -> Arbiter {
        let config = snapshot("127.0.0.1:0");
        Arbiter {
            instance_id: uuid::Uuid::new_v4(),
            pid: std::process::id() as i32,
            config: Arc::new(config),
            app: Arc::new(warden_http::EchoApp),
            listeners: Vec::new(),
            workers: WorkerTable::new(),
            ids: IdAllocator::new(),
            generation: Generation(0),
            target,
            state: ArbiterState::Running,
            pidfile: None,
            draining: Vec::new(),
            stop_deadline: None,
            reload_fn: None,
            on_reopen_logs: None,
        }
    }

    #[test]
    fn handle_signal_adjusts_worker_target() {
        let mut arbiter = test_arbiter(2);
        arbiter.handle_signal(ArbiterSignal::IncreaseWorkers).unwrap();
        assert_eq!(arbiter.target, 3);
        arbiter.handle_signal(ArbiterSignal::DecreaseWorkers).unwrap();
        assert_eq!(arbiter.target, 2);
    }

    #[test]
    fn handle_signal_decrease_never_drops_target_below_one() {
        let mut arbiter = test_arbiter(1);
        arbiter.handle_signal(ArbiterSignal::DecreaseWorkers).unwrap();
        assert_eq!(arbiter.target, 1);
    }

    #[test]
    fn handle_signal_reopen_logs_invokes_the_hook() {
        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = called.clone();
        let mut arbiter = test_arbiter(1);
        arbiter.on_reopen_logs = Some(Box::new(move || flag.store(true, std::sync::atomic::Ordering::SeqCst)));
        arbiter.handle_signal(ArbiterSignal::ReopenLogs).unwrap();
        assert!(called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn soft_reload_without_a_reload_source_is_a_noop() {
        let mut arbiter = test_arbiter(1);
        let before = arbiter.generation;
        arbiter.handle_signal(ArbiterSignal::Reload).unwrap();
        assert_eq!(arbiter.generation, before);
    }

    #[test]
    fn soft_reload_aborts_when_the_new_bind_address_fails_to_bind() {
        let mut arbiter = test_arbiter(1);
        let before_generation = arbiter.generation;
        arbiter.reload_fn = Some(Box::new(|| Ok(snapshot("unix:/nonexistent-dir-for-warden-tests/warden.sock"))));

        arbiter.handle_signal(ArbiterSignal::Reload).unwrap();

        assert_eq!(arbiter.generation, before_generation);
        assert!(arbiter.listeners.is_empty());
        assert_eq!(arbiter.config.bind, vec![BindAddress::parse("127.0.0.1:0").unwrap()]);
    }

    #[test]
    fn converge_target_scales_down_the_oldest_worker_first() {
        let mut arbiter = test_arbiter(1);
        arbiter.workers.insert(WorkerId(0), tracked(999_001, Generation(0)));
        std::thread::sleep(Duration::from_millis(5));
        arbiter.workers.insert(WorkerId(1), tracked(999_002, Generation(0)));

        arbiter.converge_target().unwrap();

        assert_eq!(arbiter.workers.get(WorkerId(0)).unwrap().record.state, WorkerState::Stopping);
        assert_eq!(arbiter.workers.get(WorkerId(1)).unwrap().record.state, WorkerState::Running);
    }

    #[test]
    fn converge_target_is_a_noop_when_already_at_target() {
        let mut arbiter = test_arbiter(1);
        arbiter.workers.insert(WorkerId(0), tracked(999_003, Generation(0)));

        arbiter.converge_target().unwrap();

        assert_eq!(arbiter.workers.get(WorkerId(0)).unwrap().record.state, WorkerState::Running);
    }

    #[test]
    fn service_draining_drops_a_generation_with_no_workers_left() {
        let mut arbiter = test_arbiter(1);
        arbiter.draining.push(Draining {
            generation: Generation(5),
            deadline: Instant::now() + Duration::from_secs(30),
        });

        arbiter.service_draining();

        assert!(arbiter.draining.is_empty());
    }

    #[test]
    fn service_draining_keeps_an_entry_before_its_deadline() {
        let mut arbiter = test_arbiter(1);
        let generation = Generation(0);
        arbiter.workers.insert(WorkerId(0), tracked(999_004, generation));
        arbiter.draining.push(Draining {
            generation,
            deadline: Instant::now() + Duration::from_secs(30),
        });

        arbiter.service_draining();

        assert_eq!(arbiter.draining.len(), 1);
    }

    #[test]
    fn service_draining_escalates_past_deadline_and_completes_a_reload() {
        let mut arbiter = test_arbiter(1);
        arbiter.state = ArbiterState::Reloading;
        let generation = Generation(0);
        arbiter.workers.insert(WorkerId(0), tracked(999_005, generation));
        arbiter.draining.push(Draining {
            generation,
            deadline: Instant::now() - Duration::from_secs(1),
        });

        arbiter.service_draining();

        assert!(arbiter.draining.is_empty());
        assert_eq!(arbiter.state, ArbiterState::Running);
    }

    #[test]
    fn service_stop_halts_once_every_worker_is_gone() {
        let mut arbiter = test_arbiter(0);
        arbiter.state = ArbiterState::Stopping;

        arbiter.service_stop();

        assert_eq!(arbiter.state, ArbiterState::Halted);
    }

    #[test]
    fn service_stop_escalates_to_sigkill_past_the_deadline_without_halting_early() {
        let mut arbiter = test_arbiter(1);
        arbiter.workers.insert(WorkerId(0), tracked(999_006, Generation(0)));
        arbiter.state = ArbiterState::Stopping;
        arbiter.stop_deadline = Some(Instant::now() - Duration::from_secs(1));

        arbiter.service_stop();

        assert_eq!(arbiter.state, ArbiterState::Stopping);
    }
}
