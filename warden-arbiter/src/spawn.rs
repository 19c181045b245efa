//! Forking and handing off to a worker loop (SPEC_FULL.md §4.1 "Spawn"):
//! the liveness counter is created before `fork(2)` so both processes
//! inherit a view onto the same shared state, and pid registration is
//! made atomic w.r.t. reaping by blocking SIGCHLD around the fork.

use std::sync::Arc;

use nix::sys::signal::{sigprocmask, SigSet, SigmaskHow, Signal};
use nix::unistd::{fork, ForkResult};
use tracing::error;

use warden_core::{ConfigSnapshot, Generation, WorkerId, WorkerRecord};
use warden_http::AppHandler;
use warden_liveness::LivenessCounter;
use warden_worker::{Listener, WorkerContext};

use crate::error::ArbiterError;
use crate::registry::TrackedWorker;

/// Fork one worker under `config`/`generation`. On success, returns the
/// parent-side bookkeeping; the child never returns — it runs the worker
/// loop to completion and calls `_exit`.
pub fn spawn_worker(
    id: WorkerId,
    generation: Generation,
    listeners: &[Listener],
    app: Arc<dyn AppHandler>,
    config: Arc<ConfigSnapshot>,
    arbiter_pid: i32,
) -> Result<TrackedWorker, ArbiterError> {
    let liveness = LivenessCounter::create_preferred().map_err(ArbiterError::Io)?;
    let worker_listeners = listeners
        .iter()
        .map(Listener::try_clone)
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(ArbiterError::Bind)?;

    let mut blocked = SigSet::empty();
    blocked.add(Signal::SIGCHLD);
    let mut old_mask = SigSet::empty();
    sigprocmask(SigmaskHow::SIG_BLOCK, Some(&blocked), Some(&mut old_mask))
        .map_err(ArbiterError::Fork)?;

    // SAFETY: no other thread in this process forks or touches the
    // signal mask concurrently; the child's only path out is `_exit`.
    let fork_result = unsafe { fork() }.map_err(ArbiterError::Fork)?;

    match fork_result {
        ForkResult::Child => {
            // Restore the parent's mask so SIGCHLD delivery in *this*
            // process (should it ever spawn its own children) is not
            // permanently blocked; worker::signals::install() below
            // installs the worker's own handlers over this.
            let _ = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&old_mask), None);
            let class = config.worker_class;
            let ctx = WorkerContext {
                listeners: worker_listeners,
                liveness,
                app,
                config,
                original_parent_pid: arbiter_pid,
            };
            let code = match warden_worker::run(class, ctx) {
                Ok(()) => 0,
                Err(e) => {
                    error!("worker exited with error: {e}");
                    1
                }
            };
            // SAFETY: `_exit` is the correct way to leave a forked
            // child — it skips atexit handlers and shared stdio
            // flushing that could otherwise race with the parent.
            unsafe {
                libc::_exit(code);
            }
        }
        ForkResult::Parent { child } => {
            sigprocmask(SigmaskHow::SIG_SETMASK, Some(&old_mask), None)
                .map_err(ArbiterError::Fork)?;
            Ok(TrackedWorker {
                record: WorkerRecord::new(id, child.as_raw(), generation),
                liveness,
            })
        }
    }
}
