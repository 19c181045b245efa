//! Everything a worker needs once it's past `fork()` (SPEC_FULL.md §4.2,
//! §4.3): the inherited listener set, its own liveness counter, the
//! application to invoke, and the configuration generation it was
//! spawned under.

use std::sync::Arc;

use warden_core::ConfigSnapshot;
use warden_http::AppHandler;
use warden_liveness::LivenessCounter;

use crate::listener::Listener;

pub struct WorkerContext {
    pub listeners: Vec<Listener>,
    pub liveness: LivenessCounter,
    pub app: Arc<dyn AppHandler>,
    pub config: Arc<ConfigSnapshot>,
    /// The arbiter's pid at spawn time; used to detect re-parenting onto
    /// init after an exec reload (SPEC_FULL.md §4.6b).
    pub original_parent_pid: i32,
}
