//! The two worker loop implementations (SPEC_FULL.md §4.2, §4.3, C4): a
//! synchronous accept loop and a cooperative, `tokio`-backed loop,
//! selected by [`warden_core::WorkerClass`] and sharing the same
//! [`WorkerContext`].

pub mod access_log;
pub mod async_worker;
pub mod context;
pub mod error;
pub mod listener;
pub mod signals;
pub mod sync_worker;

pub use context::WorkerContext;
pub use error::WorkerError;
pub use listener::{Connection, Listener};

use warden_core::WorkerClass;

/// Dispatch to the worker loop matching `class`.
pub fn run(class: WorkerClass, ctx: WorkerContext) -> Result<(), WorkerError> {
    match class {
        WorkerClass::Sync => sync_worker::run(ctx),
        WorkerClass::Async => async_worker::run(ctx),
    }
}
