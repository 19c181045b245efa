//! Shared data model for the arbiter/worker lifecycle: configuration,
//! worker bookkeeping, the pidfile, and the error taxonomy.

pub mod config;
pub mod error;
pub mod pidfile;
pub mod signal;
pub mod signal_queue;
pub mod worker_record;

pub use config::{BindAddress, ConfigSnapshot, RawConfig, WorkerClass};
pub use error::{ConfigError, CoreError};
pub use pidfile::Pidfile;
pub use signal::{ArbiterSignal, WorkerSignal};
pub use signal_queue::SignalQueue;
pub use worker_record::{Generation, IdAllocator, WorkerId, WorkerRecord, WorkerState};
