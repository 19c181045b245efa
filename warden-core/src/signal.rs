//! Signal name → semantic mapping (SPEC_FULL.md §6).
//!
//! Two small enums translate raw signal numbers into the actions the
//! arbiter and the worker understand; everything else is ignored.

/// Signals meaningful to the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterSignal {
    Reload,
    ExecReload,
    IncreaseWorkers,
    DecreaseWorkers,
    GracefulStop,
    HardStop,
    GracefulStopWorkers,
    Reap,
    ReopenLogs,
}

impl ArbiterSignal {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            libc::SIGHUP => Some(Self::Reload),
            libc::SIGUSR2 => Some(Self::ExecReload),
            libc::SIGTTIN => Some(Self::IncreaseWorkers),
            libc::SIGTTOU => Some(Self::DecreaseWorkers),
            libc::SIGQUIT => Some(Self::GracefulStop),
            libc::SIGINT | libc::SIGTERM => Some(Self::HardStop),
            libc::SIGWINCH => Some(Self::GracefulStopWorkers),
            libc::SIGCHLD => Some(Self::Reap),
            libc::SIGUSR1 => Some(Self::ReopenLogs),
            _ => None,
        }
    }

    /// Every raw signal number the arbiter installs a handler for.
    pub const RAW_SIGNALS: &'static [i32] = &[
        libc::SIGHUP,
        libc::SIGUSR2,
        libc::SIGTTIN,
        libc::SIGTTOU,
        libc::SIGQUIT,
        libc::SIGINT,
        libc::SIGTERM,
        libc::SIGWINCH,
        libc::SIGCHLD,
        libc::SIGUSR1,
    ];
}

/// Signals meaningful to a worker (SPEC_FULL.md §6: "All others are
/// ignored. The worker must NOT inherit the arbiter's SIGCHLD handler.").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSignal {
    Graceful,
    GracefulShort,
    Immediate,
    ReopenLogs,
}

impl WorkerSignal {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            libc::SIGQUIT => Some(Self::Graceful),
            libc::SIGTERM => Some(Self::GracefulShort),
            libc::SIGINT => Some(Self::Immediate),
            libc::SIGUSR1 => Some(Self::ReopenLogs),
            _ => None,
        }
    }

    pub const RAW_SIGNALS: &'static [i32] = &[
        libc::SIGQUIT,
        libc::SIGTERM,
        libc::SIGINT,
        libc::SIGUSR1,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hup_maps_to_reload() {
        assert_eq!(ArbiterSignal::from_raw(libc::SIGHUP), Some(ArbiterSignal::Reload));
    }

    #[test]
    fn int_and_term_both_map_to_hard_stop() {
        assert_eq!(ArbiterSignal::from_raw(libc::SIGINT), Some(ArbiterSignal::HardStop));
        assert_eq!(ArbiterSignal::from_raw(libc::SIGTERM), Some(ArbiterSignal::HardStop));
    }

    #[test]
    fn unmapped_signal_is_ignored_by_arbiter() {
        assert_eq!(ArbiterSignal::from_raw(libc::SIGPIPE), None);
    }

    #[test]
    fn worker_term_is_graceful_with_short_budget() {
        assert_eq!(WorkerSignal::from_raw(libc::SIGTERM), Some(WorkerSignal::GracefulShort));
    }

    #[test]
    fn worker_does_not_map_chld() {
        assert_eq!(WorkerSignal::from_raw(libc::SIGCHLD), None);
    }
}
