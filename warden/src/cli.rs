//! The CLI surface (SPEC_FULL.md §6): every flag has an equivalent config
//! key, and is merged over an optional config file the same way
//! `warden_core::RawConfig` merges any other source.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "warden", version, about = "A pre-fork HTTP/1.1 arbiter/worker server")]
pub struct Cli {
    /// Listen address (`host:port` or `unix:/path`); repeatable.
    #[arg(long = "bind")]
    pub bind: Vec<String>,

    /// Initial worker headcount.
    #[arg(long)]
    pub workers: Option<u32>,

    /// Worker loop implementation: "sync" or "async".
    #[arg(long = "worker-class")]
    pub worker_class: Option<String>,

    /// Hard liveness bound, in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Drain bound on stop/reload, in seconds.
    #[arg(long = "graceful-timeout")]
    pub graceful_timeout: Option<u64>,

    /// Per-connection idle bound, in seconds.
    #[arg(long = "keep-alive")]
    pub keep_alive: Option<u64>,

    /// Per-worker voluntary recycle threshold; 0 disables.
    #[arg(long = "max-requests")]
    pub max_requests: Option<u32>,

    /// Concurrent connection cap for cooperative workers.
    #[arg(long = "worker-connections")]
    pub worker_connections: Option<u32>,

    /// Pidfile path.
    #[arg(long)]
    pub pidfile: Option<PathBuf>,

    /// Drop privileges to this user after binding.
    #[arg(long)]
    pub user: Option<String>,

    /// Drop privileges to this group after binding.
    #[arg(long)]
    pub group: Option<String>,

    /// Umask applied before binding, as an octal string (e.g. "022").
    #[arg(long)]
    pub umask: Option<String>,

    /// Daemonize after startup.
    #[arg(long)]
    pub daemon: bool,

    /// Enable soft reload on source change (out of core scope; accepted
    /// as a hook, no file watcher is started).
    #[arg(long)]
    pub reload: bool,

    /// Optional YAML config file, merged under CLI flags.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Tracing filter for the arbiter's own log stream (e.g. "info",
    /// "warden=debug").
    #[arg(long = "log-level")]
    pub log_level: Option<String>,

    /// Access log path; workers log to stderr if omitted.
    #[arg(long = "access-logfile")]
    pub access_logfile: Option<PathBuf>,

    /// Arbiter error log path; stderr if omitted.
    #[arg(long = "error-logfile")]
    pub error_logfile: Option<PathBuf>,
}
