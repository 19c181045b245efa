//! Configuration layer (SPEC_FULL.md §4.7): CLI flags merged over an
//! optional config file, merged over built-in defaults, validated once
//! into an immutable [`ConfigSnapshot`] before the first fork.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// A listen address: either a TCP socket or a Unix domain socket path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindAddress {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl BindAddress {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        if let Some(path) = raw.strip_prefix("unix:") {
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        raw.parse::<SocketAddr>()
            .map(Self::Tcp)
            .map_err(|_| ConfigError::InvalidBindAddress(raw.to_string()))
    }
}

impl std::fmt::Display for BindAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "{addr}"),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Worker loop implementation selector (SPEC_FULL.md §4.2 / §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerClass {
    Sync,
    Async,
}

impl WorkerClass {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "sync" => Ok(Self::Sync),
            "async" => Ok(Self::Async),
            other => Err(ConfigError::UnknownWorkerClass(other.to_string())),
        }
    }
}

impl Default for WorkerClass {
    fn default() -> Self {
        Self::Sync
    }
}

/// All-optional mirror of the CLI surface (SPEC_FULL.md §6), used as the
/// intermediate representation for the file < CLI merge.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawConfig {
    pub bind: Option<Vec<String>>,
    pub workers: Option<u32>,
    pub worker_class: Option<String>,
    pub timeout: Option<u64>,
    pub graceful_timeout: Option<u64>,
    pub keep_alive: Option<u64>,
    pub max_requests: Option<u32>,
    pub worker_connections: Option<u32>,
    pub pidfile: Option<PathBuf>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub umask: Option<u32>,
    pub daemon: Option<bool>,
    pub log_level: Option<String>,
    pub access_logfile: Option<PathBuf>,
    pub error_logfile: Option<PathBuf>,
}

impl RawConfig {
    /// Load from a YAML config file. Missing keys are left `None`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
                path: path.display().to_string(),
                source,
            })?;
        serde_yaml_ng::from_str(&content).map_err(|source| ConfigError::ParseFile {
            path: path.display().to_string(),
            source,
        })
    }

    /// Overlay `self` (e.g. CLI flags) on top of `base` (e.g. a config
    /// file): every `Some` field in `self` wins; `None` falls through.
    #[must_use]
    pub fn merge_over(self, base: RawConfig) -> RawConfig {
        RawConfig {
            bind: self.bind.or(base.bind),
            workers: self.workers.or(base.workers),
            worker_class: self.worker_class.or(base.worker_class),
            timeout: self.timeout.or(base.timeout),
            graceful_timeout: self.graceful_timeout.or(base.graceful_timeout),
            keep_alive: self.keep_alive.or(base.keep_alive),
            max_requests: self.max_requests.or(base.max_requests),
            worker_connections: self.worker_connections.or(base.worker_connections),
            pidfile: self.pidfile.or(base.pidfile),
            user: self.user.or(base.user),
            group: self.group.or(base.group),
            umask: self.umask.or(base.umask),
            daemon: self.daemon.or(base.daemon),
            log_level: self.log_level.or(base.log_level),
            access_logfile: self.access_logfile.or(base.access_logfile),
            error_logfile: self.error_logfile.or(base.error_logfile),
        }
    }

    /// Validate and collapse into an immutable snapshot, filling in
    /// built-in defaults for anything still unset.
    pub fn into_snapshot(self, generation: u64) -> Result<ConfigSnapshot, ConfigError> {
        let bind_raw = self.bind.unwrap_or_else(|| vec!["127.0.0.1:8000".into()]);
        let bind = bind_raw
            .iter()
            .map(|s| BindAddress::parse(s))
            .collect::<Result<Vec<_>, _>>()?;

        let workers = self.workers.unwrap_or(1);
        if workers == 0 {
            return Err(ConfigError::WorkerCountZero(workers));
        }

        let worker_class = match self.worker_class {
            Some(raw) => WorkerClass::parse(&raw)?,
            None => WorkerClass::default(),
        };

        let timeout = self.timeout.unwrap_or(30);
        if timeout == 0 {
            return Err(ConfigError::NonPositiveTimeout("timeout"));
        }
        let graceful_timeout = self.graceful_timeout.unwrap_or(30);
        if graceful_timeout == 0 {
            return Err(ConfigError::NonPositiveTimeout("graceful_timeout"));
        }
        let keep_alive = self.keep_alive.unwrap_or(2);

        Ok(ConfigSnapshot {
            generation,
            bind,
            workers,
            worker_class,
            timeout,
            graceful_timeout,
            keep_alive,
            max_requests: self.max_requests.unwrap_or(0),
            worker_connections: self.worker_connections.unwrap_or(1000),
            pidfile: self.pidfile,
            user: self.user,
            group: self.group,
            umask: self.umask,
            daemon: self.daemon.unwrap_or(false),
            log_level: self.log_level.unwrap_or_else(|| "info".into()),
            access_logfile: self.access_logfile,
            error_logfile: self.error_logfile,
        })
    }
}

/// An immutable, fully-validated configuration for one generation
/// (SPEC_FULL.md §3). Produced fresh on every soft reload; old workers
/// keep running under the previous snapshot until drained.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub generation: u64,
    pub bind: Vec<BindAddress>,
    pub workers: u32,
    pub worker_class: WorkerClass,
    pub timeout: u64,
    pub graceful_timeout: u64,
    pub keep_alive: u64,
    pub max_requests: u32,
    pub worker_connections: u32,
    pub pidfile: Option<PathBuf>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub umask: Option<u32>,
    pub daemon: bool,
    pub log_level: String,
    pub access_logfile: Option<PathBuf>,
    pub error_logfile: Option<PathBuf>,
}

impl ConfigSnapshot {
    /// The heartbeat interval, derived from `timeout` and kept well
    /// below it (SPEC_FULL.md glossary: "must be well below timeout").
    pub fn heartbeat_interval(&self) -> std::time::Duration {
        let secs = (self.timeout / 4).max(1);
        std::time::Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_address_parses_tcp() {
        let addr = BindAddress::parse("127.0.0.1:8000").unwrap();
        assert_eq!(addr, BindAddress::Tcp("127.0.0.1:8000".parse().unwrap()));
    }

    #[test]
    fn bind_address_parses_unix() {
        let addr = BindAddress::parse("unix:/tmp/warden.sock").unwrap();
        assert_eq!(addr, BindAddress::Unix(PathBuf::from("/tmp/warden.sock")));
    }

    #[test]
    fn bind_address_rejects_garbage() {
        assert!(BindAddress::parse("not-an-address").is_err());
    }

    #[test]
    fn cli_overlay_wins_over_file() {
        let file = RawConfig {
            workers: Some(4),
            timeout: Some(60),
            ..Default::default()
        };
        let cli = RawConfig {
            workers: Some(8),
            ..Default::default()
        };
        let merged = cli.merge_over(file);
        assert_eq!(merged.workers, Some(8));
        assert_eq!(merged.timeout, Some(60));
    }

    #[test]
    fn defaults_fill_unset_fields() {
        let snapshot = RawConfig::default().into_snapshot(0).unwrap();
        assert_eq!(snapshot.workers, 1);
        assert_eq!(snapshot.worker_class, WorkerClass::Sync);
        assert_eq!(snapshot.bind, vec![BindAddress::parse("127.0.0.1:8000").unwrap()]);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let raw = RawConfig {
            workers: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            raw.into_snapshot(0),
            Err(ConfigError::WorkerCountZero(0))
        ));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let raw = RawConfig {
            timeout: Some(0),
            ..Default::default()
        };
        assert!(raw.into_snapshot(0).is_err());
    }

    #[test]
    fn unknown_worker_class_is_rejected() {
        let raw = RawConfig {
            worker_class: Some("gevent".into()),
            ..Default::default()
        };
        assert!(matches!(
            raw.into_snapshot(0),
            Err(ConfigError::UnknownWorkerClass(_))
        ));
    }

    #[test]
    fn heartbeat_interval_is_below_timeout() {
        let snapshot = RawConfig {
            timeout: Some(30),
            ..Default::default()
        }
        .into_snapshot(0)
        .unwrap();
        assert!(snapshot.heartbeat_interval().as_secs() < snapshot.timeout);
    }
}
