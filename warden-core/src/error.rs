//! Error taxonomy (SPEC_FULL.md §4.9, §7).

/// Errors raised while merging, parsing, or validating configuration.
///
/// Fatal before fork: the arbiter exits `1` on any of these.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    ParseFile {
        path: String,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),

    #[error("worker count must be at least 1, got {0}")]
    WorkerCountZero(u32),

    #[error("timeout must be positive, got {0}")]
    NonPositiveTimeout(&'static str),

    #[error("unknown worker class {0:?}, expected \"sync\" or \"async\"")]
    UnknownWorkerClass(String),

    #[error("invalid umask {0:?}, expected an octal number like \"022\"")]
    InvalidUmask(String),

    #[error("HOME environment variable not set and no pidfile given")]
    NoHome,
}

/// Errors shared across the core/arbiter/worker boundary that aren't
/// specific to configuration.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("pidfile {path}: {source}")]
    Pidfile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("pidfile {path} names live process {pid}")]
    PidfileHeld { path: String, pid: i32 },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
