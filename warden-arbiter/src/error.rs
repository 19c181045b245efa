//! Arbiter-side error taxonomy (SPEC_FULL.md §4.9, §7).

#[derive(Debug, thiserror::Error)]
pub enum ArbiterError {
    #[error(transparent)]
    Config(#[from] warden_core::ConfigError),

    #[error("cannot bind listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("fork failed: {0}")]
    Fork(#[source] nix::errno::Errno),

    #[error("system call failed: {0}")]
    Sys(#[source] nix::errno::Errno),

    #[error("unknown user/group {0:?}")]
    UnknownIdentity(String),

    #[error(transparent)]
    Pidfile(#[from] warden_core::CoreError),

    #[error("exec reload failed: {0}")]
    Exec(#[source] nix::errno::Errno),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
