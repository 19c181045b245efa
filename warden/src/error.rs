//! Top-level error taxonomy for the binary (SPEC_FULL.md §4.9, §7):
//! composes the per-crate enums into the single error the process exit
//! code is derived from.

#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    #[error(transparent)]
    Config(#[from] warden_core::ConfigError),

    #[error(transparent)]
    Core(#[from] warden_core::CoreError),

    #[error(transparent)]
    Arbiter(#[from] warden_arbiter::ArbiterError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl WardenError {
    /// Exit code mapping (SPEC_FULL.md §6: "0 clean; 1 configuration
    /// error; >1 other").
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 1,
            Self::Core(warden_core::CoreError::Config(_)) => 1,
            Self::Arbiter(warden_arbiter::ArbiterError::Config(_)) => 1,
            Self::Arbiter(warden_arbiter::ArbiterError::Pidfile(warden_core::CoreError::Config(_))) => 1,
            Self::Arbiter(warden_arbiter::ArbiterError::UnknownIdentity(_)) => 1,
            _ => 2,
        }
    }
}
