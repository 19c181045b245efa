//! The arbiter's lifecycle state machine (SPEC_FULL.md §4.1).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterState {
    Init,
    Running,
    Reloading,
    Stopping,
    Halted,
}
