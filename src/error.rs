//! Error types shared by the clock, lockdown and orchestrator layers.

use thiserror::Error;

/// Failures surfaced by the break machinery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookawayError {
    /// A duration below the 1000ms floor. The previous config stays active.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The host could not report its displays. Callers degrade to a synthetic display.
    #[error("display enumeration failed: {0}")]
    DisplayEnumeration(String),

    /// A lock window could not be created for one display.
    #[error("failed to create lock window on display {display_id} (primary: {primary}): {reason}")]
    WindowCreate {
        display_id: String,
        primary: bool,
        reason: String,
    },

    /// A global chord could not be registered.
    #[error("failed to register shortcut {chord}: {reason}")]
    ShortcutRegister { chord: String, reason: String },

    /// The orchestrator task is gone.
    #[error("break orchestrator is not running")]
    Stopped,
}

/// Error reported by a host seam (window system, display source, shortcut registry).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type Result<T, E = LookawayError> = std::result::Result<T, E>;
