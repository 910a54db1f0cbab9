use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::display::Bounds;
use crate::error::HostError;

/// Opaque identifier the host hands back for a window it created.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub Uuid);

impl WindowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WindowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stacking priority requested for a lock window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ZLevel {
    Normal,
    /// Highest compositor level available (above fullscreen apps and panels).
    ScreenSaver,
}

/// Everything the host needs to create one lock window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockWindowSpec {
    pub display_id: String,
    pub bounds: Bounds,
    pub primary: bool,
    pub decorated: bool,
    pub fullscreen: bool,
    pub z_level: ZLevel,
    pub skip_taskbar: bool,
    pub locked: bool,
    pub visible_on_all_workspaces: bool,
    /// Countdown value the window should render before its first tick arrives.
    pub initial_remaining_ms: u64,
}

impl LockWindowSpec {
    pub fn lockout(display_id: impl Into<String>, bounds: Bounds, primary: bool) -> Self {
        Self {
            display_id: display_id.into(),
            bounds,
            primary,
            decorated: false,
            fullscreen: true,
            z_level: ZLevel::ScreenSaver,
            skip_taskbar: !primary,
            locked: true,
            visible_on_all_workspaces: true,
            initial_remaining_ms: 0,
        }
    }
}

/// Current geometry and stacking as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub bounds: Bounds,
    pub always_on_top: bool,
    pub visible: bool,
}

/// Window state transitions the controller waits on between lockdown steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStateChange {
    EnteredFullscreen,
    LeftFullscreen,
    RaisedAbove,
}

/// Whether the host could confirm a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateSignal {
    Confirmed,
    /// The host has no signal for this change; callers fall back to a fixed delay.
    Unsupported,
}

/// Windowing primitives the lockdown controller drives.
///
/// Every mutating call may be slow; implementations should return once the
/// request has been handed to the window system. Calls against a window the
/// host has already torn down should fail or no-op, never panic.
#[async_trait]
pub trait WindowHost: Send + Sync {
    async fn create_window(&self, spec: &LockWindowSpec) -> Result<WindowId, HostError>;

    fn is_alive(&self, id: WindowId) -> bool;

    fn snapshot(&self, id: WindowId) -> Option<WindowSnapshot>;

    async fn set_bounds(&self, id: WindowId, bounds: Bounds) -> Result<(), HostError>;

    async fn set_fullscreen(&self, id: WindowId, fullscreen: bool) -> Result<(), HostError>;

    async fn set_z_level(&self, id: WindowId, level: ZLevel) -> Result<(), HostError>;

    /// Locks or unlocks chrome: decoration, move, resize, close, minimize.
    async fn set_locked(&self, id: WindowId, locked: bool) -> Result<(), HostError>;

    /// When suppressed, OS close requests are swallowed by the host.
    async fn set_close_suppressed(&self, id: WindowId, suppressed: bool) -> Result<(), HostError>;

    async fn raise(&self, id: WindowId) -> Result<(), HostError>;

    async fn hide(&self, id: WindowId) -> Result<(), HostError>;

    async fn destroy(&self, id: WindowId) -> Result<(), HostError>;

    async fn await_state(&self, id: WindowId, change: WindowStateChange) -> StateSignal;
}
