pub mod controller;
pub mod guard;
pub mod host;
pub mod shortcuts;

pub use controller::{LockWindowHandle, LockdownController, LockdownOptions, DEFAULT_SETTLE_DELAY};
pub use guard::{
    enforce_pins, GuardTarget, PinPass, PositionGuard, VanishedHandler, DEFAULT_GUARD_INTERVAL,
};
pub use host::{
    LockWindowSpec, StateSignal, WindowHost, WindowId, WindowSnapshot, WindowStateChange, ZLevel,
};
pub use shortcuts::{
    ShortcutHandler, ShortcutRegistrar, ShortcutTable, EMERGENCY_CHORD, SUPPRESSED_CHORDS,
};
