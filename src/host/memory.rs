//! A host that keeps windows, displays and shortcuts in memory.
//!
//! Used by the headless runner and by tests. It behaves like a cooperative
//! window system: requests apply immediately, state-change signals are
//! confirmed at once (unless disabled), and user interference can be
//! simulated through the `simulate_*` helpers.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use crate::display::{Bounds, DisplayDescriptor, DisplaySource};
use crate::error::HostError;
use crate::lockdown::{
    LockWindowSpec, ShortcutHandler, ShortcutRegistrar, StateSignal, WindowHost, WindowId,
    WindowSnapshot, WindowStateChange, ZLevel,
};

/// Observable state of one in-memory window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryWindow {
    pub spec: LockWindowSpec,
    pub bounds: Bounds,
    pub fullscreen: bool,
    pub z_level: ZLevel,
    pub locked: bool,
    pub close_suppressed: bool,
    pub visible: bool,
}

#[derive(Default)]
struct HostState {
    displays: Vec<DisplayDescriptor>,
    display_error: Option<HostError>,
    windows: HashMap<WindowId, MemoryWindow>,
    failing_displays: HashSet<String>,
    create_delay: Duration,
    created: usize,
    signals_disabled: bool,
    shortcuts: HashMap<String, ShortcutHandler>,
    rejected_chords: HashSet<String>,
}

pub struct InMemoryHost {
    state: Mutex<HostState>,
}

impl InMemoryHost {
    /// A host with one 1920x1080 primary display.
    pub fn new() -> Self {
        Self::with_displays(vec![DisplayDescriptor::new(
            "display-1",
            Bounds::new(0, 0, 1920, 1080),
            true,
        )])
    }

    pub fn with_displays(displays: Vec<DisplayDescriptor>) -> Self {
        Self {
            state: Mutex::new(HostState {
                displays,
                ..HostState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_displays(&self, displays: Vec<DisplayDescriptor>) {
        let mut state = self.state();
        state.displays = displays;
        state.display_error = None;
    }

    pub fn fail_display_enumeration(&self, message: &str) {
        self.state().display_error = Some(HostError::new(message));
    }

    /// Window creation on `display_id` will be refused.
    pub fn fail_display(&self, display_id: &str) {
        self.state().failing_displays.insert(display_id.to_string());
    }

    pub fn set_create_delay(&self, delay: Duration) {
        self.state().create_delay = delay;
    }

    /// Makes `await_state` report `Unsupported`, forcing the settle-delay fallback.
    pub fn disable_state_signals(&self) {
        self.state().signals_disabled = true;
    }

    pub fn reject_chord(&self, chord: &str) {
        self.state().rejected_chords.insert(chord.to_string());
    }

    pub fn window(&self, id: WindowId) -> Option<MemoryWindow> {
        self.state().windows.get(&id).cloned()
    }

    /// Ids of visible windows.
    pub fn window_ids(&self) -> Vec<WindowId> {
        self.state()
            .windows
            .iter()
            .filter(|(_, window)| window.visible)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn window_count(&self) -> usize {
        self.state().windows.len()
    }

    pub fn visible_window_count(&self) -> usize {
        self.state().windows.values().filter(|w| w.visible).count()
    }

    /// Number of windows ever created.
    pub fn created_count(&self) -> usize {
        self.state().created
    }

    pub fn registered_chords(&self) -> Vec<String> {
        let mut chords: Vec<_> = self.state().shortcuts.keys().cloned().collect();
        chords.sort();
        chords
    }

    /// A user drag or a workspace switch moved the window.
    pub fn simulate_move(&self, id: WindowId, bounds: Bounds) {
        if let Some(window) = self.state().windows.get_mut(&id) {
            window.bounds = bounds;
        }
    }

    /// The compositor dropped the window out of the top-most layer.
    pub fn simulate_lost_top(&self, id: WindowId) {
        if let Some(window) = self.state().windows.get_mut(&id) {
            window.z_level = ZLevel::Normal;
        }
    }

    /// The environment destroyed the window behind the controller's back.
    pub fn simulate_external_close(&self, id: WindowId) {
        self.state().windows.remove(&id);
    }

    /// An OS close request. Returns whether the window actually closed.
    pub fn request_close(&self, id: WindowId) -> bool {
        let mut state = self.state();
        match state.windows.get(&id) {
            Some(window) if window.close_suppressed => false,
            Some(_) => {
                state.windows.remove(&id);
                true
            }
            None => false,
        }
    }

    /// Fires the handler bound to `chord`. Returns whether one was registered.
    pub fn press(&self, chord: &str) -> bool {
        let handler = self.state().shortcuts.get(chord).cloned();
        match handler {
            Some(handler) => {
                handler();
                true
            }
            None => false,
        }
    }

    fn update<F>(&self, id: WindowId, op: &str, apply: F) -> Result<(), HostError>
    where
        F: FnOnce(&mut MemoryWindow),
    {
        let mut state = self.state();
        let window = state
            .windows
            .get_mut(&id)
            .ok_or_else(|| HostError::new(format!("{op}: no such window {id}")))?;
        apply(window);
        debug!("host: {op} on {id}");
        Ok(())
    }
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WindowHost for InMemoryHost {
    async fn create_window(&self, spec: &LockWindowSpec) -> Result<WindowId, HostError> {
        let delay = self.state().create_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.failing_displays.contains(&spec.display_id) {
            return Err(HostError::new(format!(
                "window creation refused on {}",
                spec.display_id
            )));
        }

        let id = WindowId::new();
        state.windows.insert(
            id,
            MemoryWindow {
                spec: spec.clone(),
                bounds: spec.bounds,
                fullscreen: spec.fullscreen,
                z_level: spec.z_level,
                locked: spec.locked,
                close_suppressed: false,
                visible: true,
            },
        );
        state.created += 1;
        debug!("host: created window {id} on {}", spec.display_id);
        Ok(id)
    }

    fn is_alive(&self, id: WindowId) -> bool {
        self.state().windows.contains_key(&id)
    }

    fn snapshot(&self, id: WindowId) -> Option<WindowSnapshot> {
        self.state().windows.get(&id).map(|window| WindowSnapshot {
            bounds: window.bounds,
            always_on_top: window.z_level == ZLevel::ScreenSaver,
            visible: window.visible,
        })
    }

    async fn set_bounds(&self, id: WindowId, bounds: Bounds) -> Result<(), HostError> {
        self.update(id, "set_bounds", |w| w.bounds = bounds)
    }

    async fn set_fullscreen(&self, id: WindowId, fullscreen: bool) -> Result<(), HostError> {
        self.update(id, "set_fullscreen", |w| w.fullscreen = fullscreen)
    }

    async fn set_z_level(&self, id: WindowId, level: ZLevel) -> Result<(), HostError> {
        self.update(id, "set_z_level", |w| w.z_level = level)
    }

    async fn set_locked(&self, id: WindowId, locked: bool) -> Result<(), HostError> {
        self.update(id, "set_locked", |w| w.locked = locked)
    }

    async fn set_close_suppressed(&self, id: WindowId, suppressed: bool) -> Result<(), HostError> {
        self.update(id, "set_close_suppressed", |w| w.close_suppressed = suppressed)
    }

    async fn raise(&self, id: WindowId) -> Result<(), HostError> {
        self.update(id, "raise", |w| w.visible = true)
    }

    async fn hide(&self, id: WindowId) -> Result<(), HostError> {
        self.update(id, "hide", |w| w.visible = false)
    }

    async fn destroy(&self, id: WindowId) -> Result<(), HostError> {
        self.state()
            .windows
            .remove(&id)
            .map(|_| debug!("host: destroyed window {id}"))
            .ok_or_else(|| HostError::new(format!("destroy: no such window {id}")))
    }

    async fn await_state(&self, id: WindowId, _change: WindowStateChange) -> StateSignal {
        let state = self.state();
        if state.signals_disabled || !state.windows.contains_key(&id) {
            StateSignal::Unsupported
        } else {
            StateSignal::Confirmed
        }
    }
}

impl DisplaySource for InMemoryHost {
    fn displays(&self) -> Result<Vec<DisplayDescriptor>, HostError> {
        let state = self.state();
        match &state.display_error {
            Some(err) => Err(err.clone()),
            None => Ok(state.displays.clone()),
        }
    }
}

impl ShortcutRegistrar for InMemoryHost {
    fn register(&self, chord: &str, handler: ShortcutHandler) -> Result<(), HostError> {
        let mut state = self.state();
        if state.rejected_chords.contains(chord) {
            return Err(HostError::new(format!("{chord} is held by another application")));
        }
        state.shortcuts.insert(chord.to_string(), handler);
        Ok(())
    }

    fn unregister(&self, chord: &str) {
        self.state().shortcuts.remove(chord);
    }

    fn is_registered(&self, chord: &str) -> bool {
        self.state().shortcuts.contains_key(chord)
    }
}
