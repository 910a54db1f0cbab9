use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::display::{Bounds, DisplayDescriptor};
use crate::error::{LookawayError, Result};

use super::guard::{GuardTarget, PositionGuard, VanishedHandler, DEFAULT_GUARD_INTERVAL};
use super::host::{LockWindowSpec, StateSignal, WindowHost, WindowId, WindowStateChange, ZLevel};
use super::shortcuts::ShortcutTable;

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(200);

/// One lock window, pinned to one display.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LockWindowHandle {
    pub window: WindowId,
    pub display_id: String,
    pub pinned: Bounds,
    pub primary: bool,
    live: bool,
}

impl LockWindowHandle {
    pub fn is_live(&self) -> bool {
        self.live
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LockdownOptions {
    pub guard_interval: Duration,
    /// Wait used between presentation steps when the host cannot signal completion.
    pub settle_delay: Duration,
}

impl Default for LockdownOptions {
    fn default() -> Self {
        Self {
            guard_interval: DEFAULT_GUARD_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

/// Owns every lock window plus the guard and shortcut state that go with them.
pub struct LockdownController {
    host: Arc<dyn WindowHost>,
    shortcuts: ShortcutTable,
    handles: Vec<LockWindowHandle>,
    /// Primary window hidden by the last exit; torn down on the next entry.
    parked: Option<WindowId>,
    guard: PositionGuard,
    on_vanished: Option<VanishedHandler>,
    options: LockdownOptions,
}

impl LockdownController {
    pub fn new(host: Arc<dyn WindowHost>, shortcuts: ShortcutTable, options: LockdownOptions) -> Self {
        Self {
            host,
            shortcuts,
            handles: Vec::new(),
            parked: None,
            guard: PositionGuard::new(),
            on_vanished: None,
            options,
        }
    }

    /// Handler the position guard calls when a lock window disappears underneath it.
    pub fn with_vanished_handler(mut self, handler: VanishedHandler) -> Self {
        self.on_vanished = Some(handler);
        self
    }

    pub fn handles(&self) -> &[LockWindowHandle] {
        &self.handles
    }

    pub fn live_handle_count(&self) -> usize {
        self.handles.iter().filter(|handle| handle.live).count()
    }

    pub fn guard_running(&self) -> bool {
        self.guard.is_running()
    }

    pub fn parked_window(&self) -> Option<WindowId> {
        self.parked
    }

    /// Puts one pinned, undecorated, top-most window on every display.
    ///
    /// The primary display (first in `displays`) is attempted first; if it
    /// fails the whole entry fails and the caller is expected to run
    /// [`exit_lockdown`](Self::exit_lockdown). A failure on any other display
    /// is logged and that display is left uncovered.
    ///
    /// Once `interrupt` is cancelled no further display is attempted; the
    /// windows created so far stay tracked so `exit_lockdown` can unwind them.
    pub async fn enter_lockdown(
        &mut self,
        displays: &[DisplayDescriptor],
        initial_remaining_ms: u64,
        interrupt: &CancellationToken,
    ) -> Result<Vec<LockWindowHandle>> {
        self.exit_lockdown().await;
        self.destroy_parked().await;

        if displays.is_empty() {
            let err = LookawayError::DisplayEnumeration("no displays to lock".to_string());
            error!("{err}");
            return Err(err);
        }

        for (index, display) in displays.iter().enumerate() {
            if interrupt.is_cancelled() {
                break;
            }
            let primary = index == 0;
            let mut spec = LockWindowSpec::lockout(display.id.clone(), display.bounds, primary);
            spec.initial_remaining_ms = initial_remaining_ms;

            let window = match self.host.create_window(&spec).await {
                Ok(window) => window,
                Err(err) => {
                    let err = LookawayError::WindowCreate {
                        display_id: display.id.clone(),
                        primary,
                        reason: err.to_string(),
                    };
                    error!("{err}");
                    if primary {
                        return Err(err);
                    }
                    continue;
                }
            };

            // Recorded before presentation so an interrupted entry can still be unwound.
            self.handles.push(LockWindowHandle {
                window,
                display_id: display.id.clone(),
                pinned: display.bounds,
                primary,
                live: true,
            });

            if interrupt.is_cancelled() {
                break;
            }
            self.present(window, display.bounds).await;
        }

        if interrupt.is_cancelled() {
            warn!(
                "Lockdown entry interrupted after {}/{} display(s)",
                self.handles.len(),
                displays.len()
            );
            return Ok(self.handles.clone());
        }

        for handle in &self.handles {
            if let Err(err) = self.host.set_close_suppressed(handle.window, true).await {
                warn!("could not suppress close on {}: {err}", handle.window);
            }
        }

        let targets = self
            .handles
            .iter()
            .map(|handle| GuardTarget {
                window: handle.window,
                pinned: handle.pinned,
            })
            .collect();
        self.guard
            .start(
                self.host.clone(),
                targets,
                self.options.guard_interval,
                self.on_vanished.clone(),
            )
            .await;

        let suppressed = self.shortcuts.suppress();

        info!(
            "Lockdown entered on {}/{} display(s), {} shortcut(s) suppressed",
            self.handles.len(),
            displays.len(),
            suppressed
        );
        Ok(self.handles.clone())
    }

    /// Unwinds a full or partial lockdown. A no-op when nothing is locked.
    ///
    /// A handle leaves the set only once its window is dismissed, so an
    /// interrupted exit is finished by the next call.
    pub async fn exit_lockdown(&mut self) -> usize {
        self.guard.stop().await;

        if self.handles.is_empty() {
            if !self.shortcuts.suppressed().is_empty() {
                self.shortcuts.release();
            }
            return 0;
        }

        self.shortcuts.release();

        let released = self.handles.len();
        while let Some(handle) = self.handles.first().cloned() {
            if handle.is_live() && self.host.is_alive(handle.window) {
                self.restore(&handle).await;

                let outcome = if handle.primary {
                    self.parked = Some(handle.window);
                    self.host.hide(handle.window).await
                } else {
                    self.host.destroy(handle.window).await
                };
                if let Err(err) = outcome {
                    warn!("failed to dismiss window {}: {err}", handle.window);
                }
            } else {
                debug!("window {} already gone; skipping restore", handle.window);
            }
            self.handles.remove(0);
        }

        info!("Lockdown exited; released {released} window(s)");
        released
    }

    /// Marks handles whose window the host has already torn down.
    pub fn refresh_liveness(&mut self) -> usize {
        for handle in &mut self.handles {
            if handle.live && !self.host.is_alive(handle.window) {
                warn!("lock window {} vanished from display {}", handle.window, handle.display_id);
                handle.live = false;
            }
        }
        self.live_handle_count()
    }

    /// Process teardown: leaves lockdown, destroys the parked window and drops every chord.
    pub async fn shutdown(&mut self) {
        self.exit_lockdown().await;
        self.destroy_parked().await;
        self.shortcuts.uninstall();
    }

    /// Sequential presentation steps, each awaited on the host's state signal.
    async fn present(&self, window: WindowId, bounds: Bounds) {
        match self.host.set_fullscreen(window, true).await {
            Ok(()) => self.settle(window, WindowStateChange::EnteredFullscreen).await,
            Err(err) => warn!("lock window {window}: fullscreen failed: {err}"),
        }
        if let Err(err) = self.host.set_z_level(window, ZLevel::ScreenSaver).await {
            warn!("lock window {window}: top-most failed: {err}");
        }
        // Fullscreen transitions can shift the frame; pin again before raising.
        if let Err(err) = self.host.set_bounds(window, bounds).await {
            warn!("lock window {window}: pin failed: {err}");
        }
        match self.host.raise(window).await {
            Ok(()) => self.settle(window, WindowStateChange::RaisedAbove).await,
            Err(err) => warn!("lock window {window}: raise failed: {err}"),
        }
    }

    async fn restore(&self, handle: &LockWindowHandle) {
        let window = handle.window;
        if let Err(err) = self.host.set_close_suppressed(window, false).await {
            warn!("could not re-enable close on {window}: {err}");
        }
        if let Err(err) = self.host.set_locked(window, false).await {
            warn!("could not unlock chrome on {window}: {err}");
        }
        if let Err(err) = self.host.set_z_level(window, ZLevel::Normal).await {
            warn!("could not drop top-most on {window}: {err}");
        }
        match self.host.set_fullscreen(window, false).await {
            Ok(()) => self.settle(window, WindowStateChange::LeftFullscreen).await,
            Err(err) => warn!("could not leave fullscreen on {window}: {err}"),
        }
    }

    async fn settle(&self, window: WindowId, change: WindowStateChange) {
        if self.host.await_state(window, change).await == StateSignal::Unsupported {
            tokio::time::sleep(self.options.settle_delay).await;
        }
    }

    async fn destroy_parked(&mut self) {
        if let Some(window) = self.parked {
            if self.host.is_alive(window) {
                if let Err(err) = self.host.destroy(window).await {
                    warn!("failed to destroy parked window {window}: {err}");
                }
            }
            self.parked = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHost;
    use crate::lockdown::shortcuts::{ShortcutRegistrar, EMERGENCY_CHORD, SUPPRESSED_CHORDS};

    fn displays(count: usize) -> Vec<DisplayDescriptor> {
        (0..count)
            .map(|i| {
                let x = i32::try_from(i).unwrap() * 1920;
                DisplayDescriptor::new(format!("display-{i}"), Bounds::new(x, 0, 1920, 1080), i == 0)
            })
            .collect()
    }

    fn controller(host: &Arc<InMemoryHost>) -> LockdownController {
        let shortcuts = ShortcutTable::new(host.clone(), Arc::new(|| {}));
        shortcuts.install_emergency().unwrap();
        LockdownController::new(host.clone(), shortcuts, LockdownOptions::default())
    }

    async fn enter(
        lockdown: &mut LockdownController,
        screens: &[DisplayDescriptor],
        initial_remaining_ms: u64,
    ) -> Result<Vec<LockWindowHandle>> {
        lockdown
            .enter_lockdown(screens, initial_remaining_ms, &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn enter_pins_one_window_per_display() {
        let host = Arc::new(InMemoryHost::new());
        let mut lockdown = controller(&host);
        let screens = displays(3);

        let handles = enter(&mut lockdown, &screens, 20_000).await.unwrap();

        assert_eq!(handles.len(), 3);
        assert_eq!(handles.iter().filter(|h| h.primary).count(), 1);
        assert!(handles[0].primary);
        for (handle, display) in handles.iter().zip(&screens) {
            assert_eq!(handle.pinned, display.bounds);
            let window = host.window(handle.window).unwrap();
            assert_eq!(window.bounds, display.bounds);
            assert!(window.fullscreen && window.locked && window.close_suppressed);
            assert!(!window.spec.decorated);
            assert_eq!(window.spec.skip_taskbar, !handle.primary);
            assert_eq!(window.spec.initial_remaining_ms, 20_000);
            assert_eq!(window.z_level, ZLevel::ScreenSaver);
        }
        assert!(lockdown.guard_running());
        assert!(SUPPRESSED_CHORDS.iter().all(|c| host.is_registered(c)));
    }

    #[tokio::test]
    async fn close_requests_are_swallowed_while_locked() {
        let host = Arc::new(InMemoryHost::new());
        let mut lockdown = controller(&host);
        let handles = enter(&mut lockdown, &displays(1), 1000).await.unwrap();

        assert!(!host.request_close(handles[0].window));
        assert!(host.is_alive(handles[0].window));
    }

    #[tokio::test]
    async fn exit_releases_everything_and_is_idempotent() {
        let host = Arc::new(InMemoryHost::new());
        let mut lockdown = controller(&host);
        let handles = enter(&mut lockdown, &displays(2), 1000).await.unwrap();

        assert_eq!(lockdown.exit_lockdown().await, 2);
        assert!(lockdown.handles().is_empty());
        assert!(!lockdown.guard_running());
        assert!(host.is_registered(EMERGENCY_CHORD));
        assert!(SUPPRESSED_CHORDS.iter().all(|c| !host.is_registered(c)));

        // Primary is hidden and parked, secondaries are gone.
        let primary = host.window(handles[0].window).unwrap();
        assert!(!primary.visible && !primary.fullscreen && !primary.locked);
        assert_eq!(primary.z_level, ZLevel::Normal);
        assert!(!host.is_alive(handles[1].window));
        assert_eq!(lockdown.parked_window(), Some(handles[0].window));

        assert_eq!(lockdown.exit_lockdown().await, 0);
        assert_eq!(host.window_count(), 1);
    }

    #[tokio::test]
    async fn reentry_tears_down_parked_window() {
        let host = Arc::new(InMemoryHost::new());
        let mut lockdown = controller(&host);
        let screens = displays(2);

        enter(&mut lockdown, &screens, 1000).await.unwrap();
        lockdown.exit_lockdown().await;
        enter(&mut lockdown, &screens, 1000).await.unwrap();
        // Re-entering while locked unwinds the previous set first.
        enter(&mut lockdown, &screens, 1000).await.unwrap();

        assert_eq!(host.window_count(), 2);
        assert_eq!(host.created_count(), 6);
        assert_eq!(lockdown.handles().len(), 2);
    }

    #[tokio::test]
    async fn secondary_failure_leaves_partial_coverage() {
        let host = Arc::new(InMemoryHost::new());
        host.fail_display("display-1");
        let mut lockdown = controller(&host);

        let handles = enter(&mut lockdown, &displays(3), 1000).await.unwrap();
        let covered: Vec<_> = handles.iter().map(|h| h.display_id.as_str()).collect();
        assert_eq!(covered, ["display-0", "display-2"]);
    }

    #[tokio::test]
    async fn primary_failure_fails_entry() {
        let host = Arc::new(InMemoryHost::new());
        host.fail_display("display-0");
        let mut lockdown = controller(&host);

        let err = enter(&mut lockdown, &displays(2), 1000).await.unwrap_err();
        assert!(matches!(err, LookawayError::WindowCreate { primary: true, .. }));
        assert_eq!(host.created_count(), 0);

        assert_eq!(lockdown.exit_lockdown().await, 0);
        assert!(host.is_registered(EMERGENCY_CHORD));
    }

    #[tokio::test]
    async fn externally_closed_windows_are_skipped_on_exit() {
        let host = Arc::new(InMemoryHost::new());
        let mut lockdown = controller(&host);
        let handles = enter(&mut lockdown, &displays(2), 1000).await.unwrap();

        host.simulate_external_close(handles[1].window);
        assert_eq!(lockdown.refresh_liveness(), 1);
        assert!(!lockdown.handles()[1].is_live());

        assert_eq!(lockdown.exit_lockdown().await, 2);
        assert_eq!(host.window_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_settle_delay_without_signals() {
        let host = Arc::new(InMemoryHost::new());
        host.disable_state_signals();
        let mut lockdown = controller(&host);

        let started = tokio::time::Instant::now();
        enter(&mut lockdown, &displays(1), 1000).await.unwrap();
        // Fullscreen and raise each wait one settle delay.
        assert_eq!(started.elapsed(), DEFAULT_SETTLE_DELAY * 2);
    }

    #[tokio::test]
    async fn refuses_to_lock_without_displays() {
        let host = Arc::new(InMemoryHost::new());
        let mut lockdown = controller(&host);

        let err = enter(&mut lockdown, &[], 1000).await.unwrap_err();
        assert!(matches!(err, LookawayError::DisplayEnumeration(_)));
        assert_eq!(host.created_count(), 0);
        assert!(!lockdown.guard_running());
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_exit_is_finished_by_the_next_call() {
        let host = Arc::new(InMemoryHost::new());
        host.disable_state_signals();
        let mut lockdown = controller(&host);
        let handles = enter(&mut lockdown, &displays(2), 1000).await.unwrap();

        // Primary restore takes one settle delay; the secondary is cut off mid-restore.
        let cut = tokio::time::timeout(Duration::from_millis(250), lockdown.exit_lockdown()).await;
        assert!(cut.is_err());
        assert_eq!(lockdown.handles().len(), 1);
        assert_eq!(host.visible_window_count(), 1);

        assert_eq!(lockdown.exit_lockdown().await, 1);
        assert!(lockdown.handles().is_empty());
        assert_eq!(host.visible_window_count(), 0);
        assert!(!host.is_alive(handles[1].window));
        assert_eq!(lockdown.parked_window(), Some(handles[0].window));
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_entry_keeps_created_windows_tracked() {
        let host = Arc::new(InMemoryHost::new());
        host.set_create_delay(Duration::from_millis(300));
        let mut lockdown = controller(&host);
        let token = CancellationToken::new();
        let cancel = token.clone();
        let targets = displays(3);

        let (entered, ()) = tokio::join!(
            lockdown.enter_lockdown(&targets, 1000, &token),
            async move {
                tokio::time::sleep(Duration::from_millis(400)).await;
                cancel.cancel();
            }
        );

        // The second create was already under way and completes; the third never starts.
        assert_eq!(entered.unwrap().len(), 2);
        assert_eq!(host.created_count(), 2);
        assert!(!lockdown.guard_running());
        assert!(SUPPRESSED_CHORDS.iter().all(|c| !host.is_registered(c)));

        assert_eq!(lockdown.exit_lockdown().await, 2);
        assert_eq!(host.visible_window_count(), 0);
        assert_eq!(host.window_count(), 1);
    }

    #[test]
    fn one_handle_per_display_for_any_count() {
        use proptest::prelude::*;

        proptest!(ProptestConfig::with_cases(12), |(count in 1usize..7)| {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let (handles, primaries, pinned) = runtime.block_on(async {
                let host = Arc::new(InMemoryHost::new());
                let mut lockdown = controller(&host);
                let screens = displays(count);
                let handles = enter(&mut lockdown, &screens, 1000).await.unwrap();
                let pinned = handles.iter().zip(&screens).all(|(h, d)| h.pinned == d.bounds);
                let primaries = handles.iter().filter(|h| h.primary).count();
                lockdown.exit_lockdown().await;
                (handles.len(), primaries, pinned)
            });
            prop_assert_eq!(handles, count);
            prop_assert_eq!(primaries, 1);
            prop_assert!(pinned);
        });
    }
}
