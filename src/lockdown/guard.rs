use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::display::Bounds;

use super::host::{WindowHost, WindowId, ZLevel};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const DEFAULT_GUARD_INTERVAL: Duration = Duration::from_millis(500);

/// A window and the geometry it must keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardTarget {
    pub window: WindowId,
    pub pinned: Bounds,
}

/// Called from the guard task, once per window, when a guarded window has
/// been torn down by the host. Must not block.
pub type VanishedHandler = Arc<dyn Fn(WindowId) + Send + Sync>;

/// Outcome of one corrective pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinPass {
    pub corrected: usize,
    pub vanished: Vec<WindowId>,
}

/// Periodic task that snaps lock windows back to their pinned geometry and
/// top-most stacking.
pub struct PositionGuard {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl PositionGuard {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub async fn start(
        &mut self,
        host: Arc<dyn WindowHost>,
        targets: Vec<GuardTarget>,
        interval: Duration,
        on_vanished: Option<VanishedHandler>,
    ) {
        self.stop().await;

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(guard_loop(
            host,
            targets,
            interval,
            on_vanished,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub async fn stop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    log_warn!("position guard task failed to join: {err}");
                }
            }
        }
    }
}

impl Default for PositionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PositionGuard {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}

async fn guard_loop(
    host: Arc<dyn WindowHost>,
    targets: Vec<GuardTarget>,
    interval: Duration,
    on_vanished: Option<VanishedHandler>,
    cancel_token: CancellationToken,
) {
    let mut reported = HashSet::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; windows were just pinned.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let pass = enforce_pins(host.as_ref(), &targets).await;
                if pass.corrected > 0 {
                    log_info!("position guard re-pinned {} window(s)", pass.corrected);
                }
                for window in pass.vanished {
                    if !reported.insert(window) {
                        continue;
                    }
                    log_warn!("guarded window {} is gone", window);
                    if let Some(handler) = &on_vanished {
                        handler(window);
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                log_debug!("position guard shutting down");
                break;
            }
        }
    }
}

/// One corrective pass: re-pins drifted windows and lists dead ones.
pub async fn enforce_pins(host: &dyn WindowHost, targets: &[GuardTarget]) -> PinPass {
    let mut pass = PinPass::default();

    for target in targets {
        if !host.is_alive(target.window) {
            pass.vanished.push(target.window);
            continue;
        }
        let Some(current) = host.snapshot(target.window) else {
            continue;
        };
        if current.bounds == target.pinned && current.always_on_top {
            continue;
        }

        log_debug!(
            "window {} drifted to {:?} (on top: {}); restoring {:?}",
            target.window,
            current.bounds,
            current.always_on_top,
            target.pinned
        );

        if let Err(err) = host.set_bounds(target.window, target.pinned).await {
            log_warn!("failed to re-pin window {}: {err}", target.window);
        }
        if let Err(err) = host.set_locked(target.window, true).await {
            log_warn!("failed to re-lock window {}: {err}", target.window);
        }
        if let Err(err) = host.set_z_level(target.window, ZLevel::ScreenSaver).await {
            log_warn!("failed to re-assert top-most on {}: {err}", target.window);
        }
        if let Err(err) = host.raise(target.window).await {
            log_warn!("failed to raise window {}: {err}", target.window);
        }
        pass.corrected += 1;
    }

    pass
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHost;
    use crate::lockdown::host::LockWindowSpec;

    async fn pinned_window(host: &InMemoryHost, bounds: Bounds) -> GuardTarget {
        let window = host
            .create_window(&LockWindowSpec::lockout("main", bounds, true))
            .await
            .unwrap();
        GuardTarget {
            window,
            pinned: bounds,
        }
    }

    #[tokio::test]
    async fn enforce_restores_moved_window() {
        let host = InMemoryHost::new();
        let bounds = Bounds::new(0, 0, 1920, 1080);
        let target = pinned_window(&host, bounds).await;

        assert_eq!(enforce_pins(&host, &[target]).await, PinPass::default());

        host.simulate_move(target.window, Bounds::new(40, 40, 800, 600));
        host.simulate_lost_top(target.window);
        assert_eq!(enforce_pins(&host, &[target]).await.corrected, 1);

        let snapshot = host.snapshot(target.window).unwrap();
        assert_eq!(snapshot.bounds, bounds);
        assert!(snapshot.always_on_top);
    }

    #[tokio::test]
    async fn enforce_skips_and_lists_dead_windows() {
        let host = InMemoryHost::new();
        let target = pinned_window(&host, Bounds::new(0, 0, 100, 100)).await;
        host.simulate_external_close(target.window);

        let pass = enforce_pins(&host, &[target]).await;
        assert_eq!(pass.corrected, 0);
        assert_eq!(pass.vanished, vec![target.window]);
    }

    #[tokio::test(start_paused = true)]
    async fn guard_task_corrects_drift_until_stopped() {
        let host = Arc::new(InMemoryHost::new());
        let bounds = Bounds::new(0, 0, 1920, 1080);
        let target = pinned_window(&host, bounds).await;

        let mut guard = PositionGuard::new();
        guard
            .start(host.clone(), vec![target], DEFAULT_GUARD_INTERVAL, None)
            .await;
        assert!(guard.is_running());

        host.simulate_move(target.window, Bounds::new(300, 0, 1920, 1080));
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(host.snapshot(target.window).unwrap().bounds, bounds);

        guard.stop().await;
        assert!(!guard.is_running());

        let moved = Bounds::new(5, 5, 10, 10);
        host.simulate_move(target.window, moved);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(host.snapshot(target.window).unwrap().bounds, moved);
    }

    #[tokio::test(start_paused = true)]
    async fn vanished_window_is_reported_once() {
        use std::sync::Mutex;

        let host = Arc::new(InMemoryHost::new());
        let target = pinned_window(&host, Bounds::new(0, 0, 1920, 1080)).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: VanishedHandler = Arc::new(move |window| sink.lock().unwrap().push(window));

        let mut guard = PositionGuard::new();
        guard
            .start(host.clone(), vec![target], DEFAULT_GUARD_INTERVAL, Some(handler))
            .await;

        host.simulate_external_close(target.window);
        tokio::time::sleep(Duration::from_secs(3)).await;
        guard.stop().await;

        assert_eq!(*seen.lock().unwrap(), vec![target.window]);
    }
}
