use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::collaborators::{ConfigStore, ForegroundApp, ForegroundApps, StatsRecorder};
use crate::display::{DisplayEnumerator, DisplaySource};
use crate::error::{LookawayError, Result};
use crate::lockdown::{
    LockdownController, ShortcutHandler, ShortcutRegistrar, ShortcutTable, VanishedHandler,
    WindowHost, WindowId,
};
use crate::timer::{ClockEvent, Phase, PhaseClock, PhaseConfig};

use super::commands::{Command, Message, OrchestratorHandle};
use super::events::{LifecycleEvent, LifecycleObserver};
use super::state::{BreakState, ExitReason, OrchestratorOptions, OrchestratorSnapshot};

/// Host primitives the orchestrator drives.
#[derive(Clone)]
pub struct HostBindings {
    pub windows: Arc<dyn WindowHost>,
    pub displays: Arc<dyn DisplaySource>,
    pub shortcuts: Arc<dyn ShortcutRegistrar>,
}

/// Stores and helpers the orchestrator reports to.
#[derive(Clone)]
pub struct Collaborators {
    pub observers: Vec<Arc<dyn LifecycleObserver>>,
    pub stats: Arc<dyn StatsRecorder>,
    pub foreground: Arc<dyn ForegroundApps>,
    pub config: Arc<dyn ConfigStore>,
}

/// A running orchestrator.
pub struct Spawned {
    pub handle: OrchestratorHandle,
    pub task: JoinHandle<()>,
    /// Degraded-mode conditions found at startup (for example a missing emergency chord).
    pub warnings: Vec<LookawayError>,
}

/// The WORK/BREAK state machine. Runs as one task and processes commands,
/// countdown events and lockdown completions strictly one at a time.
pub struct BreakOrchestrator {
    rx: mpsc::UnboundedReceiver<Message>,
    tx: mpsc::UnboundedSender<Message>,
    state: BreakState,
    config: PhaseConfig,
    clock: PhaseClock<Message>,
    lockdown: Arc<Mutex<LockdownController>>,
    displays: DisplayEnumerator,
    observers: Vec<Arc<dyn LifecycleObserver>>,
    stats: Arc<dyn StatsRecorder>,
    foreground: Arc<dyn ForegroundApps>,
    config_store: Arc<dyn ConfigStore>,
    /// Enter or exit task currently running against the lockdown controller.
    in_flight: Option<JoinHandle<()>>,
    /// Stops a running entry from attempting further displays.
    entry_interrupt: Option<CancellationToken>,
    /// Bumped for every enter/exit so completions from superseded tasks are dropped.
    attempt: u64,
    captured_app: Option<ForegroundApp>,
    pending_skip: bool,
    pending_trigger: bool,
    work_started: Option<Instant>,
    break_started: Option<Instant>,
    break_duration_ms: u64,
    remaining_ms: u64,
    live_handles: usize,
    snapshot_tx: watch::Sender<OrchestratorSnapshot>,
}

impl BreakOrchestrator {
    /// Loads the config, installs the emergency chord and starts the first
    /// WORK countdown on a new task. Must be called inside a tokio runtime.
    pub fn spawn(
        host: HostBindings,
        collaborators: Collaborators,
        options: OrchestratorOptions,
    ) -> Spawned {
        let mut warnings = Vec::new();

        let config = match collaborators.config.load_config() {
            Ok(config) => match config.validate() {
                Ok(()) => config,
                Err(err) => {
                    warn!("stored config rejected ({err}); using defaults");
                    PhaseConfig::default()
                }
            },
            Err(err) => {
                warn!("failed to load config: {err:#}; using defaults");
                PhaseConfig::default()
            }
        };

        let (tx, rx) = mpsc::unbounded_channel::<Message>();
        let (snapshot_tx, snapshot_rx) = watch::channel(OrchestratorSnapshot::initial(config));

        let emergency_tx = tx.clone();
        let emergency: ShortcutHandler = Arc::new(move || {
            info!("Emergency exit shortcut triggered");
            let _ = emergency_tx.send(Command::EmergencyExit.into());
        });

        let shortcuts = ShortcutTable::new(host.shortcuts, emergency);
        if let Err(err) = shortcuts.install_emergency() {
            warn!("STARTUP WARNING: {err}; breaks can only end by expiry or skip");
            warnings.push(err);
        }

        let vanished_tx = tx.clone();
        let on_vanished: VanishedHandler = Arc::new(move |window| {
            let _ = vanished_tx.send(Message::WindowVanished { window });
        });

        let lockdown = LockdownController::new(host.windows, shortcuts, options.lockdown)
            .with_vanished_handler(on_vanished);
        let clock = PhaseClock::new(tx.clone(), options.tick_interval)
            .with_verbose_ticks(options.verbose_ticks);

        let orchestrator = Self {
            rx,
            tx: tx.clone(),
            state: BreakState::Working,
            config,
            clock,
            lockdown: Arc::new(Mutex::new(lockdown)),
            displays: DisplayEnumerator::new(host.displays),
            observers: collaborators.observers,
            stats: collaborators.stats,
            foreground: collaborators.foreground,
            config_store: collaborators.config,
            in_flight: None,
            entry_interrupt: None,
            attempt: 0,
            captured_app: None,
            pending_skip: false,
            pending_trigger: false,
            work_started: None,
            break_started: None,
            break_duration_ms: config.break_duration_ms,
            remaining_ms: config.work_duration_ms,
            live_handles: 0,
            snapshot_tx,
        };

        let task = tokio::spawn(orchestrator.run());

        Spawned {
            handle: OrchestratorHandle::new(tx, snapshot_rx),
            task,
            warnings,
        }
    }

    async fn run(mut self) {
        info!(
            "Break orchestrator started: work {}ms, break {}ms",
            self.config.work_duration_ms, self.config.break_duration_ms
        );
        self.begin_work();
        self.publish();

        while let Some(message) = self.rx.recv().await {
            match message {
                Message::Command(Command::Shutdown { reply }) => {
                    self.shutdown().await;
                    let _ = reply.send(());
                    break;
                }
                Message::Command(command) => self.handle_command(command).await,
                Message::Clock(event) => self.handle_clock(event),
                Message::LockdownEntered {
                    attempt,
                    outcome,
                    foreground,
                } => self.on_lockdown_entered(attempt, outcome, foreground).await,
                Message::LockdownExited { attempt } => self.on_lockdown_exited(attempt),
                Message::WindowVanished { window } => self.on_window_vanished(window).await,
            }
            self.publish();
        }

        info!("Break orchestrator stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::TriggerBreakNow => match self.state {
                BreakState::Working => {
                    info!("Go to break requested");
                    self.begin_break();
                }
                BreakState::ExitingBreak => {
                    debug!("break requested while unwinding; will start once working");
                    self.pending_trigger = true;
                }
                state => debug!("ignoring break request in {state:?}"),
            },
            Command::SkipBreak => match self.state {
                BreakState::OnBreak => {
                    info!("Skip break requested");
                    self.end_break(ExitReason::Skipped);
                }
                BreakState::EnteringBreak => {
                    debug!("skip requested while entering; deferring until the break is up");
                    self.pending_skip = true;
                }
                state => debug!("ignoring skip in {state:?}"),
            },
            Command::EmergencyExit => self.emergency_exit().await,
            Command::UpdateConfig { config, reply } => {
                let _ = reply.send(self.update_config(config));
            }
            Command::Shutdown { reply } => {
                // Handled in `run`; kept exhaustive.
                let _ = reply.send(());
            }
        }
    }

    fn handle_clock(&mut self, event: ClockEvent) {
        if !self.clock.is_current(event.generation()) {
            debug!("dropping stale countdown event {event:?}");
            return;
        }

        match event {
            ClockEvent::Tick { state, .. } => {
                self.remaining_ms = state.remaining_ms;
                match (state.phase, self.state) {
                    (Phase::Work, BreakState::Working) => self.notify(LifecycleEvent::WorkTick {
                        remaining_ms: state.remaining_ms,
                    }),
                    (Phase::Break, BreakState::OnBreak) => self.notify(LifecycleEvent::BreakTick {
                        remaining_ms: state.remaining_ms,
                    }),
                    _ => {}
                }
            }
            ClockEvent::Expired { generation, phase } => {
                self.clock.finish(generation);
                match (phase, self.state) {
                    (Phase::Work, BreakState::Working) => self.begin_break(),
                    (Phase::Break, BreakState::OnBreak) => self.end_break(ExitReason::Natural),
                    (phase, state) => debug!("ignoring {phase:?} expiry in {state:?}"),
                }
            }
        }
    }

    /// WORKING -> ENTERING_BREAK.
    fn begin_break(&mut self) {
        self.clock.cancel();
        if let Some(started) = self.work_started.take() {
            self.stats.record_work_time(elapsed_ms(started));
        }

        self.transition(BreakState::EnteringBreak);
        self.pending_skip = false;
        self.captured_app = None;
        self.break_duration_ms = self.config.duration_for(Phase::Break);
        self.remaining_ms = self.break_duration_ms;

        let displays = self.displays.list_displays();
        self.notify(LifecycleEvent::BreakStarting);

        self.attempt += 1;
        let attempt = self.attempt;
        let lockdown = self.lockdown.clone();
        let foreground = self.foreground.clone();
        let tx = self.tx.clone();
        let initial_remaining_ms = self.break_duration_ms;
        let interrupt = CancellationToken::new();
        self.entry_interrupt = Some(interrupt.clone());

        self.in_flight = Some(tokio::spawn(async move {
            let app = foreground.capture_foreground_app().await;
            let outcome = lockdown
                .lock()
                .await
                .enter_lockdown(&displays, initial_remaining_ms, &interrupt)
                .await
                .map(|handles| handles.len());
            let _ = tx.send(Message::LockdownEntered {
                attempt,
                outcome,
                foreground: app,
            });
        }));
    }

    /// ENTERING_BREAK -> ON_BREAK, or back to WORKING if the primary window failed.
    async fn on_lockdown_entered(
        &mut self,
        attempt: u64,
        outcome: Result<usize>,
        foreground: Option<ForegroundApp>,
    ) {
        if attempt != self.attempt || self.state != BreakState::EnteringBreak {
            debug!("dropping stale lockdown entry #{attempt}");
            return;
        }
        self.in_flight = None;
        self.entry_interrupt = None;
        self.captured_app = foreground;

        let handles = match outcome {
            Ok(handles) => handles,
            Err(err) => {
                error!("Lockdown failed ({err}); cleaning up and resuming work");
                self.lockdown.lock().await.exit_lockdown().await;
                self.pending_skip = false;
                self.begin_work();
                return;
            }
        };

        self.live_handles = handles;
        self.transition(BreakState::OnBreak);
        self.break_started = Some(Instant::now());
        if let Err(err) = self.clock.start(Phase::Break, self.break_duration_ms) {
            error!("could not start break countdown: {err}");
        }
        self.notify(LifecycleEvent::BreakStarted);

        if std::mem::take(&mut self.pending_skip) {
            info!("Honouring skip queued during lockdown entry");
            self.end_break(ExitReason::Skipped);
        }
    }

    /// ON_BREAK -> EXITING_BREAK for natural expiry and skips.
    fn end_break(&mut self, reason: ExitReason) {
        self.clock.cancel();
        let started = self.break_started.take();
        match reason {
            ExitReason::Natural => self.stats.record_break_time(self.break_duration_ms),
            ExitReason::Skipped => self.stats.record_skipped_break(),
            ExitReason::Emergency => {
                if let Some(started) = started {
                    self.stats.record_break_time(elapsed_ms(started));
                }
            }
        }

        info!("Break ending ({})", reason.as_str());
        self.transition(BreakState::ExitingBreak);
        self.notify(LifecycleEvent::BreakEnding { reason });

        self.attempt += 1;
        let attempt = self.attempt;
        let lockdown = self.lockdown.clone();
        let foreground = self.foreground.clone();
        let restore = match reason {
            ExitReason::Skipped => self.captured_app.take(),
            ExitReason::Natural | ExitReason::Emergency => None,
        };
        let tx = self.tx.clone();

        self.in_flight = Some(tokio::spawn(async move {
            lockdown.lock().await.exit_lockdown().await;
            if let Some(app) = restore {
                foreground.restore_foreground_app(&app).await;
            }
            let _ = tx.send(Message::LockdownExited { attempt });
        }));
    }

    /// EXITING_BREAK -> WORKING.
    fn on_lockdown_exited(&mut self, attempt: u64) {
        if attempt != self.attempt || self.state != BreakState::ExitingBreak {
            debug!("dropping stale lockdown exit #{attempt}");
            return;
        }
        self.in_flight = None;
        self.live_handles = 0;
        self.captured_app = None;
        self.begin_work();

        if std::mem::take(&mut self.pending_trigger) {
            info!("Starting break requested during unwind");
            self.begin_break();
        }
    }

    /// Unconditional: cuts a running entry short, lets in-flight work finish,
    /// tears lockdown down inline and lands in WORKING.
    async fn emergency_exit(&mut self) {
        let from = self.state;
        warn!("Emergency exit requested in {from:?}");

        if from == BreakState::Working {
            // Nothing should be up, but make sure.
            self.lockdown.lock().await.exit_lockdown().await;
            return;
        }

        if from.is_in_flight() {
            self.drain_in_flight().await;
        }
        // Any completion already queued by the drained task is now stale.
        self.attempt += 1;
        self.clock.cancel();

        self.lockdown.lock().await.exit_lockdown().await;
        self.live_handles = 0;
        self.pending_skip = false;
        self.pending_trigger = false;
        self.captured_app = None;

        let started = self.break_started.take();
        if from == BreakState::OnBreak {
            if let Some(started) = started {
                self.stats.record_break_time(elapsed_ms(started));
            }
        }
        if from != BreakState::ExitingBreak {
            self.notify(LifecycleEvent::BreakEnding {
                reason: ExitReason::Emergency,
            });
        }

        self.begin_work();
    }

    fn update_config(&mut self, config: PhaseConfig) -> Result<()> {
        config.validate()?;

        if let Err(err) = self.config_store.save_config(&config) {
            error!("Error saving settings: {err:#}");
        }
        self.config = config;
        info!("Settings updated: {config:?}");

        if self.state == BreakState::Working {
            // Restart the countdown; the WORK span keeps its original start.
            match self.clock.start(Phase::Work, config.work_duration_ms) {
                Ok(_) => self.remaining_ms = config.work_duration_ms,
                Err(err) => error!("could not restart work countdown: {err}"),
            }
        }
        Ok(())
    }

    /// Enters WORKING and starts a fresh WORK countdown.
    fn begin_work(&mut self) {
        self.transition(BreakState::Working);
        self.work_started = Some(Instant::now());
        let work_ms = self.config.duration_for(Phase::Work);
        self.remaining_ms = work_ms;
        if let Err(err) = self.clock.start(Phase::Work, work_ms) {
            error!("could not start work countdown: {err}");
        }
        self.notify(LifecycleEvent::WorkStarted);
    }

    async fn shutdown(&mut self) {
        info!("Shutting down break orchestrator in {:?}", self.state);
        self.clock.cancel();
        self.drain_in_flight().await;
        if let Some(started) = self.work_started.take() {
            self.stats.record_work_time(elapsed_ms(started));
        }
        self.lockdown.lock().await.shutdown().await;
        self.live_handles = 0;
    }

    /// Interrupts a running entry and waits for the enter or exit task to
    /// return. Tasks are never aborted: dropping one mid-await could orphan a
    /// window the host has already created.
    async fn drain_in_flight(&mut self) {
        if let Some(interrupt) = self.entry_interrupt.take() {
            interrupt.cancel();
        }
        if let Some(task) = self.in_flight.take() {
            if let Err(err) = task.await {
                error!("lockdown task failed: {err}");
            }
        }
    }

    /// The position guard saw a lock window disappear.
    async fn on_window_vanished(&mut self, window: WindowId) {
        if self.state != BreakState::OnBreak {
            debug!("window {window} vanished in {:?}; exit will skip it", self.state);
            return;
        }
        self.live_handles = self.lockdown.lock().await.refresh_liveness();
        info!("Lock window {window} vanished; {} still up", self.live_handles);
    }

    fn transition(&mut self, next: BreakState) {
        if self.state != next {
            info!("{:?} -> {:?}", self.state, next);
        }
        self.state = next;
    }

    fn notify(&self, event: LifecycleEvent) {
        if !event.is_tick() {
            debug!("notify {}", event.name());
        }
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }

    fn publish(&self) {
        let remaining_ms = self
            .clock
            .snapshot()
            .map(|countdown| countdown.remaining_ms)
            .unwrap_or(self.remaining_ms);

        self.snapshot_tx.send_replace(OrchestratorSnapshot {
            state: self.state,
            phase: self.state.phase(),
            remaining_ms,
            live_handles: self.live_handles,
            config: self.config,
        });
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
