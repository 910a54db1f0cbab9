use tokio::sync::{mpsc, oneshot, watch};

use crate::collaborators::ForegroundApp;
use crate::error::{LookawayError, Result};
use crate::lockdown::WindowId;
use crate::timer::{ClockEvent, PhaseConfig};

use super::{BreakState, OrchestratorSnapshot};

pub(crate) enum Command {
    TriggerBreakNow,
    SkipBreak,
    EmergencyExit,
    UpdateConfig {
        config: PhaseConfig,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Everything the orchestrator task reacts to, in arrival order.
pub(crate) enum Message {
    Command(Command),
    Clock(ClockEvent),
    LockdownEntered {
        attempt: u64,
        outcome: Result<usize>,
        foreground: Option<ForegroundApp>,
    },
    LockdownExited {
        attempt: u64,
    },
    WindowVanished {
        window: WindowId,
    },
}

impl From<ClockEvent> for Message {
    fn from(event: ClockEvent) -> Self {
        Message::Clock(event)
    }
}

impl From<Command> for Message {
    fn from(command: Command) -> Self {
        Message::Command(command)
    }
}

/// Cloneable command surface for the view layer and global shortcuts.
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::UnboundedSender<Message>,
    snapshot: watch::Receiver<OrchestratorSnapshot>,
}

impl OrchestratorHandle {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<Message>,
        snapshot: watch::Receiver<OrchestratorSnapshot>,
    ) -> Self {
        Self { tx, snapshot }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command.into())
            .map_err(|_| LookawayError::Stopped)
    }

    /// Starts a break now. Ignored unless working; queued while a break is unwinding.
    pub fn trigger_break_now(&self) -> Result<()> {
        self.send(Command::TriggerBreakNow)
    }

    /// Ends the current break early. Ignored while working.
    pub fn skip_break(&self) -> Result<()> {
        self.send(Command::SkipBreak)
    }

    /// Forces lockdown down from any state.
    pub fn emergency_exit(&self) -> Result<()> {
        self.send(Command::EmergencyExit)
    }

    /// Validates, persists and applies new durations. A running WORK countdown
    /// restarts with the new duration; a running BREAK is left alone.
    pub async fn update_config(&self, config: PhaseConfig) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::UpdateConfig { config, reply })?;
        response.await.map_err(|_| LookawayError::Stopped)?
    }

    pub fn snapshot(&self) -> OrchestratorSnapshot {
        *self.snapshot.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<OrchestratorSnapshot> {
        self.snapshot.clone()
    }

    /// Resolves once the orchestrator reports `state`.
    pub async fn wait_for_state(&self, state: BreakState) -> Result<OrchestratorSnapshot> {
        let mut rx = self.snapshot.clone();
        loop {
            let current = *rx.borrow_and_update();
            if current.state == state {
                return Ok(current);
            }
            rx.changed().await.map_err(|_| LookawayError::Stopped)?;
        }
    }

    /// Leaves any lockdown, releases every window and chord, and stops the task.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.send(Command::Shutdown { reply })?;
        done.await.map_err(|_| LookawayError::Stopped)
    }
}
