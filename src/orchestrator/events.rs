use serde::Serialize;
use tokio::sync::mpsc;

use super::ExitReason;

/// Lifecycle notifications for the view layer and other observers.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LifecycleEvent {
    WorkStarted,
    BreakStarting,
    BreakStarted,
    #[serde(rename_all = "camelCase")]
    BreakEnding { reason: ExitReason },
    #[serde(rename_all = "camelCase")]
    WorkTick { remaining_ms: u64 },
    #[serde(rename_all = "camelCase")]
    BreakTick { remaining_ms: u64 },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::WorkStarted => "work-started",
            LifecycleEvent::BreakStarting => "break-starting",
            LifecycleEvent::BreakStarted => "break-started",
            LifecycleEvent::BreakEnding { .. } => "break-ending",
            LifecycleEvent::WorkTick { .. } => "work-tick",
            LifecycleEvent::BreakTick { .. } => "break-tick",
        }
    }

    pub fn is_tick(&self) -> bool {
        matches!(
            self,
            LifecycleEvent::WorkTick { .. } | LifecycleEvent::BreakTick { .. }
        )
    }
}

/// Called on the orchestrator task; implementations must not block.
pub trait LifecycleObserver: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent);
}

/// Forwards every event into an unbounded channel.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl LifecycleObserver for ChannelObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(*event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_string(&LifecycleEvent::BreakEnding {
            reason: ExitReason::Skipped,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"breakEnding","reason":"skipped"}"#);

        let json = serde_json::to_string(&LifecycleEvent::WorkTick { remaining_ms: 4000 }).unwrap();
        assert_eq!(json, r#"{"event":"workTick","remainingMs":4000}"#);
    }
}
