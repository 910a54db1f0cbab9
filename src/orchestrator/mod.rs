mod commands;
mod controller;
mod events;
mod state;

pub use commands::OrchestratorHandle;
pub use controller::{BreakOrchestrator, Collaborators, HostBindings, Spawned};
pub use events::{ChannelObserver, LifecycleEvent, LifecycleObserver};
pub use state::{BreakState, ExitReason, OrchestratorOptions, OrchestratorSnapshot};
