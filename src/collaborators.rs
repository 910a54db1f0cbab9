//! Seams to the stores and helpers the orchestrator reports to.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::timer::PhaseConfig;

/// Receives elapsed-time accounting from the orchestrator.
pub trait StatsRecorder: Send + Sync {
    /// Once per completed WORK span.
    fn record_work_time(&self, duration_ms: u64);

    /// Once per BREAK span that ended naturally or through an emergency exit.
    fn record_break_time(&self, duration_ms: u64);

    /// Once per honoured skip.
    fn record_skipped_break(&self);
}

/// The application that had focus before a break started.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ForegroundApp {
    pub bundle_id: Option<String>,
    pub name: Option<String>,
    pub platform: String,
}

/// Saves and restores the foreground application around a break.
#[async_trait]
pub trait ForegroundApps: Send + Sync {
    async fn capture_foreground_app(&self) -> Option<ForegroundApp>;

    async fn restore_foreground_app(&self, app: &ForegroundApp);
}

/// Persisted phase durations.
pub trait ConfigStore: Send + Sync {
    fn load_config(&self) -> Result<PhaseConfig>;

    fn save_config(&self, config: &PhaseConfig) -> Result<()>;
}
