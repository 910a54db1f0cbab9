use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lockdown::LockdownOptions;
use crate::timer::{Phase, PhaseConfig, DEFAULT_TICK_INTERVAL};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BreakState {
    Working,
    EnteringBreak,
    OnBreak,
    ExitingBreak,
}

impl Default for BreakState {
    fn default() -> Self {
        BreakState::Working
    }
}

impl BreakState {
    pub fn phase(&self) -> Phase {
        match self {
            BreakState::Working => Phase::Work,
            BreakState::EnteringBreak | BreakState::OnBreak | BreakState::ExitingBreak => {
                Phase::Break
            }
        }
    }

    /// A lockdown enter or exit is running.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, BreakState::EnteringBreak | BreakState::ExitingBreak)
    }
}

/// Why a break ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ExitReason {
    Natural,
    Skipped,
    Emergency,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Natural => "natural",
            ExitReason::Skipped => "skipped",
            ExitReason::Emergency => "emergency",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorSnapshot {
    pub state: BreakState,
    pub phase: Phase,
    pub remaining_ms: u64,
    /// Lock windows up after a completed entry; zero outside ON_BREAK/EXITING_BREAK.
    pub live_handles: usize,
    pub config: PhaseConfig,
}

impl OrchestratorSnapshot {
    pub fn initial(config: PhaseConfig) -> Self {
        Self {
            state: BreakState::Working,
            phase: Phase::Work,
            remaining_ms: config.work_duration_ms,
            live_handles: 0,
            config,
        }
    }
}

/// Runtime tuning. Durations are not persisted.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorOptions {
    pub tick_interval: Duration,
    pub lockdown: LockdownOptions,
    /// Log every countdown tick at info level.
    pub verbose_ticks: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            lockdown: LockdownOptions::default(),
            verbose_ticks: false,
        }
    }
}

impl OrchestratorOptions {
    /// Defaults, with `LOOKAWAY_DEBUG=1|true` turning on per-tick logging.
    pub fn from_env() -> Self {
        let verbose_ticks = std::env::var("LOOKAWAY_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            verbose_ticks,
            ..Self::default()
        }
    }
}
