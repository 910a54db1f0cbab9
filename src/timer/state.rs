use serde::{Deserialize, Serialize};
use std::cmp;
use std::time::Duration;

use crate::error::{LookawayError, Result};

/// Shortest duration accepted for either phase.
pub const MIN_PHASE_MS: u64 = 1000;

pub const DEFAULT_WORK_MS: u64 = 20 * 60 * 1000;
pub const DEFAULT_BREAK_MS: u64 = 20 * 1000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Work,
    Break,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Work
    }
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Work => "work",
            Phase::Break => "break",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseConfig {
    #[serde(rename = "workDuration")]
    pub work_duration_ms: u64,
    #[serde(rename = "breakDuration")]
    pub break_duration_ms: u64,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            work_duration_ms: DEFAULT_WORK_MS,
            break_duration_ms: DEFAULT_BREAK_MS,
        }
    }
}

impl PhaseConfig {
    pub fn new(work_duration_ms: u64, break_duration_ms: u64) -> Result<Self> {
        let config = Self {
            work_duration_ms,
            break_duration_ms,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_duration("workDuration", self.work_duration_ms)?;
        validate_duration("breakDuration", self.break_duration_ms)
    }

    pub fn duration_for(&self, phase: Phase) -> u64 {
        match phase {
            Phase::Work => self.work_duration_ms,
            Phase::Break => self.break_duration_ms,
        }
    }
}

pub fn validate_duration(field: &str, duration_ms: u64) -> Result<()> {
    if duration_ms < MIN_PHASE_MS {
        return Err(LookawayError::InvalidConfig(format!(
            "{field} must be at least {MIN_PHASE_MS}ms, got {duration_ms}ms"
        )));
    }
    Ok(())
}

/// One running countdown, replaced wholesale at every phase boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CountdownState {
    pub phase: Phase,
    pub duration_ms: u64,
    pub remaining_ms: u64,
    pub started_at_epoch_ms: i64,
}

impl CountdownState {
    pub fn begin(phase: Phase, duration_ms: u64, started_at_epoch_ms: i64) -> Self {
        Self {
            phase,
            duration_ms,
            remaining_ms: duration_ms,
            started_at_epoch_ms,
        }
    }

    /// Recomputes remaining time from the elapsed span rather than decrementing,
    /// so late or skipped ticks never accumulate drift. Never increases.
    pub fn sync_from_elapsed(&mut self, elapsed: Duration) {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let remaining = self.duration_ms.saturating_sub(elapsed_ms);
        self.remaining_ms = cmp::min(self.remaining_ms, remaining);
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_ms == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_sub_second_durations() {
        assert!(PhaseConfig::new(999, 2000).is_err());
        assert!(PhaseConfig::new(1000, 999).is_err());
        assert!(PhaseConfig::new(1000, 1000).is_ok());
    }

    #[test]
    fn remaining_is_clamped_and_monotonic() {
        let mut state = CountdownState::begin(Phase::Work, 3000, 0);
        state.sync_from_elapsed(Duration::from_millis(1200));
        assert_eq!(state.remaining_ms, 1800);

        // A stale, smaller elapsed reading must not move the countdown backwards.
        state.sync_from_elapsed(Duration::from_millis(900));
        assert_eq!(state.remaining_ms, 1800);

        state.sync_from_elapsed(Duration::from_secs(10));
        assert_eq!(state.remaining_ms, 0);
        assert!(state.is_expired());
    }

    #[test]
    fn config_uses_original_settings_keys() {
        let config: PhaseConfig =
            serde_json::from_str(r#"{"workDuration": 5000, "breakDuration": 2000}"#).unwrap();
        assert_eq!(config, PhaseConfig::new(5000, 2000).unwrap());
    }
}
