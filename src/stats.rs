use anyhow::{Context, Result};
use chrono::Utc;
use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{Mutex, PoisonError},
};

use crate::collaborators::StatsRecorder;
use crate::utils::fs::write_json_atomic;

/// Cumulative totals, persisted as `stats.json`. Times are milliseconds,
/// timestamps are epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsRecord {
    pub total_work_time: u64,
    pub total_break_time: u64,
    pub total_time_on_laptop: u64,
    pub breaks_taken: u64,
    pub breaks_skipped: u64,
    pub current_session_start: i64,
    pub last_updated: i64,
}

impl StatsRecord {
    fn fresh(now_ms: i64) -> Self {
        Self {
            total_work_time: 0,
            total_break_time: 0,
            total_time_on_laptop: 0,
            breaks_taken: 0,
            breaks_skipped: 0,
            current_session_start: now_ms,
            last_updated: now_ms,
        }
    }
}

/// Record plus display strings, with the running session folded into the total.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    #[serde(flatten)]
    pub record: StatsRecord,
    pub formatted_work_time: String,
    pub formatted_break_time: String,
    pub formatted_total_time: String,
}

pub struct StatsStore {
    path: PathBuf,
    data: Mutex<StatsRecord>,
}

impl StatsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let now_ms = Utc::now().timestamp_millis();
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read stats from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Unreadable stats at {}: {err}; starting fresh", path.display());
                StatsRecord::fresh(now_ms)
            })
        } else {
            StatsRecord::fresh(now_ms)
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn record(&self) -> StatsRecord {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn summary(&self) -> StatsSummary {
        self.summary_at(Utc::now().timestamp_millis())
    }

    fn summary_at(&self, now_ms: i64) -> StatsSummary {
        let mut record = self.record();
        let session_ms = u64::try_from(now_ms - record.current_session_start).unwrap_or(0);
        record.total_time_on_laptop += session_ms;

        StatsSummary {
            formatted_work_time: format_duration(record.total_work_time),
            formatted_break_time: format_duration(record.total_break_time),
            formatted_total_time: format_duration(record.total_time_on_laptop),
            record,
        }
    }

    pub fn reset(&self) -> Result<()> {
        let mut guard = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = StatsRecord::fresh(Utc::now().timestamp_millis());
        write_json_atomic(&self.path, &*guard)
    }

    /// Applies `change` and persists. Save failures are logged, never raised.
    fn mutate<F>(&self, change: F)
    where
        F: FnOnce(&mut StatsRecord),
    {
        let mut guard = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        change(&mut guard);
        guard.last_updated = Utc::now().timestamp_millis();
        if let Err(err) = write_json_atomic(&self.path, &*guard) {
            error!("Error saving stats: {err:#}");
        }
    }
}

impl StatsRecorder for StatsStore {
    fn record_work_time(&self, duration_ms: u64) {
        self.mutate(|stats| {
            stats.total_work_time += duration_ms;
            stats.total_time_on_laptop += duration_ms;
        });
    }

    fn record_break_time(&self, duration_ms: u64) {
        self.mutate(|stats| {
            stats.total_break_time += duration_ms;
            stats.total_time_on_laptop += duration_ms;
            stats.breaks_taken += 1;
        });
    }

    fn record_skipped_break(&self) {
        self.mutate(|stats| stats.breaks_skipped += 1);
    }
}

/// `1d 2h 3m`, `2h 5m`, `3m 7s` or `42s`.
pub fn format_duration(ms: u64) -> String {
    let seconds = ms / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{days}d {}h {}m", hours % 24, minutes % 60)
    } else if hours > 0 {
        format!("{hours}h {}m", minutes % 60)
    } else if minutes > 0 {
        format!("{minutes}m {}s", seconds % 60)
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_like_the_stats_screen() {
        assert_eq!(format_duration(42_000), "42s");
        assert_eq!(format_duration(187_000), "3m 7s");
        assert_eq!(format_duration((2 * 60 + 5) * 60_000), "2h 5m");
        assert_eq!(format_duration(((24 + 2) * 60 + 3) * 60_000), "1d 2h 3m");
    }

    #[test]
    fn records_accumulate_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let store = StatsStore::new(path.clone()).unwrap();

        store.record_work_time(1_200_000);
        store.record_break_time(20_000);
        store.record_skipped_break();

        let record = StatsStore::new(path).unwrap().record();
        assert_eq!(record.total_work_time, 1_200_000);
        assert_eq!(record.total_break_time, 20_000);
        assert_eq!(record.total_time_on_laptop, 1_220_000);
        assert_eq!(record.breaks_taken, 1);
        assert_eq!(record.breaks_skipped, 1);
    }

    #[test]
    fn summary_includes_running_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatsStore::new(dir.path().join("stats.json")).unwrap();
        store.record_work_time(60_000);

        let start = store.record().current_session_start;
        let summary = store.summary_at(start + 30_000);
        assert_eq!(summary.record.total_time_on_laptop, 90_000);
        assert_eq!(summary.formatted_total_time, "1m 30s");
        assert_eq!(summary.formatted_work_time, "1m 0s");
    }

    #[test]
    fn reset_zeroes_counters() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatsStore::new(dir.path().join("stats.json")).unwrap();
        store.record_skipped_break();
        store.reset().unwrap();
        assert_eq!(store.record().breaks_skipped, 0);
    }
}
