use anyhow::{Context, Result};
use log::{info, warn};
use serde::Deserialize;
use std::{
    fs,
    path::PathBuf,
    sync::{PoisonError, RwLock},
};

use crate::collaborators::ConfigStore;
use crate::timer::{PhaseConfig, MIN_PHASE_MS};
use crate::utils::fs::write_json_atomic;

/// On-disk shape; fields below the floor are ignored individually.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSettings {
    work_duration: Option<u64>,
    break_duration: Option<u64>,
}

impl StoredSettings {
    fn resolve(self) -> PhaseConfig {
        let mut config = PhaseConfig::default();
        match self.work_duration {
            Some(ms) if ms >= MIN_PHASE_MS => config.work_duration_ms = ms,
            Some(ms) => warn!("ignoring stored workDuration {ms}ms (below {MIN_PHASE_MS}ms)"),
            None => {}
        }
        match self.break_duration {
            Some(ms) if ms >= MIN_PHASE_MS => config.break_duration_ms = ms,
            Some(ms) => warn!("ignoring stored breakDuration {ms}ms (below {MIN_PHASE_MS}ms)"),
            None => {}
        }
        config
    }
}

/// JSON-backed phase durations (`settings.json` in the data directory).
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<PhaseConfig>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str::<StoredSettings>(&contents) {
                Ok(stored) => stored.resolve(),
                Err(err) => {
                    warn!("Unreadable settings at {}: {err}; using defaults", path.display());
                    PhaseConfig::default()
                }
            }
        } else {
            PhaseConfig::default()
        };

        info!(
            "Settings loaded: work {}ms, break {}ms",
            data.work_duration_ms, data.break_duration_ms
        );

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn config(&self) -> PhaseConfig {
        *self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update(&self, config: PhaseConfig) -> Result<()> {
        config.validate()?;
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        write_json_atomic(&self.path, &config)?;
        *guard = config;
        info!("Settings saved: {config:?}");
        Ok(())
    }
}

impl ConfigStore for SettingsStore {
    fn load_config(&self) -> Result<PhaseConfig> {
        Ok(self.config())
    }

    fn save_config(&self, config: &PhaseConfig) -> Result<()> {
        self.update(*config)
    }
}
