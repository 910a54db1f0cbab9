pub mod collaborators;
pub mod display;
pub mod error;
pub mod foreground;
pub mod host;
pub mod lockdown;
pub mod orchestrator;
pub mod settings;
pub mod stats;
pub mod timer;
pub mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use log::{info, warn};

use foreground::SystemForegroundApps;
use host::InMemoryHost;
use orchestrator::{
    BreakOrchestrator, ChannelObserver, Collaborators, HostBindings, OrchestratorOptions,
};
use settings::SettingsStore;
use stats::StatsStore;

pub use error::{HostError, LookawayError};

/// Directory holding `settings.json` and `stats.json`.
///
/// `LOOKAWAY_DATA_DIR` wins; otherwise the platform config dir.
pub fn data_dir() -> anyhow::Result<PathBuf> {
    if let Some(dir) = std::env::var_os("LOOKAWAY_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir()
        .map(|dir| dir.join("lookaway"))
        .context("no config directory available; set LOOKAWAY_DATA_DIR")
}

/// Headless runner: drives the break cycle against the in-memory host and
/// prints every lifecycle event as one JSON line until Ctrl-C.
pub fn run() -> anyhow::Result<()> {
    utils::logging::init_logging();
    info!("Lookaway starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(async {
        let app_data_dir = data_dir()?;
        std::fs::create_dir_all(&app_data_dir).with_context(|| {
            format!("Failed to create data dir {}", app_data_dir.display())
        })?;

        let settings = Arc::new(SettingsStore::new(app_data_dir.join("settings.json"))?);
        let stats = Arc::new(StatsStore::new(app_data_dir.join("stats.json"))?);
        let host = Arc::new(InMemoryHost::new());
        let (observer, mut events) = ChannelObserver::new();

        let spawned = BreakOrchestrator::spawn(
            HostBindings {
                windows: host.clone(),
                displays: host.clone(),
                shortcuts: host,
            },
            Collaborators {
                observers: vec![Arc::new(observer)],
                stats: stats.clone(),
                foreground: Arc::new(SystemForegroundApps),
                config: settings,
            },
            OrchestratorOptions::from_env(),
        );
        for warning in &spawned.warnings {
            warn!("Running degraded: {warning}");
        }

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => println!("{}", serde_json::to_string(&event)?),
                    None => break,
                },
                signal = tokio::signal::ctrl_c() => {
                    signal.context("Failed to listen for Ctrl-C")?;
                    info!("Interrupted; shutting down");
                    break;
                }
            }
        }

        if let Err(err) = spawned.handle.shutdown().await {
            warn!("orchestrator already stopped: {err}");
        }
        let _ = spawned.task.await;

        let summary = stats.summary();
        info!(
            "Session totals: work {}, breaks {}, {} taken, {} skipped",
            summary.formatted_work_time,
            summary.formatted_break_time,
            summary.record.breaks_taken,
            summary.record.breaks_skipped
        );
        Ok(())
    })
}
