use async_trait::async_trait;
#[cfg(target_os = "macos")]
use log::{error, info};
use log::debug;

use crate::collaborators::{ForegroundApp, ForegroundApps};

/// Foreground helper backed by the OS. Only macOS can restore focus; on other
/// platforms capture yields nothing.
pub struct SystemForegroundApps;

#[async_trait]
impl ForegroundApps for SystemForegroundApps {
    async fn capture_foreground_app(&self) -> Option<ForegroundApp> {
        #[cfg(target_os = "macos")]
        {
            let bundle_id = osascript(
                "tell application \"System Events\" to get bundle identifier of first application process whose frontmost is true",
            )
            .await;
            let name = osascript(
                "tell application \"System Events\" to get name of first application process whose frontmost is true",
            )
            .await;
            if bundle_id.is_none() && name.is_none() {
                return None;
            }
            let app = ForegroundApp {
                bundle_id,
                name,
                platform: std::env::consts::OS.to_string(),
            };
            info!("Saved previous app: {app:?}");
            Some(app)
        }

        #[cfg(not(target_os = "macos"))]
        {
            debug!(
                "foreground app capture not supported on {}",
                std::env::consts::OS
            );
            None
        }
    }

    async fn restore_foreground_app(&self, app: &ForegroundApp) {
        if app.platform != std::env::consts::OS {
            debug!("not restoring {app:?}: captured on another platform");
            return;
        }

        #[cfg(target_os = "macos")]
        {
            let script = match (&app.bundle_id, &app.name) {
                (Some(bundle_id), _) => {
                    format!("tell application id \"{}\" to activate", escape(bundle_id))
                }
                (None, Some(name)) => format!("tell application \"{}\" to activate", escape(name)),
                (None, None) => return,
            };
            match osascript(&script).await {
                Some(_) => info!("Restored app: {:?}", app.name),
                None => error!("Error restoring app {:?}", app.name),
            }
        }
    }
}

#[cfg(target_os = "macos")]
async fn osascript(script: &str) -> Option<String> {
    let output = match tokio::process::Command::new("osascript")
        .args(["-e", script])
        .output()
        .await
    {
        Ok(output) => output,
        Err(err) => {
            error!("failed to run osascript: {err}");
            return None;
        }
    };

    if !output.status.success() {
        error!(
            "osascript exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return None;
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

#[cfg(target_os = "macos")]
fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
