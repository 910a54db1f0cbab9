//! Display geometry snapshots taken at break entry.

use std::sync::Arc;

use log::{error, warn};
use serde::{Deserialize, Serialize};

use crate::error::{HostError, LookawayError};

/// Safe area used when the host reports no displays at all.
pub const FALLBACK_BOUNDS: Bounds = Bounds {
    x: 0,
    y: 0,
    width: 1280,
    height: 800,
};

pub const FALLBACK_DISPLAY_ID: &str = "fallback";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DisplayDescriptor {
    pub id: String,
    pub bounds: Bounds,
    /// Set on the display the OS reports as primary.
    pub is_primary: bool,
}

impl DisplayDescriptor {
    pub fn new(id: impl Into<String>, bounds: Bounds, is_primary: bool) -> Self {
        Self {
            id: id.into(),
            bounds,
            is_primary,
        }
    }

    fn fallback() -> Self {
        Self::new(FALLBACK_DISPLAY_ID, FALLBACK_BOUNDS, true)
    }
}

/// Host-side source of the physical display list.
pub trait DisplaySource: Send + Sync {
    fn displays(&self) -> Result<Vec<DisplayDescriptor>, HostError>;
}

/// Reads displays from the host and normalises the result: primary first,
/// never empty.
#[derive(Clone)]
pub struct DisplayEnumerator {
    source: Arc<dyn DisplaySource>,
}

impl DisplayEnumerator {
    pub fn new(source: Arc<dyn DisplaySource>) -> Self {
        Self { source }
    }

    pub fn list_displays(&self) -> Vec<DisplayDescriptor> {
        let mut displays = match self.source.displays() {
            Ok(displays) => displays,
            Err(err) => {
                let err = LookawayError::DisplayEnumeration(err.to_string());
                error!("{err}; falling back to a synthetic display");
                return vec![DisplayDescriptor::fallback()];
            }
        };

        if displays.is_empty() {
            warn!("host reported zero displays; using synthetic {FALLBACK_BOUNDS:?}");
            return vec![DisplayDescriptor::fallback()];
        }

        // Stable sort keeps the host's order among secondaries.
        displays.sort_by_key(|display| !display.is_primary);

        // Exactly one primary, even if the host flagged none or several.
        for (index, display) in displays.iter_mut().enumerate() {
            display.is_primary = index == 0;
        }

        displays
    }
}
