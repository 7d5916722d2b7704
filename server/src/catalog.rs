//! Device catalog answered on SYNC

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

/// Static list of device descriptions exposed to the platform
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceCatalog {
    devices: Vec<Value>,
}

impl DeviceCatalog {
    pub fn new(devices: Vec<Value>) -> Self {
        Self { devices }
    }

    /// Load a JSON array of device descriptions
    ///
    /// A missing file yields an empty catalog; an unreadable or malformed one
    /// is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Device catalog not found, SYNC will report no devices");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read device catalog {}", path.display()))?;
        let devices: Vec<Value> = serde_json::from_str(&raw)
            .with_context(|| format!("Device catalog {} is not a JSON array", path.display()))?;

        info!(path = %path.display(), devices = devices.len(), "Device catalog loaded");
        Ok(Self { devices })
    }

    pub fn devices(&self) -> &[Value] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
