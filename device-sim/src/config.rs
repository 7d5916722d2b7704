//! Simulator configuration

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use lanbridge_shared::{ports, DeviceIdentity};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "LANBRIDGE_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "device-sim.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Where commands and discovery probes arrive
    pub listen_addr: SocketAddr,
    /// State-push listener of the fulfillment server
    pub report_addr: SocketAddr,
    pub device_id: String,
    pub local_device_id: String,
    /// Tracks in the emulated playlist
    pub track_count: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, ports::DEVICE_COMMAND_PORT)),
            report_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, ports::STATE_PUSH_PORT)),
            device_id: "soundbar".to_string(),
            local_device_id: "deviceid123".to_string(),
            track_count: 3,
        }
    }
}

impl SimConfig {
    /// Load defaults, then the TOML file, then `LANBRIDGE_*` variables
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        Self::figment(&path)
            .extract()
            .with_context(|| format!("Failed to load configuration from {path}"))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(SimConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("LANBRIDGE_").ignore(&["config"]))
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            device_id: self.device_id.clone(),
            local_device_id: self.local_device_id.clone(),
        }
    }
}
