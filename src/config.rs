//! Hub agent configuration

use crate::connection::ConnectionConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use lanbridge_shared::{ports, timing};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "LANBRIDGE_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "hub-agent.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Host runtime forwarding platform intents
    pub host_addr: SocketAddr,
    /// Device (or broadcast) address device traffic is sent to
    pub device_addr: IpAddr,
    pub device_port: u16,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let broadcast: Ipv4Addr = ports::DEVICE_BROADCAST_ADDR
            .parse()
            .unwrap_or(Ipv4Addr::BROADCAST);

        Self {
            host_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8070)),
            device_addr: IpAddr::V4(broadcast),
            device_port: ports::DEVICE_COMMAND_PORT,
            request_timeout_ms: timing::DEVICE_REQUEST_TIMEOUT_MS,
            connect_timeout_ms: 5000,
            reconnect_delay_ms: 1000,
            max_reconnect_delay_ms: 30_000,
        }
    }
}

impl AgentConfig {
    /// Load defaults, then the TOML file, then `LANBRIDGE_*` variables
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        Self::figment(&path)
            .extract()
            .with_context(|| format!("Failed to load configuration from {path}"))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(AgentConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("LANBRIDGE_").ignore(&["config"]))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            host_addr: self.host_addr,
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            max_reconnect_delay: Duration::from_millis(self.max_reconnect_delay_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.device_addr, "192.168.1.255".parse::<IpAddr>().unwrap());
        assert_eq!(config.device_port, 3311);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));

        let connection = config.connection();
        assert_eq!(connection.reconnect_delay, Duration::from_secs(1));
        assert_eq!(connection.max_reconnect_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "hub-agent.toml",
                r#"
                host_addr = "10.0.0.2:8070"
                device_port = 4000
                "#,
            )?;
            jail.set_env("LANBRIDGE_DEVICE_PORT", "5000");

            let config: AgentConfig = AgentConfig::figment("hub-agent.toml").extract()?;
            assert_eq!(config.host_addr, "10.0.0.2:8070".parse().unwrap());
            assert_eq!(config.device_port, 5000);
            assert_eq!(config.max_reconnect_delay_ms, 30_000);
            Ok(())
        });
    }
}
