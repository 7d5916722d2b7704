//! Server configuration

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use lanbridge_shared::{ports, timing, TransceiverConfig};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "LANBRIDGE_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "fulfillment.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Where the platform connects with intents
    pub listen_addr: SocketAddr,
    /// Where device commands are sent (normally the LAN broadcast address)
    pub device_addr: SocketAddr,
    /// Local address device replies arrive on
    pub reply_addr: SocketAddr,
    /// Local address devices push unsolicited state to
    pub report_addr: SocketAddr,
    /// Platform endpoint receiving state reports
    pub upstream_addr: SocketAddr,
    /// How long to wait for the upstream connection to open
    pub upstream_connect_timeout_ms: u64,
    pub agent_user_id: String,
    /// JSON array of device descriptions returned on SYNC
    pub catalog_path: PathBuf,
    pub request_timeout_ms: u64,
    pub sweep_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let broadcast: Ipv4Addr = ports::DEVICE_BROADCAST_ADDR
            .parse()
            .unwrap_or(Ipv4Addr::BROADCAST);

        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            device_addr: SocketAddr::from((broadcast, ports::DEVICE_COMMAND_PORT)),
            reply_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, ports::REPLY_LISTEN_PORT)),
            report_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, ports::STATE_PUSH_PORT)),
            upstream_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8090)),
            upstream_connect_timeout_ms: timing::UPSTREAM_CONNECT_TIMEOUT_MS,
            agent_user_id: "user01".to_string(),
            catalog_path: PathBuf::from("onsync.json"),
            request_timeout_ms: timing::DEVICE_REQUEST_TIMEOUT_MS,
            sweep_interval_ms: timing::TIMEOUT_SWEEP_INTERVAL_MS,
        }
    }
}

impl ServerConfig {
    /// Load defaults, then the TOML file, then `LANBRIDGE_*` variables
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        Self::figment(&path)
            .extract()
            .with_context(|| format!("Failed to load configuration from {path}"))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(ServerConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("LANBRIDGE_").ignore(&["config"]))
    }

    pub fn transceiver(&self) -> TransceiverConfig {
        TransceiverConfig {
            bind_addr: self.reply_addr,
            broadcast: true,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_device_network() {
        let config = ServerConfig::default();
        assert_eq!(config.device_addr, "192.168.1.255:3311".parse().unwrap());
        assert_eq!(config.reply_addr.port(), 3312);
        assert_eq!(config.report_addr.port(), 3314);
        assert_eq!(config.agent_user_id, "user01");
        assert_eq!(config.transceiver().request_timeout, Duration::from_secs(5));
        assert_eq!(config.upstream_connect_timeout_ms, 5000);
    }

    #[test]
    fn test_toml_and_env_override_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "fulfillment.toml",
                r#"
                agent_user_id = "household-7"
                request_timeout_ms = 2000
                "#,
            )?;
            jail.set_env("LANBRIDGE_DEVICE_ADDR", "10.0.0.255:3311");

            let config: ServerConfig = ServerConfig::figment("fulfillment.toml").extract()?;
            assert_eq!(config.agent_user_id, "household-7");
            assert_eq!(config.request_timeout_ms, 2000);
            assert_eq!(config.device_addr, "10.0.0.255:3311".parse().unwrap());
            assert_eq!(config.listen_addr.port(), 8080);
            Ok(())
        });
    }
}
