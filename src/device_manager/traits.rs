//! Device manager abstraction for host-provided transmission

use async_trait::async_trait;
use lanbridge_shared::ExchangeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One UDP exchange requested from the device manager
///
/// `data` and every entry of the response's `response_packets` are
/// hex-encoded datagram bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UdpRequestData {
    pub request_id: String,
    pub device_id: String,
    pub port: u16,
    pub data: String,
    pub expected_response_packets: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UdpResponseData {
    pub request_id: String,
    pub device_id: String,
    #[serde(default)]
    pub response_packets: Vec<String>,
}

/// Device manager refusal, optionally carrying a platform error code
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct CommandFailure {
    pub error_code: Option<String>,
    pub message: String,
}

impl CommandFailure {
    pub fn new(error_code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.map(str::to_string),
            message: message.into(),
        }
    }
}

impl From<CommandFailure> for ExchangeError {
    fn from(failure: CommandFailure) -> Self {
        ExchangeError::Rejected {
            code: failure.error_code,
            message: failure.message,
        }
    }
}

/// Sends datagrams to devices on behalf of the agent
#[async_trait]
pub trait DeviceManager: Send + Sync {
    /// Send one datagram and collect the expected number of response packets
    async fn send(&self, request: UdpRequestData) -> Result<UdpResponseData, CommandFailure>;

    /// Human-readable name for this device manager
    fn name(&self) -> &'static str;
}
