//! Device link abstraction for pluggable transports

use crate::error::ExchangeError;
use crate::protocol::{DeviceMessage, DeviceReply};
use crate::transceiver::Transceiver;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;

/// Carries one request to a device and returns its reply
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Exchange a single message with the device it names
    async fn exchange(&self, message: DeviceMessage) -> Result<DeviceReply, ExchangeError>;

    /// Human-readable name for this link
    fn name(&self) -> &'static str;
}

/// Sends every request through a shared transceiver to one fixed address,
/// typically the LAN broadcast address
pub struct BroadcastLink {
    transceiver: Arc<Transceiver>,
    destination: SocketAddr,
}

impl BroadcastLink {
    pub fn new(transceiver: Arc<Transceiver>, destination: SocketAddr) -> Self {
        Self {
            transceiver,
            destination,
        }
    }
}

#[async_trait]
impl DeviceLink for BroadcastLink {
    async fn exchange(&self, message: DeviceMessage) -> Result<DeviceReply, ExchangeError> {
        self.transceiver.transceive(&message, self.destination).await
    }

    fn name(&self) -> &'static str {
        "broadcast"
    }
}
