//! Device link over a device manager

use super::traits::{DeviceManager, UdpRequestData};
use async_trait::async_trait;
use lanbridge_shared::codec;
use lanbridge_shared::protocol::UNSOLICITED_MSG_ID;
use lanbridge_shared::{DeviceLink, DeviceMessage, DeviceReply, Envelope, ExchangeError};
use std::sync::Arc;

/// Exchanges device messages through a device manager on behalf of one
/// platform request
///
/// Each exchange travels as hex-encoded `{"msgId": 0, "payload": ...}` and
/// expects exactly one response packet. The device manager correlates the
/// response, so no id is allocated.
pub struct DeviceManagerLink {
    manager: Arc<dyn DeviceManager>,
    request_id: String,
    port: u16,
}

impl DeviceManagerLink {
    pub fn new(manager: Arc<dyn DeviceManager>, request_id: impl Into<String>, port: u16) -> Self {
        Self {
            manager,
            request_id: request_id.into(),
            port,
        }
    }
}

#[async_trait]
impl DeviceLink for DeviceManagerLink {
    async fn exchange(&self, message: DeviceMessage) -> Result<DeviceReply, ExchangeError> {
        let device_id = message.device_id.clone();
        let data = codec::encode_hex_json(&Envelope::new(UNSOLICITED_MSG_ID, message))?;

        let response = self
            .manager
            .send(UdpRequestData {
                request_id: self.request_id.clone(),
                device_id,
                port: self.port,
                data,
                expected_response_packets: 1,
            })
            .await?;

        let packet = response.response_packets.first().ok_or_else(|| {
            ExchangeError::MalformedReply(format!("no response packet from {}", response.device_id))
        })?;

        let reply: Envelope<DeviceReply> = codec::decode_hex_json(packet)?;
        Ok(reply.payload)
    }

    fn name(&self) -> &'static str {
        "device-manager"
    }
}
