//! UDP device manager sending straight to the LAN

use super::traits::{CommandFailure, DeviceManager, UdpRequestData, UdpResponseData};
use async_trait::async_trait;
use lanbridge_shared::codec;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::debug;

/// Error code reported when a device does not answer in time
pub const DEVICE_OFFLINE: &str = "deviceOffline";

/// Sends each request from its own ephemeral socket, so replies need no
/// correlation id
pub struct UdpDeviceManager {
    device_host: IpAddr,
    response_timeout: Duration,
}

impl UdpDeviceManager {
    pub fn new(device_host: IpAddr, response_timeout: Duration) -> Self {
        Self {
            device_host,
            response_timeout,
        }
    }

    async fn open_socket(&self) -> std::io::Result<UdpSocket> {
        let bind_addr = match self.device_host {
            IpAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            IpAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.set_broadcast(true)?;
        Ok(socket)
    }
}

#[async_trait]
impl DeviceManager for UdpDeviceManager {
    async fn send(&self, request: UdpRequestData) -> Result<UdpResponseData, CommandFailure> {
        let payload = hex::decode(&request.data)
            .map_err(|e| CommandFailure::new(None, format!("Request data is not hex: {e}")))?;

        let socket = self
            .open_socket()
            .await
            .map_err(|e| CommandFailure::new(None, format!("Failed to open socket: {e}")))?;

        let target = SocketAddr::new(self.device_host, request.port);
        socket
            .send_to(&payload, target)
            .await
            .map_err(|e| CommandFailure::new(None, format!("Send to {target} failed: {e}")))?;

        debug!(
            request_id = %request.request_id,
            device_id = %request.device_id,
            %target,
            "Datagram sent"
        );

        let expected = request.expected_response_packets as usize;
        let mut packets = Vec::with_capacity(expected);
        let mut buf = vec![0u8; codec::MAX_DATAGRAM_SIZE];
        let deadline = Instant::now() + self.response_timeout;

        while packets.len() < expected {
            match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Ok(Ok((n, from))) => {
                    debug!(device_id = %request.device_id, %from, bytes = n, "Response packet");
                    packets.push(hex::encode(&buf[..n]));
                }
                Ok(Err(e)) => {
                    return Err(CommandFailure::new(None, format!("Receive failed: {e}")));
                }
                Err(_) => {
                    return Err(CommandFailure::new(
                        Some(DEVICE_OFFLINE),
                        format!(
                            "{} answered {}/{} packets within {}ms",
                            request.device_id,
                            packets.len(),
                            expected,
                            self.response_timeout.as_millis()
                        ),
                    ));
                }
            }
        }

        Ok(UdpResponseData {
            request_id: request.request_id,
            device_id: request.device_id,
            response_packets: packets,
        })
    }

    fn name(&self) -> &'static str {
        "udp"
    }
}
