//! Request/response correlation over UDP
//!
//! This module handles:
//! - Allocating a correlation id per outbound device request
//! - Tracking in-flight requests until they are answered or time out
//! - Matching inbound replies to requests by id
//! - Dropping malformed, late and unmatched datagrams

mod pending;
mod timeout;

pub use pending::{PendingRequest, PendingTable, ReplyOutcome};
pub use timeout::TimeoutSweeper;

use crate::codec;
use crate::error::ExchangeError;
use crate::protocol::{CorrelationId, DeviceMessage, DeviceReply, Envelope};
use crate::{ports, timing};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Configuration for a transceiver socket
#[derive(Debug, Clone)]
pub struct TransceiverConfig {
    /// Local address to bind (replies arrive here)
    pub bind_addr: SocketAddr,
    /// Allow sending to broadcast addresses
    pub broadcast: bool,
    /// How long a request may wait for its reply
    pub request_timeout: Duration,
    /// Period of the background timeout sweep
    pub sweep_interval: Duration,
}

impl Default for TransceiverConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, ports::REPLY_LISTEN_PORT)),
            broadcast: true,
            request_timeout: Duration::from_millis(timing::DEVICE_REQUEST_TIMEOUT_MS),
            sweep_interval: Duration::from_millis(timing::TIMEOUT_SWEEP_INTERVAL_MS),
        }
    }
}

/// Owns one UDP socket and correlates requests sent on it with their replies
///
/// Construct once per socket and share it behind an `Arc`. The receive loop
/// and the timeout sweeper run as background tasks holding weak references;
/// they are aborted when the transceiver is dropped, which also fails any
/// request still waiting with [`ExchangeError::Closed`].
pub struct Transceiver {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    pending: Mutex<PendingTable>,
    tasks: Vec<JoinHandle<()>>,
}

impl Transceiver {
    /// Bind a socket and start the transceiver. Must be called within a Tokio runtime.
    pub async fn bind(config: &TransceiverConfig) -> io::Result<Arc<Self>> {
        let socket = UdpSocket::bind(config.bind_addr).await?;
        if config.broadcast {
            socket.set_broadcast(true)?;
        }
        Self::with_socket(socket, config)
    }

    /// Start a transceiver on an already bound socket
    pub fn with_socket(socket: UdpSocket, config: &TransceiverConfig) -> io::Result<Arc<Self>> {
        let local_addr = socket.local_addr()?;
        let socket = Arc::new(socket);
        let request_timeout = config.request_timeout;
        let sweep_interval = config.sweep_interval;

        info!(%local_addr, timeout_ms = request_timeout.as_millis() as u64, "UDP transceiver listening");

        Ok(Arc::new_cyclic(|owner: &Weak<Self>| {
            let tasks = vec![
                tokio::spawn(receive_loop(socket.clone(), owner.clone())),
                tokio::spawn(TimeoutSweeper::new(owner.clone(), sweep_interval).run()),
            ];

            Self {
                socket,
                local_addr,
                pending: Mutex::new(PendingTable::new(request_timeout)),
                tasks,
            }
        }))
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send a message to a device and wait for the matching reply
    ///
    /// Fails with [`ExchangeError::Send`] straight away if the datagram cannot
    /// be transmitted, or with [`ExchangeError::Timeout`] once the request has
    /// waited longer than the configured timeout.
    pub async fn transceive(
        &self,
        message: &DeviceMessage,
        destination: SocketAddr,
    ) -> Result<DeviceReply, ExchangeError> {
        let (msg_id, reply_rx) = {
            let mut pending = self.pending.lock().await;
            let now = Instant::now();
            log_evicted(&pending.sweep(now));
            pending.register(now)
        };

        let datagram = match codec::encode_datagram(&Envelope::new(msg_id, message)) {
            Ok(datagram) => datagram,
            Err(e) => {
                self.pending.lock().await.discard(msg_id);
                return Err(e.into());
            }
        };

        if let Err(e) = self.socket.send_to(&datagram, destination).await {
            self.pending.lock().await.discard(msg_id);
            warn!(msg_id, %destination, error = %e, "Failed to send device request");
            return Err(ExchangeError::Send(e));
        }

        debug!(
            msg_id,
            %destination,
            intent = %message.intent,
            device_id = %message.device_id,
            "Sent device request"
        );

        match reply_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ExchangeError::Closed(msg_id)),
        }
    }

    /// Process one inbound datagram: resolve its request if pending, then sweep
    async fn handle_datagram(&self, bytes: &[u8], from: SocketAddr) {
        let parsed = codec::decode_datagram::<DeviceReply>(bytes);
        let mut pending = self.pending.lock().await;

        match parsed {
            Ok(envelope) => {
                let msg_id = envelope.msg_id;
                if pending.resolve(msg_id, envelope.payload) {
                    debug!(msg_id, %from, "Matched device reply");
                } else {
                    debug!(msg_id, %from, "Discarding unmatched reply");
                }
            }
            Err(e) => {
                warn!(%from, error = %e, "Dropping malformed reply");
            }
        }

        log_evicted(&pending.sweep(Instant::now()));
    }

    /// Evict timed-out requests now
    pub async fn sweep(&self) -> Vec<CorrelationId> {
        let evicted = self.pending.lock().await.sweep(Instant::now());
        log_evicted(&evicted);
        evicted
    }

    /// Number of requests awaiting a reply
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Check whether a request is still awaiting a reply
    pub async fn is_pending(&self, msg_id: CorrelationId) -> bool {
        self.pending.lock().await.contains(msg_id)
    }
}

impl Drop for Transceiver {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn log_evicted(evicted: &[CorrelationId]) {
    for msg_id in evicted {
        debug!(msg_id, "Request timed out and was evicted");
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, owner: Weak<Transceiver>) {
    let mut buf = vec![0u8; codec::MAX_DATAGRAM_SIZE];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((n, from)) => {
                if let Some(transceiver) = owner.upgrade() {
                    transceiver.handle_datagram(&buf[..n], from).await;
                }
            }
            Err(e) => {
                // ICMP errors from earlier sends surface here; keep listening
                warn!(error = %e, "UDP receive error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StateMap;
    use serde_json::json;
    use tokio::time::timeout;

    fn test_config(timeout_ms: u64) -> TransceiverConfig {
        TransceiverConfig {
            bind_addr: "127.0.0.1:0".parse().expect("addr"),
            broadcast: false,
            request_timeout: Duration::from_millis(timeout_ms),
            sweep_interval: Duration::from_millis(20),
        }
    }

    async fn device_socket() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind device");
        let addr = socket.local_addr().expect("device addr");
        (socket, addr)
    }

    async fn recv_request(socket: &UdpSocket) -> (Envelope<DeviceMessage>, SocketAddr) {
        let mut buf = vec![0u8; codec::MAX_DATAGRAM_SIZE];
        let (n, from) = socket.recv_from(&mut buf).await.expect("device recv");
        let envelope = codec::decode_datagram(&buf[..n]).expect("device decode");
        (envelope, from)
    }

    async fn send_reply(socket: &UdpSocket, to: SocketAddr, msg_id: CorrelationId, device_id: &str, states: serde_json::Value) {
        let body = json!({"msgId": msg_id, "payload": {"device_id": device_id, "states": states}});
        socket
            .send_to(body.to_string().as_bytes(), to)
            .await
            .expect("device send");
    }

    fn states(value: serde_json::Value) -> StateMap {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("states must be an object"),
        }
    }

    #[tokio::test]
    async fn test_query_resolves_with_reply() {
        let transceiver = Transceiver::bind(&test_config(2000)).await.expect("bind");
        let (device, device_addr) = device_socket().await;

        let responder = tokio::spawn(async move {
            let (request, from) = recv_request(&device).await;
            assert_eq!(request.msg_id, 1);
            assert_eq!(request.payload.device_id, "d1");
            send_reply(&device, from, request.msg_id, "d1", json!({"on": true})).await;
        });

        let reply = transceiver
            .transceive(&DeviceMessage::query("d1"), device_addr)
            .await
            .expect("should resolve");

        responder.await.expect("responder");
        assert_eq!(reply.device_id, "d1");
        assert_eq!(reply.states, states(json!({"on": true})));
        assert_eq!(transceiver.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_no_reply_times_out_and_evicts() {
        let transceiver = Transceiver::bind(&test_config(150)).await.expect("bind");
        let (device, device_addr) = device_socket().await;

        let started = Instant::now();
        let err = transceiver
            .transceive(&DeviceMessage::query("d1"), device_addr)
            .await
            .expect_err("should time out");

        let msg_id = match err {
            ExchangeError::Timeout { msg_id, timeout_ms } => {
                assert_eq!(timeout_ms, 150);
                msg_id
            }
            other => panic!("unexpected error {:?}", other),
        };
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert!(!transceiver.is_pending(msg_id).await);

        // The late reply is unmatched and must not disturb the next exchange
        let (request, from) = recv_request(&device).await;
        send_reply(&device, from, request.msg_id, "d1", json!({"on": false})).await;

        let responder = tokio::spawn(async move {
            let (request, from) = recv_request(&device).await;
            send_reply(&device, from, request.msg_id, "d1", json!({"on": true})).await;
        });
        let reply = transceiver
            .transceive(&DeviceMessage::query("d1"), device_addr)
            .await
            .expect("second request should resolve");
        responder.await.expect("responder");
        assert_eq!(reply.states["on"], true);
    }

    #[tokio::test]
    async fn test_send_failure_rejects_immediately() {
        let transceiver = Transceiver::bind(&test_config(5000)).await.expect("bind");

        // An IPv6 destination cannot be reached from an IPv4 socket
        let destination: SocketAddr = "[::1]:3311".parse().expect("addr");
        let started = Instant::now();
        let err = transceiver
            .transceive(&DeviceMessage::query("d1"), destination)
            .await
            .expect_err("send should fail");

        assert!(matches!(err, ExchangeError::Send(_)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(transceiver.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_resolve_independently() {
        let transceiver = Transceiver::bind(&test_config(2000)).await.expect("bind");
        let (device, device_addr) = device_socket().await;
        const N: usize = 5;

        // Answer in reverse order, preceded by noise for an id never issued
        let responder = tokio::spawn(async move {
            let mut requests = Vec::new();
            for _ in 0..N {
                requests.push(recv_request(&device).await);
            }
            let from = requests[0].1;
            send_reply(&device, from, 9999, "ghost", json!({"on": true})).await;
            device.send_to(b"not json", from).await.expect("device send");

            for (request, from) in requests.into_iter().rev() {
                let id = request.payload.device_id.clone();
                send_reply(&device, from, request.msg_id, &id, json!({"name": id})).await;
            }
        });

        let mut handles = Vec::new();
        for i in 0..N {
            let transceiver = transceiver.clone();
            handles.push(tokio::spawn(async move {
                let device_id = format!("dev-{i}");
                let reply = transceiver
                    .transceive(&DeviceMessage::query(device_id.clone()), device_addr)
                    .await
                    .expect("should resolve");
                (device_id, reply)
            }));
        }

        for handle in handles {
            let (device_id, reply) = handle.await.expect("task");
            assert_eq!(reply.device_id, device_id);
            assert_eq!(reply.states["name"], json!(device_id));
        }
        responder.await.expect("responder");
        assert_eq!(transceiver.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_timeout_of_one_request_leaves_others_intact() {
        let transceiver = Transceiver::bind(&test_config(200)).await.expect("bind");
        let (device, device_addr) = device_socket().await;

        // Only answer the device named "alive"
        let responder = tokio::spawn(async move {
            for _ in 0..2 {
                let (request, from) = recv_request(&device).await;
                if request.payload.device_id == "alive" {
                    send_reply(&device, from, request.msg_id, "alive", json!({"online": true})).await;
                }
            }
        });

        let silent_query = DeviceMessage::query("silent");
        let alive_query = DeviceMessage::query("alive");
        let silent = transceiver.transceive(&silent_query, device_addr);
        let alive = transceiver.transceive(&alive_query, device_addr);
        let (silent, alive) = tokio::join!(silent, alive);

        responder.await.expect("responder");
        assert!(silent.expect_err("should time out").is_timeout());
        assert_eq!(alive.expect("should resolve").states["online"], true);
    }

    #[tokio::test]
    async fn test_zero_sweep_interval_still_times_out() {
        let config = TransceiverConfig {
            sweep_interval: Duration::ZERO,
            ..test_config(100)
        };
        let transceiver = Transceiver::bind(&config).await.expect("bind");
        let (_device, device_addr) = device_socket().await;

        let err = timeout(
            Duration::from_secs(2),
            transceiver.transceive(&DeviceMessage::query("d1"), device_addr),
        )
        .await
        .expect("sweeper should evict without traffic")
        .expect_err("should time out");
        assert!(err.is_timeout());
        assert_eq!(transceiver.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_inbound_datagram_sweeps_stale_requests() {
        let config = TransceiverConfig {
            sweep_interval: Duration::from_secs(3600),
            ..test_config(100)
        };
        let transceiver = Transceiver::bind(&config).await.expect("bind");
        let (device, device_addr) = device_socket().await;

        let request = tokio::spawn({
            let transceiver = transceiver.clone();
            async move {
                transceiver
                    .transceive(&DeviceMessage::query("silent"), device_addr)
                    .await
            }
        });
        let (stale, _) = recv_request(&device).await;

        // Past the deadline, but nothing has swept yet
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(transceiver.is_pending(stale.msg_id).await);

        send_reply(&device, transceiver.local_addr(), 9999, "ghost", json!({})).await;

        let err = timeout(Duration::from_secs(2), request)
            .await
            .expect("traffic should trigger the sweep")
            .expect("task")
            .expect_err("should time out");
        assert!(err.is_timeout());
        assert!(!transceiver.is_pending(stale.msg_id).await);
    }

    #[tokio::test]
    async fn test_late_reply_resolves_before_sweep() {
        let config = TransceiverConfig {
            sweep_interval: Duration::from_secs(3600),
            ..test_config(100)
        };
        let transceiver = Transceiver::bind(&config).await.expect("bind");
        let (device, device_addr) = device_socket().await;

        let responder = tokio::spawn(async move {
            let (request, from) = recv_request(&device).await;
            tokio::time::sleep(Duration::from_millis(250)).await;
            send_reply(&device, from, request.msg_id, "d1", json!({"on": true})).await;
        });

        let reply = timeout(
            Duration::from_secs(2),
            transceiver.transceive(&DeviceMessage::query("d1"), device_addr),
        )
        .await
        .expect("reply should settle the request")
        .expect("match is processed before the sweep");

        responder.await.expect("responder");
        assert_eq!(reply.states["on"], true);
        assert_eq!(transceiver.pending_count().await, 0);
    }
}
