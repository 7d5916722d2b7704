//! Connection manager with a persistent host connection and automatic reconnection

use anyhow::{anyhow, Result};
use bytes::Bytes;
use lanbridge_shared::codec::{self, CodecError, FrameDecoder};
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Events emitted by the connection manager
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Successfully connected to the host
    Connected { addr: SocketAddr },
    /// Disconnected from the host
    Disconnected { reason: String },
    /// Received a request frame from the host
    Received(Value),
    /// Connection attempt failed; another follows after the backoff delay
    ConnectionFailed { reason: String },
}

/// Configuration for connection manager
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Host runtime address
    pub host_addr: SocketAddr,
    /// Reconnection delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
}

/// Manages the persistent connection to the host runtime
pub struct ConnectionManager {
    /// Channel to send frames to the host
    outbound_tx: mpsc::Sender<Bytes>,
    /// Channel to receive connection events
    event_rx: mpsc::Receiver<ConnectionEvent>,
}

impl ConnectionManager {
    /// Create a new connection manager and start the connection loop
    pub fn new(config: ConnectionConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel::<Bytes>(100);
        let (event_tx, event_rx) = mpsc::channel::<ConnectionEvent>(100);

        tokio::spawn(async move {
            connection_loop(config, outbound_rx, event_tx).await;
        });

        Self {
            outbound_tx,
            event_rx,
        }
    }

    /// Receive the next connection event
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.event_rx.recv().await
    }

    /// Get a sender for outbound messages
    pub fn sender(&self) -> FrameSender {
        FrameSender {
            tx: self.outbound_tx.clone(),
        }
    }
}

/// Cloneable handle queueing messages for the host
#[derive(Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<Bytes>,
}

impl FrameSender {
    /// Encode a message as a frame and queue it
    pub async fn send<T: Serialize>(&self, message: &T) -> Result<()> {
        let frame = codec::encode_frame(message)?;
        self.tx
            .send(frame)
            .await
            .map_err(|_| anyhow!("Connection closed"))
    }
}

/// Main connection loop with reconnection logic
async fn connection_loop(
    config: ConnectionConfig,
    mut outbound_rx: mpsc::Receiver<Bytes>,
    event_tx: mpsc::Sender<ConnectionEvent>,
) {
    let mut reconnect_delay = config.reconnect_delay;

    loop {
        match timeout(config.connect_timeout, TcpStream::connect(config.host_addr)).await {
            Ok(Ok(stream)) => {
                // Connected successfully
                reconnect_delay = config.reconnect_delay;

                let _ = event_tx
                    .send(ConnectionEvent::Connected {
                        addr: config.host_addr,
                    })
                    .await;

                let reason = match handle_connection(stream, &mut outbound_rx, &event_tx).await {
                    Ok(()) => "Host closed connection".to_string(),
                    Err(e) => e.to_string(),
                };
                let _ = event_tx
                    .send(ConnectionEvent::Disconnected { reason })
                    .await;
            }
            Ok(Err(e)) => {
                let _ = event_tx
                    .send(ConnectionEvent::ConnectionFailed {
                        reason: e.to_string(),
                    })
                    .await;
            }
            Err(_) => {
                let _ = event_tx
                    .send(ConnectionEvent::ConnectionFailed {
                        reason: format!("Connect timed out after {:?}", config.connect_timeout),
                    })
                    .await;
            }
        }

        if event_tx.is_closed() {
            debug!("Connection events no longer consumed, stopping");
            return;
        }

        // Wait before reconnecting
        tokio::time::sleep(reconnect_delay).await;

        // Exponential backoff
        reconnect_delay = std::cmp::min(reconnect_delay * 2, config.max_reconnect_delay);
    }
}

/// Handle an active connection until the host goes away
async fn handle_connection(
    stream: TcpStream,
    outbound_rx: &mut mpsc::Receiver<Bytes>,
    event_tx: &mpsc::Sender<ConnectionEvent>,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();

    let mut decoder = FrameDecoder::new();
    let mut read_buf = vec![0u8; 4096];

    loop {
        tokio::select! {
            // Send outbound frames
            Some(frame) = outbound_rx.recv() => {
                writer.write_all(&frame).await?;
            }

            // Read incoming frames
            result = reader.read(&mut read_buf) => {
                let n = result?;
                if n == 0 {
                    return Ok(());
                }
                decoder.extend(&read_buf[..n]);

                // Process all complete frames
                loop {
                    match decoder.decode_next::<Value>() {
                        Ok(Some(request)) => {
                            let _ = event_tx.send(ConnectionEvent::Received(request)).await;
                        }
                        Ok(None) => break,
                        Err(CodecError::Json(e)) => {
                            warn!(error = %e, "Dropping non-JSON frame from host");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }
}
