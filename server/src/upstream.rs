//! Upstream state report delivery
//!
//! Reports travel as length-prefixed JSON frames over one TCP connection to
//! the platform endpoint, which answers every report with a `{requestId}`
//! acknowledgement frame. The connection is opened on first use and
//! re-established on the next report after any failure.

use async_trait::async_trait;
use lanbridge_shared::codec::{self, FrameDecoder};
use lanbridge_shared::platform::ReportAck;
use lanbridge_shared::report::ReportError;
use lanbridge_shared::{StateReport, StateSink};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct UpstreamConnection {
    stream: TcpStream,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
}

impl UpstreamConnection {
    async fn read_ack(&mut self) -> Result<ReportAck, ReportError> {
        loop {
            if let Some(ack) = self.decoder.decode_next()? {
                return Ok(ack);
            }

            let n = self.stream.read(&mut self.read_buf).await?;
            if n == 0 {
                return Err(ReportError::Unavailable("upstream closed the connection".into()));
            }
            self.decoder.extend(&self.read_buf[..n]);
        }
    }
}

/// State sink pushing reports to the platform over TCP
pub struct UpstreamLink {
    addr: SocketAddr,
    connect_timeout: Duration,
    ack_timeout: Duration,
    connection: Mutex<Option<UpstreamConnection>>,
}

impl UpstreamLink {
    pub fn new(addr: SocketAddr, connect_timeout: Duration, ack_timeout: Duration) -> Self {
        Self {
            addr,
            connect_timeout,
            ack_timeout,
            connection: Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<UpstreamConnection, ReportError> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| {
                ReportError::Unavailable(format!(
                    "{}: connect timed out after {:?}",
                    self.addr, self.connect_timeout
                ))
            })?
            .map_err(|e| ReportError::Unavailable(format!("{}: {e}", self.addr)))?;
        stream.set_nodelay(true)?;

        info!(addr = %self.addr, "Connected to upstream");
        Ok(UpstreamConnection {
            stream,
            decoder: FrameDecoder::new(),
            read_buf: vec![0u8; 1024],
        })
    }

    async fn deliver(
        &self,
        connection: &mut UpstreamConnection,
        report: &StateReport,
    ) -> Result<(), ReportError> {
        let frame = codec::encode_frame(report)?;
        connection.stream.write_all(&frame).await?;

        let ack = tokio::time::timeout(self.ack_timeout, connection.read_ack())
            .await
            .map_err(|_| ReportError::Timeout {
                request_id: report.request_id.clone(),
                timeout_ms: self.ack_timeout.as_millis() as u64,
            })??;

        if ack.request_id != report.request_id {
            return Err(ReportError::Rejected {
                request_id: report.request_id.clone(),
                reason: format!("acknowledged {} instead", ack.request_id),
            });
        }

        debug!(request_id = %report.request_id, "Report acknowledged");
        Ok(())
    }
}

#[async_trait]
impl StateSink for UpstreamLink {
    async fn push(&self, report: &StateReport) -> Result<(), ReportError> {
        let mut guard = self.connection.lock().await;

        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let Some(connection) = guard.as_mut() else {
            return Err(ReportError::Unavailable("no upstream connection".into()));
        };

        let result = self.deliver(connection, report).await;
        if let Err(e) = &result {
            warn!(addr = %self.addr, error = %e, "Upstream delivery failed, dropping connection");
            *guard = None;
        }
        result
    }

    fn name(&self) -> &'static str {
        "upstream"
    }
}
