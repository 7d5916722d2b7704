//! Individual platform connection handling

use crate::fulfillment::FulfillmentApp;
use bytes::Bytes;
use lanbridge_shared::codec::{self, CodecError, FrameDecoder};
use lanbridge_shared::HandlerError;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

/// One platform connection carrying framed intent requests
pub struct PlatformSession {
    addr: SocketAddr,
    reader: ReadHalf<TcpStream>,
    writer: WriteHalf<TcpStream>,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
}

impl PlatformSession {
    /// Create a new session from an accepted TCP stream
    pub fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        let (reader, writer) = tokio::io::split(stream);

        Self {
            addr,
            reader,
            writer,
            decoder: FrameDecoder::new(),
            read_buf: vec![0u8; 4096],
        }
    }

    /// Read the next request frame
    ///
    /// Returns `Ok(None)` once the connection is closed. A frame whose body is
    /// not JSON is reported as an error without desynchronizing the stream.
    pub async fn recv(&mut self) -> Result<Option<Value>, CodecError> {
        loop {
            // First try to decode from existing buffer
            if let Some(value) = self.decoder.decode_next()? {
                return Ok(Some(value));
            }

            match self.reader.read(&mut self.read_buf).await {
                Ok(0) => return Ok(None),
                Ok(n) => self.decoder.extend(&self.read_buf[..n]),
                Err(e) => {
                    warn!(addr = %self.addr, error = %e, "Read error");
                    return Ok(None);
                }
            }
        }
    }

    async fn send(&mut self, frame: &Bytes) -> std::io::Result<()> {
        self.writer.write_all(frame).await?;
        self.writer.flush().await
    }

    /// Serve requests until the platform disconnects
    pub async fn run(mut self, app: Arc<FulfillmentApp>) {
        info!(addr = %self.addr, "Platform session opened");

        loop {
            let response = match self.recv().await {
                Ok(Some(value)) => app.handle_value(value).await,
                Ok(None) => break,
                Err(CodecError::Json(e)) => Err(HandlerError::invalid_request("", e.to_string())),
                Err(e) => {
                    warn!(addr = %self.addr, error = %e, "Dropping session after bad frame");
                    break;
                }
            };

            let encoded = match &response {
                Ok(response) => codec::encode_frame(response),
                Err(rejection) => {
                    warn!(
                        request_id = %rejection.request_id,
                        error_code = %rejection.error_code,
                        debug = %rejection.debug_string,
                        "Request rejected"
                    );
                    codec::encode_frame(&rejection.to_response())
                }
            };

            let frame = match encoded {
                Ok(frame) => frame,
                Err(e) => {
                    error!(addr = %self.addr, error = %e, "Failed to encode response");
                    continue;
                }
            };

            debug!(addr = %self.addr, bytes = frame.len(), "Sending response");
            if let Err(e) = self.send(&frame).await {
                warn!(addr = %self.addr, error = %e, "Write error");
                break;
            }
        }

        info!(addr = %self.addr, "Platform session closed");
    }
}
