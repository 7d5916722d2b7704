//! JSON codecs for device datagrams and the platform link
//!
//! Device traffic is one JSON document per UDP datagram. The platform link
//! runs over TCP, so messages there are framed as:
//! ```text
//! [ 4 bytes: length (u32, big-endian) ][ N bytes: JSON document ]
//! ```
//!
//! The host device manager and IDENTIFY scan data carry JSON as hex strings,
//! handled by the `*_hex_json` helpers.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::Envelope;

/// Largest datagram a device is expected to handle
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Maximum frame size (1 MB) to prevent memory exhaustion
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Datagram too large: {0} bytes (max: {MAX_DATAGRAM_SIZE})")]
    DatagramTooLarge(usize),

    #[error("Frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("Invalid frame length prefix: {0}")]
    InvalidLength(u32),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Encode an envelope into a single datagram
pub fn encode_datagram<T: Serialize>(envelope: &Envelope<T>) -> Result<Vec<u8>, CodecError> {
    let bytes = serde_json::to_vec(envelope)?;
    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(CodecError::DatagramTooLarge(bytes.len()));
    }
    Ok(bytes)
}

/// Decode a datagram into an envelope
pub fn decode_datagram<T: DeserializeOwned>(bytes: &[u8]) -> Result<Envelope<T>, CodecError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Serialize a value as JSON and hex-encode it
pub fn encode_hex_json<T: Serialize>(value: &T) -> Result<String, CodecError> {
    Ok(hex::encode(serde_json::to_vec(value)?))
}

/// Hex-decode a string and parse the result as JSON
pub fn decode_hex_json<T: DeserializeOwned>(data: &str) -> Result<T, CodecError> {
    let bytes = hex::decode(data)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Encode a value into a length-prefixed frame
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Bytes, CodecError> {
    let body = serde_json::to_vec(value)?;

    if body.len() > MAX_FRAME_SIZE as usize {
        return Err(CodecError::FrameTooLarge(body.len()));
    }

    let mut buf = BytesMut::with_capacity(4 + body.len());
    buf.put_u32(body.len() as u32);
    buf.extend_from_slice(&body);

    Ok(buf.freeze())
}

/// Try to decode a length-prefixed frame from a buffer
///
/// Returns:
/// - `Ok(Some(value))` if a complete frame was decoded
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if the data is invalid
pub fn decode_frame<T: DeserializeOwned>(buf: &mut BytesMut) -> Result<Option<T>, CodecError> {
    if buf.len() < 4 {
        return Ok(None);
    }

    // Peek at the length prefix without consuming
    let frame_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);

    if frame_len > MAX_FRAME_SIZE {
        return Err(CodecError::InvalidLength(frame_len));
    }

    let total_len = 4 + frame_len as usize;
    if buf.len() < total_len {
        return Ok(None);
    }

    buf.advance(4);
    let body = buf.split_to(frame_len as usize);

    Ok(Some(serde_json::from_slice(&body)?))
}

/// Accumulates stream bytes and yields complete frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Create a new frame decoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame from the buffer
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all complete frames
    pub fn decode_next<T: DeserializeOwned>(&mut self) -> Result<Option<T>, CodecError> {
        decode_frame(&mut self.buffer)
    }

    /// Get the current buffer length
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}
