//! Errors of a single device exchange

use crate::codec::CodecError;
use crate::platform::error_code;
use crate::protocol::CorrelationId;
use thiserror::Error;

/// Why a request to one device did not produce a reply
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// The datagram never left the process
    #[error("Send failed: {0}")]
    Send(#[source] std::io::Error),

    #[error("No reply to request {msg_id} within {timeout_ms}ms")]
    Timeout {
        msg_id: CorrelationId,
        timeout_ms: u64,
    },

    /// A reply arrived but did not match the expected schema
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The transceiver went away before the request settled
    #[error("Transceiver closed before request {0} settled")]
    Closed(CorrelationId),

    /// The transport refused the request, optionally with a platform error code
    #[error("Request rejected: {message}")]
    Rejected {
        code: Option<String>,
        message: String,
    },
}

impl ExchangeError {
    /// Platform error code for this failure, `invalid_request` when none applies
    pub fn error_code(&self) -> &str {
        match self {
            ExchangeError::Rejected {
                code: Some(code), ..
            } => code,
            _ => error_code::INVALID_REQUEST,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ExchangeError::Timeout { .. })
    }
}
