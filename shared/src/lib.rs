//! LAN Bridge Shared Library
//!
//! This crate provides the device wire protocol, the request/response
//! correlation engine and the command dispatcher used by both the cloud
//! fulfillment server and the hub-local execution agent.

pub mod codec;
pub mod dispatch;
pub mod error;
pub mod platform;
pub mod protocol;
pub mod report;
pub mod transceiver;

// Re-export commonly used types at crate root
pub use dispatch::{BroadcastLink, CommandDispatcher, DeviceLink, DispatchError};
pub use error::ExchangeError;
pub use platform::{
    error_code, ExecuteRecord, ExecuteStatus, HandlerError, IntentInput, IntentRequest,
    PlatformResponse, StateReport,
};
pub use protocol::{
    CorrelationId, DeviceIdentity, DeviceMessage, DeviceReply, Envelope, Intent, StateMap,
};
pub use report::{ReportError, StateReporter, StateSink};
pub use transceiver::{Transceiver, TransceiverConfig};

/// Timing parameters for device exchanges
pub mod timing {
    /// How long a device request may stay pending before it fails with a timeout
    pub const DEVICE_REQUEST_TIMEOUT_MS: u64 = 5000;

    /// Period of the background sweep over the pending table
    pub const TIMEOUT_SWEEP_INTERVAL_MS: u64 = 250;

    /// How long to wait for the upstream platform to acknowledge a state report
    pub const REPORT_ACK_TIMEOUT_MS: u64 = 5000;

    /// How long to wait for the upstream platform connection to open
    pub const UPSTREAM_CONNECT_TIMEOUT_MS: u64 = 5000;
}

/// Well-known ports and addresses of the device network
pub mod ports {
    /// Port devices listen on for commands
    pub const DEVICE_COMMAND_PORT: u16 = 3311;

    /// Local port the transceiver binds to receive replies
    pub const REPLY_LISTEN_PORT: u16 = 3312;

    /// Local port devices push unsolicited state to
    pub const STATE_PUSH_PORT: u16 = 3314;

    /// LAN broadcast address used by cloud-direct dispatch
    pub const DEVICE_BROADCAST_ADDR: &str = "192.168.1.255";
}
