//! Device transmission through a device manager
//!
//! This module handles:
//! - The device manager seam (request/response in hex-encoded packets)
//! - A UDP-backed device manager for hubs without a host runtime
//! - Adapting a device manager to the dispatcher's device link

mod link;
mod traits;
mod udp;

pub use link::DeviceManagerLink;
pub use traits::{CommandFailure, DeviceManager, UdpRequestData, UdpResponseData};
pub use udp::UdpDeviceManager;
