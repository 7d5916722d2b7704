//! Command fan-out over device links
//!
//! This module handles:
//! - Building one device message per target device
//! - Running the per-device exchanges concurrently
//! - Isolating per-device failures
//! - Aggregating outcomes into QUERY and EXECUTE shapes

mod dispatcher;
mod link;

pub use dispatcher::{CommandDispatcher, DeviceOutcome, DispatchError};
pub use link::{BroadcastLink, DeviceLink};
