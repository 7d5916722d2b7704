//! Connection management for the host runtime link
//!
//! This module handles:
//! - Persistent TCP connection with automatic reconnection
//! - Exponential backoff between attempts
//! - Framed JSON requests in, framed responses out

mod manager;

pub use manager::{ConnectionConfig, ConnectionEvent, ConnectionManager, FrameSender};
