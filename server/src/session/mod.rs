//! Platform sessions
//!
//! This module handles:
//! - Reading framed intent requests from a platform connection
//! - Routing each request to the fulfillment app
//! - Writing the response or rejection back on the same connection

mod connection;

pub use connection::PlatformSession;
