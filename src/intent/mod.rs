//! Intent handling for the hub-local agent
//!
//! This module handles:
//! - Parsing platform requests forwarded by the host
//! - Dispatching IDENTIFY, QUERY and EXECUTE to their handlers
//! - Rejecting intents only the cloud front end serves

mod app;
pub mod handlers;

pub use app::LocalExecutionApp;
