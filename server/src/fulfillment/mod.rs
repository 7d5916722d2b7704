//! Platform intent handling for the cloud-direct bridge
//!
//! This module handles:
//! - SYNC from the static device catalog
//! - QUERY and EXECUTE by broadcasting to LAN devices
//! - Reporting executed state upstream
//! - DISCONNECT

mod app;

pub use app::FulfillmentApp;
