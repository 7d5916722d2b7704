//! IDENTIFY intent handler

use lanbridge_shared::platform::{IdentifyPayload, IdentifyResponse};
use lanbridge_shared::{DeviceIdentity, HandlerError};
use tracing::{debug, info};

const INVALID_SCAN_DATA: &str = "Invalid scan data";

/// Handle IDENTIFY by decoding the discovery reply the host scanned
pub fn handle_identify(
    request_id: &str,
    payload: &IdentifyPayload,
) -> Result<IdentifyResponse, HandlerError> {
    let scan = payload
        .device
        .udp_scan_data
        .as_ref()
        .ok_or_else(|| HandlerError::invalid_request(request_id, INVALID_SCAN_DATA))?;

    let identity = DeviceIdentity::from_scan_data(&scan.data).map_err(|e| {
        debug!(request_id, error = %e, "Undecodable scan data");
        HandlerError::invalid_request(request_id, INVALID_SCAN_DATA)
    })?;

    info!(
        request_id,
        device_id = %identity.device_id,
        verification_id = %identity.local_device_id,
        "Device identified"
    );
    Ok(IdentifyResponse::new(request_id, identity))
}
