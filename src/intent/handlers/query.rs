//! QUERY intent handler

use super::HandlerContext;
use lanbridge_shared::platform::{DeviceRef, QueryResponse, QueryResponsePayload};
use lanbridge_shared::{HandlerError, IntentInput};
use tracing::debug;

/// Handle QUERY across every QUERY input of the request
pub async fn handle_query(
    ctx: &HandlerContext,
    inputs: &[IntentInput],
) -> Result<QueryResponse, HandlerError> {
    let devices: Vec<DeviceRef> = inputs
        .iter()
        .filter_map(|input| match input {
            IntentInput::Query { payload } => Some(payload.devices.iter().cloned()),
            _ => None,
        })
        .flatten()
        .collect();

    let states = ctx
        .dispatcher
        .query(&devices)
        .await
        .map_err(|e| HandlerError::invalid_request(&ctx.request_id, e.to_string()))?;

    debug!(
        request_id = %ctx.request_id,
        requested = devices.len(),
        answered = states.len(),
        "QUERY complete"
    );

    Ok(QueryResponse {
        request_id: ctx.request_id.clone(),
        payload: QueryResponsePayload { devices: states },
    })
}
