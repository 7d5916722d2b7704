//! EXECUTE intent handler

use super::HandlerContext;
use lanbridge_shared::platform::{ExecuteCommand, ExecuteResponse, ExecuteResponsePayload};
use lanbridge_shared::{HandlerError, IntentInput};
use tracing::debug;

/// Handle EXECUTE for every command and execution step of the request
pub async fn handle_execute(
    ctx: &HandlerContext,
    inputs: &[IntentInput],
) -> Result<ExecuteResponse, HandlerError> {
    let commands: Vec<ExecuteCommand> = inputs
        .iter()
        .filter_map(|input| match input {
            IntentInput::Execute { payload } => Some(payload.commands.iter().cloned()),
            _ => None,
        })
        .flatten()
        .collect();

    let records = ctx
        .dispatcher
        .execute(&commands)
        .await
        .map_err(|e| HandlerError::invalid_request(&ctx.request_id, e.to_string()))?;

    let failed = records.iter().filter(|record| !record.is_success()).count();
    debug!(
        request_id = %ctx.request_id,
        records = records.len(),
        failed,
        "EXECUTE complete"
    );

    Ok(ExecuteResponse {
        request_id: ctx.request_id.clone(),
        payload: ExecuteResponsePayload { commands: records },
    })
}
