//! Local execution app - validates and routes incoming intents

use super::handlers::{self, HandlerContext};
use crate::device_manager::{DeviceManager, DeviceManagerLink};
use lanbridge_shared::{
    CommandDispatcher, HandlerError, IntentInput, IntentRequest, PlatformResponse,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Answers IDENTIFY, QUERY and EXECUTE through the hub's device manager
pub struct LocalExecutionApp {
    manager: Arc<dyn DeviceManager>,
    device_port: u16,
}

impl LocalExecutionApp {
    /// Create a new app sending device traffic to `device_port`
    pub fn new(manager: Arc<dyn DeviceManager>, device_port: u16) -> Self {
        Self {
            manager,
            device_port,
        }
    }

    /// Parse a raw request from the host and handle it
    pub async fn handle_value(&self, value: Value) -> Result<PlatformResponse, HandlerError> {
        let request = IntentRequest::parse(value)?;
        self.handle(&request).await
    }

    /// Route a request to the handler for its intent
    pub async fn handle(&self, request: &IntentRequest) -> Result<PlatformResponse, HandlerError> {
        let Some(first) = request.inputs.first() else {
            return Err(HandlerError::invalid_request(
                &request.request_id,
                "Request has no inputs",
            ));
        };
        let intent = first.intent();

        info!(
            request_id = %request.request_id,
            %intent,
            manager = self.manager.name(),
            "Handling intent"
        );

        let ctx = HandlerContext {
            request_id: request.request_id.clone(),
            dispatcher: CommandDispatcher::new(Arc::new(DeviceManagerLink::new(
                self.manager.clone(),
                request.request_id.clone(),
                self.device_port,
            ))),
        };

        match first {
            IntentInput::Identify { payload } => {
                handlers::handle_identify(&ctx.request_id, payload).map(PlatformResponse::Identify)
            }
            IntentInput::Query { .. } => handlers::handle_query(&ctx, &request.inputs)
                .await
                .map(PlatformResponse::Query),
            IntentInput::Execute { .. } => handlers::handle_execute(&ctx, &request.inputs)
                .await
                .map(PlatformResponse::Execute),
            IntentInput::Sync | IntentInput::Disconnect => {
                Err(HandlerError::not_supported(&request.request_id, intent))
            }
        }
    }
}
