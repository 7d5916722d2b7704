//! Cloud-direct intent handling

use crate::catalog::DeviceCatalog;
use lanbridge_shared::platform::{
    DeviceRef, EmptyResponse, ExecuteCommand, ExecuteResponse, ExecuteResponsePayload,
    QueryResponse, QueryResponsePayload, SyncPayload, SyncResponse,
};
use lanbridge_shared::{
    CommandDispatcher, HandlerError, Intent, IntentInput, IntentRequest, PlatformResponse,
    StateReporter,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Status attached to every state in a QUERY response
const QUERY_STATUS: &str = "SUCCESS";

/// Answers platform intents by broadcasting to devices on the LAN
pub struct FulfillmentApp {
    dispatcher: CommandDispatcher,
    reporter: Arc<StateReporter>,
    catalog: DeviceCatalog,
}

impl FulfillmentApp {
    pub fn new(
        dispatcher: CommandDispatcher,
        reporter: Arc<StateReporter>,
        catalog: DeviceCatalog,
    ) -> Self {
        Self {
            dispatcher,
            reporter,
            catalog,
        }
    }

    /// Parse a raw platform request and handle it
    pub async fn handle_value(&self, value: Value) -> Result<PlatformResponse, HandlerError> {
        let request = IntentRequest::parse(value)?;
        self.handle(&request).await
    }

    /// Route a request to the handler for its intent
    pub async fn handle(&self, request: &IntentRequest) -> Result<PlatformResponse, HandlerError> {
        let Some(intent) = request.intent() else {
            return Err(HandlerError::invalid_request(
                &request.request_id,
                "Request has no inputs",
            ));
        };

        info!(request_id = %request.request_id, %intent, "Handling intent");

        match intent {
            Intent::Sync => Ok(PlatformResponse::Sync(self.sync(request))),
            Intent::Query => self.query(request).await.map(PlatformResponse::Query),
            Intent::Execute => self.execute(request).await.map(PlatformResponse::Execute),
            Intent::Disconnect => Ok(PlatformResponse::Disconnect(EmptyResponse::default())),
            Intent::Identify => Err(HandlerError::not_supported(&request.request_id, intent)),
        }
    }

    fn sync(&self, request: &IntentRequest) -> SyncResponse {
        SyncResponse {
            request_id: request.request_id.clone(),
            payload: SyncPayload {
                agent_user_id: self.reporter.agent_user_id().to_string(),
                devices: self.catalog.devices().to_vec(),
            },
        }
    }

    async fn query(&self, request: &IntentRequest) -> Result<QueryResponse, HandlerError> {
        let devices: Vec<DeviceRef> = request
            .inputs
            .iter()
            .filter_map(|input| match input {
                IntentInput::Query { payload } => Some(payload.devices.iter().cloned()),
                _ => None,
            })
            .flatten()
            .collect();

        let mut states = self
            .dispatcher
            .query(&devices)
            .await
            .map_err(|e| HandlerError::invalid_request(&request.request_id, e.to_string()))?;

        for state in states.values_mut() {
            state.insert("status".into(), Value::from(QUERY_STATUS));
        }

        debug!(
            request_id = %request.request_id,
            requested = devices.len(),
            answered = states.len(),
            "QUERY complete"
        );

        Ok(QueryResponse {
            request_id: request.request_id.clone(),
            payload: QueryResponsePayload { devices: states },
        })
    }

    async fn execute(&self, request: &IntentRequest) -> Result<ExecuteResponse, HandlerError> {
        let commands: Vec<ExecuteCommand> = request
            .inputs
            .iter()
            .filter_map(|input| match input {
                IntentInput::Execute { payload } => Some(payload.commands.iter().cloned()),
                _ => None,
            })
            .flatten()
            .collect();

        let records = self
            .dispatcher
            .execute(&commands)
            .await
            .map_err(|e| HandlerError::invalid_request(&request.request_id, e.to_string()))?;

        for record in records.iter().filter(|record| record.is_success()) {
            let (Some(device_id), Some(states)) = (record.ids.first(), record.states.as_ref())
            else {
                continue;
            };
            if let Err(e) = self.reporter.report(device_id, states.clone()).await {
                warn!(%device_id, error = %e, "Failed to report state after EXECUTE");
            }
        }

        Ok(ExecuteResponse {
            request_id: request.request_id.clone(),
            payload: ExecuteResponsePayload { commands: records },
        })
    }
}
