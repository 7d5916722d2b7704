//! Platform-facing request and response envelopes
//!
//! These mirror the smart-home platform's JSON schema closely enough for the
//! two front ends to parse intents and shape responses. Field names follow the
//! platform's camelCase convention on the wire.

use crate::protocol::{DeviceIdentity, Intent, StateMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Platform error codes used by the bridge
pub mod error_code {
    /// Generic failure code, also used when a device failure carries none
    pub const INVALID_REQUEST: &str = "invalid_request";

    /// Intent is not handled by this front end
    pub const NOT_SUPPORTED: &str = "notSupported";
}

/// Device id -> last reported state
pub type QueryStates = BTreeMap<String, StateMap>;

/// Incoming platform intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRequest {
    pub request_id: String,
    #[serde(default)]
    pub inputs: Vec<IntentInput>,
}

impl IntentRequest {
    /// Parse a raw request, keeping the request id for the error if parsing fails
    pub fn parse(value: Value) -> Result<Self, HandlerError> {
        let request_id = value
            .get("requestId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let request: IntentRequest = serde_json::from_value(value)
            .map_err(|e| HandlerError::invalid_request(&request_id, e.to_string()))?;

        if request.inputs.is_empty() {
            return Err(HandlerError::invalid_request(&request_id, "Request has no inputs"));
        }
        Ok(request)
    }

    /// Intent of the first input, which selects the handler
    pub fn intent(&self) -> Option<Intent> {
        self.inputs.first().map(IntentInput::intent)
    }
}

/// One input of a platform request, tagged by its intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent")]
pub enum IntentInput {
    #[serde(rename = "action.devices.SYNC")]
    Sync,
    #[serde(rename = "action.devices.IDENTIFY")]
    Identify {
        #[serde(default)]
        payload: IdentifyPayload,
    },
    #[serde(rename = "action.devices.QUERY")]
    Query { payload: QueryPayload },
    #[serde(rename = "action.devices.EXECUTE")]
    Execute { payload: ExecutePayload },
    #[serde(rename = "action.devices.DISCONNECT")]
    Disconnect,
}

impl IntentInput {
    pub fn intent(&self) -> Intent {
        match self {
            IntentInput::Sync => Intent::Sync,
            IntentInput::Identify { .. } => Intent::Identify,
            IntentInput::Query { .. } => Intent::Query,
            IntentInput::Execute { .. } => Intent::Execute,
            IntentInput::Disconnect => Intent::Disconnect,
        }
    }
}

/// Reference to a device in a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Value>,
}

impl DeviceRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            custom_data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPayload {
    pub devices: Vec<DeviceRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutePayload {
    pub commands: Vec<ExecuteCommand>,
}

/// A set of devices and the execution steps to apply to each of them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteCommand {
    pub devices: Vec<DeviceRef>,
    pub execution: Vec<Execution>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<StateMap>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentifyPayload {
    #[serde(default)]
    pub device: IdentifyDevice,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyDevice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udp_scan_data: Option<ScanData>,
}

/// Hex-encoded discovery reply captured by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanData {
    pub data: String,
}

/// Any response a front end can send back for an intent
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PlatformResponse {
    Sync(SyncResponse),
    Identify(IdentifyResponse),
    Query(QueryResponse),
    Execute(ExecuteResponse),
    Disconnect(EmptyResponse),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub request_id: String,
    pub payload: SyncPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    pub agent_user_id: String,
    pub devices: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyResponse {
    pub intent: Intent,
    pub request_id: String,
    pub payload: IdentifyResponsePayload,
}

impl IdentifyResponse {
    pub fn new(request_id: impl Into<String>, identity: DeviceIdentity) -> Self {
        Self {
            intent: Intent::Identify,
            request_id: request_id.into(),
            payload: IdentifyResponsePayload {
                device: IdentifiedDevice {
                    id: identity.device_id,
                    verification_id: identity.local_device_id,
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifyResponsePayload {
    pub device: IdentifiedDevice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifiedDevice {
    pub id: String,
    pub verification_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub request_id: String,
    pub payload: QueryResponsePayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponsePayload {
    pub devices: QueryStates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub request_id: String,
    pub payload: ExecuteResponsePayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResponsePayload {
    pub commands: Vec<ExecuteRecord>,
}

/// Outcome of one execution step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecuteStatus {
    Success,
    Error,
}

/// Result record of one device for one execution step of an EXECUTE
///
/// `ids` always holds a single device id. Devices sharing an outcome are not
/// merged into one record, since each carries its own reported states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRecord {
    pub ids: Vec<String>,
    pub status: ExecuteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub states: Option<StateMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl ExecuteRecord {
    pub fn success(device_id: impl Into<String>, states: StateMap) -> Self {
        Self {
            ids: vec![device_id.into()],
            status: ExecuteStatus::Success,
            states: Some(states),
            error_code: None,
        }
    }

    pub fn error(device_id: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            ids: vec![device_id.into()],
            status: ExecuteStatus::Error,
            states: None,
            error_code: Some(error_code.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecuteStatus::Success
    }
}

/// DISCONNECT answers with an empty object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmptyResponse {}

/// Structured rejection of a platform request
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Handler error for request {request_id} ({error_code}): {debug_string}")]
pub struct HandlerError {
    pub request_id: String,
    pub error_code: String,
    pub debug_string: String,
}

impl HandlerError {
    pub fn new(
        request_id: impl Into<String>,
        error_code: impl Into<String>,
        debug_string: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            error_code: error_code.into(),
            debug_string: debug_string.into(),
        }
    }

    pub fn invalid_request(request_id: impl Into<String>, debug_string: impl Into<String>) -> Self {
        Self::new(request_id, error_code::INVALID_REQUEST, debug_string)
    }

    pub fn not_supported(request_id: impl Into<String>, intent: Intent) -> Self {
        Self::new(
            request_id,
            error_code::NOT_SUPPORTED,
            format!("{intent} is not handled here"),
        )
    }

    /// Wire form sent back to the platform
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            request_id: self.request_id.clone(),
            payload: ErrorPayload {
                error_code: self.error_code.clone(),
                debug_string: self.debug_string.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub request_id: String,
    pub payload: ErrorPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error_code: String,
    pub debug_string: String,
}

/// Upstream push of device state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateReport {
    pub request_id: String,
    pub agent_user_id: String,
    pub payload: StateReportPayload,
}

impl StateReport {
    pub fn new(
        request_id: impl Into<String>,
        agent_user_id: impl Into<String>,
        device_id: impl Into<String>,
        states: StateMap,
    ) -> Self {
        let mut by_device = BTreeMap::new();
        by_device.insert(device_id.into(), states);
        Self {
            request_id: request_id.into(),
            agent_user_id: agent_user_id.into(),
            payload: StateReportPayload {
                devices: ReportedDevices { states: by_device },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateReportPayload {
    pub devices: ReportedDevices,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedDevices {
    pub states: BTreeMap<String, StateMap>,
}

/// Upstream acknowledgement of a state report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAck {
    pub request_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_execute_request() {
        let value = json!({
            "requestId": "ff36a3cc",
            "inputs": [{
                "intent": "action.devices.EXECUTE",
                "payload": {
                    "commands": [{
                        "devices": [{"id": "soundbar", "customData": {"room": "living"}}],
                        "execution": [{"command": "action.devices.commands.setVolume", "params": {"volumeLevel": 30}}]
                    }]
                }
            }]
        });

        let request = IntentRequest::parse(value).expect("parse failed");
        assert_eq!(request.request_id, "ff36a3cc");
        assert_eq!(request.intent(), Some(Intent::Execute));
        match &request.inputs[0] {
            IntentInput::Execute { payload } => {
                let command = &payload.commands[0];
                assert_eq!(command.devices[0].id, "soundbar");
                assert_eq!(command.execution[0].command, "action.devices.commands.setVolume");
            }
            other => panic!("unexpected input {:?}", other),
        }
    }

    #[test]
    fn test_parse_sync_without_payload() {
        let request = IntentRequest::parse(json!({
            "requestId": "r1",
            "inputs": [{"intent": "action.devices.SYNC"}]
        }))
        .expect("parse failed");
        assert_eq!(request.intent(), Some(Intent::Sync));
    }

    #[test]
    fn test_parse_unknown_intent_keeps_request_id() {
        let err = IntentRequest::parse(json!({
            "requestId": "r2",
            "inputs": [{"intent": "action.devices.REBOOT"}]
        }))
        .expect_err("should fail");
        assert_eq!(err.request_id, "r2");
        assert_eq!(err.error_code, error_code::INVALID_REQUEST);
    }

    #[test]
    fn test_parse_rejects_empty_inputs() {
        let err = IntentRequest::parse(json!({"requestId": "r3", "inputs": []})).expect_err("should fail");
        assert_eq!(err.request_id, "r3");
    }

    #[test]
    fn test_identify_without_scan_data_parses() {
        let request = IntentRequest::parse(json!({
            "requestId": "r4",
            "inputs": [{"intent": "action.devices.IDENTIFY", "payload": {"device": {}}}]
        }))
        .expect("parse failed");
        match &request.inputs[0] {
            IntentInput::Identify { payload } => assert!(payload.device.udp_scan_data.is_none()),
            other => panic!("unexpected input {:?}", other),
        }
    }

    #[test]
    fn test_execute_record_wire_shape() {
        let mut states = StateMap::new();
        states.insert("on".into(), json!(true));
        let ok = serde_json::to_value(ExecuteRecord::success("a", states)).expect("serialize failed");
        assert_eq!(ok, json!({"ids": ["a"], "status": "SUCCESS", "states": {"on": true}}));

        let err = serde_json::to_value(ExecuteRecord::error("b", "invalid_request")).expect("serialize failed");
        assert_eq!(err, json!({"ids": ["b"], "status": "ERROR", "errorCode": "invalid_request"}));
    }

    #[test]
    fn test_disconnect_response_is_empty_object() {
        let value = serde_json::to_value(PlatformResponse::Disconnect(EmptyResponse::default()))
            .expect("serialize failed");
        assert_eq!(value, json!({}));
    }

    #[test]
    fn test_handler_error_response() {
        let err = HandlerError::invalid_request("r5", "Invalid scan data");
        let value = serde_json::to_value(err.to_response()).expect("serialize failed");
        assert_eq!(
            value,
            json!({"requestId": "r5", "payload": {"errorCode": "invalid_request", "debugString": "Invalid scan data"}})
        );
    }

    #[test]
    fn test_state_report_shape() {
        let mut states = StateMap::new();
        states.insert("on".into(), json!(false));
        let report = StateReport::new("12", "user01", "soundbar", states);
        let value = serde_json::to_value(&report).expect("serialize failed");
        assert_eq!(value["requestId"], "12");
        assert_eq!(value["agentUserId"], "user01");
        assert_eq!(value["payload"]["devices"]["states"]["soundbar"]["on"], false);
    }
}
