//! Device wire protocol
//!
//! Devices speak JSON over UDP. Every request and reply is wrapped in an
//! envelope carrying a correlation id:
//!
//! ```text
//! request: {"msgId": 7, "payload": {"intent": "action.devices.QUERY", "device_id": "soundbar"}}
//! reply:   {"msgId": 7, "payload": {"device_id": "soundbar", "states": {"on": true}}}
//! ```
//!
//! State pushes use the reply shape with `msgId` 0.

use crate::codec::{self, CodecError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Correlation id tagging a request and its reply
pub type CorrelationId = u32;

/// Id carried by traffic that is not part of a request/response exchange
pub const UNSOLICITED_MSG_ID: CorrelationId = 0;

/// Plain-text probe devices answer with their identity
pub const DISCOVERY_PACKET: &str = "HelloLocalHomeSDK";

/// Free-form device state object (`{"on": true, "currentVolume": 40}`)
pub type StateMap = serde_json::Map<String, serde_json::Value>;

/// Platform operation category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    #[serde(rename = "action.devices.SYNC")]
    Sync,
    #[serde(rename = "action.devices.IDENTIFY")]
    Identify,
    #[serde(rename = "action.devices.QUERY")]
    Query,
    #[serde(rename = "action.devices.EXECUTE")]
    Execute,
    #[serde(rename = "action.devices.DISCONNECT")]
    Disconnect,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Sync => "action.devices.SYNC",
            Intent::Identify => "action.devices.IDENTIFY",
            Intent::Query => "action.devices.QUERY",
            Intent::Execute => "action.devices.EXECUTE",
            Intent::Disconnect => "action.devices.DISCONNECT",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire envelope wrapping every device datagram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "msgId")]
    pub msg_id: CorrelationId,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(msg_id: CorrelationId, payload: T) -> Self {
        Self { msg_id, payload }
    }
}

/// Request sent to a single device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMessage {
    pub intent: Intent,
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<StateMap>,
}

impl DeviceMessage {
    /// Build a QUERY request for a device
    pub fn query(device_id: impl Into<String>) -> Self {
        Self {
            intent: Intent::Query,
            device_id: device_id.into(),
            command: None,
            params: None,
        }
    }

    /// Build an EXECUTE request for a device
    pub fn execute(
        device_id: impl Into<String>,
        command: impl Into<String>,
        params: Option<StateMap>,
    ) -> Self {
        Self {
            intent: Intent::Execute,
            device_id: device_id.into(),
            command: Some(command.into()),
            params,
        }
    }
}

/// Reply (or unsolicited push) from a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceReply {
    pub device_id: String,
    #[serde(default)]
    pub states: StateMap,
}

/// Identity a device announces in response to discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub local_device_id: String,
}

impl DeviceIdentity {
    /// Decode the hex-encoded JSON scan data the host attaches to IDENTIFY
    pub fn from_scan_data(data: &str) -> Result<Self, CodecError> {
        codec::decode_hex_json(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_message_omits_command() {
        let envelope = Envelope::new(1, DeviceMessage::query("d1"));
        let value = serde_json::to_value(&envelope).expect("serialize failed");
        assert_eq!(
            value,
            json!({"msgId": 1, "payload": {"intent": "action.devices.QUERY", "device_id": "d1"}})
        );
    }

    #[test]
    fn test_execute_message_carries_params() {
        let mut params = StateMap::new();
        params.insert("on".into(), json!(true));
        let msg = DeviceMessage::execute("soundbar", "action.devices.commands.OnOff", Some(params));
        let value = serde_json::to_value(&msg).expect("serialize failed");
        assert_eq!(value["command"], "action.devices.commands.OnOff");
        assert_eq!(value["params"]["on"], true);
    }

    #[test]
    fn test_reply_without_states_defaults_to_empty() {
        let reply: Envelope<DeviceReply> =
            serde_json::from_str(r#"{"msgId":3,"payload":{"device_id":"d1"}}"#).expect("parse failed");
        assert_eq!(reply.msg_id, 3);
        assert!(reply.payload.states.is_empty());
    }

    #[test]
    fn test_identity_from_scan_data() {
        let raw = r#"{"device_id":"soundbar","local_device_id":"deviceid123"}"#;
        let identity = DeviceIdentity::from_scan_data(&hex::encode(raw)).expect("decode failed");
        assert_eq!(identity.device_id, "soundbar");
        assert_eq!(identity.local_device_id, "deviceid123");
    }

    #[test]
    fn test_identity_rejects_bad_hex() {
        assert!(DeviceIdentity::from_scan_data("zz-not-hex").is_err());
    }

    #[test]
    fn test_intent_display_matches_wire() {
        assert_eq!(Intent::Execute.to_string(), "action.devices.EXECUTE");
        let parsed: Intent = serde_json::from_str("\"action.devices.IDENTIFY\"").expect("parse failed");
        assert_eq!(parsed, Intent::Identify);
    }
}
