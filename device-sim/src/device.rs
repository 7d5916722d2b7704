//! Emulated soundbar
//!
//! Mirrors the reference firmware: a single audio device that answers
//! discovery probes, QUERY and EXECUTE datagrams, and pushes its power state
//! to the state-push listener whenever it is switched on or off.

use lanbridge_shared::protocol::{DISCOVERY_PACKET, UNSOLICITED_MSG_ID};
use lanbridge_shared::{DeviceIdentity, DeviceMessage, DeviceReply, Envelope, Intent, StateMap};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

/// Probe the companion app sends when it leaves; ignored
pub const CLOSE_COMPANION_PACKET: &str = "CloseCompanion";

pub const DEFAULT_VOLUME: i64 = 40;
const MAX_VOLUME: i64 = 100;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Datagram is not valid UTF-8")]
    NotText,

    #[error("Unparseable request: {0}")]
    Json(#[from] serde_json::Error),
}

/// Audio output state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioState {
    /// Powered off
    Standby,
    Stopped,
    Playing,
    Paused,
}

impl AudioState {
    fn activity_state(self) -> &'static str {
        match self {
            AudioState::Standby => "STANDBY",
            _ => "ACTIVE",
        }
    }

    fn playback_state(self) -> &'static str {
        match self {
            AudioState::Paused => "PAUSED",
            AudioState::Playing => "PLAYING",
            _ => "STOPPED",
        }
    }
}

/// What the device sends in answer to one datagram
#[derive(Debug, Default, PartialEq)]
pub struct Reaction {
    /// Sent back to the requester
    pub reply: Option<Value>,
    /// Sent to the state-push listener
    pub push: Option<Envelope<DeviceReply>>,
}

/// Soundbar state and protocol handling
#[derive(Debug)]
pub struct Soundbar {
    identity: DeviceIdentity,
    state: AudioState,
    volume: i64,
    muted: bool,
    track_count: usize,
    track: Option<usize>,
}

impl Soundbar {
    pub fn new(identity: DeviceIdentity, track_count: usize) -> Self {
        Self {
            identity,
            state: AudioState::Standby,
            volume: DEFAULT_VOLUME,
            muted: false,
            track_count,
            track: None,
        }
    }

    pub fn state(&self) -> AudioState {
        self.state
    }

    pub fn volume(&self) -> i64 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn track(&self) -> Option<usize> {
        self.track
    }

    /// React to one inbound datagram
    pub fn handle_datagram(&mut self, datagram: &[u8]) -> Result<Reaction, DeviceError> {
        let text = std::str::from_utf8(datagram).map_err(|_| DeviceError::NotText)?;

        if text == DISCOVERY_PACKET {
            return Ok(Reaction {
                reply: Some(json!({
                    "device_id": self.identity.device_id,
                    "local_device_id": self.identity.local_device_id,
                })),
                push: None,
            });
        }
        if text == CLOSE_COMPANION_PACKET {
            return Ok(Reaction::default());
        }

        let request: Envelope<DeviceMessage> = serde_json::from_str(text)?;
        Ok(self.handle_message(request.msg_id, &request.payload))
    }

    fn handle_message(&mut self, msg_id: u32, message: &DeviceMessage) -> Reaction {
        if message.device_id != self.identity.device_id {
            debug!(device_id = %message.device_id, "Unknown device_id");
            return Reaction::default();
        }

        match message.intent {
            Intent::Query => Reaction {
                reply: Some(self.reply(msg_id, self.query_states())),
                push: None,
            },
            Intent::Execute => self.execute(msg_id, message),
            other => {
                debug!(intent = %other, "Unknown intent");
                Reaction::default()
            }
        }
    }

    fn execute(&mut self, msg_id: u32, message: &DeviceMessage) -> Reaction {
        let empty = StateMap::new();
        let params = message.params.as_ref().unwrap_or(&empty);
        let command = message.command.as_deref().unwrap_or_default();

        let reply_states = match command.strip_prefix("action.devices.commands.") {
            Some("OnOff") => {
                let on = bool_param(params, "on");
                self.set_power(on);
                if on {
                    self.play_next(true);
                }

                return Reaction {
                    reply: Some(self.reply(
                        msg_id,
                        states(&[("on", Value::from(on)), ("online", Value::from(true))]),
                    )),
                    push: Some(Envelope::new(
                        UNSOLICITED_MSG_ID,
                        DeviceReply {
                            device_id: self.identity.device_id.clone(),
                            states: states(&[("on", Value::from(on))]),
                        },
                    )),
                };
            }
            Some("volumeRelative") => {
                self.volume = self.volume.saturating_add(int_param(params, "relativeSteps"));
                self.muted = false;
                self.clamp_volume();
                self.volume_states()
            }
            Some("setVolume") => {
                self.volume = int_param(params, "volumeLevel");
                self.muted = false;
                self.clamp_volume();
                self.volume_states()
            }
            Some("mute") => {
                self.muted = bool_param(params, "mute");
                self.clamp_volume();
                self.volume_states()
            }
            Some("mediaResume") => {
                if self.state == AudioState::Paused {
                    self.state = AudioState::Playing;
                } else {
                    self.play_next(true);
                }
                online()
            }
            Some("mediaNext") | Some("mediaPrevious") => {
                if self.state == AudioState::Paused {
                    self.state = AudioState::Playing;
                }
                self.play_next(command.ends_with("mediaNext"));
                online()
            }
            Some("mediaPause") => {
                if self.state == AudioState::Playing {
                    self.state = AudioState::Paused;
                }
                online()
            }
            Some("mediaStop") => {
                self.stop();
                online()
            }
            _ => {
                debug!(command, "Unknown command");
                return Reaction::default();
            }
        };

        Reaction {
            reply: Some(self.reply(msg_id, reply_states)),
            push: None,
        }
    }

    fn reply(&self, msg_id: u32, states: StateMap) -> Value {
        json!({
            "msgId": msg_id,
            "payload": {
                "device_id": self.identity.device_id,
                "states": states,
            }
        })
    }

    fn query_states(&self) -> StateMap {
        states(&[
            ("on", Value::from(self.state != AudioState::Standby)),
            ("activityState", Value::from(self.state.activity_state())),
            ("playbackState", Value::from(self.state.playback_state())),
            ("isMuted", Value::from(self.muted)),
            ("currentVolume", Value::from(self.volume)),
            ("online", Value::from(true)),
        ])
    }

    fn volume_states(&self) -> StateMap {
        states(&[
            ("currentVolume", Value::from(self.volume)),
            ("isMuted", Value::from(self.muted)),
            ("online", Value::from(true)),
        ])
    }

    fn clamp_volume(&mut self) {
        self.volume = self.volume.clamp(0, MAX_VOLUME);
    }

    fn set_power(&mut self, on: bool) {
        if on {
            if self.state == AudioState::Standby {
                self.state = AudioState::Stopped;
            }
        } else if self.state != AudioState::Standby {
            self.stop();
            self.state = AudioState::Standby;
            self.muted = false;
        }
    }

    fn stop(&mut self) {
        self.state = AudioState::Stopped;
    }

    /// Advance the playlist by one track, wrapping at either end
    fn play_next(&mut self, forward: bool) {
        if self.track_count == 0 {
            return;
        }

        let last = self.track_count - 1;
        let next = match (self.track, forward) {
            (Some(track), true) if track < last => track + 1,
            (_, true) => 0,
            (Some(track), false) if track > 0 => track - 1,
            (_, false) => last,
        };

        self.track = Some(next);
        self.set_power(true);
        self.state = AudioState::Playing;
    }
}

fn states(entries: &[(&str, Value)]) -> StateMap {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn online() -> StateMap {
    states(&[("online", Value::from(true))])
}

fn bool_param(params: &StateMap, key: &str) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn int_param(params: &StateMap, key: &str) -> i64 {
    params.get(key).and_then(Value::as_i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soundbar() -> Soundbar {
        Soundbar::new(
            DeviceIdentity {
                device_id: "soundbar".into(),
                local_device_id: "deviceid123".into(),
            },
            3,
        )
    }

    fn execute(device: &mut Soundbar, msg_id: u32, command: &str, params: Value) -> Reaction {
        let request = json!({
            "msgId": msg_id,
            "payload": {
                "intent": "action.devices.EXECUTE",
                "device_id": "soundbar",
                "command": format!("action.devices.commands.{command}"),
                "params": params,
            }
        });
        device.handle_datagram(request.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_discovery_returns_identity() {
        let mut device = soundbar();
        let reaction = device.handle_datagram(DISCOVERY_PACKET.as_bytes()).unwrap();
        assert_eq!(
            reaction.reply,
            Some(json!({"device_id": "soundbar", "local_device_id": "deviceid123"}))
        );

        let reaction = device.handle_datagram(CLOSE_COMPANION_PACKET.as_bytes()).unwrap();
        assert_eq!(reaction, Reaction::default());
    }

    #[test]
    fn test_query_in_standby() {
        let mut device = soundbar();
        let request = json!({"msgId": 5, "payload": {"intent": "action.devices.QUERY", "device_id": "soundbar"}});
        let reaction = device.handle_datagram(request.to_string().as_bytes()).unwrap();

        assert_eq!(
            reaction.reply,
            Some(json!({
                "msgId": 5,
                "payload": {
                    "device_id": "soundbar",
                    "states": {
                        "on": false,
                        "activityState": "STANDBY",
                        "playbackState": "STOPPED",
                        "isMuted": false,
                        "currentVolume": 40,
                        "online": true
                    }
                }
            }))
        );
        assert!(reaction.push.is_none());
    }

    #[test]
    fn test_on_off_replies_and_pushes() {
        let mut device = soundbar();

        let reaction = execute(&mut device, 7, "OnOff", json!({"on": true}));
        assert_eq!(device.state(), AudioState::Playing);
        assert_eq!(device.track(), Some(0));
        assert_eq!(reaction.reply.unwrap()["payload"]["states"], json!({"on": true, "online": true}));

        let push = reaction.push.unwrap();
        assert_eq!(push.msg_id, 0);
        assert_eq!(push.payload.states["on"], true);

        execute(&mut device, 8, "mute", json!({"mute": true}));
        let reaction = execute(&mut device, 9, "OnOff", json!({"on": false}));
        assert_eq!(device.state(), AudioState::Standby);
        assert!(!device.is_muted());
        assert_eq!(reaction.push.unwrap().payload.states["on"], false);
    }

    #[test]
    fn test_volume_is_clamped_and_unmutes() {
        let mut device = soundbar();

        execute(&mut device, 1, "mute", json!({"mute": true}));
        assert!(device.is_muted());

        let reaction = execute(&mut device, 2, "volumeRelative", json!({"relativeSteps": 80}));
        assert_eq!(device.volume(), 100);
        assert!(!device.is_muted());
        assert_eq!(
            reaction.reply.unwrap()["payload"]["states"],
            json!({"currentVolume": 100, "isMuted": false, "online": true})
        );

        execute(&mut device, 3, "setVolume", json!({"volumeLevel": -5}));
        assert_eq!(device.volume(), 0);

        execute(&mut device, 4, "volumeRelative", json!({"relativeSteps": i64::MAX}));
        assert_eq!(device.volume(), 100);
        execute(&mut device, 5, "volumeRelative", json!({"relativeSteps": i64::MIN}));
        assert_eq!(device.volume(), 0);
    }

    #[test]
    fn test_transport_controls() {
        let mut device = soundbar();

        execute(&mut device, 1, "mediaResume", json!({}));
        assert_eq!(device.state(), AudioState::Playing);
        assert_eq!(device.track(), Some(0));

        execute(&mut device, 2, "mediaPause", json!({}));
        assert_eq!(device.state(), AudioState::Paused);

        execute(&mut device, 3, "mediaResume", json!({}));
        assert_eq!(device.state(), AudioState::Playing);
        assert_eq!(device.track(), Some(0));

        execute(&mut device, 4, "mediaPrevious", json!({}));
        assert_eq!(device.track(), Some(2));

        execute(&mut device, 5, "mediaNext", json!({}));
        assert_eq!(device.track(), Some(0));

        let reaction = execute(&mut device, 6, "mediaStop", json!({}));
        assert_eq!(device.state(), AudioState::Stopped);
        assert_eq!(reaction.reply.unwrap()["payload"]["states"], json!({"online": true}));
    }

    #[test]
    fn test_ignores_other_devices_and_commands() {
        let mut device = soundbar();
        let request = json!({"msgId": 2, "payload": {"intent": "action.devices.QUERY", "device_id": "lamp"}});
        let reaction = device.handle_datagram(request.to_string().as_bytes()).unwrap();
        assert_eq!(reaction, Reaction::default());

        let reaction = execute(&mut device, 3, "ColorAbsolute", json!({}));
        assert_eq!(reaction, Reaction::default());
    }

    #[test]
    fn test_rejects_garbage() {
        let mut device = soundbar();
        assert!(matches!(device.handle_datagram(b"{not json"), Err(DeviceError::Json(_))));
        assert!(matches!(device.handle_datagram(&[0xff, 0xfe]), Err(DeviceError::NotText)));
    }
}
