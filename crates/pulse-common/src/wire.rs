//! JSON wire envelope for hub connections.
//!
//! Every frame is a JSON text message of the form `{"e": <event>, "d":
//! <payload>}`. Inbound frames are decoded in two steps: the envelope first,
//! just far enough to read the event-name discriminant, then the payload for
//! events the session actually handles. Anything undecodable at either step
//! is dropped by the receiver, never fatal to the connection.

use crate::telemetry::MachineData;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `login` event name, valid for both connection roles.
pub const EVENT_LOGIN: &str = "login";
/// `staticData` event name: machine descriptor, reporter to hub.
pub const EVENT_STATIC_DATA: &str = "staticData";
/// `dynamicData` event name: live metrics snapshot, reporter to hub.
pub const EVENT_DYNAMIC_DATA: &str = "dynamicData";
/// `heartbeat` event name: liveness signal, hub to client.
pub const EVENT_HEARTBEAT: &str = "heartbeat";
/// `machineData` event name: transformed metrics snapshot, hub to client.
pub const EVENT_MACHINE_DATA: &str = "machineData";

/// Errors producing or consuming wire frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// The frame was not a JSON object with an `e` discriminant.
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    /// The payload did not match the shape the named event requires.
    #[error("malformed `{event}` payload: {source}")]
    Payload {
        /// Event name the payload was decoded for.
        event: String,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
    /// An outbound event failed to serialize.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A partially-decoded inbound frame: discriminant plus raw payload.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    /// Event-name discriminant.
    pub e: String,
    /// Raw payload; `Null` for payload-less events.
    #[serde(default)]
    pub d: serde_json::Value,
}

impl Envelope {
    /// Decode the envelope of a frame without touching the payload.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Envelope`] if the frame is not valid JSON or
    /// lacks the `e` field.
    pub fn decode(frame: &str) -> Result<Self, WireError> {
        serde_json::from_str(frame).map_err(WireError::Envelope)
    }

    /// Decode the payload as `T`, consuming the envelope.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Payload`] if the payload does not match `T`.
    pub fn payload<T: DeserializeOwned>(self) -> Result<T, WireError> {
        serde_json::from_value(self.d).map_err(|source| WireError::Payload {
            event: self.e,
            source,
        })
    }
}

/// `login` payload: the out-of-band credential carried by the first
/// application message of a connection, not by the transport handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Login {
    /// Opaque access token minted by the account backend.
    pub auth_token: String,
}

/// Events sent from the hub to dashboard clients.
///
/// Variants serialize to the `{"e", "d"}` envelope directly; the variant
/// name is the wire discriminant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "e", content = "d", rename_all = "camelCase")]
pub enum OutboundEvent {
    /// Periodic liveness signal, no payload.
    Heartbeat,
    /// One relayed telemetry snapshot.
    MachineData(MachineData),
}

impl OutboundEvent {
    /// Encode as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Encode`] if serialization fails.
    pub fn encode(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_decodes_discriminant_and_payload() {
        let env = Envelope::decode(r#"{"e":"login","d":{"auth_token":"tok"}}"#).unwrap();
        assert_eq!(env.e, EVENT_LOGIN);
        let login: Login = env.payload().unwrap();
        assert_eq!(login.auth_token, "tok");
    }

    #[test]
    fn envelope_tolerates_missing_payload() {
        let env = Envelope::decode(r#"{"e":"heartbeat"}"#).unwrap();
        assert_eq!(env.e, EVENT_HEARTBEAT);
        assert!(env.d.is_null());
    }

    #[test]
    fn envelope_rejects_non_json() {
        assert!(matches!(
            Envelope::decode("not json at all"),
            Err(WireError::Envelope(_))
        ));
    }

    #[test]
    fn envelope_rejects_missing_discriminant() {
        assert!(matches!(
            Envelope::decode(r#"{"d":{}}"#),
            Err(WireError::Envelope(_))
        ));
    }

    #[test]
    fn payload_mismatch_names_the_event() {
        let env = Envelope::decode(r#"{"e":"login","d":{"wrong":1}}"#).unwrap();
        let err = env.payload::<Login>().unwrap_err();
        match err {
            WireError::Payload { event, .. } => assert_eq!(event, "login"),
            other => panic!("expected Payload error, got {other:?}"),
        }
    }

    #[test]
    fn heartbeat_encodes_discriminant_only() {
        let frame = OutboundEvent::Heartbeat.encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"e": "heartbeat"}));
    }

    #[test]
    fn outbound_event_round_trips_through_envelope() {
        let frame = OutboundEvent::Heartbeat.encode().unwrap();
        let env = Envelope::decode(&frame).unwrap();
        assert_eq!(env.e, EVENT_HEARTBEAT);
    }
}
