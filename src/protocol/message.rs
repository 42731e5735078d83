//! Message envelope and message kinds.
//!
//! Wire shape: `{ "id": string, "type": string, "timestamp": number, "payload": object }`.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use uuid::Uuid;

use crate::protocol::codes::ErrorCode;

/// Discriminant of every message kind the protocol recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Ping,
    Pong,
    StateUpdate,
    Ack,
    Nack,
}

impl MessageType {
    pub const ALL: [MessageType; 5] = [
        MessageType::Ping,
        MessageType::Pong,
        MessageType::StateUpdate,
        MessageType::Ack,
        MessageType::Nack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Ping => "PING",
            MessageType::Pong => "PONG",
            MessageType::StateUpdate => "STATE_UPDATE",
            MessageType::Ack => "ACK",
            MessageType::Nack => "NACK",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or(())
    }
}

/// Payload of a NACK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NackPayload {
    pub reason: String,
    pub code: ErrorCode,
}

/// A message body, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Ping(Map<String, Value>),
    Pong(Map<String, Value>),
    /// Opaque application state; the transport never interprets it.
    StateUpdate(Map<String, Value>),
    Ack(Map<String, Value>),
    Nack(NackPayload),
}

impl Message {
    pub fn kind(&self) -> MessageType {
        match self {
            Message::Ping(_) => MessageType::Ping,
            Message::Pong(_) => MessageType::Pong,
            Message::StateUpdate(_) => MessageType::StateUpdate,
            Message::Ack(_) => MessageType::Ack,
            Message::Nack(_) => MessageType::Nack,
        }
    }

    /// Payload as it appears on the wire.
    pub fn payload(&self) -> Value {
        match self {
            Message::Ping(map)
            | Message::Pong(map)
            | Message::StateUpdate(map)
            | Message::Ack(map) => Value::Object(map.clone()),
            Message::Nack(nack) => {
                let mut map = Map::new();
                map.insert("reason".into(), Value::String(nack.reason.clone()));
                map.insert("code".into(), Value::String(nack.code.as_str().into()));
                Value::Object(map)
            }
        }
    }
}

/// A validated or locally constructed protocol envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Correlation id. `None` only on NACKs answering input whose id could
    /// not be recovered; serialized as `null`.
    pub id: Option<String>,
    /// Sender clock, conventionally milliseconds since the Unix epoch.
    /// Kept as the JSON number received so a PONG echoes it exactly.
    pub timestamp: Number,
    pub message: Message,
}

impl Envelope {
    /// Wrap a message in a fresh envelope stamped with the current time.
    pub fn new(message: Message) -> Self {
        Self {
            id: Some(Uuid::new_v4().to_string()),
            timestamp: Number::from(now_millis()),
            message,
        }
    }

    /// PONG answering a PING; echoes the ping timestamp so the client can
    /// measure the round trip.
    pub fn pong(ping_timestamp: Number) -> Self {
        Self {
            id: Some(Uuid::new_v4().to_string()),
            timestamp: ping_timestamp,
            message: Message::Pong(Map::new()),
        }
    }

    /// NACK rejecting an inbound message.
    pub fn nack(correlation_id: Option<String>, reason: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            id: correlation_id,
            timestamp: Number::from(now_millis()),
            message: Message::Nack(NackPayload {
                reason: reason.into(),
                code,
            }),
        }
    }

    /// ACK for the message with the given id.
    pub fn ack(correlation_id: impl Into<String>) -> Self {
        Self {
            id: Some(correlation_id.into()),
            timestamp: Number::from(now_millis()),
            message: Message::Ack(Map::new()),
        }
    }

    pub fn state_update(state: Map<String, Value>) -> Self {
        Self::new(Message::StateUpdate(state))
    }

    pub fn kind(&self) -> MessageType {
        self.message.kind()
    }

    /// Serialize to a single JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Serialize)]
struct WireEnvelope<'a> {
    id: Option<&'a str>,
    #[serde(rename = "type")]
    kind: MessageType,
    timestamp: &'a Number,
    payload: Value,
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireEnvelope {
            id: self.id.as_deref(),
            kind: self.kind(),
            timestamp: &self.timestamp,
            payload: self.message.payload(),
        }
        .serialize(serializer)
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pong_echoes_ping_timestamp() {
        let pong = Envelope::pong(Number::from(1_700_000_000_123u64));
        assert_eq!(pong.kind(), MessageType::Pong);
        assert_eq!(pong.timestamp.as_u64(), Some(1_700_000_000_123));
        assert!(pong.id.is_some());
    }

    #[test]
    fn nack_without_correlation_serializes_null_id() {
        let nack = Envelope::nack(None, "not json", ErrorCode::InvalidMessage);
        let value: Value = serde_json::from_str(&nack.to_json().unwrap()).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["type"], "NACK");
        assert_eq!(value["payload"], json!({"reason": "not json", "code": "INVALID_MESSAGE"}));
    }

    #[test]
    fn nack_keeps_correlation_id() {
        let nack = Envelope::nack(Some("m-7".into()), "slow down", ErrorCode::RateLimited);
        let value: Value = serde_json::from_str(&nack.to_json().unwrap()).unwrap();
        assert_eq!(value["id"], "m-7");
        assert_eq!(value["payload"]["code"], "RATE_LIMITED");
    }

    #[test]
    fn state_update_carries_payload_verbatim() {
        let mut state = Map::new();
        state.insert("k".into(), json!("v"));
        let env = Envelope::state_update(state);
        let value: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "STATE_UPDATE");
        assert_eq!(value["payload"], json!({"k": "v"}));
    }

    #[test]
    fn message_type_names_are_stable() {
        for kind in MessageType::ALL {
            assert_eq!(kind.as_str().parse::<MessageType>(), Ok(kind));
        }
        assert!("ping".parse::<MessageType>().is_err());
    }
}
