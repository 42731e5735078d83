//! Inbound frame validation.
//!
//! # Responsibilities
//! - Reject frames that are not JSON objects
//! - Require `id` (string), `type` (known kind) and `timestamp` (non-negative number)
//! - Check each kind's payload shape
//!
//! Validation never panics; any malformed input yields a `ValidationError`.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::protocol::codes::ErrorCode;
use crate::protocol::message::{Envelope, Message, MessageType, NackPayload};

/// Why an inbound frame was rejected. The `Display` text is sent back to the
/// client as the NACK reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("message must be a JSON object")]
    NotAnObject,

    #[error("message is missing `type`")]
    MissingType,

    #[error("unrecognized message type {0}")]
    UnknownType(String),

    #[error("message `id` must be a string")]
    InvalidId,

    #[error("message `timestamp` must be a non-negative number")]
    InvalidTimestamp,

    #[error("{0} requires a payload")]
    MissingPayload(MessageType),

    #[error("{0} payload must be an object")]
    PayloadNotObject(MessageType),

    #[error("NACK payload field `{0}` is missing or invalid")]
    InvalidNackField(&'static str),
}

/// Validate a raw text frame and return the typed envelope.
pub fn validate(raw: &str) -> Result<Envelope, ValidationError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ValidationError::InvalidJson(e.to_string()))?;
    let mut object = match value {
        Value::Object(object) => object,
        _ => return Err(ValidationError::NotAnObject),
    };

    let kind = match object.get("type") {
        None | Some(Value::Null) => return Err(ValidationError::MissingType),
        Some(Value::String(name)) => name
            .parse::<MessageType>()
            .map_err(|_| ValidationError::UnknownType(format!("`{}`", name)))?,
        Some(other) => return Err(ValidationError::UnknownType(other.to_string())),
    };

    let id = match object.remove("id") {
        Some(Value::String(id)) => id,
        _ => return Err(ValidationError::InvalidId),
    };

    let timestamp = match object.remove("timestamp") {
        Some(Value::Number(n)) if n.as_f64().is_some_and(|t| t.is_finite() && t >= 0.0) => n,
        _ => return Err(ValidationError::InvalidTimestamp),
    };

    let payload = match object.remove("payload") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map),
        Some(_) => return Err(ValidationError::PayloadNotObject(kind)),
    };

    let message = match kind {
        MessageType::Ping => Message::Ping(payload.unwrap_or_default()),
        MessageType::Pong => Message::Pong(payload.unwrap_or_default()),
        MessageType::Ack => Message::Ack(payload.unwrap_or_default()),
        MessageType::StateUpdate => {
            Message::StateUpdate(payload.ok_or(ValidationError::MissingPayload(kind))?)
        }
        MessageType::Nack => {
            Message::Nack(nack_payload(payload.ok_or(ValidationError::MissingPayload(kind))?)?)
        }
    };

    Ok(Envelope {
        id: Some(id),
        timestamp,
        message,
    })
}

fn nack_payload(map: Map<String, Value>) -> Result<NackPayload, ValidationError> {
    let reason = map
        .get("reason")
        .and_then(Value::as_str)
        .ok_or(ValidationError::InvalidNackField("reason"))?;
    let code = map
        .get("code")
        .and_then(Value::as_str)
        .and_then(|code| code.parse::<ErrorCode>().ok())
        .ok_or(ValidationError::InvalidNackField("code"))?;

    Ok(NackPayload {
        reason: reason.to_string(),
        code,
    })
}

/// Best-effort recovery of a frame's `id` so a NACK can be correlated even
/// when the rest of the envelope is invalid.
pub fn extract_id(raw: &str) -> Option<String> {
    match serde_json::from_str::<Value>(raw).ok()? {
        Value::Object(mut object) => match object.remove("id") {
            Some(Value::String(id)) => Some(id),
            _ => None,
        },
        _ => None,
    }
}
