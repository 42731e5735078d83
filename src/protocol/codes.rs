//! Machine-readable error codes and WebSocket close codes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reason code carried in every NACK payload.
///
/// The string form of each variant is part of the wire contract and must not
/// change between versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Frame was not JSON, or failed envelope / payload validation.
    InvalidMessage,
    /// Connection exceeded its per-window message cap.
    RateLimited,
    /// Frame exceeded the configured maximum size.
    PayloadTooLarge,
    /// Server failed to handle an otherwise valid message.
    InternalError,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 4] = [
        ErrorCode::InvalidMessage,
        ErrorCode::RateLimited,
        ErrorCode::PayloadTooLarge,
        ErrorCode::InternalError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidMessage => "INVALID_MESSAGE",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCode::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or(())
    }
}

/// WebSocket close status codes used by the server (RFC 6455 §7.4.1).
pub mod close_code {
    /// Server closed the connection in an orderly way.
    pub const NORMAL: u16 = 1000;
    /// Server is shutting down and no longer accepts connections.
    pub const GOING_AWAY: u16 = 1001;
    /// Connection refused by admission policy (per-source cap).
    pub const POLICY_VIOLATION: u16 = 1008;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_strings() {
        for code in ErrorCode::ALL {
            assert_eq!(code.as_str().parse::<ErrorCode>(), Ok(code));
        }
        assert!("NOT_A_CODE".parse::<ErrorCode>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&ErrorCode::RateLimited).unwrap();
        assert_eq!(json, "\"RATE_LIMITED\"");
    }

    #[test]
    fn policy_close_differs_from_normal() {
        assert_ne!(close_code::POLICY_VIOLATION, close_code::NORMAL);
    }
}
