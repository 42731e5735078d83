//! Connection identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a client connection.
///
/// Opaque to clients and collaborators; only equality and display matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the raw UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0.simple())
    }
}

impl std::str::FromStr for ConnectionId {
    type Err = uuid::Error;

    /// Accepts both the display form (`conn-<hex>`) and a bare UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("conn-").unwrap_or(s);
        Uuid::parse_str(raw).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn display_form_parses_back() {
        let id = ConnectionId::new();
        assert_eq!(id.to_string().parse::<ConnectionId>().unwrap(), id);
        assert_eq!(id.as_uuid().to_string().parse::<ConnectionId>().unwrap(), id);
        assert!("conn-zzz".parse::<ConnectionId>().is_err());
    }
}
