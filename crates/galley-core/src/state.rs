//! Connection lifecycle state as observed by the application layer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the realtime connection.
///
/// Only the connection driver moves between states; everything else reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Idle, no socket.
    #[default]
    Disconnected,
    /// First attempt after an explicit connect is in flight.
    Connecting,
    /// Socket open, heartbeat running.
    Connected,
    /// Recovering from a transient failure; a retry is scheduled or in flight.
    Reconnecting,
    /// Retries exhausted; waiting for an explicit connect.
    Error,
}

impl ConnectionState {
    /// Whether the socket is open.
    #[must_use]
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// Whether an attempt is underway, so a new connect should join it.
    #[must_use]
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }

    /// Whether nothing is happening and a send should kick off a connect.
    #[must_use]
    pub fn is_idle(self) -> bool {
        self == Self::Disconnected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of the connection, published on every state change.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Failed attempts since the last successful open.
    pub attempt: u32,
    /// Configured attempt budget.
    pub max_attempts: u32,
    /// Delay before the scheduled retry, if one is scheduled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_delay_ms: Option<u64>,
    /// Description of the most recent failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ConnectionSnapshot {
    /// Initial snapshot for a fresh connection with the given budget.
    #[must_use]
    pub fn idle(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn pending_states() {
        assert!(ConnectionState::Connecting.is_pending());
        assert!(ConnectionState::Reconnecting.is_pending());
        assert!(!ConnectionState::Connected.is_pending());
        assert!(!ConnectionState::Error.is_pending());
    }

    #[test]
    fn only_disconnected_is_idle() {
        assert!(ConnectionState::Disconnected.is_idle());
        assert!(!ConnectionState::Error.is_idle());
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&ConnectionState::Reconnecting).unwrap();
        assert_eq!(json, "\"reconnecting\"");
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }

    #[test]
    fn snapshot_omits_empty_optionals() {
        let json = serde_json::to_value(ConnectionSnapshot::idle(10)).unwrap();
        assert_eq!(json["state"], "disconnected");
        assert_eq!(json["maxAttempts"], 10);
        assert!(json.get("nextDelayMs").is_none());
        assert!(json.get("lastError").is_none());
    }
}
