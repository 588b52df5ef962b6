//! Wire envelope shared by both directions of the event stream.
//!
//! ```json
//! {
//!   "type": "order_updated",
//!   "payload": {...},
//!   "timestamp": "2026-01-01T00:00:00.000Z",
//!   "restaurantId": "r_1"
//! }
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;

/// Heartbeat probe sent by the client (and answered by the client if the server sends one).
pub const PING: &str = "ping";
/// Heartbeat reply.
pub const PONG: &str = "pong";
/// Alternate heartbeat reply name used by some backends.
pub const HEARTBEAT_PONG: &str = "heartbeat_pong";

/// Format a timestamp the way the backend expects (ISO-8601, millisecond precision, `Z`).
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Generate a fresh correlation id (time-ordered UUID v7).
#[must_use]
pub fn new_correlation_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// WireEnvelope
// ─────────────────────────────────────────────────────────────────────────────

/// One JSON frame on the socket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEnvelope {
    /// Event or command name.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Body; `null` for heartbeats.
    #[serde(default)]
    pub payload: Value,
    /// ISO-8601 send time.
    #[serde(default)]
    pub timestamp: String,
    /// Tenant scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restaurant_id: Option<String>,
    /// Caller-supplied id echoed by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl WireEnvelope {
    /// Build an envelope stamped with the current time.
    #[must_use]
    pub fn new(message_type: impl Into<String>, payload: Value) -> Self {
        Self {
            message_type: message_type.into(),
            payload,
            timestamp: format_timestamp(Utc::now()),
            restaurant_id: None,
            correlation_id: None,
        }
    }

    /// Heartbeat probe.
    #[must_use]
    pub fn ping(restaurant_id: Option<&str>) -> Self {
        Self::new(PING, Value::Null).scoped(restaurant_id)
    }

    /// Heartbeat reply.
    #[must_use]
    pub fn pong(restaurant_id: Option<&str>) -> Self {
        Self::new(PONG, Value::Null).scoped(restaurant_id)
    }

    /// Tag with a tenant scope when one is known.
    #[must_use]
    pub fn scoped(mut self, restaurant_id: Option<&str>) -> Self {
        if let Some(id) = restaurant_id {
            self.restaurant_id = Some(id.to_owned());
        }
        self
    }

    /// Whether this frame is a heartbeat reply.
    #[must_use]
    pub fn is_pong(&self) -> bool {
        self.message_type == PONG || self.message_type == HEARTBEAT_PONG
    }

    /// Whether this frame is a heartbeat probe.
    #[must_use]
    pub fn is_ping(&self) -> bool {
        self.message_type == PING
    }

    /// Parse one text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize to a text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OutboundMessage
// ─────────────────────────────────────────────────────────────────────────────

/// A message handed to the connection by application code.
///
/// Owned by the connection's queue until it is written or the queue is
/// cleared by an intentional disconnect.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundMessage {
    /// Message name.
    pub message_type: String,
    /// Opaque body.
    pub payload: Value,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Optional id for matching replies.
    pub correlation_id: Option<String>,
}

impl OutboundMessage {
    /// New message stamped now.
    #[must_use]
    pub fn new(message_type: impl Into<String>, payload: Value) -> Self {
        Self {
            message_type: message_type.into(),
            payload,
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Wrap into a wire envelope scoped to the given tenant.
    #[must_use]
    pub fn to_envelope(&self, restaurant_id: Option<&str>) -> WireEnvelope {
        WireEnvelope {
            message_type: self.message_type.clone(),
            payload: self.payload.clone(),
            timestamp: format_timestamp(self.timestamp),
            restaurant_id: restaurant_id.map(str::to_owned),
            correlation_id: self.correlation_id.clone(),
        }
    }
}
