//! Inbound domain events and the order model they carry.
//!
//! Events are decoded from a [`WireEnvelope`] by [`InboundEvent::from_envelope`].
//! Order payloads are accepted either bare (`payload: {id, ...}`) or wrapped
//! (`payload: {order: {id, ...}}`). Unmodelled event names are kept as
//! [`InboundEvent::Other`] so subscribers still see them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ProtocolError;
use crate::wire::WireEnvelope;

/// `order_created` event name.
pub const ORDER_CREATED: &str = "order_created";
/// `order_updated` event name.
pub const ORDER_UPDATED: &str = "order_updated";
/// `order_status_changed` event name.
pub const ORDER_STATUS_CHANGED: &str = "order_status_changed";
/// `order_deleted` event name.
pub const ORDER_DELETED: &str = "order_deleted";

// ─────────────────────────────────────────────────────────────────────────────
// Order model
// ─────────────────────────────────────────────────────────────────────────────

/// Kitchen lifecycle of an order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Just placed.
    #[default]
    New,
    /// Awaiting confirmation.
    Pending,
    /// Accepted by the kitchen.
    Confirmed,
    /// Being cooked.
    Preparing,
    /// Ready for pickup or service.
    Ready,
    /// Handed over.
    #[serde(alias = "picked-up", alias = "picked_up")]
    Completed,
    /// Voided.
    Cancelled,
    /// A status this client does not know about.
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    /// Whether the order has left the kitchen flow.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// One line on an order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineItem {
    /// Line id, when the backend assigns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name.
    pub name: String,
    /// Quantity ordered.
    #[serde(default = "one")]
    pub quantity: u32,
    /// Fields this client does not model (modifiers, notes, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn one() -> u32 {
    1
}

/// An order as carried by order events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Order id.
    pub id: String,
    /// Owning restaurant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restaurant_id: Option<String>,
    /// Human-facing ticket number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    /// Current status.
    #[serde(default)]
    pub status: OrderStatus,
    /// Line items.
    #[serde(default)]
    pub items: Vec<OrderLineItem>,
    /// Total in minor units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cents: Option<i64>,
    /// Creation time as sent by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Last update time as sent by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Everything else.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// InboundEvent
// ─────────────────────────────────────────────────────────────────────────────

/// A parsed domain event from the backend.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundEvent {
    /// A new order was placed.
    OrderCreated {
        /// The order.
        order: Order,
    },
    /// Order content changed.
    OrderUpdated {
        /// The order after the change.
        order: Order,
    },
    /// Order moved between statuses. Both ends are kept so views can animate
    /// the transition.
    OrderStatusChanged {
        /// Affected order.
        order_id: String,
        /// Status before the change.
        previous_status: OrderStatus,
        /// Status after the change.
        new_status: OrderStatus,
        /// Full order when the backend includes it.
        order: Option<Order>,
    },
    /// Order removed.
    OrderDeleted {
        /// Removed order id.
        order_id: String,
    },
    /// Heartbeat reply.
    HeartbeatPong,
    /// Any other domain event name.
    Other {
        /// Envelope `type`.
        event_type: String,
        /// Raw payload.
        payload: Value,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusChangePayload {
    #[serde(alias = "id")]
    order_id: String,
    #[serde(alias = "oldStatus", alias = "fromStatus")]
    previous_status: OrderStatus,
    #[serde(alias = "status", alias = "toStatus")]
    new_status: OrderStatus,
    #[serde(default)]
    order: Option<Order>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeletedPayload {
    #[serde(alias = "id")]
    order_id: String,
}

impl InboundEvent {
    /// Decode the event carried by an envelope.
    pub fn from_envelope(envelope: &WireEnvelope) -> Result<Self, ProtocolError> {
        let event_type = envelope.message_type.as_str();
        if envelope.is_pong() {
            return Ok(Self::HeartbeatPong);
        }
        let payload = &envelope.payload;
        let needs_payload = matches!(
            event_type,
            ORDER_CREATED | ORDER_UPDATED | ORDER_STATUS_CHANGED | ORDER_DELETED
        );
        if needs_payload && payload.is_null() {
            return Err(ProtocolError::MissingPayload {
                event_type: event_type.to_owned(),
            });
        }

        let event = match event_type {
            ORDER_CREATED => Self::OrderCreated {
                order: parse_order(payload)?,
            },
            ORDER_UPDATED => Self::OrderUpdated {
                order: parse_order(payload)?,
            },
            ORDER_STATUS_CHANGED => {
                let change: StatusChangePayload = serde_json::from_value(payload.clone())?;
                Self::OrderStatusChanged {
                    order_id: change.order_id,
                    previous_status: change.previous_status,
                    new_status: change.new_status,
                    order: change.order,
                }
            }
            ORDER_DELETED => {
                let deleted: DeletedPayload = serde_json::from_value(payload.clone())?;
                Self::OrderDeleted {
                    order_id: deleted.order_id,
                }
            }
            other => Self::Other {
                event_type: other.to_owned(),
                payload: payload.clone(),
            },
        };
        Ok(event)
    }

    /// Wire name of this event.
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::OrderCreated { .. } => ORDER_CREATED,
            Self::OrderUpdated { .. } => ORDER_UPDATED,
            Self::OrderStatusChanged { .. } => ORDER_STATUS_CHANGED,
            Self::OrderDeleted { .. } => ORDER_DELETED,
            Self::HeartbeatPong => crate::wire::HEARTBEAT_PONG,
            Self::Other { event_type, .. } => event_type,
        }
    }

    /// Order this event is about, if any.
    #[must_use]
    pub fn order_id(&self) -> Option<&str> {
        match self {
            Self::OrderCreated { order } | Self::OrderUpdated { order } => Some(&order.id),
            Self::OrderStatusChanged { order_id, .. } | Self::OrderDeleted { order_id } => {
                Some(order_id)
            }
            Self::HeartbeatPong | Self::Other { .. } => None,
        }
    }
}

fn parse_order(payload: &Value) -> Result<Order, ProtocolError> {
    let body = match payload.get("order") {
        Some(inner) if inner.is_object() => inner,
        _ => payload,
    };
    Ok(serde_json::from_value(body.clone())?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn envelope(event_type: &str, payload: Value) -> WireEnvelope {
        WireEnvelope::new(event_type, payload)
    }

    #[test]
    fn order_created_bare_payload() {
        let env = envelope(
            ORDER_CREATED,
            json!({
                "id": "o_1",
                "orderNumber": "42",
                "status": "new",
                "items": [{"name": "Bowl", "quantity": 2}]
            }),
        );
        let event = InboundEvent::from_envelope(&env).unwrap();
        assert_matches!(&event, InboundEvent::OrderCreated { order } if order.id == "o_1");
        if let InboundEvent::OrderCreated { order } = event {
            assert_eq!(order.order_number.as_deref(), Some("42"));
            assert_eq!(order.items[0].quantity, 2);
        }
    }

    #[test]
    fn order_updated_wrapped_payload() {
        let env = envelope(ORDER_UPDATED, json!({"order": {"id": "o_2", "status": "preparing"}}));
        let event = InboundEvent::from_envelope(&env).unwrap();
        assert_matches!(
            event,
            InboundEvent::OrderUpdated { order } if order.status == OrderStatus::Preparing
        );
    }

    #[test]
    fn status_change_keeps_both_ends() {
        let env = envelope(
            ORDER_STATUS_CHANGED,
            json!({"orderId": "o_3", "previousStatus": "preparing", "newStatus": "ready"}),
        );
        let event = InboundEvent::from_envelope(&env).unwrap();
        assert_eq!(
            event,
            InboundEvent::OrderStatusChanged {
                order_id: "o_3".into(),
                previous_status: OrderStatus::Preparing,
                new_status: OrderStatus::Ready,
                order: None,
            }
        );
        assert_eq!(event.order_id(), Some("o_3"));
    }

    #[test]
    fn order_deleted_accepts_id_alias() {
        let env = envelope(ORDER_DELETED, json!({"id": "o_4"}));
        let event = InboundEvent::from_envelope(&env).unwrap();
        assert_eq!(event, InboundEvent::OrderDeleted { order_id: "o_4".into() });
    }

    #[test]
    fn pong_is_heartbeat() {
        let env = envelope("pong", Value::Null);
        assert_eq!(InboundEvent::from_envelope(&env).unwrap(), InboundEvent::HeartbeatPong);
    }

    #[test]
    fn unknown_type_is_other() {
        let env = envelope("menu_updated", json!({"itemId": "m_1"}));
        let event = InboundEvent::from_envelope(&env).unwrap();
        assert_eq!(event.event_type(), "menu_updated");
        assert!(event.order_id().is_none());
    }

    #[test]
    fn missing_payload_is_protocol_error() {
        let env = envelope(ORDER_CREATED, Value::Null);
        assert_matches!(
            InboundEvent::from_envelope(&env),
            Err(ProtocolError::MissingPayload { .. })
        );
    }

    #[test]
    fn malformed_payload_is_protocol_error() {
        let env = envelope(ORDER_STATUS_CHANGED, json!({"orderId": 7}));
        assert_matches!(InboundEvent::from_envelope(&env), Err(ProtocolError::Json(_)));
    }

    #[test]
    fn status_aliases_and_unknown() {
        let s: OrderStatus = serde_json::from_str("\"picked-up\"").unwrap();
        assert_eq!(s, OrderStatus::Completed);
        let s: OrderStatus = serde_json::from_str("\"on_the_moon\"").unwrap();
        assert_eq!(s, OrderStatus::Unknown);
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Ready.is_terminal());
    }

    #[test]
    fn order_keeps_unmodelled_fields() {
        let order: Order =
            serde_json::from_value(json!({"id": "o_5", "tableNumber": 12})).unwrap();
        assert_eq!(order.extra["tableNumber"], 12);
        assert_eq!(order.status, OrderStatus::New);
    }
}
