//! Mapping backend events onto checkout events.
//!
//! The payment gateway reports progress through the same event stream as
//! orders: `checkout_created`, `payment_captured`, `checkout_completed` and
//! `checkout_failed`, each carrying a `checkoutId`. Events for a different
//! checkout than the one in progress are ignored.

use galley_core::InboundEvent;
use serde_json::Value;

use crate::types::{CheckoutContext, CheckoutEvent};

/// Checkout event carried by `event`, if it concerns the checkout in `ctx`.
pub fn checkout_event(event: &InboundEvent, ctx: &CheckoutContext) -> Option<CheckoutEvent> {
    let InboundEvent::Other {
        event_type,
        payload,
    } = event
    else {
        return None;
    };

    let checkout_id = str_field(payload, &["checkoutId", "checkout_id", "id"]);
    if let (Some(current), Some(incoming)) = (ctx.checkout_id.as_deref(), checkout_id.as_deref()) {
        if current != incoming {
            return None;
        }
    }

    match event_type.as_str() {
        "checkout_created" => {
            checkout_id.map(|checkout_id| CheckoutEvent::CheckoutCreated { checkout_id })
        }
        "payment_captured" => str_field(payload, &["paymentId", "payment_id"])
            .map(|payment_id| CheckoutEvent::PaymentCaptured { payment_id }),
        "checkout_completed" => str_field(payload, &["paymentId", "payment_id"])
            .map(|payment_id| CheckoutEvent::CheckoutCompleted { payment_id }),
        "checkout_failed" => Some(CheckoutEvent::CheckoutFailed {
            error: str_field(payload, &["error", "message", "reason"])
                .unwrap_or_else(|| "checkout failed".to_string()),
        }),
        _ => None,
    }
}

fn str_field(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_str))
        .map(str::to_owned)
}
