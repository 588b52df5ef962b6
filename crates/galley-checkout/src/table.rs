//! The checkout transition table.

use crate::types::{CheckoutContext, CheckoutEvent, CheckoutState};

/// State reached by applying `event` in `state`, or `None` when the pair is
/// not in the table.
///
/// Guards read `ctx`: a device must be known to be selected, and creating a
/// checkout needs a selected device and a positive amount.
pub fn next_state(
    state: CheckoutState,
    ctx: &CheckoutContext,
    event: &CheckoutEvent,
) -> Option<CheckoutState> {
    use CheckoutEvent as E;
    use CheckoutState as S;

    let next = match (state, event) {
        (S::Idle, E::LoadDevices) => S::LoadingDevices,
        (S::LoadingDevices, E::DevicesLoaded { .. }) => S::DevicesLoaded,
        (S::LoadingDevices, E::DevicesFailed { .. }) => S::Failed,
        (S::DevicesLoaded, E::SelectDevice { device_id }) if ctx.has_device(device_id) => {
            S::DevicesLoaded
        }
        (S::DevicesLoaded, E::CreateCheckout { amount_cents, .. })
            if *amount_cents > 0 && ctx.selected_device_id.is_some() =>
        {
            S::CreatingCheckout
        }
        (S::CreatingCheckout, E::CheckoutCreated { .. }) => S::Polling,
        (S::Polling, E::PaymentCaptured { .. }) => S::Completing,
        (S::Polling | S::Completing, E::CheckoutCompleted { .. }) => S::Completed,
        (S::CreatingCheckout | S::Polling | S::Completing, E::CheckoutFailed { .. }) => S::Failed,
        (S::LoadingDevices | S::DevicesLoaded | S::CreatingCheckout | S::Polling, E::Cancel) => {
            S::Cancelled
        }
        (S::CreatingCheckout | S::Polling | S::Completing, E::Timeout) => S::Timeout,
        (from, E::Reset) if from != S::Idle => S::Idle,
        _ => return None,
    };
    Some(next)
}

/// Apply the context side of a valid transition.
pub(crate) fn apply_context(ctx: &mut CheckoutContext, event: CheckoutEvent) {
    match event {
        CheckoutEvent::LoadDevices => ctx.error = None,
        CheckoutEvent::DevicesLoaded { devices } => {
            ctx.devices = devices;
            if let Some(id) = ctx.selected_device_id.take() {
                if ctx.has_device(&id) {
                    ctx.selected_device_id = Some(id);
                }
            }
        }
        CheckoutEvent::DevicesFailed { error } | CheckoutEvent::CheckoutFailed { error } => {
            ctx.error = Some(error);
        }
        CheckoutEvent::SelectDevice { device_id } => ctx.selected_device_id = Some(device_id),
        CheckoutEvent::CreateCheckout {
            amount_cents,
            order_id,
        } => {
            ctx.amount_cents = Some(amount_cents);
            ctx.order_id = order_id;
            ctx.checkout_id = None;
            ctx.payment_id = None;
            ctx.error = None;
        }
        CheckoutEvent::CheckoutCreated { checkout_id } => ctx.checkout_id = Some(checkout_id),
        CheckoutEvent::PaymentCaptured { payment_id }
        | CheckoutEvent::CheckoutCompleted { payment_id } => ctx.payment_id = Some(payment_id),
        CheckoutEvent::Timeout => ctx.error = Some("checkout timed out".to_string()),
        CheckoutEvent::Cancel => {}
        CheckoutEvent::Reset => *ctx = CheckoutContext::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Device;
    use CheckoutState as S;

    fn loaded() -> CheckoutContext {
        CheckoutContext {
            devices: vec![Device::new("d1", "Front counter")],
            ..CheckoutContext::default()
        }
    }

    fn create(amount_cents: u64) -> CheckoutEvent {
        CheckoutEvent::CreateCheckout {
            amount_cents,
            order_id: None,
        }
    }

    #[test]
    fn happy_path() {
        let mut ctx = loaded();
        assert_eq!(next_state(S::Idle, &ctx, &CheckoutEvent::LoadDevices), Some(S::LoadingDevices));
        let select = CheckoutEvent::SelectDevice { device_id: "d1".into() };
        assert_eq!(next_state(S::DevicesLoaded, &ctx, &select), Some(S::DevicesLoaded));
        ctx.selected_device_id = Some("d1".into());
        assert_eq!(next_state(S::DevicesLoaded, &ctx, &create(500)), Some(S::CreatingCheckout));
        let created = CheckoutEvent::CheckoutCreated { checkout_id: "c".into() };
        assert_eq!(next_state(S::CreatingCheckout, &ctx, &created), Some(S::Polling));
        let captured = CheckoutEvent::PaymentCaptured { payment_id: "p".into() };
        assert_eq!(next_state(S::Polling, &ctx, &captured), Some(S::Completing));
        let done = CheckoutEvent::CheckoutCompleted { payment_id: "p".into() };
        assert_eq!(next_state(S::Completing, &ctx, &done), Some(S::Completed));
    }

    #[test]
    fn unknown_device_cannot_be_selected() {
        let select = CheckoutEvent::SelectDevice { device_id: "nope".into() };
        assert_eq!(next_state(S::DevicesLoaded, &loaded(), &select), None);
    }

    #[test]
    fn create_needs_device_and_amount() {
        let mut ctx = loaded();
        assert_eq!(next_state(S::DevicesLoaded, &ctx, &create(500)), None);
        ctx.selected_device_id = Some("d1".into());
        assert_eq!(next_state(S::DevicesLoaded, &ctx, &create(0)), None);
    }

    #[test]
    fn cancel_not_allowed_while_completing() {
        assert_eq!(next_state(S::Completing, &loaded(), &CheckoutEvent::Cancel), None);
        assert_eq!(next_state(S::Polling, &loaded(), &CheckoutEvent::Cancel), Some(S::Cancelled));
    }

    #[test]
    fn reset_from_everywhere_but_idle() {
        for state in S::ALL {
            let expected = (state != S::Idle).then_some(S::Idle);
            assert_eq!(next_state(state, &loaded(), &CheckoutEvent::Reset), expected, "{state}");
        }
    }

    #[test]
    fn terminal_states_only_accept_reset() {
        let ctx = loaded();
        let events = [
            CheckoutEvent::LoadDevices,
            CheckoutEvent::Cancel,
            CheckoutEvent::Timeout,
            CheckoutEvent::CheckoutFailed { error: "x".into() },
            CheckoutEvent::CheckoutCompleted { payment_id: "p".into() },
        ];
        for state in S::ALL.into_iter().filter(|s| s.is_terminal()) {
            for event in &events {
                assert_eq!(next_state(state, &ctx, event), None, "{state} {}", event.name());
            }
        }
    }

    #[test]
    fn reload_drops_stale_selection() {
        let mut ctx = loaded();
        ctx.selected_device_id = Some("d1".into());
        apply_context(
            &mut ctx,
            CheckoutEvent::DevicesLoaded { devices: vec![Device::new("d2", "Patio")] },
        );
        assert_eq!(ctx.selected_device_id, None);

        ctx.selected_device_id = Some("d2".into());
        apply_context(
            &mut ctx,
            CheckoutEvent::DevicesLoaded {
                devices: vec![Device::new("d2", "Patio"), Device::new("d3", "Bar")],
            },
        );
        assert_eq!(ctx.selected_device_id.as_deref(), Some("d2"));
    }

    #[test]
    fn create_clears_previous_attempt() {
        let mut ctx = CheckoutContext {
            checkout_id: Some("old".into()),
            payment_id: Some("old".into()),
            error: Some("declined".into()),
            ..loaded()
        };
        apply_context(
            &mut ctx,
            CheckoutEvent::CreateCheckout { amount_cents: 900, order_id: Some("o1".into()) },
        );
        assert_eq!(ctx.amount_cents, Some(900));
        assert_eq!(ctx.order_id.as_deref(), Some("o1"));
        assert!(ctx.checkout_id.is_none());
        assert!(ctx.payment_id.is_none());
        assert!(ctx.error.is_none());
    }
}
