//! Property tests over arbitrary event sequences.

use galley_checkout::{CheckoutEvent, CheckoutMachine, CheckoutState, CheckoutTimeouts, Device};
use proptest::prelude::*;

fn device_id() -> impl Strategy<Value = String> {
    prop_oneof![Just("d1".to_string()), Just("d2".to_string()), Just("ghost".to_string())]
}

fn event() -> impl Strategy<Value = CheckoutEvent> {
    prop_oneof![
        Just(CheckoutEvent::LoadDevices),
        Just(CheckoutEvent::DevicesLoaded {
            devices: vec![Device::new("d1", "Counter"), Device::new("d2", "Patio")],
        }),
        Just(CheckoutEvent::DevicesFailed { error: "offline".into() }),
        device_id().prop_map(|device_id| CheckoutEvent::SelectDevice { device_id }),
        (0u64..5000).prop_map(|amount_cents| CheckoutEvent::CreateCheckout {
            amount_cents,
            order_id: None,
        }),
        Just(CheckoutEvent::CheckoutCreated { checkout_id: "c1".into() }),
        Just(CheckoutEvent::PaymentCaptured { payment_id: "p1".into() }),
        Just(CheckoutEvent::CheckoutCompleted { payment_id: "p1".into() }),
        Just(CheckoutEvent::CheckoutFailed { error: "declined".into() }),
        Just(CheckoutEvent::Cancel),
        Just(CheckoutEvent::Timeout),
        Just(CheckoutEvent::Reset),
    ]
}

proptest! {
    #[test]
    fn invalid_events_leave_machine_unchanged(events in prop::collection::vec(event(), 0..40)) {
        let (mut machine, _timers) = CheckoutMachine::new(CheckoutTimeouts::default());
        let mut rejected = 0;
        for ev in events {
            let before = machine.snapshot();
            let allowed = machine.can_transition(&ev);
            prop_assert_eq!(machine.snapshot(), before.clone());

            let applied = machine.transition(ev);
            prop_assert_eq!(applied, allowed);
            if !applied {
                rejected += 1;
                prop_assert_eq!(machine.snapshot(), before);
            }
            prop_assert_eq!(machine.dropped_transitions(), rejected);
        }
    }

    #[test]
    fn operation_handles_only_in_timed_states(events in prop::collection::vec(event(), 0..40)) {
        let (mut machine, _timers) = CheckoutMachine::new(CheckoutTimeouts::default());
        for ev in events {
            let _ = machine.transition(ev);
            let timed = matches!(
                machine.state(),
                CheckoutState::CreatingCheckout | CheckoutState::Polling | CheckoutState::Completing
            );
            prop_assert_eq!(machine.has_operation(), timed);
        }
    }
}
