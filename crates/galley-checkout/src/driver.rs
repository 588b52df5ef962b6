//! Task owning a [`CheckoutMachine`] and its timer channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use galley_core::InboundEvent;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::inbound::checkout_event;
use crate::machine::{CheckoutMachine, TimerFired};
use crate::table::next_state;
use crate::types::{CheckoutEvent, CheckoutSnapshot, CheckoutTimeouts};

enum Command {
    Apply(CheckoutEvent),
    Inbound(InboundEvent),
}

/// Cloneable handle to a running checkout driver.
#[derive(Clone)]
pub struct CheckoutHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<CheckoutSnapshot>,
    dropped: Arc<AtomicU64>,
}

impl CheckoutHandle {
    /// Queue `event`. Returns `false` once the driver has stopped.
    pub fn send(&self, event: CheckoutEvent) -> bool {
        self.commands.send(Command::Apply(event)).is_ok()
    }

    /// Queue a backend event; it is applied only if it maps to the
    /// checkout in progress.
    pub fn feed(&self, event: InboundEvent) -> bool {
        self.commands.send(Command::Inbound(event)).is_ok()
    }

    /// Latest published state and context.
    pub fn snapshot(&self) -> CheckoutSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver updated after every applied transition.
    pub fn watch(&self) -> watch::Receiver<CheckoutSnapshot> {
        self.snapshots.clone()
    }

    /// Whether `event` would apply to the latest published snapshot.
    pub fn can_transition(&self, event: &CheckoutEvent) -> bool {
        let snap = self.snapshots.borrow();
        next_state(snap.state, &snap.context, event).is_some()
    }

    /// Invalid events dropped so far.
    pub fn dropped_transitions(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for CheckoutHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutHandle")
            .field("state", &self.snapshots.borrow().state)
            .finish_non_exhaustive()
    }
}

/// Applies commands and fired timers to one machine, in arrival order.
pub struct CheckoutDriver {
    machine: CheckoutMachine,
    timers: mpsc::UnboundedReceiver<TimerFired>,
    commands: mpsc::UnboundedReceiver<Command>,
    dropped: Arc<AtomicU64>,
    shutdown: CancellationToken,
}

impl CheckoutDriver {
    /// Spawn a driver on the current runtime. It stops when `shutdown` is
    /// cancelled or every handle is dropped.
    pub fn spawn(
        timeouts: CheckoutTimeouts,
        shutdown: CancellationToken,
    ) -> (CheckoutHandle, JoinHandle<CheckoutSnapshot>) {
        let (mut machine, timers) = CheckoutMachine::new(timeouts);
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (snap_tx, snapshots) = watch::channel(machine.snapshot());
        let _ = machine.subscribe(move |snap| {
            let _ = snap_tx.send_replace(snap.clone());
        });
        let dropped = Arc::new(AtomicU64::new(0));

        let driver = Self {
            machine,
            timers,
            commands,
            dropped: Arc::clone(&dropped),
            shutdown,
        };
        let handle = CheckoutHandle {
            commands: commands_tx,
            snapshots,
            dropped,
        };
        (handle, tokio::spawn(driver.run()))
    }

    async fn run(mut self) -> CheckoutSnapshot {
        debug!("checkout driver started");
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Apply(event)) => {
                        let _ = self.machine.transition(event);
                    }
                    Some(Command::Inbound(event)) => {
                        if let Some(mapped) = checkout_event(&event, self.machine.context()) {
                            let _ = self.machine.transition(mapped);
                        }
                    }
                    None => break,
                },
                Some(fired) = self.timers.recv() => {
                    let _ = self.machine.on_timer(fired);
                }
            }
            self.dropped
                .store(self.machine.dropped_transitions(), Ordering::Relaxed);
        }
        let last = self.machine.snapshot();
        info!(state = %last.state, "checkout driver stopped");
        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CheckoutState, Device};
    use serde_json::json;
    use std::time::Duration;

    async fn settle(handle: &CheckoutHandle, state: CheckoutState) {
        let mut rx = handle.watch();
        tokio::time::timeout(Duration::from_secs(600), rx.wait_for(|s| s.state == state))
            .await
            .unwrap()
            .unwrap();
    }

    fn start(handle: &CheckoutHandle) {
        assert!(handle.send(CheckoutEvent::LoadDevices));
        assert!(handle.send(CheckoutEvent::DevicesLoaded {
            devices: vec![Device::new("d1", "Counter")],
        }));
        assert!(handle.send(CheckoutEvent::SelectDevice { device_id: "d1".into() }));
        assert!(handle.send(CheckoutEvent::CreateCheckout {
            amount_cents: 2400,
            order_id: Some("o7".into()),
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn drives_to_completion_from_backend_events() {
        let (handle, task) =
            CheckoutDriver::spawn(CheckoutTimeouts::default(), CancellationToken::new());
        start(&handle);
        settle(&handle, CheckoutState::CreatingCheckout).await;

        assert!(handle.feed(InboundEvent::Other {
            event_type: "checkout_created".into(),
            payload: json!({"checkoutId": "c1"}),
        }));
        settle(&handle, CheckoutState::Polling).await;
        assert!(handle.can_transition(&CheckoutEvent::Cancel));

        assert!(handle.feed(InboundEvent::Other {
            event_type: "checkout_completed".into(),
            payload: json!({"checkoutId": "c1", "paymentId": "p1"}),
        }));
        settle(&handle, CheckoutState::Completed).await;
        assert_eq!(handle.snapshot().context.payment_id.as_deref(), Some("p1"));

        drop(handle);
        let last = task.await.unwrap();
        assert_eq!(last.state, CheckoutState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn creating_times_out() {
        let timeouts = CheckoutTimeouts {
            creating: Duration::from_secs(3),
            polling: Duration::from_secs(30),
        };
        let (handle, _task) = CheckoutDriver::spawn(timeouts, CancellationToken::new());
        start(&handle);
        settle(&handle, CheckoutState::Timeout).await;
        assert_eq!(
            handle.snapshot().context.error.as_deref(),
            Some("checkout timed out")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_events_are_counted() {
        let (handle, _task) =
            CheckoutDriver::spawn(CheckoutTimeouts::default(), CancellationToken::new());
        assert!(handle.send(CheckoutEvent::Cancel));
        assert!(handle.send(CheckoutEvent::Timeout));
        assert!(handle.send(CheckoutEvent::LoadDevices));
        settle(&handle, CheckoutState::LoadingDevices).await;
        assert_eq!(handle.dropped_transitions(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_driver() {
        let shutdown = CancellationToken::new();
        let (handle, task) = CheckoutDriver::spawn(CheckoutTimeouts::default(), shutdown.clone());
        shutdown.cancel();
        let last = task.await.unwrap();
        assert_eq!(last.state, CheckoutState::Idle);
        assert!(!handle.send(CheckoutEvent::LoadDevices));
    }
}
