//! The checkout machine and the handles it owns.
//!
//! `creating_checkout` and `polling` each start an operation: a
//! [`CancellationToken`] for the work running against the terminal and a
//! timer task that reports back through the machine's timer channel. Timers
//! are tagged with the operation epoch, so a timer that fires after its
//! operation was replaced or released is ignored.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::table::{apply_context, next_state};
use crate::types::{
    CheckoutContext, CheckoutEvent, CheckoutSnapshot, CheckoutState, CheckoutTimeouts,
};

/// Callback invoked after each applied transition.
pub type Listener = Arc<dyn Fn(&CheckoutSnapshot) + Send + Sync>;

/// Identifies a registered listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A timer reporting that an operation ran out of time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerFired {
    epoch: u64,
}

impl TimerFired {
    /// Operation the timer belonged to.
    pub fn epoch(self) -> u64 {
        self.epoch
    }
}

struct Operation {
    epoch: u64,
    cancel: CancellationToken,
    timer: Option<AbortHandle>,
}

impl Operation {
    fn release(self) {
        self.cancel.cancel();
        if let Some(timer) = self.timer {
            timer.abort();
        }
    }
}

/// Terminal checkout state machine.
///
/// Invalid `(state, event)` pairs are no-ops: they return `false`, log at
/// debug, and bump [`dropped_transitions`](Self::dropped_transitions).
pub struct CheckoutMachine {
    state: CheckoutState,
    context: CheckoutContext,
    timeouts: CheckoutTimeouts,
    operation: Option<Operation>,
    epoch: u64,
    timer_tx: mpsc::UnboundedSender<TimerFired>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
    dropped: u64,
}

impl CheckoutMachine {
    /// New machine in `idle`, plus the receiver its timers report on.
    pub fn new(timeouts: CheckoutTimeouts) -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let machine = Self {
            state: CheckoutState::Idle,
            context: CheckoutContext::default(),
            timeouts,
            operation: None,
            epoch: 0,
            timer_tx,
            listeners: Vec::new(),
            next_listener: 0,
            dropped: 0,
        };
        (machine, timer_rx)
    }

    /// Current state.
    pub fn state(&self) -> CheckoutState {
        self.state
    }

    /// Current context.
    pub fn context(&self) -> &CheckoutContext {
        &self.context
    }

    /// Owned copy of state and context.
    pub fn snapshot(&self) -> CheckoutSnapshot {
        CheckoutSnapshot {
            state: self.state,
            context: self.context.clone(),
        }
    }

    /// Number of events ignored as invalid.
    pub fn dropped_transitions(&self) -> u64 {
        self.dropped
    }

    /// Whether an operation's handles are currently held.
    pub fn has_operation(&self) -> bool {
        self.operation.is_some()
    }

    /// Token for the running operation. Work against the terminal should
    /// stop once it is cancelled.
    pub fn cancellation_token(&self) -> Option<CancellationToken> {
        self.operation.as_ref().map(|op| op.cancel.clone())
    }

    /// Whether `event` would be applied. No side effects.
    pub fn can_transition(&self, event: &CheckoutEvent) -> bool {
        next_state(self.state, &self.context, event).is_some()
    }

    /// Apply `event`. Returns `false` when it is not valid in the current state.
    pub fn transition(&mut self, event: CheckoutEvent) -> bool {
        let Some(next) = next_state(self.state, &self.context, &event) else {
            self.dropped += 1;
            debug!(
                state = %self.state,
                event = event.name(),
                dropped = self.dropped,
                "ignoring invalid checkout transition"
            );
            return false;
        };

        if event.releases_operation() {
            self.release_operation();
        }
        let from = self.state;
        let name = event.name();
        apply_context(&mut self.context, event);
        self.state = next;
        if next != from {
            if let Some(limit) = self.timeouts.for_state(next) {
                self.begin_operation(limit);
            }
        }
        debug!(%from, to = %next, event = name, "checkout transition");

        let snapshot = self.snapshot();
        for (_, listener) in &self.listeners {
            listener(&snapshot);
        }
        true
    }

    /// Feed a fired timer back in. Stale timers are ignored.
    pub fn on_timer(&mut self, fired: TimerFired) -> bool {
        let current = self.operation.as_ref().map(|op| op.epoch);
        if current != Some(fired.epoch) {
            debug!(epoch = fired.epoch, ?current, "ignoring stale checkout timer");
            return false;
        }
        self.transition(CheckoutEvent::Timeout)
    }

    /// Register a listener for applied transitions.
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&CheckoutSnapshot) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    fn begin_operation(&mut self, limit: Duration) {
        self.release_operation();
        self.epoch += 1;
        let epoch = self.epoch;
        let cancel = CancellationToken::new();

        let timer = match Handle::try_current() {
            Ok(rt) => {
                let tx = self.timer_tx.clone();
                let token = cancel.clone();
                let task = rt.spawn(async move {
                    tokio::select! {
                        () = tokio::time::sleep(limit) => {
                            let _ = tx.send(TimerFired { epoch });
                        }
                        () = token.cancelled() => {}
                    }
                });
                Some(task.abort_handle())
            }
            Err(_) => {
                warn!(state = %self.state, "no tokio runtime, checkout timeout disabled");
                None
            }
        };
        debug!(
            epoch,
            limit_ms = limit.as_millis(),
            state = %self.state,
            "checkout operation started"
        );
        self.operation = Some(Operation {
            epoch,
            cancel,
            timer,
        });
    }

    fn release_operation(&mut self) {
        if let Some(op) = self.operation.take() {
            debug!(epoch = op.epoch, "checkout operation released");
            op.release();
        }
    }
}

impl Drop for CheckoutMachine {
    fn drop(&mut self) {
        self.release_operation();
    }
}

impl std::fmt::Debug for CheckoutMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutMachine")
            .field("state", &self.state)
            .field("context", &self.context)
            .field("epoch", &self.epoch)
            .field("has_operation", &self.operation.is_some())
            .field("listeners", &self.listeners.len())
            .field("dropped", &self.dropped)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Device;
    use std::sync::Mutex;

    type Recorder = Arc<Mutex<Vec<CheckoutState>>>;

    fn timeouts() -> CheckoutTimeouts {
        CheckoutTimeouts {
            creating: Duration::from_secs(5),
            polling: Duration::from_secs(60),
        }
    }

    fn to_devices_loaded(m: &mut CheckoutMachine) {
        assert!(m.transition(CheckoutEvent::LoadDevices));
        assert!(m.transition(CheckoutEvent::DevicesLoaded {
            devices: vec![Device::new("d1", "Counter")],
        }));
        assert!(m.transition(CheckoutEvent::SelectDevice { device_id: "d1".into() }));
    }

    fn to_polling(m: &mut CheckoutMachine) {
        to_devices_loaded(m);
        assert!(m.transition(CheckoutEvent::CreateCheckout {
            amount_cents: 1500,
            order_id: Some("o1".into()),
        }));
        assert!(m.transition(CheckoutEvent::CheckoutCreated { checkout_id: "c1".into() }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_from_polling_clears_both_handles() {
        let (mut m, mut timers) = CheckoutMachine::new(timeouts());
        to_polling(&mut m);
        assert_eq!(m.state(), CheckoutState::Polling);
        let token = m.cancellation_token().unwrap();

        assert!(m.transition(CheckoutEvent::Cancel));
        assert_eq!(m.state(), CheckoutState::Cancelled);
        assert!(!m.has_operation());
        assert!(token.is_cancelled());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(timers.try_recv().is_err());

        assert!(m.transition(CheckoutEvent::Reset));
        assert!(!m.has_operation());
        assert_eq!(m.snapshot(), CheckoutSnapshot::default());
    }

    #[tokio::test(start_paused = true)]
    async fn polling_timer_fires_timeout() {
        let (mut m, mut timers) = CheckoutMachine::new(timeouts());
        to_polling(&mut m);

        tokio::time::sleep(Duration::from_secs(61)).await;
        let fired = timers.recv().await.unwrap();
        assert!(m.on_timer(fired));
        assert_eq!(m.state(), CheckoutState::Timeout);
        assert_eq!(m.context().error.as_deref(), Some("checkout timed out"));
        assert!(!m.has_operation());
    }

    #[tokio::test(start_paused = true)]
    async fn entering_polling_replaces_creating_handles() {
        let (mut m, mut timers) = CheckoutMachine::new(timeouts());
        to_devices_loaded(&mut m);
        assert!(m.transition(CheckoutEvent::CreateCheckout {
            amount_cents: 100,
            order_id: None,
        }));
        let creating = m.cancellation_token().unwrap();
        assert!(m.transition(CheckoutEvent::CheckoutCreated { checkout_id: "c".into() }));
        assert!(creating.is_cancelled());
        let polling = m.cancellation_token().unwrap();
        assert!(!polling.is_cancelled());

        // The 5s creating timer was aborted; nothing fires before the 60s one.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(timers.try_recv().is_err());
        assert_eq!(m.state(), CheckoutState::Polling);
    }

    #[tokio::test(start_paused = true)]
    async fn completing_keeps_the_polling_timer() {
        let (mut m, mut timers) = CheckoutMachine::new(timeouts());
        to_polling(&mut m);
        assert!(m.transition(CheckoutEvent::PaymentCaptured { payment_id: "p1".into() }));
        assert!(m.has_operation());

        tokio::time::sleep(Duration::from_secs(61)).await;
        let fired = timers.recv().await.unwrap();
        assert!(m.on_timer(fired));
        assert_eq!(m.state(), CheckoutState::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_timer_is_ignored() {
        let (mut m, _timers) = CheckoutMachine::new(timeouts());
        to_polling(&mut m);
        let stale = TimerFired { epoch: 1 };
        assert!(!m.on_timer(stale));
        assert_eq!(m.state(), CheckoutState::Polling);
        assert_eq!(m.dropped_transitions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn listeners_see_applied_transitions_only() {
        let (mut m, _timers) = CheckoutMachine::new(timeouts());
        let rec = Recorder::default();
        let sink = Arc::clone(&rec);
        let id = m.subscribe(move |s| sink.lock().unwrap().push(s.state));

        assert!(!m.transition(CheckoutEvent::Cancel));
        assert!(m.transition(CheckoutEvent::LoadDevices));
        assert!(!m.transition(CheckoutEvent::LoadDevices));
        assert!(m.transition(CheckoutEvent::DevicesFailed { error: "offline".into() }));
        assert_eq!(
            *rec.lock().unwrap(),
            vec![CheckoutState::LoadingDevices, CheckoutState::Failed]
        );
        assert_eq!(m.dropped_transitions(), 2);

        assert!(m.unsubscribe(id));
        assert!(!m.unsubscribe(id));
        assert!(m.transition(CheckoutEvent::Reset));
        assert_eq!(rec.lock().unwrap().len(), 2);
    }

    #[test]
    fn can_transition_has_no_side_effects() {
        let (m, _timers) = CheckoutMachine::new(timeouts());
        assert!(m.can_transition(&CheckoutEvent::LoadDevices));
        assert!(!m.can_transition(&CheckoutEvent::Cancel));
        assert_eq!(m.state(), CheckoutState::Idle);
        assert_eq!(m.dropped_transitions(), 0);
    }

    #[test]
    fn without_runtime_operations_have_no_timer() {
        let (mut m, _timers) = CheckoutMachine::new(timeouts());
        to_polling(&mut m);
        assert!(m.has_operation());
        assert!(m.transition(CheckoutEvent::CheckoutFailed { error: "declined".into() }));
        assert!(!m.has_operation());
        assert_eq!(m.context().error.as_deref(), Some("declined"));
    }
}
