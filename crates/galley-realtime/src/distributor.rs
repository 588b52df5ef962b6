//! Batched fan-out of inbound events.
//!
//! [`EventDistributor::emit`] only appends to a pending batch. The first
//! emit into an empty batch schedules one flush after the batch window;
//! the flush hands the whole batch to every subscriber in a single
//! synchronous pass under a delivery lock, so batches never interleave and
//! each subscriber sees events in emit order.
//!
//! Subscribers are isolated from each other: a panicking callback is caught,
//! logged, and skipped. The registry may be changed from inside a callback.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use galley_core::InboundEvent;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::config::DEFAULT_BATCH_WINDOW;

/// One flushed batch, shared by every subscriber.
pub type EventBatch = Arc<[InboundEvent]>;

type Callback = Arc<dyn Fn(&EventBatch) + Send + Sync>;

struct Entry {
    id: String,
    token: u64,
    callback: Callback,
}

#[derive(Default)]
struct Pending {
    events: Vec<InboundEvent>,
    flush_scheduled: bool,
}

struct Shared {
    window: Duration,
    subscribers: Mutex<Vec<Entry>>,
    pending: Mutex<Pending>,
    delivery: Mutex<()>,
    next_token: AtomicU64,
}

impl Shared {
    /// Callback currently registered under `id`.
    fn callback_for(&self, id: &str) -> Option<Callback> {
        self.subscribers
            .lock()
            .iter()
            .find(|e| e.id == id)
            .map(|e| Arc::clone(&e.callback))
    }

    fn is_registered(&self, token: u64) -> bool {
        self.subscribers.lock().iter().any(|e| e.token == token)
    }

    fn remove_token(&self, token: u64) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|e| e.token != token);
        subs.len() != before
    }

    fn flush(&self) {
        let _delivering = self.delivery.lock();

        let batch: EventBatch = {
            let mut pending = self.pending.lock();
            pending.flush_scheduled = false;
            std::mem::take(&mut pending.events).into()
        };
        if batch.is_empty() {
            return;
        }

        let recipients: Vec<String> = self
            .subscribers
            .lock()
            .iter()
            .map(|e| e.id.clone())
            .collect();
        debug!(
            batch_size = batch.len(),
            subscribers = recipients.len(),
            "flushing event batch"
        );

        for id in recipients {
            // Resolved per delivery: an earlier callback in this pass may have
            // removed or replaced this subscriber.
            let Some(callback) = self.callback_for(&id) else {
                continue;
            };
            let delivered = catch_unwind(AssertUnwindSafe(|| callback(&batch)));
            if let Err(panic) = delivered {
                error!(
                    subscriber = %id,
                    panic = panic_message(panic.as_ref()),
                    "subscriber panicked during delivery"
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

/// Coalesces inbound events and delivers each batch once to every subscriber.
///
/// Cheap to clone; clones share the registry and pending batch.
#[derive(Clone)]
pub struct EventDistributor {
    shared: Arc<Shared>,
}

impl Default for EventDistributor {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_WINDOW)
    }
}

impl EventDistributor {
    /// Distributor that coalesces events over `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                window,
                subscribers: Mutex::new(Vec::new()),
                pending: Mutex::new(Pending::default()),
                delivery: Mutex::new(()),
                next_token: AtomicU64::new(1),
            }),
        }
    }

    /// Batch window.
    pub fn window(&self) -> Duration {
        self.shared.window
    }

    /// Append an event to the pending batch.
    ///
    /// Never delivers inline. Must be called inside a tokio runtime for the
    /// flush to be scheduled; otherwise the event waits for the next emit
    /// that is.
    pub fn emit(&self, event: InboundEvent) {
        let runtime = tokio::runtime::Handle::try_current();
        let schedule = {
            let mut pending = self.shared.pending.lock();
            pending.events.push(event);
            let schedule = !pending.flush_scheduled && runtime.is_ok();
            if schedule {
                pending.flush_scheduled = true;
            }
            schedule
        };
        match runtime {
            Ok(handle) if schedule => {
                let shared = Arc::clone(&self.shared);
                let _ = handle.spawn(async move {
                    tokio::time::sleep(shared.window).await;
                    shared.flush();
                });
            }
            Ok(_) => {}
            Err(_) => warn!("emit outside a tokio runtime, batch flush deferred"),
        }
    }

    /// Register `callback` under `id`.
    ///
    /// An existing registration with the same id is replaced; its handle no
    /// longer has any effect.
    pub fn subscribe<F>(&self, id: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&[InboundEvent]) + Send + Sync + 'static,
    {
        self.register(id.into(), Arc::new(move |batch: &EventBatch| callback(batch)))
    }

    /// Register a channel that receives every batch.
    ///
    /// The subscription stays registered while the handle is alive, even if
    /// the receiver is dropped.
    pub fn subscribe_channel(
        &self,
        id: impl Into<String>,
    ) -> (Subscription, mpsc::UnboundedReceiver<EventBatch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.register(
            id.into(),
            Arc::new(move |batch: &EventBatch| {
                let _ = tx.send(Arc::clone(batch));
            }),
        );
        (subscription, rx)
    }

    fn register(&self, id: String, callback: Callback) -> Subscription {
        let token = self.shared.next_token.fetch_add(1, Ordering::Relaxed);
        {
            let mut subs = self.shared.subscribers.lock();
            if let Some(existing) = subs.iter_mut().find(|e| e.id == id) {
                debug!(subscriber = %id, "replacing subscriber");
                existing.token = token;
                existing.callback = callback;
            } else {
                subs.push(Entry {
                    id: id.clone(),
                    token,
                    callback,
                });
            }
        }
        Subscription {
            id,
            token,
            registry: Arc::downgrade(&self.shared),
        }
    }

    /// Remove the subscriber registered under `id`. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: &str) {
        self.shared.subscribers.lock().retain(|e| e.id != id);
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().len()
    }

    /// Events waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.shared.pending.lock().events.len()
    }
}

/// Handle to one registration. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: String,
    token: u64,
    registry: Weak<Shared>,
}

impl Subscription {
    /// Subscriber id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether this registration is still the live one for its id.
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|shared| shared.is_registered(self.token))
    }

    /// Remove this registration. Safe to call repeatedly.
    pub fn unsubscribe(&self) {
        if let Some(shared) = self.registry.upgrade() {
            if shared.remove_token(self.token) {
                debug!(subscriber = %self.id, "unsubscribed");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
