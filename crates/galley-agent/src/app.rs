//! Wiring of the realtime client and its consumers.

use std::sync::Arc;

use anyhow::{Context, Result};
use galley_cart::{CartStorage, CartStore};
use galley_checkout::{CheckoutDriver, CheckoutHandle, CheckoutSnapshot, CheckoutTimeouts};
use galley_core::{ConnectionState, InboundEvent};
use galley_realtime::{RealtimeClient, RealtimeClientBuilder, Subscription};
use galley_settings::GalleySettings;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cart store as wired by the agent.
pub type SharedCart = Arc<CartStore<Arc<dyn CartStorage>>>;

/// Running agent.
pub struct App {
    client: RealtimeClient,
    cart: SharedCart,
    checkout: CheckoutHandle,
    checkout_task: JoinHandle<CheckoutSnapshot>,
    state_task: JoinHandle<()>,
    shutdown: CancellationToken,
    _subscriptions: Vec<Subscription>,
}

impl App {
    /// Hydrate the cart, start the checkout driver, spawn the client, and
    /// subscribe the consumers. Does not connect.
    pub fn start(
        settings: &GalleySettings,
        client: RealtimeClientBuilder,
        storage: Arc<dyn CartStorage>,
    ) -> Result<Self> {
        let cart: SharedCart = Arc::new(CartStore::for_restaurant(
            storage,
            settings.cart.storage_key.clone(),
            settings.restaurant_id.clone(),
        ));
        let restored = cart.hydrate();
        let state = cart.state();
        info!(restored, items = state.items.len(), status = ?state.status, "cart ready");

        let shutdown = CancellationToken::new();
        let timeouts = CheckoutTimeouts {
            creating: settings.checkout.creating_timeout(),
            polling: settings.checkout.polling_timeout(),
        };
        let (checkout, checkout_task) = CheckoutDriver::spawn(timeouts, shutdown.child_token());

        let client = client.spawn().context("failed to start realtime client")?;

        let subscriptions = vec![
            client.subscribe("event-log", log_batch),
            client.subscribe("cart", {
                let cart = Arc::clone(&cart);
                move |events: &[InboundEvent]| cart.handle_events(events)
            }),
            client.subscribe("checkout", {
                let checkout = checkout.clone();
                move |events: &[InboundEvent]| {
                    for event in events {
                        let _ = checkout.feed(event.clone());
                    }
                }
            }),
        ];

        let state_task = tokio::spawn(watch_connection(client.clone(), shutdown.child_token()));

        Ok(Self {
            client,
            cart,
            checkout,
            checkout_task,
            state_task,
            shutdown,
            _subscriptions: subscriptions,
        })
    }

    /// Open the connection. A failed first attempt is logged; retries
    /// continue in the background.
    pub async fn connect(&self) {
        match self.client.connect().await {
            Ok(()) => info!("realtime connected"),
            Err(e) => warn!(error = %e, "initial connect failed, retrying in background"),
        }
    }

    /// Close the connection, stop the driver tasks, and log final state.
    pub async fn shutdown(self) {
        self.client.disconnect().await;
        self.client.shutdown().await;
        self.shutdown.cancel();
        let _ = self.state_task.await;
        match self.checkout_task.await {
            Ok(last) => debug!(state = %last.state, "checkout stopped"),
            Err(e) => warn!(error = %e, "checkout task failed"),
        }
        let cart = self.cart.state();
        info!(
            items = cart.items.len(),
            total_cents = cart.total_cents(),
            "agent stopped"
        );
    }
}

fn log_batch(events: &[InboundEvent]) {
    debug!(count = events.len(), "event batch");
    for event in events {
        match event {
            InboundEvent::OrderStatusChanged {
                order_id,
                previous_status,
                new_status,
                ..
            } => info!(
                order_id = %order_id,
                from = ?previous_status,
                to = ?new_status,
                "order status changed"
            ),
            InboundEvent::HeartbeatPong => {}
            other => info!(
                event = other.event_type(),
                order_id = other.order_id().unwrap_or("-"),
                "event"
            ),
        }
    }
}

async fn watch_connection(client: RealtimeClient, stop: CancellationToken) {
    let mut rx = client.watch_state();
    let mut last = rx.borrow().state;
    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = rx.borrow_and_update().clone();
                if snap.state == last {
                    continue;
                }
                last = snap.state;
                match snap.state {
                    ConnectionState::Reconnecting => warn!(
                        attempt = snap.attempt,
                        max_attempts = snap.max_attempts,
                        next_delay_ms = ?snap.next_delay_ms,
                        "realtime reconnecting"
                    ),
                    ConnectionState::Error => warn!(
                        error = snap.last_error.as_deref().unwrap_or("unknown"),
                        "realtime connection failed"
                    ),
                    state => info!(state = ?state, "realtime state"),
                }
            }
        }
    }
}
