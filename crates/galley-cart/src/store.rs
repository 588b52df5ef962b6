//! Shared cart store: reducer, persistence, and event-driven invalidation.

use std::sync::atomic::{AtomicU64, Ordering};

use galley_core::InboundEvent;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::reducer::{Transition, reduce};
use crate::state::{CartAction, CartSnapshot, CartState, HydrationTicket, InvalidationReason};
use crate::storage::{CartStorage, StorageError};

/// Thread-safe cart backed by a [`CartStorage`].
///
/// Every applied action that changes the persisted fields is saved under the
/// store's key before [`dispatch`](Self::dispatch) returns. Save failures are
/// logged and do not roll the state back.
pub struct CartStore<S> {
    state: Mutex<CartState>,
    storage: S,
    key: String,
    dropped: AtomicU64,
}

impl<S: CartStorage> CartStore<S> {
    /// Empty cart persisted under `key`.
    pub fn new(storage: S, key: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(CartState::default()),
            storage,
            key: key.into(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Empty cart already bound to a restaurant.
    pub fn for_restaurant(
        storage: S,
        key: impl Into<String>,
        restaurant_id: Option<String>,
    ) -> Self {
        let store = Self::new(storage, key);
        store.state.lock().restaurant_id = restaurant_id;
        store
    }

    /// Copy of the current state.
    pub fn state(&self) -> CartState {
        self.state.lock().clone()
    }

    /// Storage key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Backing storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Actions ignored as invalid so far.
    pub fn dropped_actions(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Apply `action`. Returns whether it applied.
    pub fn dispatch(&self, action: CartAction) -> bool {
        let mut state = self.state.lock();
        let name = action.name();
        match reduce(&state, action) {
            Transition::Applied {
                state: next,
                persist,
            } => {
                debug!(
                    action = name,
                    revision = next.revision,
                    status = ?next.status,
                    items = next.items.len(),
                    "cart action applied"
                );
                *state = next;
                if persist {
                    if let Err(e) = self.storage.save(&self.key, &state.to_snapshot()) {
                        warn!(key = %self.key, error = %e, "failed to persist cart");
                    }
                }
                true
            }
            Transition::Ignored { reason } => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(action = name, reason, dropped, "ignoring cart action");
                false
            }
        }
    }

    /// Start a hydration and return its ticket.
    pub fn begin_hydration(&self) -> HydrationTicket {
        let mut state = self.state.lock();
        let ticket = HydrationTicket {
            revision: state.revision,
        };
        if let Transition::Applied { state: next, .. } =
            reduce(&state, CartAction::BeginHydration)
        {
            *state = next;
        }
        ticket
    }

    /// Finish a hydration with what storage returned. Returns whether the
    /// loaded snapshot was applied; a stale ticket discards it.
    pub fn complete_hydration(
        &self,
        ticket: HydrationTicket,
        loaded: Result<Option<CartSnapshot>, StorageError>,
    ) -> bool {
        let action = match loaded {
            Ok(Some(snapshot)) => CartAction::Hydrated { ticket, snapshot },
            Ok(None) => {
                debug!(key = %self.key, "no stored cart");
                CartAction::HydrationFailed { ticket }
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "failed to load stored cart");
                CartAction::HydrationFailed { ticket }
            }
        };
        let hydrated = matches!(action, CartAction::Hydrated { .. });
        self.dispatch(action) && hydrated
    }

    /// Load the stored snapshot.
    pub fn hydrate(&self) -> bool {
        let ticket = self.begin_hydration();
        let loaded = self.storage.load(&self.key);
        self.complete_hydration(ticket, loaded)
    }

    /// Apply the invalidations carried by a batch of backend events.
    pub fn handle_events(&self, events: &[InboundEvent]) {
        for event in events {
            let current = self.state.lock().restaurant_id.clone();
            if let Some(reason) = invalidation_for(event, current.as_deref()) {
                info!(reason = reason.as_str(), "invalidating cart");
                let _ = self.dispatch(CartAction::Invalidate { reason });
            }
        }
    }
}

impl<S> std::fmt::Debug for CartStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore")
            .field("key", &self.key)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

/// Invalidation implied by `event` for a cart bound to `restaurant_id`.
///
/// - `menu_updated` for this restaurant (or unscoped)
/// - `cart_invalidated`
/// - `restaurant_changed` naming another restaurant
pub fn invalidation_for(
    event: &InboundEvent,
    restaurant_id: Option<&str>,
) -> Option<InvalidationReason> {
    let InboundEvent::Other {
        event_type,
        payload,
    } = event
    else {
        return None;
    };
    let scoped = payload
        .get("restaurantId")
        .or_else(|| payload.get("restaurant_id"))
        .and_then(Value::as_str);

    match event_type.as_str() {
        "menu_updated" => match (scoped, restaurant_id) {
            (Some(theirs), Some(ours)) if theirs != ours => None,
            _ => Some(InvalidationReason::MenuUpdated),
        },
        "cart_invalidated" => Some(InvalidationReason::Remote),
        "restaurant_changed" => match scoped {
            Some(theirs) if Some(theirs) != restaurant_id => {
                Some(InvalidationReason::RestaurantMismatch {
                    restaurant_id: theirs.to_string(),
                })
            }
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CartItem, CartStatus};
    use crate::storage::MemoryStorage;
    use serde_json::json;

    const KEY: &str = "galley-cart";

    fn other(event_type: &str, payload: Value) -> InboundEvent {
        InboundEvent::Other {
            event_type: event_type.into(),
            payload,
        }
    }

    fn add(store: &CartStore<MemoryStorage>, id: &str, qty: u32) -> bool {
        store.dispatch(CartAction::AddItem {
            item: CartItem::new(id, id, 100, qty),
        })
    }

    #[test]
    fn edits_are_persisted() {
        let store = CartStore::new(MemoryStorage::new(), KEY);
        assert!(add(&store, "a", 2));
        assert!(store.dispatch(CartAction::SetTip { tip_cents: 75 }));
        let saved = store.storage().load(KEY).unwrap().unwrap();
        assert_eq!(saved.items.len(), 1);
        assert_eq!(saved.tip, 75);
    }

    #[test]
    fn hydrate_restores_previous_session() {
        let storage = MemoryStorage::new();
        storage
            .save(
                KEY,
                &CartSnapshot {
                    items: vec![CartItem::new("a", "A", 100, 1)],
                    restaurant_id: Some("r_1".into()),
                    tip: 10,
                },
            )
            .unwrap();
        let store = CartStore::for_restaurant(storage, KEY, Some("r_1".into()));
        assert!(store.hydrate());
        let state = store.state();
        assert_eq!(state.status, CartStatus::Ready);
        assert_eq!(state.tip_cents, 10);
    }

    #[test]
    fn hydrate_without_snapshot_settles_empty() {
        let store = CartStore::new(MemoryStorage::new(), KEY);
        assert!(!store.hydrate());
        assert_eq!(store.state().status, CartStatus::Empty);
        assert_eq!(store.dropped_actions(), 0);
    }

    #[test]
    fn corrupt_snapshot_does_not_block_the_cart() {
        let storage = MemoryStorage::new();
        storage.insert_raw(KEY, "not json");
        let store = CartStore::new(storage, KEY);
        assert!(!store.hydrate());
        assert_eq!(store.state().status, CartStatus::Empty);
        assert!(add(&store, "a", 1));
    }

    #[test]
    fn invalidation_during_hydration_wins() {
        let storage = MemoryStorage::new();
        storage
            .save(
                KEY,
                &CartSnapshot {
                    items: vec![CartItem::new("old", "Old", 100, 1)],
                    ..CartSnapshot::default()
                },
            )
            .unwrap();
        let store = CartStore::new(storage, KEY);

        let ticket = store.begin_hydration();
        let loaded = store.storage().load(KEY);
        store.handle_events(&[other("cart_invalidated", json!({}))]);
        assert!(!store.complete_hydration(ticket, loaded));

        let state = store.state();
        assert!(state.items.is_empty());
        assert_eq!(state.status, CartStatus::Empty);
        assert_eq!(store.dropped_actions(), 1);
        // The invalidation overwrote the stored snapshot too.
        assert!(store.storage().load(KEY).unwrap().unwrap().items.is_empty());
    }

    #[test]
    fn menu_updates_for_other_restaurants_are_ignored() {
        let store = CartStore::for_restaurant(MemoryStorage::new(), KEY, Some("r_1".into()));
        assert!(add(&store, "a", 1));
        store.handle_events(&[
            other("menu_updated", json!({"restaurantId": "r_2"})),
            InboundEvent::OrderDeleted { order_id: "o".into() },
        ]);
        assert_eq!(store.state().items.len(), 1);

        store.handle_events(&[other("menu_updated", json!({"restaurantId": "r_1"}))]);
        assert!(store.state().items.is_empty());
    }

    #[test]
    fn restaurant_change_rebinds_cart() {
        let store = CartStore::for_restaurant(MemoryStorage::new(), KEY, Some("r_1".into()));
        assert!(add(&store, "a", 1));
        store.handle_events(&[other("restaurant_changed", json!({"restaurantId": "r_1"}))]);
        assert_eq!(store.state().items.len(), 1);

        store.handle_events(&[other("restaurant_changed", json!({"restaurantId": "r_3"}))]);
        let state = store.state();
        assert!(state.items.is_empty());
        assert_eq!(state.restaurant_id.as_deref(), Some("r_3"));
    }

    #[test]
    fn invalid_actions_are_counted() {
        let store = CartStore::new(MemoryStorage::new(), KEY);
        assert!(!store.dispatch(CartAction::RemoveItem { item_id: "ghost".into() }));
        assert!(!add(&store, "a", 0));
        assert_eq!(store.dropped_actions(), 2);
        assert_eq!(store.state(), CartState::default());
        assert!(store.storage().raw(KEY).is_none());
    }
}
