//! Pure cart reducer.

use crate::state::{CartAction, CartState, CartStatus, HydrationTicket, InvalidationReason};

/// Outcome of [`reduce`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The action applied.
    Applied {
        /// State after the action.
        state: CartState,
        /// Whether the persisted snapshot changed.
        persist: bool,
    },
    /// The action does not fit the current state; nothing changed.
    Ignored {
        /// Why it was ignored.
        reason: &'static str,
    },
}

impl Transition {
    /// Whether the action applied.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Apply `action` to `state`.
pub fn reduce(state: &CartState, action: CartAction) -> Transition {
    let mut next = state.clone();
    let persist = match action {
        CartAction::BeginHydration => {
            next.status = CartStatus::Hydrating;
            next.pending_hydration = Some(HydrationTicket {
                revision: next.revision,
            });
            false
        }
        CartAction::Hydrated { ticket, snapshot } => {
            if let Err(reason) = check_ticket(state, ticket) {
                return Transition::Ignored { reason };
            }
            next.pending_hydration = None;
            let foreign = match (&state.restaurant_id, &snapshot.restaurant_id) {
                (Some(current), Some(stored)) => current != stored,
                (Some(_), None) => !snapshot.items.is_empty(),
                (None, _) => false,
            };
            if foreign {
                // Stored cart belongs elsewhere; start clean and overwrite it.
                next.items.clear();
                next.tip_cents = 0;
                next.status = CartStatus::Empty;
                return Transition::Applied {
                    state: next,
                    persist: true,
                };
            }
            next.items = snapshot.items.into_iter().filter(|i| i.quantity > 0).collect();
            next.tip_cents = snapshot.tip;
            if snapshot.restaurant_id.is_some() {
                next.restaurant_id = snapshot.restaurant_id;
            }
            settle(&mut next);
            false
        }
        CartAction::HydrationFailed { ticket } => {
            if state.pending_hydration != Some(ticket) {
                return Transition::Ignored {
                    reason: "no matching hydration in flight",
                };
            }
            next.pending_hydration = None;
            settle(&mut next);
            false
        }
        CartAction::AddItem { item } => {
            if item.quantity == 0 {
                return Transition::Ignored {
                    reason: "quantity must be positive",
                };
            }
            match next.position(&item.id) {
                Some(pos) => {
                    let line = &mut next.items[pos];
                    line.quantity = line.quantity.saturating_add(item.quantity);
                }
                None => next.items.push(item),
            }
            edited(&mut next)
        }
        CartAction::UpdateQuantity { item_id, quantity } => {
            let Some(pos) = next.position(&item_id) else {
                return Transition::Ignored {
                    reason: "unknown item",
                };
            };
            if quantity == 0 {
                let _ = next.items.remove(pos);
            } else {
                next.items[pos].quantity = quantity;
            }
            edited(&mut next)
        }
        CartAction::RemoveItem { item_id } => {
            let Some(pos) = next.position(&item_id) else {
                return Transition::Ignored {
                    reason: "unknown item",
                };
            };
            let _ = next.items.remove(pos);
            edited(&mut next)
        }
        CartAction::SetTip { tip_cents } => {
            next.tip_cents = tip_cents;
            edited(&mut next)
        }
        CartAction::SetRestaurant { restaurant_id } => {
            if restaurant_id == state.restaurant_id {
                return Transition::Ignored {
                    reason: "restaurant unchanged",
                };
            }
            if state.restaurant_id.is_some() {
                next.items.clear();
                next.tip_cents = 0;
            }
            next.restaurant_id = restaurant_id;
            edited(&mut next)
        }
        CartAction::Clear => {
            next.items.clear();
            next.tip_cents = 0;
            edited(&mut next)
        }
        CartAction::Invalidate { reason } => {
            next.items.clear();
            next.tip_cents = 0;
            if let InvalidationReason::RestaurantMismatch { restaurant_id } = reason {
                next.restaurant_id = Some(restaurant_id);
            }
            edited(&mut next)
        }
    };
    Transition::Applied {
        state: next,
        persist,
    }
}

fn check_ticket(state: &CartState, ticket: HydrationTicket) -> Result<(), &'static str> {
    if state.pending_hydration != Some(ticket) {
        return Err("no matching hydration in flight");
    }
    if ticket.revision != state.revision {
        return Err("cart changed since hydration started");
    }
    Ok(())
}

/// Local edit: supersedes any hydration in flight.
fn edited(state: &mut CartState) -> bool {
    state.revision += 1;
    state.pending_hydration = None;
    settle(state);
    true
}

fn settle(state: &mut CartState) {
    if state.pending_hydration.is_some() {
        state.status = CartStatus::Hydrating;
    } else if state.items.is_empty() {
        state.status = CartStatus::Empty;
    } else {
        state.status = CartStatus::Ready;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CartItem, CartSnapshot};
    use assert_matches::assert_matches;

    fn apply(state: &CartState, action: CartAction) -> CartState {
        match reduce(state, action) {
            Transition::Applied { state, .. } => state,
            Transition::Ignored { reason } => panic!("ignored: {reason}"),
        }
    }

    fn ticket_of(state: &CartState) -> HydrationTicket {
        state.pending_hydration.unwrap()
    }

    fn stored() -> CartSnapshot {
        CartSnapshot {
            items: vec![CartItem::new("pizza", "Pizza", 1500, 1)],
            restaurant_id: Some("r_1".into()),
            tip: 200,
        }
    }

    #[test]
    fn hydration_loads_snapshot() {
        let s = apply(&CartState::default(), CartAction::BeginHydration);
        assert_eq!(s.status, CartStatus::Hydrating);
        let t = ticket_of(&s);
        let s = apply(&s, CartAction::Hydrated { ticket: t, snapshot: stored() });
        assert_eq!(s.status, CartStatus::Ready);
        assert_eq!(s.items.len(), 1);
        assert_eq!(s.tip_cents, 200);
        assert_eq!(s.restaurant_id.as_deref(), Some("r_1"));
        assert!(s.pending_hydration.is_none());
        assert_eq!(s.revision, 0);
    }

    #[test]
    fn late_hydration_does_not_overwrite_invalidation() {
        let s = apply(&CartState::default(), CartAction::BeginHydration);
        let t = ticket_of(&s);
        let s = apply(&s, CartAction::Invalidate { reason: InvalidationReason::MenuUpdated });
        assert_eq!(s.revision, 1);
        assert_eq!(s.status, CartStatus::Empty);

        assert_matches!(
            reduce(&s, CartAction::Hydrated { ticket: t, snapshot: stored() }),
            Transition::Ignored { .. }
        );
    }

    #[test]
    fn late_hydration_does_not_overwrite_local_edit() {
        let s = apply(&CartState::default(), CartAction::BeginHydration);
        let t = ticket_of(&s);
        let s = apply(&s, CartAction::AddItem { item: CartItem::new("soda", "Soda", 250, 1) });
        assert_eq!(s.status, CartStatus::Ready);
        assert_matches!(
            reduce(&s, CartAction::Hydrated { ticket: t, snapshot: stored() }),
            Transition::Ignored { .. }
        );
        assert_matches!(
            reduce(&s, CartAction::HydrationFailed { ticket: t }),
            Transition::Ignored { .. }
        );
    }

    #[test]
    fn second_hydration_supersedes_first() {
        let s = apply(&CartState::default(), CartAction::BeginHydration);
        let first = ticket_of(&s);
        let s = apply(&s, CartAction::HydrationFailed { ticket: first });
        let s = apply(&s, CartAction::BeginHydration);
        let second = ticket_of(&s);
        // Same revision, so the tickets compare equal; the first was consumed.
        assert_eq!(first, second);
        let s = apply(&s, CartAction::Hydrated { ticket: second, snapshot: stored() });
        assert_matches!(
            reduce(&s, CartAction::Hydrated { ticket: first, snapshot: stored() }),
            Transition::Ignored { .. }
        );
    }

    #[test]
    fn foreign_snapshot_is_discarded() {
        let s = apply(
            &CartState::default(),
            CartAction::SetRestaurant { restaurant_id: Some("r_2".into()) },
        );
        let s = apply(&s, CartAction::BeginHydration);
        let t = ticket_of(&s);
        match reduce(&s, CartAction::Hydrated { ticket: t, snapshot: stored() }) {
            Transition::Applied { state, persist } => {
                assert!(persist);
                assert!(state.items.is_empty());
                assert_eq!(state.restaurant_id.as_deref(), Some("r_2"));
                assert_eq!(state.status, CartStatus::Empty);
            }
            Transition::Ignored { reason } => panic!("{reason}"),
        }
    }

    #[test]
    fn add_merges_same_line() {
        let s = apply(
            &CartState::default(),
            CartAction::AddItem {
                item: CartItem::new("a", "A", 100, 1),
            },
        );
        let s = apply(
            &s,
            CartAction::AddItem {
                item: CartItem::new("a", "A", 100, 2),
            },
        );
        assert_eq!(s.items.len(), 1);
        assert_eq!(s.items[0].quantity, 3);
        assert_eq!(s.revision, 2);
    }

    #[test]
    fn zero_quantity_add_is_ignored() {
        assert_matches!(
            reduce(
                &CartState::default(),
                CartAction::AddItem {
                    item: CartItem::new("a", "A", 100, 0)
                }
            ),
            Transition::Ignored { reason: "quantity must be positive" }
        );
    }

    #[test]
    fn update_to_zero_removes_line() {
        let s = apply(
            &CartState::default(),
            CartAction::AddItem {
                item: CartItem::new("a", "A", 100, 1),
            },
        );
        let s = apply(
            &s,
            CartAction::UpdateQuantity {
                item_id: "a".into(),
                quantity: 0,
            },
        );
        assert!(s.items.is_empty());
        assert_eq!(s.status, CartStatus::Empty);
    }

    #[test]
    fn unknown_line_is_ignored() {
        assert_matches!(
            reduce(&CartState::default(), CartAction::RemoveItem { item_id: "x".into() }),
            Transition::Ignored { reason: "unknown item" }
        );
    }

    #[test]
    fn switching_restaurant_empties_cart() {
        let s = apply(
            &CartState::default(),
            CartAction::SetRestaurant { restaurant_id: Some("r_1".into()) },
        );
        let s = apply(&s, CartAction::AddItem { item: CartItem::new("a", "A", 100, 1) });
        let s = apply(&s, CartAction::SetTip { tip_cents: 50 });
        let s = apply(&s, CartAction::SetRestaurant { restaurant_id: Some("r_2".into()) });
        assert!(s.items.is_empty());
        assert_eq!(s.tip_cents, 0);
        assert_matches!(
            reduce(&s, CartAction::SetRestaurant { restaurant_id: Some("r_2".into()) }),
            Transition::Ignored { .. }
        );
    }

    #[test]
    fn mismatch_invalidation_adopts_restaurant() {
        let s = apply(
            &CartState::default(),
            CartAction::Invalidate {
                reason: InvalidationReason::RestaurantMismatch { restaurant_id: "r_5".into() },
            },
        );
        assert_eq!(s.restaurant_id.as_deref(), Some("r_5"));
    }
}
