//! Cart state, actions, and the persisted snapshot.

use serde::{Deserialize, Serialize};

/// One line in the cart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Line id; adding an item with an existing id merges quantities.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Price per unit.
    pub unit_price_cents: u64,
    /// Units; always > 0 while in the cart.
    pub quantity: u32,
    /// Kitchen notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CartItem {
    /// Line without notes.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        unit_price_cents: u64,
        quantity: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            unit_price_cents,
            quantity,
            notes: None,
        }
    }

    /// Price of the whole line.
    pub fn line_total_cents(&self) -> u64 {
        self.unit_price_cents.saturating_mul(u64::from(self.quantity))
    }
}

/// Persisted form: `{ "items": [...], "restaurantId": string|null, "tip": integer }`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    /// Cart lines.
    #[serde(default)]
    pub items: Vec<CartItem>,
    /// Restaurant the cart belongs to.
    #[serde(default)]
    pub restaurant_id: Option<String>,
    /// Tip in cents.
    #[serde(default)]
    pub tip: u64,
}

/// Lifecycle of the in-memory cart.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    /// No items.
    #[default]
    Empty,
    /// Waiting for a stored snapshot.
    Hydrating,
    /// Has items.
    Ready,
}

/// Proof that a hydration was started at a given revision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HydrationTicket {
    pub(crate) revision: u64,
}

impl HydrationTicket {
    /// Revision the hydration was started at.
    pub fn revision(self) -> u64 {
        self.revision
    }
}

/// Why the cart was emptied from outside.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvalidationReason {
    /// Menu changed; prices and items may be stale.
    MenuUpdated,
    /// Backend asked for the cart to be dropped.
    Remote,
    /// The device now serves a different restaurant.
    RestaurantMismatch {
        /// The restaurant now in effect.
        restaurant_id: String,
    },
}

impl InvalidationReason {
    /// Short name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MenuUpdated => "menu_updated",
            Self::Remote => "remote",
            Self::RestaurantMismatch { .. } => "restaurant_mismatch",
        }
    }
}

/// Input to the reducer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CartAction {
    /// Start loading the stored snapshot.
    BeginHydration,
    /// Stored snapshot loaded.
    Hydrated {
        /// Ticket from the matching `BeginHydration`.
        ticket: HydrationTicket,
        /// Loaded data.
        snapshot: CartSnapshot,
    },
    /// Hydration ended without usable data.
    HydrationFailed {
        /// Ticket from the matching `BeginHydration`.
        ticket: HydrationTicket,
    },
    /// Add a line, or add to the quantity of an existing line.
    AddItem {
        /// Line to add.
        item: CartItem,
    },
    /// Set a line's quantity; zero removes it.
    UpdateQuantity {
        /// Line id.
        item_id: String,
        /// New quantity.
        quantity: u32,
    },
    /// Remove a line.
    RemoveItem {
        /// Line id.
        item_id: String,
    },
    /// Set the tip.
    SetTip {
        /// Tip in cents.
        tip_cents: u64,
    },
    /// Switch restaurant. A non-empty cart for another restaurant is emptied.
    SetRestaurant {
        /// New restaurant.
        restaurant_id: Option<String>,
    },
    /// Empty the cart.
    Clear,
    /// Empty the cart and drop any in-flight hydration.
    Invalidate {
        /// Cause.
        reason: InvalidationReason,
    },
}

impl CartAction {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BeginHydration => "begin_hydration",
            Self::Hydrated { .. } => "hydrated",
            Self::HydrationFailed { .. } => "hydration_failed",
            Self::AddItem { .. } => "add_item",
            Self::UpdateQuantity { .. } => "update_quantity",
            Self::RemoveItem { .. } => "remove_item",
            Self::SetTip { .. } => "set_tip",
            Self::SetRestaurant { .. } => "set_restaurant",
            Self::Clear => "clear",
            Self::Invalidate { .. } => "invalidate",
        }
    }
}

/// In-memory cart.
///
/// `revision` increases on every local edit and invalidation. A hydration
/// ticket is only honoured while the revision it was issued at is current.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CartState {
    /// Cart lines.
    pub items: Vec<CartItem>,
    /// Restaurant the cart belongs to.
    pub restaurant_id: Option<String>,
    /// Tip in cents.
    pub tip_cents: u64,
    /// Lifecycle.
    pub status: CartStatus,
    /// Edit counter.
    pub revision: u64,
    /// Hydration in flight.
    pub pending_hydration: Option<HydrationTicket>,
}

impl CartState {
    /// Sum of line totals.
    pub fn subtotal_cents(&self) -> u64 {
        self.items.iter().map(CartItem::line_total_cents).sum()
    }

    /// Subtotal plus tip.
    pub fn total_cents(&self) -> u64 {
        self.subtotal_cents().saturating_add(self.tip_cents)
    }

    /// Total units across lines.
    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    /// The persisted part of the state.
    pub fn to_snapshot(&self) -> CartSnapshot {
        CartSnapshot {
            items: self.items.clone(),
            restaurant_id: self.restaurant_id.clone(),
            tip: self.tip_cents,
        }
    }

    /// Position of a line by id.
    pub(crate) fn position(&self, item_id: &str) -> Option<usize> {
        self.items.iter().position(|i| i.id == item_id)
    }
}
