//! # galley-cart
//!
//! Client-side cart kept in sync with backend events.
//!
//! - [`reduce`]: pure reducer over [`CartState`] and [`CartAction`]
//! - [`CartStore`]: thread-safe wrapper that persists snapshots through a
//!   [`CartStorage`] and turns backend events into invalidations
//! - [`MemoryStorage`] and [`FileStorage`]: storage backends
//!
//! Hydration is guarded by the cart revision: a snapshot that finishes
//! loading after a local edit or an invalidation is discarded.

#![deny(unsafe_code)]

pub mod reducer;
pub mod state;
pub mod storage;
pub mod store;

pub use reducer::{Transition, reduce};
pub use state::{
    CartAction, CartItem, CartSnapshot, CartState, CartStatus, HydrationTicket, InvalidationReason,
};
pub use storage::{CartStorage, FileStorage, MemoryStorage, StorageError};
pub use store::{CartStore, invalidation_for};
