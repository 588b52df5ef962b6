//! # galley-core
//!
//! Foundation types shared by every Galley crate.
//!
//! - **Wire**: [`WireEnvelope`] and [`OutboundMessage`], the JSON frames exchanged
//!   with the backend event stream
//! - **Events**: [`InboundEvent`] tagged union over order events, plus the
//!   [`Order`] model they carry
//! - **State**: [`ConnectionState`] and [`ConnectionSnapshot`]
//! - **Retry**: [`ReconnectPolicy`] and the backoff math
//! - **Errors**: the `thiserror` hierarchy rooted at [`SyncError`]
//! - **Logging**: subscriber setup and log capture for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod logging;
pub mod retry;
pub mod state;
pub mod wire;

pub use errors::{AuthError, ProtocolError, SyncError, TransportError};
pub use events::{InboundEvent, Order, OrderLineItem, OrderStatus};
pub use retry::{ReconnectPolicy, RetryState};
pub use state::{ConnectionSnapshot, ConnectionState};
pub use wire::{OutboundMessage, WireEnvelope};
