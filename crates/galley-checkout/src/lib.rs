//! # galley-checkout
//!
//! Payment-terminal checkout workflow as a finite-state machine.
//!
//! - [`next_state`] is the transition table, a pure function of state,
//!   context and event
//! - [`CheckoutMachine`] applies it, owns the cancellation token and timeout
//!   timer of the running operation, and notifies listeners
//! - [`CheckoutDriver`] runs a machine on a task and accepts commands and
//!   backend events through a [`CheckoutHandle`]
//!
//! Events that do not fit the current state are ignored and counted, since
//! gateway events may arrive late or twice.

#![deny(unsafe_code)]

pub mod driver;
pub mod inbound;
pub mod machine;
pub mod table;
pub mod types;

pub use driver::{CheckoutDriver, CheckoutHandle};
pub use inbound::checkout_event;
pub use machine::{CheckoutMachine, Listener, ListenerId, TimerFired};
pub use table::next_state;
pub use types::{
    CheckoutContext, CheckoutEvent, CheckoutSnapshot, CheckoutState, CheckoutTimeouts, Device,
};
