//! # galley-realtime
//!
//! The realtime synchronization core: one persistent duplex connection to the
//! backend event stream, and batched fan-out of its events.
//!
//! - [`RealtimeClient`]: handle to the connection driver task. Owns the socket,
//!   reconnects with exponential backoff and jitter, runs the heartbeat, and
//!   queues outbound messages while the connection is down
//! - [`EventDistributor`]: coalesces inbound events into batches and delivers
//!   each batch once to every subscriber
//! - [`transport`]: the socket abstraction, with a tokio-tungstenite
//!   implementation in [`tungstenite`] and an in-process one in [`testing`]
//! - [`auth`]: token and tenant collaborators plus socket URL construction

#![deny(unsafe_code)]

pub mod auth;
pub mod client;
pub mod config;
pub mod distributor;
pub mod interceptor;
pub mod testing;
pub mod transport;
pub mod tungstenite;

pub use auth::{NoToken, StaticTenant, StaticToken, TenantContext, TokenProvider};
pub use client::{RealtimeClient, RealtimeClientBuilder};
pub use config::{ClientConfig, ConfigError};
pub use distributor::{EventBatch, EventDistributor, Subscription};
pub use interceptor::{MessageInterceptor, TracingInterceptor};
pub use transport::{Connector, Socket, SocketFrame};
pub use tungstenite::WsConnector;
