//! Socket abstraction consumed by the connection driver.
//!
//! The driver only needs open, text, close and error signals, so a socket is
//! reduced to three operations. [`crate::tungstenite::WsConnector`] is the
//! production implementation; [`crate::testing`] provides an in-process one.

use async_trait::async_trait;
use galley_core::TransportError;
use url::Url;

/// Normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code used when the heartbeat goes unanswered.
pub const HEARTBEAT_TIMEOUT_CLOSE: u16 = 4000;

/// One frame surfaced by a [`Socket`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketFrame {
    /// A text frame.
    Text(String),
    /// The peer closed the connection.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// An open, message-framed, bidirectional connection.
#[async_trait]
pub trait Socket: Send {
    /// Write one text frame.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Next frame, or `None` once the stream has ended.
    ///
    /// Must be cancel-safe: the driver polls it inside `select!`.
    async fn recv(&mut self) -> Option<Result<SocketFrame, TransportError>>;

    /// Close the connection. Errors are swallowed; the socket is unusable
    /// afterwards either way.
    async fn close(&mut self, code: u16, reason: &str);
}

/// Opens sockets.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a socket to `url`.
    async fn connect(&self, url: &Url) -> Result<Box<dyn Socket>, TransportError>;
}
