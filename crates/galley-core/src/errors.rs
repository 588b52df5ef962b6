//! Error hierarchy for the synchronization core.
//!
//! - [`TransportError`]: socket-level failures (connect, timeout, close, send, read)
//! - [`AuthError`]: the token provider could not produce credentials
//! - [`ProtocolError`]: a single inbound frame could not be understood
//! - [`SyncError`]: top-level error returned by the connection API
//!
//! Connection errors are `Clone` because one failed attempt is reported to
//! every caller that joined it.

use std::time::Duration;

use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// TransportError
// ─────────────────────────────────────────────────────────────────────────────

/// Failure of the underlying message-framed socket.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The socket could not be opened.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The socket did not open within the connect timeout.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// The socket was closed by the peer or locally.
    #[error("connection closed ({code}): {reason}")]
    Closed {
        /// WebSocket close code.
        code: u16,
        /// Close reason text.
        reason: String,
    },

    /// A frame could not be written.
    #[error("send failed: {0}")]
    Send(String),

    /// The read half failed.
    #[error("read failed: {0}")]
    Read(String),

    /// The configured endpoint cannot be turned into a socket URL.
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// Whether retrying with backoff can plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::InvalidUrl(_))
    }

    /// Shorthand for a closed-connection error.
    #[must_use]
    pub fn closed(code: u16, reason: impl Into<String>) -> Self {
        Self::Closed {
            code,
            reason: reason.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AuthError
// ─────────────────────────────────────────────────────────────────────────────

/// The auth token provider failed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("token provider failed: {message}")]
pub struct AuthError {
    /// Human-readable failure description.
    pub message: String,
}

impl AuthError {
    /// Create an auth error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ProtocolError
// ─────────────────────────────────────────────────────────────────────────────

/// An inbound frame that cannot be turned into an event.
///
/// Protocol errors are per-frame: the frame is dropped and logged, the
/// connection stays up.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON or does not match the expected shape.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// A domain event arrived without the payload it requires.
    #[error("event {event_type} is missing its payload")]
    MissingPayload {
        /// The envelope `type`.
        event_type: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// SyncError
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level error for connection operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Socket-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Credentials could not be obtained.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The attempt was abandoned by an intentional disconnect.
    #[error("connection attempt cancelled by disconnect")]
    Cancelled,

    /// The reconnect budget is spent; an explicit connect is required.
    #[error("gave up after {attempts} reconnect attempts")]
    RetriesExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// The connection driver is no longer running.
    #[error("connection driver has shut down")]
    Shutdown,
}

impl SyncError {
    /// Whether the failure is retried under the backoff policy.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_transient(),
            Self::Auth(_) => true,
            Self::Cancelled | Self::RetriesExhausted { .. } | Self::Shutdown => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
