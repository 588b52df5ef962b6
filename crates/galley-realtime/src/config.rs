//! Realtime client configuration.

use std::time::Duration;

use galley_core::ReconnectPolicy;
use thiserror::Error;

/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Default limit for a single connect attempt (token fetch + socket open).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default batch window, roughly one animation frame.
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(16);

/// Invalid client configuration.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid realtime config: {0}")]
pub struct ConfigError(pub String);

/// Configuration for [`RealtimeClient`](crate::RealtimeClient).
#[derive(Clone, Debug)]
pub struct ClientConfig {
    // Endpoint
    /// Base HTTP(S) endpoint; the scheme is swapped to WS(S) at connect time.
    pub base_url: String,
    /// Tenant scope, used for the URL and to tag outbound messages.
    pub restaurant_id: Option<String>,

    // Liveness
    /// Interval between pings. No pong for twice this long closes the socket.
    pub heartbeat_interval: Duration,
    /// Limit for one connect attempt.
    pub connect_timeout: Duration,

    // Reconnection
    /// Backoff and attempt budget.
    pub reconnect: ReconnectPolicy,

    // Fan-out
    /// Window used to coalesce inbound events.
    pub batch_window: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            restaurant_id: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
            batch_window: DEFAULT_BATCH_WINDOW,
        }
    }
}

impl ClientConfig {
    /// Configuration for the given base endpoint with defaults elsewhere.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the tenant scope.
    #[must_use]
    pub fn restaurant_id(mut self, id: impl Into<String>) -> Self {
        self.restaurant_id = Some(id.into());
        self
    }

    /// Set the heartbeat interval.
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the reconnect policy.
    #[must_use]
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Set the batch window.
    #[must_use]
    pub fn batch_window(mut self, window: Duration) -> Self {
        self.batch_window = window;
        self
    }

    /// How long without a pong before the socket is considered dead.
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_interval * 2
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError("base URL cannot be empty".to_string()));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError("heartbeat interval must be > 0".to_string()));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError("connect timeout must be > 0".to_string()));
        }
        if self.batch_window.is_zero() {
            return Err(ConfigError("batch window must be > 0".to_string()));
        }
        self.reconnect.validate().map_err(ConfigError)
    }
}
