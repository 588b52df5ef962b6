//! Realtime connection settings.

use std::time::Duration;

use galley_core::ReconnectPolicy;
use galley_realtime::ClientConfig;
use serde::{Deserialize, Serialize};

/// Connection to the backend event stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeSettings {
    /// HTTP(S) base endpoint; swapped to WS(S) when connecting.
    pub base_url: String,
    /// Ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Limit for one connect attempt in milliseconds.
    pub connect_timeout_ms: u64,
    /// Event coalescing window in milliseconds.
    pub batch_window_ms: u64,
    /// Backoff and attempt budget.
    pub reconnect: ReconnectPolicy,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001/ws".to_string(),
            heartbeat_interval_ms: 30_000,
            connect_timeout_ms: 10_000,
            batch_window_ms: 16,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl RealtimeSettings {
    /// Client configuration for these settings, without a tenant.
    pub fn to_config(&self) -> ClientConfig {
        ClientConfig::new(self.base_url.clone())
            .heartbeat_interval(Duration::from_millis(self.heartbeat_interval_ms))
            .connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .batch_window(Duration::from_millis(self.batch_window_ms))
            .reconnect(self.reconnect.clone())
    }
}
