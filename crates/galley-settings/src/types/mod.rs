//! Settings type definitions.
//!
//! All types use camelCase JSON and `#[serde(default)]`, so partial files
//! deserialize with missing fields taken from [`Default`].

mod consumers;
mod realtime;

pub use consumers::*;
pub use realtime::*;

use galley_core::logging::LogFormat;
use galley_realtime::ClientConfig;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings.
///
/// ```json
/// {
///   "restaurantId": "r_1",
///   "realtime": { "baseUrl": "https://api.example.com/ws", "reconnect": { "maxAttempts": 20 } },
///   "logging": { "level": "debug", "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GalleySettings {
    /// Settings schema version.
    pub version: String,
    /// Tenant the device belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restaurant_id: Option<String>,
    /// Realtime connection.
    pub realtime: RealtimeSettings,
    /// Terminal checkout.
    pub checkout: CheckoutSettings,
    /// Cart persistence.
    pub cart: CartSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl Default for GalleySettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            restaurant_id: None,
            realtime: RealtimeSettings::default(),
            checkout: CheckoutSettings::default(),
            cart: CartSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl GalleySettings {
    /// Client configuration including the tenant.
    pub fn client_config(&self) -> ClientConfig {
        let config = self.realtime.to_config();
        match &self.restaurant_id {
            Some(id) => config.restaurant_id(id.clone()),
            None => config,
        }
    }

    /// Reject values that would leave a component unusable.
    pub fn validate(&self) -> Result<()> {
        self.client_config()
            .validate()
            .map_err(|e| SettingsError::InvalidValue(e.to_string()))?;
        if self.checkout.creating_timeout_ms == 0 || self.checkout.polling_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "checkout timeouts must be > 0".into(),
            ));
        }
        if self.cart.storage_key.is_empty() {
            return Err(SettingsError::InvalidValue(
                "cart storage key cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `info` or `galley_realtime=debug`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
