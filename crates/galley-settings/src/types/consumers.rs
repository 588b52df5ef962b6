//! Settings for the checkout and cart consumers.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Terminal checkout timeouts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckoutSettings {
    /// How long creating a checkout on the terminal may take.
    pub creating_timeout_ms: u64,
    /// How long to wait for the customer to pay.
    pub polling_timeout_ms: u64,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            creating_timeout_ms: 30_000,
            polling_timeout_ms: 300_000,
        }
    }
}

impl CheckoutSettings {
    /// Creating-checkout timeout.
    pub fn creating_timeout(&self) -> Duration {
        Duration::from_millis(self.creating_timeout_ms)
    }

    /// Polling timeout.
    pub fn polling_timeout(&self) -> Duration {
        Duration::from_millis(self.polling_timeout_ms)
    }
}

/// Cart persistence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CartSettings {
    /// Directory for cart snapshots. Relative paths resolve under `~/.galley`.
    pub storage_dir: String,
    /// Snapshot key (file stem).
    pub storage_key: String,
}

impl Default for CartSettings {
    fn default() -> Self {
        Self {
            storage_dir: "cart".to_string(),
            storage_key: "galley-cart".to_string(),
        }
    }
}

impl CartSettings {
    /// Storage directory resolved against the settings home.
    pub fn resolved_dir(&self, home: &std::path::Path) -> PathBuf {
        let dir = PathBuf::from(&self.storage_dir);
        if dir.is_absolute() { dir } else { home.join(dir) }
    }
}
