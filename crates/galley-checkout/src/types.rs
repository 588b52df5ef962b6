//! Checkout states, events, and the context they carry.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default limit for creating a checkout on the terminal.
pub const DEFAULT_CREATING_TIMEOUT: Duration = Duration::from_secs(30);
/// Default limit for the customer to complete payment.
pub const DEFAULT_POLLING_TIMEOUT: Duration = Duration::from_secs(300);

/// Where the checkout workflow is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutState {
    /// Nothing started.
    Idle,
    /// Fetching paired terminals.
    LoadingDevices,
    /// Terminals known; a device may be selected.
    DevicesLoaded,
    /// Asking the terminal to start a checkout.
    CreatingCheckout,
    /// Waiting for the customer to pay.
    Polling,
    /// Payment captured, waiting for final confirmation.
    Completing,
    /// Paid.
    Completed,
    /// Device loading or the checkout failed.
    Failed,
    /// Cancelled by the operator.
    Cancelled,
    /// An operation ran out of time.
    Timeout,
}

impl CheckoutState {
    /// Every state, in workflow order.
    pub const ALL: [Self; 10] = [
        Self::Idle,
        Self::LoadingDevices,
        Self::DevicesLoaded,
        Self::CreatingCheckout,
        Self::Polling,
        Self::Completing,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
        Self::Timeout,
    ];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::LoadingDevices => "loading_devices",
            Self::DevicesLoaded => "devices_loaded",
            Self::CreatingCheckout => "creating_checkout",
            Self::Polling => "polling",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        }
    }

    /// States that start a timed, cancellable operation on entry.
    pub fn starts_operation(self) -> bool {
        matches!(self, Self::CreatingCheckout | Self::Polling)
    }

    /// Final states; only `Reset` leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Timeout
        )
    }
}

impl fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A paired payment terminal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Terminal id.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl Device {
    /// Terminal with an id and display name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Input to the checkout machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutEvent {
    /// Start fetching terminals.
    LoadDevices,
    /// Terminal list arrived.
    DevicesLoaded {
        /// Paired terminals.
        devices: Vec<Device>,
    },
    /// Terminal list could not be fetched.
    DevicesFailed {
        /// Failure description.
        error: String,
    },
    /// Pick a terminal from the loaded list.
    SelectDevice {
        /// Terminal id.
        device_id: String,
    },
    /// Start a checkout on the selected terminal.
    CreateCheckout {
        /// Amount to charge.
        amount_cents: u64,
        /// Order being paid, if any.
        order_id: Option<String>,
    },
    /// The terminal accepted the checkout.
    CheckoutCreated {
        /// Gateway checkout id.
        checkout_id: String,
    },
    /// The customer paid.
    PaymentCaptured {
        /// Gateway payment id.
        payment_id: String,
    },
    /// The gateway confirmed the checkout.
    CheckoutCompleted {
        /// Gateway payment id.
        payment_id: String,
    },
    /// The gateway rejected or aborted the checkout.
    CheckoutFailed {
        /// Failure description.
        error: String,
    },
    /// Operator cancel.
    Cancel,
    /// The running operation ran out of time.
    Timeout,
    /// Back to `idle` with a fresh context.
    Reset,
}

impl CheckoutEvent {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoadDevices => "load_devices",
            Self::DevicesLoaded { .. } => "devices_loaded",
            Self::DevicesFailed { .. } => "devices_failed",
            Self::SelectDevice { .. } => "select_device",
            Self::CreateCheckout { .. } => "create_checkout",
            Self::CheckoutCreated { .. } => "checkout_created",
            Self::PaymentCaptured { .. } => "payment_captured",
            Self::CheckoutCompleted { .. } => "checkout_completed",
            Self::CheckoutFailed { .. } => "checkout_failed",
            Self::Cancel => "cancel",
            Self::Timeout => "timeout",
            Self::Reset => "reset",
        }
    }

    /// Events that release any running operation before they apply.
    pub fn releases_operation(&self) -> bool {
        matches!(
            self,
            Self::Cancel
                | Self::Timeout
                | Self::CheckoutCompleted { .. }
                | Self::CheckoutFailed { .. }
                | Self::Reset
        )
    }
}

/// Data accumulated by the workflow.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutContext {
    /// Terminals from the last successful load.
    pub devices: Vec<Device>,
    /// Chosen terminal.
    pub selected_device_id: Option<String>,
    /// Amount being charged.
    pub amount_cents: Option<u64>,
    /// Order being paid.
    pub order_id: Option<String>,
    /// Gateway checkout id once created.
    pub checkout_id: Option<String>,
    /// Gateway payment id once captured.
    pub payment_id: Option<String>,
    /// Last failure.
    pub error: Option<String>,
}

impl CheckoutContext {
    /// Whether `device_id` is among the loaded terminals.
    pub fn has_device(&self, device_id: &str) -> bool {
        self.devices.iter().any(|d| d.id == device_id)
    }
}

/// State plus context, as handed to listeners.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckoutSnapshot {
    /// Current state.
    pub state: CheckoutState,
    /// Current context.
    pub context: CheckoutContext,
}

impl Default for CheckoutSnapshot {
    fn default() -> Self {
        Self {
            state: CheckoutState::Idle,
            context: CheckoutContext::default(),
        }
    }
}

/// Limits for the timed states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckoutTimeouts {
    /// Limit for `creating_checkout`.
    pub creating: Duration,
    /// Limit for `polling` and the `completing` that follows it.
    pub polling: Duration,
}

impl Default for CheckoutTimeouts {
    fn default() -> Self {
        Self {
            creating: DEFAULT_CREATING_TIMEOUT,
            polling: DEFAULT_POLLING_TIMEOUT,
        }
    }
}

impl CheckoutTimeouts {
    /// Limit applied on entering `state`, if it starts an operation.
    pub fn for_state(&self, state: CheckoutState) -> Option<Duration> {
        match state {
            CheckoutState::CreatingCheckout => Some(self.creating),
            CheckoutState::Polling => Some(self.polling),
            _ => None,
        }
    }
}
