//! Hook for observing raw socket traffic.

use tracing::trace;

/// Sees every text frame the driver writes or reads.
///
/// Called on the driver task; implementations must not block.
pub trait MessageInterceptor: Send + Sync {
    /// A frame is about to be written.
    fn on_outbound(&self, _text: &str) {}

    /// A frame was read, before parsing.
    fn on_inbound(&self, _text: &str) {}
}

/// Logs traffic at `trace` level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingInterceptor;

impl MessageInterceptor for TracingInterceptor {
    fn on_outbound(&self, text: &str) {
        trace!(target: "galley::wire", direction = "out", frame = text);
    }

    fn on_inbound(&self, text: &str) {
        trace!(target: "galley::wire", direction = "in", frame = text);
    }
}
