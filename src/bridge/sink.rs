//! Diagnostic sink for inbound traffic.
//!
//! Responses carry no acknowledgement contract, so the bridge only reports
//! them. The sink is the one place that looks inside a [`NativeResponse`].

// ============================================================================
// Imports
// ============================================================================

use tracing::{info, warn};

use crate::identifiers::ConnectionId;
use crate::protocol::NativeResponse;
use crate::transport::DisconnectReason;

// ============================================================================
// DiagnosticSink
// ============================================================================

/// Receives every response of the active connection, in arrival order.
pub trait DiagnosticSink: Send + Sync {
    /// Called for each response.
    fn on_response(&self, connection_id: ConnectionId, response: &NativeResponse);

    /// Called once after the connection's responses are exhausted.
    fn on_disconnect(&self, connection_id: ConnectionId, reason: &DisconnectReason) {
        let _ = (connection_id, reason);
    }
}

// ============================================================================
// TracingSink
// ============================================================================

/// Logs responses through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn on_response(&self, connection_id: ConnectionId, response: &NativeResponse) {
        info!(
            connection_id = %connection_id,
            status = response.get_str("status").unwrap_or(""),
            response = %response.as_value(),
            "Native response"
        );
    }

    fn on_disconnect(&self, connection_id: ConnectionId, reason: &DisconnectReason) {
        if let Some(e) = reason.to_error() {
            warn!(connection_id = %connection_id, error = %e, "Response stream ended");
        } else {
            info!(connection_id = %connection_id, "Response stream ended");
        }
    }
}
