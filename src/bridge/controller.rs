//! Bridge controller.
//!
//! Delivers download requests over the session connection and routes the
//! handler's responses to the diagnostic sink.
//!
//! # Delivery
//!
//! ```text
//! handle(request)
//!   ├─ live connection?  ── yes ──► send
//!   │                    └─ no ───► open ──► send
//!   └─ send hit a dead channel ──► open ──► send (once)
//! ```
//!
//! A failed `open` is returned to the caller; the request is not queued.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::Result;
use crate::identifiers::EndpointName;
use crate::protocol::{DownloadRequest, OutboundMessage};
use crate::transport::{Connection, ConnectionManager};

use super::sink::DiagnosticSink;

// ============================================================================
// BridgeController
// ============================================================================

/// Forwards requests to the native handler.
pub struct BridgeController {
    manager: Arc<ConnectionManager>,
    endpoint: EndpointName,
    sink: Arc<dyn DiagnosticSink>,
    include_action: bool,
}

impl BridgeController {
    /// Creates a controller delivering to `endpoint` through `manager`.
    #[must_use]
    pub fn new(
        manager: Arc<ConnectionManager>,
        endpoint: EndpointName,
        sink: Arc<dyn DiagnosticSink>,
        include_action: bool,
    ) -> Self {
        Self {
            manager,
            endpoint,
            sink,
            include_action,
        }
    }

    /// The connection manager.
    #[inline]
    #[must_use]
    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// The endpoint requests are delivered to.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &EndpointName {
        &self.endpoint
    }

    /// Returns the live connection, opening one if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndpointUnavailable`](crate::Error::EndpointUnavailable) if the handler cannot be
    /// launched.
    pub async fn connect(&self) -> Result<Connection> {
        if let Some(connection) = self.manager.current() {
            return Ok(connection);
        }

        let connection = self.manager.open(&self.endpoint).await?;
        self.route_responses(&connection);
        Ok(connection)
    }

    /// Sends `request` to the handler.
    ///
    /// Does not wait for a response.
    ///
    /// # Errors
    ///
    /// - [`Error::EndpointUnavailable`](crate::Error::EndpointUnavailable) if no connection could be opened
    /// - [`Error::SendOnDeadChannel`](crate::Error::SendOnDeadChannel) if the reopened connection died as well
    /// - [`Error::MessageTooLarge`](crate::Error::MessageTooLarge) if the request does not fit in a frame
    pub async fn handle(&self, request: DownloadRequest) -> Result<()> {
        let message = OutboundMessage::new(&request, self.include_action);
        let connection = self.connect().await?;

        match connection.send(&message) {
            Err(e) if e.is_recoverable() => {
                debug!(connection_id = %connection.id(), error = %e, "Connection died before send, reopening");
                let connection = self.connect().await?;
                connection.send(&message)?;
                trace!(connection_id = %connection.id(), url = request.url(), "Request sent");
                Ok(())
            }
            Err(e) => Err(e),
            Ok(()) => {
                trace!(connection_id = %connection.id(), url = request.url(), "Request sent");
                Ok(())
            }
        }
    }

    /// Spawns the task feeding `connection`'s responses to the sink.
    ///
    /// No-op if the responses are already routed.
    fn route_responses(&self, connection: &Connection) {
        let Some(mut messages) = connection.on_message() else {
            return;
        };

        let id = connection.id();
        let disconnected = connection.disconnect_signal();
        let sink = Arc::clone(&self.sink);

        tokio::spawn(async move {
            while let Some(response) = messages.recv().await {
                sink.on_response(id, &response);
            }

            let reason = disconnected.await;
            sink.on_disconnect(id, &reason);
            debug!(connection_id = %id, "Response routing ended");
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
