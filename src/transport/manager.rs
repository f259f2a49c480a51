//! Connection manager owning the single native channel.
//!
//! Holds at most one live [`Connection`] per bridge and publishes every
//! lifecycle transition through a [`StatusPublisher`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │            ConnectionManager             │
//! │  ┌────────────────────────────────────┐  │
//! │  │ slot: Option<Connection>           │  │
//! │  │   open()  → launch + publish(true) │  │
//! │  │   hook    → publish(false)         │  │
//! │  └────────────────────────────────────┘  │
//! └──────────────────────────────────────────┘
//! ```
//!
//! State writes are ordered by the transition lock: `open` holds it while it
//! stores a new connection and publishes `connected`, and the terminate hook
//! holds it while it publishes `disconnected` for the connection in the slot.
//! The slot lock itself only guards the swap, so [`ConnectionManager::current`]
//! never waits on a store write.
//!
//! A dead connection stays in the slot until its teardown has finished;
//! `open` waits it out before launching a new handler.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::identifiers::{ConnectionId, EndpointName};
use crate::status::{ConnectionState, StatusPublisher};

use super::connection::{Connection, DisconnectReason, TerminateHook};
use super::endpoint::Endpoint;

// ============================================================================
// ConnectionManager
// ============================================================================

/// Owns the lifecycle of the channel to the native handler.
///
/// # Example
///
/// ```ignore
/// let manager = ConnectionManager::new(endpoint, publisher, DEFAULT_MESSAGE_BUFFER);
/// let connection = manager.open(&name).await?;
/// connection.send(&request)?;
/// ```
pub struct ConnectionManager {
    /// Launches handler processes.
    endpoint: Arc<dyn Endpoint>,

    /// Sole writer of the connection state.
    publisher: Arc<StatusPublisher>,

    /// Inbound buffer size for new connections.
    message_buffer: usize,

    /// The current connection, live or still tearing down.
    slot: Arc<Mutex<Option<Connection>>>,

    /// Orders state writes between `open` and the terminate hook.
    transition: Arc<Mutex<()>>,

    /// Serializes `open`.
    open_lock: AsyncMutex<()>,
}

// ============================================================================
// ConnectionManager - Constructor
// ============================================================================

impl ConnectionManager {
    /// Creates a manager and resets the published state to disconnected.
    #[must_use]
    pub fn new(
        endpoint: Arc<dyn Endpoint>,
        publisher: Arc<StatusPublisher>,
        message_buffer: usize,
    ) -> Self {
        publisher.publish(ConnectionState::disconnected(None));

        Self {
            endpoint,
            publisher,
            message_buffer,
            slot: Arc::new(Mutex::new(None)),
            transition: Arc::new(Mutex::new(())),
            open_lock: AsyncMutex::new(()),
        }
    }
}

// ============================================================================
// ConnectionManager - Public API
// ============================================================================

impl ConnectionManager {
    /// Returns the live connection, if any.
    #[must_use]
    pub fn current(&self) -> Option<Connection> {
        self.slot
            .lock()
            .as_ref()
            .filter(|connection| connection.is_live())
            .cloned()
    }

    /// Returns `true` if a live connection exists.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.current().is_some()
    }

    /// The publisher state transitions are written to.
    #[inline]
    #[must_use]
    pub fn publisher(&self) -> &Arc<StatusPublisher> {
        &self.publisher
    }

    /// Opens the channel to `name`, or returns the live one.
    ///
    /// A dead connection still in the slot is waited out first, so its
    /// disconnect is published and its handler reaped before the new
    /// connection's open.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::EndpointUnavailable`] if the handler cannot be
    /// launched. The failure is published as the last error; `open` is not
    /// retried.
    pub async fn open(&self, name: &EndpointName) -> Result<Connection> {
        let _guard = self.open_lock.lock().await;

        let previous = self.slot.lock().clone();
        if let Some(previous) = previous {
            if previous.is_live() {
                debug!(connection_id = %previous.id(), "Reusing live connection");
                return Ok(previous);
            }

            debug!(connection_id = %previous.id(), "Waiting for previous connection teardown");
            previous.on_disconnect().await;
        }

        let io = match self.endpoint.launch(name).await {
            Ok(io) => io,
            Err(e) => {
                warn!(endpoint = %name, error = %e, "Failed to open native connection");
                self.publisher
                    .publish(ConnectionState::disconnected(Some(e.to_string())));
                return Err(e);
            }
        };

        let id = ConnectionId::next();
        let transition = self.transition.lock();
        let connection = Connection::with_hook(
            id,
            name.clone(),
            io,
            self.message_buffer,
            Some(self.terminate_hook()),
        );
        *self.slot.lock() = Some(connection.clone());
        self.publisher.publish(ConnectionState::connected());
        drop(transition);

        info!(connection_id = %id, endpoint = %name, "Connection established");
        Ok(connection)
    }

    /// Closes the live connection normally and waits for its teardown.
    ///
    /// No-op without a connection.
    pub async fn close(&self) {
        let connection = self.slot.lock().clone();

        if let Some(connection) = connection {
            connection.close();
            let reason = connection.on_disconnect().await;
            debug!(connection_id = %connection.id(), %reason, "Connection closed by manager");
        }
    }
}

// ============================================================================
// ConnectionManager - Lifecycle
// ============================================================================

impl ConnectionManager {
    /// Builds the hook that publishes a connection's disconnect.
    ///
    /// The connection stays in the slot; `open` replaces it once its
    /// teardown is over.
    fn terminate_hook(&self) -> TerminateHook {
        let slot = Arc::clone(&self.slot);
        let transition = Arc::clone(&self.transition);
        let publisher = Arc::clone(&self.publisher);

        Box::new(move |id: ConnectionId, reason: &DisconnectReason| {
            let _transition = transition.lock();
            let is_current = slot.lock().as_ref().is_some_and(|current| current.id() == id);

            if is_current {
                publisher.publish(ConnectionState::from_disconnect(reason));
            } else {
                debug!(connection_id = %id, "Terminated connection no longer current");
            }
        })
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // The terminate hook holds the slot; closing breaks that cycle and
        // still publishes the disconnect.
        if let Some(connection) = self.slot.lock().as_ref() {
            connection.close();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
