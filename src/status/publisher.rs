//! Connection state publishing.
//!
//! The publisher is the only writer of the status record. Observers learn
//! about transitions exclusively through the store.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::transport::DisconnectReason;

use super::store::StatusStore;

// ============================================================================
// Constants
// ============================================================================

/// Storage key of the connected flag.
pub const STATUS_KEY: &str = "isConnected";

/// Storage key of the last error detail.
pub const LAST_ERROR_KEY: &str = "lastError";

// ============================================================================
// ConnectionState
// ============================================================================

/// Externally observable summary of channel liveness.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    /// Whether a live connection exists.
    #[serde(rename = "isConnected")]
    pub connected: bool,

    /// Detail of the last failure, if the state is the result of one.
    #[serde(rename = "lastError")]
    pub last_error: Option<String>,
}

impl ConnectionState {
    /// State after a successful open.
    #[inline]
    #[must_use]
    pub fn connected() -> Self {
        Self {
            connected: true,
            last_error: None,
        }
    }

    /// Disconnected state, optionally carrying an error.
    #[inline]
    #[must_use]
    pub fn disconnected(last_error: Option<String>) -> Self {
        Self {
            connected: false,
            last_error,
        }
    }

    /// State after a connection terminated for `reason`.
    #[inline]
    #[must_use]
    pub fn from_disconnect(reason: &DisconnectReason) -> Self {
        Self::disconnected(reason.detail().map(str::to_owned))
    }

    /// Reads the state back from `store`; anything missing reads as
    /// disconnected.
    #[must_use]
    pub fn load(store: &dyn StatusStore) -> Self {
        let connected = store
            .get(STATUS_KEY)
            .ok()
            .flatten()
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let last_error = store
            .get(LAST_ERROR_KEY)
            .ok()
            .flatten()
            .and_then(|v| v.as_str().map(str::to_owned));

        Self {
            connected,
            last_error,
        }
    }

    fn to_items(&self) -> Map<String, Value> {
        let mut items = Map::new();
        items.insert(STATUS_KEY.into(), Value::Bool(self.connected));
        items.insert(
            LAST_ERROR_KEY.into(),
            self.last_error.clone().map_or(Value::Null, Value::String),
        );
        items
    }
}

// ============================================================================
// StatusPublisher
// ============================================================================

/// Writes [`ConnectionState`] transitions to a [`StatusStore`].
pub struct StatusPublisher {
    store: Arc<dyn StatusStore>,
    /// Last state written, for idempotence.
    last: Mutex<Option<ConnectionState>>,
}

impl StatusPublisher {
    /// Creates a publisher writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn StatusStore>) -> Self {
        Self {
            store,
            last: Mutex::new(None),
        }
    }

    /// The store this publisher writes to.
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn StatusStore> {
        &self.store
    }

    /// Writes `state` unless it equals the last published state.
    ///
    /// Returns `true` if a write happened. Storage failures are logged,
    /// never propagated.
    pub fn publish(&self, state: ConnectionState) -> bool {
        let mut last = self.last.lock();
        if last.as_ref() == Some(&state) {
            debug!(connected = state.connected, "Connection state unchanged, skipping write");
            return false;
        }

        match self.store.set(state.to_items()) {
            Ok(()) => {
                debug!(
                    connected = state.connected,
                    last_error = state.last_error.as_deref().unwrap_or(""),
                    "Connection state published"
                );
                *last = Some(state);
                true
            }
            Err(e) => {
                warn!(error = %e, connected = state.connected, "Failed to publish connection state");
                false
            }
        }
    }

    /// The last state successfully published.
    #[must_use]
    pub fn current(&self) -> Option<ConnectionState> {
        self.last.lock().clone()
    }
}

// ============================================================================
// Tests
// ============================================================================
