//! Status observer for indicator views.
//!
//! Reads the stored flag once at start-up and then follows change
//! notifications for that key only.
//!
//! # Example
//!
//! ```ignore
//! let mut subscriber = StatusSubscriber::start(store);
//! render(subscriber.current());
//! while let Some(indicator) = subscriber.changed().await {
//!     render(indicator);
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, trace};

use super::publisher::STATUS_KEY;
use super::store::{StatusStore, StorageArea, StorageChange};

// ============================================================================
// Indicator
// ============================================================================

/// The two visual states of a connection indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    /// A live connection exists.
    Connected,
    /// No live connection.
    NotConnected,
}

impl Indicator {
    /// Maps a stored value to an indicator; anything but `true` is
    /// "not connected".
    #[inline]
    #[must_use]
    pub fn from_value(value: Option<&Value>) -> Self {
        if value.and_then(Value::as_bool).unwrap_or(false) {
            Self::Connected
        } else {
            Self::NotConnected
        }
    }

    /// Returns `true` for [`Indicator::Connected`].
    #[inline]
    #[must_use]
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

// ============================================================================
// StatusSubscriber
// ============================================================================

/// Follows the stored connection flag.
pub struct StatusSubscriber {
    store: Arc<dyn StatusStore>,
    area: StorageArea,
    changes_rx: broadcast::Receiver<StorageChange>,
    current: Indicator,
}

impl StatusSubscriber {
    /// Subscribes to `store` (area [`StorageArea::Local`]) and reads the
    /// current value.
    #[must_use]
    pub fn start(store: Arc<dyn StatusStore>) -> Self {
        Self::with_area(store, StorageArea::Local)
    }

    /// Like [`StatusSubscriber::start`] but scoped to `area`.
    #[must_use]
    pub fn with_area(store: Arc<dyn StatusStore>, area: StorageArea) -> Self {
        // Subscribe first so no change slips in between.
        let changes_rx = store.subscribe();
        let current = Self::read(store.as_ref());

        debug!(?current, %area, "Status subscriber started");

        Self {
            store,
            area,
            changes_rx,
            current,
        }
    }

    /// The indicator as last observed.
    #[inline]
    #[must_use]
    pub fn current(&self) -> Indicator {
        self.current
    }

    /// Waits for the next change of the connected flag.
    ///
    /// Notifications for other keys or areas are skipped, as are writes that
    /// leave the indicator as it was. Returns `None` if the notification queue
    /// closes.
    pub async fn changed(&mut self) -> Option<Indicator> {
        loop {
            let next = match self.changes_rx.recv().await {
                Ok(change) => {
                    if change.area != self.area {
                        trace!(area = %change.area, "Ignoring change in other area");
                        continue;
                    }
                    let Some(value_change) = change.get(STATUS_KEY) else {
                        continue;
                    };
                    Indicator::from_value(value_change.new_value.as_ref())
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Status subscriber lagged, re-reading store");
                    Self::read(self.store.as_ref())
                }
                Err(RecvError::Closed) => return None,
            };

            if next != self.current {
                self.current = next;
                return Some(next);
            }
        }
    }

    fn read(store: &dyn StatusStore) -> Indicator {
        Indicator::from_value(store.get(STATUS_KEY).ok().flatten().as_ref())
    }
}

// ============================================================================
// Tests
// ============================================================================
