//! Composed bridge runtime.
//!
//! The [`Bridge`] ties the interceptor, the controller and the status store
//! together and processes download events one at a time.
//!
//! # Example
//!
//! ```ignore
//! use netmanthan_bridge::{Bridge, download_channel};
//!
//! let bridge = Bridge::builder().downloads(downloads).build()?;
//! bridge.start().await.ok();
//!
//! let (emitter, events) = download_channel();
//! tokio::spawn({
//!     let bridge = bridge.clone();
//!     async move { bridge.run(events).await }
//! });
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::browser::{DownloadEvents, DownloadInterceptor, DownloadItem};
use crate::error::{Error, Result};
use crate::status::{ConnectionState, StatusStore, StatusSubscriber};

use super::builder::BridgeBuilder;
use super::config::{BridgeConfig, ConnectPolicy};
use super::controller::BridgeController;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the bridge.
pub(crate) struct BridgeInner {
    /// Settings the bridge was built from.
    pub config: BridgeConfig,

    /// Suppresses browser downloads.
    pub interceptor: DownloadInterceptor,

    /// Delivers requests.
    pub controller: BridgeController,

    /// Where the connection state is published.
    pub store: Arc<dyn StatusStore>,

    /// Set once `run` has taken the event stream.
    pub subscribed: AtomicBool,
}

// ============================================================================
// Bridge
// ============================================================================

/// Download bridge between the browser and the native handler.
///
/// Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct Bridge {
    pub(crate) inner: Arc<BridgeInner>,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("endpoint", self.inner.controller.endpoint())
            .field("connect_policy", &self.inner.config.connect_policy)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Bridge - Public API
// ============================================================================

impl Bridge {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    pub(crate) fn from_parts(
        config: BridgeConfig,
        interceptor: DownloadInterceptor,
        controller: BridgeController,
        store: Arc<dyn StatusStore>,
    ) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                config,
                interceptor,
                controller,
                store,
                subscribed: AtomicBool::new(false),
            }),
        }
    }

    /// Settings the bridge was built from.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// The controller delivering requests.
    #[inline]
    #[must_use]
    pub fn controller(&self) -> &BridgeController {
        &self.inner.controller
    }

    /// Returns `true` if a live connection exists.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.controller.manager().is_connected()
    }

    /// The connection state as stored.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState::load(self.inner.store.as_ref())
    }

    /// The store the connection state is published to.
    #[inline]
    #[must_use]
    pub fn status_store(&self) -> &Arc<dyn StatusStore> {
        &self.inner.store
    }

    /// Starts an observer of the connection indicator.
    #[must_use]
    pub fn status_subscriber(&self) -> StatusSubscriber {
        StatusSubscriber::with_area(Arc::clone(&self.inner.store), self.inner.store.area())
    }

    /// Opens the session connection if the policy is eager.
    ///
    /// A failure leaves the bridge in degraded mode: the next download tries
    /// to open again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndpointUnavailable`] if the eager open fails.
    pub async fn start(&self) -> Result<()> {
        match self.inner.config.connect_policy {
            ConnectPolicy::Eager => {
                let connection = self.inner.controller.connect().await?;
                info!(connection_id = %connection.id(), "Bridge started");
            }
            ConnectPolicy::Lazy => {
                debug!("Bridge started, connection deferred to first download");
            }
        }
        Ok(())
    }

    /// Intercepts one download and forwards its request.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] if the item has no usable URL
    /// - [`Error::SuppressFailed`] if the browser could not cancel it
    /// - [`Error::EndpointUnavailable`] if no connection could be opened
    pub async fn on_download(&self, item: DownloadItem) -> Result<()> {
        let request = self.inner.interceptor.intercept(item).await?;
        self.inner.controller.handle(request).await
    }

    /// Processes download events in arrival order until the stream ends.
    ///
    /// Per-download failures are logged and the download is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `run` was entered before. The event
    /// subscription lasts for the lifetime of the bridge.
    pub async fn run(&self, mut events: DownloadEvents) -> Result<()> {
        if self.inner.subscribed.swap(true, Ordering::SeqCst) {
            return Err(Error::config("bridge is already subscribed to download events"));
        }

        info!("Processing download events");

        while let Some(item) = events.recv().await {
            let download_id = item.id;

            match self.on_download(item).await {
                Ok(()) => debug!(download_id = %download_id, "Download forwarded"),
                Err(e @ Error::InvalidRequest { .. }) => {
                    debug!(download_id = %download_id, error = %e, "Download left to the browser");
                }
                Err(e) if e.is_connection_error() => {
                    warn!(download_id = %download_id, error = %e, "Download dropped, native handler unavailable");
                }
                Err(e) => {
                    warn!(download_id = %download_id, error = %e, "Download dropped");
                }
            }
        }

        info!("Download event stream ended");
        Ok(())
    }

    /// Closes the connection normally.
    pub async fn shutdown(&self) {
        info!("Bridge shutting down");
        self.inner.controller.manager().close().await;
    }
}
