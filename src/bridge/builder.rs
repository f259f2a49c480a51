//! Builder pattern for bridge configuration.
//!
//! Provides a fluent API for configuring and creating [`Bridge`] instances.
//!
//! # Example
//!
//! ```ignore
//! use netmanthan_bridge::{Bridge, ConnectPolicy};
//!
//! let bridge = Bridge::builder()
//!     .endpoint("com.netmanthan.nativemessaging")
//!     .connect_policy(ConnectPolicy::Lazy)
//!     .downloads(downloads)
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::browser::{DownloadInterceptor, Downloads};
use crate::error::{Error, Result};
use crate::status::{FileStore, MemoryStore, StatusPublisher, StatusStore};
use crate::transport::{ConnectionManager, Endpoint, ManifestEndpoint, default_manifest_dirs};

use super::config::{BridgeConfig, ConnectPolicy};
use super::controller::BridgeController;
use super::core::Bridge;
use super::sink::{DiagnosticSink, TracingSink};

// ============================================================================
// BridgeBuilder
// ============================================================================

/// Builder for configuring a [`Bridge`] instance.
///
/// Use [`Bridge::builder()`] to create a new builder.
#[derive(Default)]
pub struct BridgeBuilder {
    /// Settings.
    config: BridgeConfig,
    /// Browser download subsystem.
    downloads: Option<Arc<dyn Downloads>>,
    /// Endpoint launcher override.
    launcher: Option<Arc<dyn Endpoint>>,
    /// Status store override.
    store: Option<Arc<dyn StatusStore>>,
    /// Diagnostic sink override.
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl fmt::Debug for BridgeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeBuilder")
            .field("config", &self.config)
            .field("downloads", &self.downloads.is_some())
            .field("launcher", &self.launcher.is_some())
            .field("store", &self.store.is_some())
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

// ============================================================================
// BridgeBuilder Implementation
// ============================================================================

impl BridgeBuilder {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all settings.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the registered name of the native handler.
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, name: impl Into<String>) -> Self {
        self.config.endpoint = name.into();
        self
    }

    /// Adds a directory searched for the host manifest.
    #[inline]
    #[must_use]
    pub fn manifest_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.manifest_dirs.push(dir.into());
        self
    }

    /// Sets the extension id checked against the manifest.
    #[inline]
    #[must_use]
    pub fn extension_id(mut self, id: impl Into<String>) -> Self {
        self.config.extension_id = Some(id.into());
        self
    }

    /// Sets when the connection is opened.
    #[inline]
    #[must_use]
    pub fn connect_policy(mut self, policy: ConnectPolicy) -> Self {
        self.config.connect_policy = policy;
        self
    }

    /// Sets the inbound response buffer capacity.
    #[inline]
    #[must_use]
    pub fn message_buffer(mut self, capacity: usize) -> Self {
        self.config.message_buffer = capacity;
        self
    }

    /// Tags outbound messages with an action field.
    #[inline]
    #[must_use]
    pub fn include_action(mut self, include: bool) -> Self {
        self.config.include_action = include;
        self
    }

    /// Persists the connection state to `path`.
    #[inline]
    #[must_use]
    pub fn status_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.status_file = Some(path.into());
        self
    }

    /// Sets the browser download subsystem. Required.
    #[inline]
    #[must_use]
    pub fn downloads(mut self, downloads: Arc<dyn Downloads>) -> Self {
        self.downloads = Some(downloads);
        self
    }

    /// Replaces the manifest-based launcher.
    #[inline]
    #[must_use]
    pub fn launcher(mut self, launcher: Arc<dyn Endpoint>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Replaces the configured status store.
    #[inline]
    #[must_use]
    pub fn status_store(mut self, store: Arc<dyn StatusStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the logging sink for responses.
    #[inline]
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Builds the bridge with validation.
    ///
    /// Publishes the disconnected start-up state. Does not connect; see
    /// [`Bridge::start`].
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no [`Downloads`] is set or a setting is out of
    ///   range
    /// - [`Error::InvalidEndpointName`] if the endpoint name is invalid
    /// - [`Error::Storage`] if the status file cannot be opened
    pub fn build(self) -> Result<Bridge> {
        self.config.validate()?;
        let endpoint = self.config.endpoint_name()?;

        let downloads = self.downloads.ok_or_else(|| {
            Error::config(
                "A Downloads implementation is required. Use .downloads() to set it.\n\
                 Example: Bridge::builder().downloads(Arc::new(browser_downloads))",
            )
        })?;

        let launcher: Arc<dyn Endpoint> = match self.launcher {
            Some(launcher) => launcher,
            None => {
                let dirs = if self.config.manifest_dirs.is_empty() {
                    default_manifest_dirs()
                } else {
                    self.config.manifest_dirs.clone()
                };
                Arc::new(ManifestEndpoint::new(dirs, self.config.extension_id.clone()))
            }
        };

        let store: Arc<dyn StatusStore> = match (self.store, &self.config.status_file) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(FileStore::open(path)?),
            (None, None) => Arc::new(MemoryStore::default()),
        };

        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));

        let publisher = Arc::new(StatusPublisher::new(Arc::clone(&store)));
        let manager = Arc::new(ConnectionManager::new(
            launcher,
            publisher,
            self.config.message_buffer,
        ));
        let controller =
            BridgeController::new(manager, endpoint, sink, self.config.include_action);

        debug!(
            endpoint = %controller.endpoint(),
            policy = ?self.config.connect_policy,
            "Bridge built"
        );

        Ok(Bridge::from_parts(
            self.config,
            DownloadInterceptor::new(downloads),
            controller,
            store,
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::identifiers::DownloadId;
    use crate::status::ConnectionState;
    use crate::transport::LoopbackEndpoint;

    struct NoopDownloads;

    #[async_trait]
    impl Downloads for NoopDownloads {
        async fn cancel(&self, _: DownloadId) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_new_creates_default_builder() {
        let builder = BridgeBuilder::new();
        assert_eq!(builder.config, BridgeConfig::default());
        assert!(builder.downloads.is_none());
        assert!(builder.launcher.is_none());
    }

    #[test]
    fn test_setters_update_config() {
        let builder = BridgeBuilder::new()
            .endpoint("com.example.host")
            .manifest_dir("/a")
            .manifest_dir("/b")
            .extension_id("ext@example.org")
            .connect_policy(ConnectPolicy::Lazy)
            .message_buffer(4)
            .include_action(true);

        assert_eq!(builder.config.endpoint, "com.example.host");
        assert_eq!(
            builder.config.manifest_dirs,
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );
        assert_eq!(builder.config.extension_id.as_deref(), Some("ext@example.org"));
        assert_eq!(builder.config.connect_policy, ConnectPolicy::Lazy);
        assert_eq!(builder.config.message_buffer, 4);
        assert!(builder.config.include_action);
    }

    #[test]
    fn test_build_requires_downloads() {
        let err = BridgeBuilder::new().build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_build_rejects_invalid_endpoint() {
        let err = BridgeBuilder::new()
            .endpoint("not a name")
            .downloads(Arc::new(NoopDownloads))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidEndpointName { .. }));
    }

    #[test]
    fn test_build_publishes_disconnected() {
        let (launcher, _hosts) = LoopbackEndpoint::new();
        let bridge = BridgeBuilder::new()
            .downloads(Arc::new(NoopDownloads))
            .launcher(Arc::new(launcher))
            .build()
            .unwrap();

        assert!(!bridge.is_connected());
        assert_eq!(bridge.connection_state(), ConnectionState::disconnected(None));
    }

    #[test]
    fn test_build_with_status_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.json");

        let (launcher, _hosts) = LoopbackEndpoint::new();
        let bridge = BridgeBuilder::new()
            .downloads(Arc::new(NoopDownloads))
            .launcher(Arc::new(launcher))
            .status_file(&path)
            .build()
            .unwrap();

        assert!(path.exists());
        assert_eq!(bridge.config().status_file.as_deref(), Some(path.as_path()));
    }
}
