//! Netmanthan Bridge - Browser download hand-off to a native handler.
//!
//! This library intercepts browser downloads, suppresses the browser's own
//! handling and forwards each download to an out-of-process native handler
//! over a persistent native-messaging channel.
//!
//! # Architecture
//!
//! The bridge follows a single-channel model:
//!
//! - **Browser side**: Download-created events in, cancel calls out
//! - **Native side**: One long-lived handler process speaking
//!   length-prefixed JSON over stdio
//!
//! Key design principles:
//!
//! - At most one live [`Connection`] per bridge, owned by the
//!   [`ConnectionManager`]
//! - A [`DownloadRequest`] only exists after the browser confirmed the cancel
//! - Every connection transition is published to a [`StatusStore`] before it
//!   becomes observable
//! - Event-driven architecture (no polling)
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use netmanthan_bridge::{Bridge, Result, download_channel};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let bridge = Bridge::builder()
//!         .endpoint("com.netmanthan.nativemessaging")
//!         .downloads(Arc::new(browser_downloads()))
//!         .build()?;
//!
//!     // Eager policy: connect now, degrade on failure
//!     if let Err(e) = bridge.start().await {
//!         tracing::warn!(error = %e, "Native handler not available yet");
//!     }
//!
//!     let (emitter, events) = download_channel();
//!     install_download_listener(emitter);
//!
//!     bridge.run(events).await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | Runtime composition, controller, configuration |
//! | [`browser`] | Download events and interception |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire framing and message types |
//! | [`status`] | Connection state storage and observers |
//! | [`transport`] | Native channel, endpoints and connection manager |

// ============================================================================
// Modules
// ============================================================================

/// Runtime composition: [`Bridge`], [`BridgeBuilder`], [`BridgeController`].
pub mod bridge;

/// Browser download events and interception.
pub mod browser;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for bridge entities.
pub mod identifiers;

/// Native messaging framing and message types.
pub mod protocol;

/// Shared connection status.
pub mod status;

/// Native channel transport.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Bridge types
pub use bridge::{
    Bridge, BridgeBuilder, BridgeConfig, BridgeController, ConnectPolicy, DiagnosticSink,
    TracingSink,
};

// Browser types
pub use browser::{
    DownloadEmitter, DownloadEvents, DownloadInterceptor, DownloadItem, DownloadState, Downloads,
    download_channel,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnectionId, DownloadId, EndpointName};

// Protocol types
pub use protocol::{DownloadRequest, Header, NativeResponse};

// Status types
pub use status::{
    ConnectionState, FileStore, Indicator, MemoryStore, StatusPublisher, StatusStore,
    StatusSubscriber,
};

// Transport types
pub use transport::{
    Connection, ConnectionManager, DisconnectReason, Endpoint, LoopbackEndpoint,
    ManifestEndpoint,
};
