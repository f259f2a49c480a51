//! Browser-side download handling.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Downloads`] | Cancel operation of the browser's download subsystem |
//! | [`DownloadItem`] | A download-created event |
//! | [`DownloadInterceptor`] | Suppresses a download and builds its request |
//!
//! # Example
//!
//! ```ignore
//! use netmanthan_bridge::browser::{DownloadInterceptor, download_channel};
//!
//! let interceptor = DownloadInterceptor::new(downloads);
//! let (emitter, mut events) = download_channel();
//!
//! while let Some(item) = events.recv().await {
//!     match interceptor.intercept(item).await {
//!         Ok(request) => forward(request),
//!         Err(e) => tracing::warn!(error = %e, "Download dropped"),
//!     }
//! }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Download events and the cancel seam.
pub mod download;

/// Download interception.
pub mod interceptor;

// ============================================================================
// Re-exports
// ============================================================================

pub use download::{
    DownloadEmitter, DownloadEvents, DownloadItem, DownloadState, Downloads, download_channel,
};
pub use interceptor::DownloadInterceptor;
