//! Native channel protocol.
//!
//! This module defines the framing and the message types exchanged with the
//! native handler.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`OutboundMessage`] | Bridge → Handler | Take over a download |
//! | [`NativeResponse`] | Handler → Bridge | Opaque status/diagnostic document |
//!
//! There is one long-lived channel and no request/response correlation.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Length-prefixed JSON framing |
//! | `message` | Request and response types |

// ============================================================================
// Submodules
// ============================================================================

/// Length-prefixed JSON framing.
pub mod codec;

/// Request and response types.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use message::{DOWNLOAD_ACTION, DownloadRequest, Header, NativeResponse, OutboundMessage};
