//! Error types for the download bridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use netmanthan_bridge::{Result, Error};
//!
//! async fn example(manager: &ConnectionManager, name: &EndpointName) -> Result<()> {
//!     let connection = manager.open(name).await?;
//!     connection.send(&serde_json::json!({ "url": "https://example.com/a.zip" }))?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidEndpointName`] |
//! | Connection | [`Error::EndpointUnavailable`], [`Error::SendOnDeadChannel`], [`Error::Disconnected`] |
//! | Protocol | [`Error::Protocol`], [`Error::MessageTooLarge`], [`Error::InvalidRequest`] |
//! | Browser | [`Error::SuppressFailed`] |
//! | Status | [`Error::Storage`] |
//! | External | [`Error::Io`], [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

use crate::identifiers::{ConnectionId, DownloadId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when bridge configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Native endpoint name does not follow the host naming rule.
    #[error("Invalid endpoint name: {name:?}")]
    InvalidEndpointName {
        /// The rejected name.
        name: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// The native handler could not be reached or launched.
    ///
    /// Covers missing registration, permission denial and a handler that
    /// dies during startup. Never retried automatically.
    #[error("Native endpoint {endpoint} unavailable: {message}")]
    EndpointUnavailable {
        /// Endpoint that was requested.
        endpoint: String,
        /// Why it could not be opened.
        message: String,
    },

    /// `send` was called on a connection that is no longer live.
    ///
    /// The remedy is to open a new connection and send again.
    #[error("Send on dead channel (connection {connection_id})")]
    SendOnDeadChannel {
        /// The dead connection.
        connection_id: ConnectionId,
    },

    /// The channel died unexpectedly.
    #[error("Native endpoint disconnected: {detail}")]
    Disconnected {
        /// Error detail reported for the disconnect.
        detail: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation on the channel.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// A frame exceeds the size allowed in its direction.
    #[error("Message of {size} bytes exceeds limit of {max} bytes")]
    MessageTooLarge {
        /// Size of the offending message.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Download event cannot be turned into a request.
    #[error("Invalid download request: {message}")]
    InvalidRequest {
        /// Description of what is wrong with the event.
        message: String,
    },

    // ========================================================================
    // Browser Errors
    // ========================================================================
    /// The browser refused to cancel its own handling of a download.
    #[error("Failed to suppress download {download_id}: {message}")]
    SuppressFailed {
        /// The download that could not be cancelled.
        download_id: DownloadId,
        /// Reason reported by the browser.
        message: String,
    },

    // ========================================================================
    // Status Errors
    // ========================================================================
    /// Shared status storage failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid endpoint name error.
    #[inline]
    pub fn invalid_endpoint_name(name: impl Into<String>) -> Self {
        Self::InvalidEndpointName { name: name.into() }
    }

    /// Creates an endpoint unavailable error.
    #[inline]
    pub fn endpoint_unavailable(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EndpointUnavailable {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates a send-on-dead-channel error.
    #[inline]
    pub fn send_on_dead_channel(connection_id: ConnectionId) -> Self {
        Self::SendOnDeadChannel { connection_id }
    }

    /// Creates a disconnect error.
    #[inline]
    pub fn disconnected(detail: impl Into<String>) -> Self {
        Self::Disconnected {
            detail: detail.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a message too large error.
    #[inline]
    pub fn message_too_large(size: usize, max: usize) -> Self {
        Self::MessageTooLarge { size, max }
    }

    /// Creates an invalid request error.
    #[inline]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a suppression failure error.
    #[inline]
    pub fn suppress_failed(download_id: DownloadId, message: impl Into<String>) -> Self {
        Self::SuppressFailed {
            download_id,
            message: message.into(),
        }
    }

    /// Creates a storage error.
    #[inline]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::EndpointUnavailable { .. }
                | Self::SendOnDeadChannel { .. }
                | Self::Disconnected { .. }
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed after the connection is reopened.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SendOnDeadChannel { .. } | Self::Disconnected { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::endpoint_unavailable("com.example.host", "no manifest found");
        assert_eq!(
            err.to_string(),
            "Native endpoint com.example.host unavailable: no manifest found"
        );
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("messageBuffer must be > 0");
        assert_eq!(
            err.to_string(),
            "Configuration error: messageBuffer must be > 0"
        );
    }

    #[test]
    fn test_suppress_failed_display() {
        let err = Error::suppress_failed(DownloadId::new(7), "download already complete");
        assert_eq!(
            err.to_string(),
            "Failed to suppress download 7: download already complete"
        );
    }

    #[test]
    fn test_is_connection_error() {
        let unavailable = Error::endpoint_unavailable("a.b", "missing");
        let dead = Error::send_on_dead_channel(ConnectionId::next());
        let gone = Error::disconnected("broken pipe");
        let other = Error::config("test");

        assert!(unavailable.is_connection_error());
        assert!(dead.is_connection_error());
        assert!(gone.is_connection_error());
        assert!(!other.is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        let dead = Error::send_on_dead_channel(ConnectionId::next());
        let unavailable = Error::endpoint_unavailable("a.b", "missing");

        assert!(dead.is_recoverable());
        assert!(!unavailable.is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::BrokenPipe, "broken pipe");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
