//! Bridge configuration.
//!
//! Loaded from camelCase JSON; every field has a default.
//!
//! ```json
//! {
//!   "endpoint": "com.netmanthan.nativemessaging",
//!   "manifestDirs": ["/home/me/.mozilla/native-messaging-hosts"],
//!   "extensionId": "netmanthan@example.org",
//!   "connectPolicy": "lazy",
//!   "messageBuffer": 64,
//!   "includeAction": true,
//!   "statusFile": "/home/me/.local/state/netmanthan/status.json"
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::EndpointName;
use crate::transport::DEFAULT_MESSAGE_BUFFER;

// ============================================================================
// Constants
// ============================================================================

/// Name the native handler registers under by default.
pub const DEFAULT_ENDPOINT: &str = "com.netmanthan.nativemessaging";

// ============================================================================
// ConnectPolicy
// ============================================================================

/// When the session connection is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectPolicy {
    /// Open at start-up.
    #[default]
    Eager,
    /// Open on the first intercepted download.
    Lazy,
}

// ============================================================================
// BridgeConfig
// ============================================================================

/// Settings of a [`crate::bridge::Bridge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct BridgeConfig {
    /// Registered name of the native handler.
    pub endpoint: String,

    /// Directories searched for the host manifest. Empty means the platform
    /// defaults.
    pub manifest_dirs: Vec<PathBuf>,

    /// Extension id passed to the handler and checked against the manifest.
    pub extension_id: Option<String>,

    /// When the connection is opened.
    pub connect_policy: ConnectPolicy,

    /// Capacity of the inbound response buffer.
    pub message_buffer: usize,

    /// Tag outbound messages with `"action": "download"`.
    pub include_action: bool,

    /// Persist the connection state to this file instead of memory.
    pub status_file: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            manifest_dirs: Vec::new(),
            extension_id: None,
            connect_policy: ConnectPolicy::default(),
            message_buffer: DEFAULT_MESSAGE_BUFFER,
            include_action: false,
            status_file: None,
        }
    }
}

impl BridgeConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the document does not parse or a value is out
    ///   of range
    /// - [`Error::InvalidEndpointName`] if `endpoint` breaks the naming rule
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("invalid bridge configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    ///
    /// # Errors
    ///
    /// As [`BridgeConfig::from_json_str`], plus [`Error::Config`] if the file
    /// cannot be read.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {e}", path.display())))?;

        debug!(path = %path.display(), "Loading bridge configuration");
        Self::from_json_str(&json)
    }

    /// Checks values serde cannot.
    ///
    /// # Errors
    ///
    /// See [`BridgeConfig::from_json_str`].
    pub fn validate(&self) -> Result<()> {
        self.endpoint_name()?;

        if self.message_buffer == 0 {
            return Err(Error::config("messageBuffer must be at least 1"));
        }

        Ok(())
    }

    /// The validated endpoint name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpointName`] if `endpoint` breaks the naming
    /// rule.
    pub fn endpoint_name(&self) -> Result<EndpointName> {
        EndpointName::new(self.endpoint.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
