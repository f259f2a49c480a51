//! Type-safe identifiers for bridge entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Source |
//! |------|--------|
//! | [`DownloadId`] | Assigned by the browser's download subsystem |
//! | [`ConnectionId`] | Assigned locally, unique per process |
//! | [`EndpointName`] | Registered name of the native handler |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Native messaging host naming rule: dot-separated ASCII word segments.
static ENDPOINT_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?-u:\w)+(\.(?-u:\w)+)*$").expect("endpoint name pattern is valid")
});

/// Counter for locally assigned connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// DownloadId
// ============================================================================

/// Identity of a browser download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadId(u64);

impl DownloadId {
    /// Wraps a browser-assigned download ID.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ConnectionId
// ============================================================================

/// Identity of one native channel instance.
///
/// IDs are never reused within a process, so a stale handle can always be
/// told apart from its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next connection ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================================================
// EndpointName
// ============================================================================

/// Registered name of a native handler, e.g. `com.netmanthan.nativemessaging`.
///
/// Must consist of word characters separated by single dots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EndpointName(String);

impl EndpointName {
    /// Validates and wraps an endpoint name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpointName`] if the name breaks the naming rule.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if ENDPOINT_NAME_PATTERN.is_match(&name) {
            Ok(Self(name))
        } else {
            Err(Error::invalid_endpoint_name(name))
        }
    }

    /// Returns the name as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the manifest file name for this endpoint (`<name>.json`).
    #[inline]
    #[must_use]
    pub fn manifest_file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl fmt::Display for EndpointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EndpointName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for EndpointName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<EndpointName> for String {
    fn from(value: EndpointName) -> Self {
        value.0
    }
}

// ============================================================================
// Tests
// ============================================================================
