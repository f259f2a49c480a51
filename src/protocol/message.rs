//! Messages carried on the native channel.
//!
//! # Outbound (bridge → handler)
//!
//! ```json
//! {
//!   "action": "download",
//!   "url": "https://x/test.zip",
//!   "filename": "test.zip",
//!   "mimeType": "application/zip",
//!   "referrer": "https://x/",
//!   "headers": [{ "name": "Cookie", "value": "a=b" }]
//! }
//! ```
//!
//! Only `url` is required; absent fields are omitted, and `action` is only
//! present when the bridge is configured to include it.
//!
//! # Inbound (handler → bridge)
//!
//! Any valid JSON document. The bridge does not interpret it.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Value of the `action` discriminator for download requests.
pub const DOWNLOAD_ACTION: &str = "download";

// ============================================================================
// Header
// ============================================================================

/// A single request header, kept in browser order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

impl Header {
    /// Creates a header.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// ============================================================================
// DownloadRequest
// ============================================================================

/// Normalized, immutable description of an intercepted download.
///
/// Built only from a download the browser has already given up
/// (see [`crate::browser::DownloadInterceptor`]), so there is no public
/// constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    referrer: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<Vec<Header>>,
}

impl DownloadRequest {
    /// Creates a request. Callers must have suppressed the browser download.
    pub(crate) fn new(
        url: String,
        filename: Option<String>,
        mime_type: Option<String>,
        referrer: Option<String>,
        headers: Option<Vec<Header>>,
    ) -> Result<Self> {
        validate_url(&url)?;

        Ok(Self {
            url,
            filename,
            mime_type,
            referrer,
            headers,
        })
    }

    /// Source URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Suggested filename.
    #[inline]
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// MIME type reported by the browser.
    #[inline]
    #[must_use]
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Referrer of the download.
    #[inline]
    #[must_use]
    pub fn referrer(&self) -> Option<&str> {
        self.referrer.as_deref()
    }

    /// Request headers in browser order.
    #[inline]
    #[must_use]
    pub fn headers(&self) -> Option<&[Header]> {
        self.headers.as_deref()
    }
}

/// Checks that `url` is an absolute URL.
///
/// # Errors
///
/// Returns [`Error::InvalidRequest`] for empty or unparsable URLs.
pub fn validate_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(Error::invalid_request("download has no URL"));
    }

    Url::parse(url)
        .map(|_| ())
        .map_err(|e| Error::invalid_request(format!("unparsable URL {url:?}: {e}")))
}

// ============================================================================
// OutboundMessage
// ============================================================================

/// Wire form of a [`DownloadRequest`], optionally tagged with an action.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage<'a> {
    /// Protocol discriminator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<&'static str>,

    /// The request being delivered.
    #[serde(flatten)]
    pub request: &'a DownloadRequest,
}

impl<'a> OutboundMessage<'a> {
    /// Wraps a request, tagging it with [`DOWNLOAD_ACTION`] if asked to.
    #[inline]
    #[must_use]
    pub fn new(request: &'a DownloadRequest, include_action: bool) -> Self {
        Self {
            action: include_action.then_some(DOWNLOAD_ACTION),
            request,
        }
    }
}

// ============================================================================
// NativeResponse
// ============================================================================

/// Opaque document received from the native handler.
///
/// Responses are not correlated with requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeResponse(Value);

impl NativeResponse {
    /// Wraps a JSON document.
    #[inline]
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Returns the underlying document.
    #[inline]
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consumes the response, returning the document.
    #[inline]
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Returns a top-level string field, if the document is an object.
    #[inline]
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

impl From<Value> for NativeResponse {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

// ============================================================================
// Tests
// ============================================================================
