//! Browser download subsystem seam.
//!
//! The embedder forwards the browser's download-created events through a
//! [`DownloadEmitter`] and implements [`Downloads`] to cancel a download.
//!
//! # Example
//!
//! ```ignore
//! let (emitter, events) = download_channel();
//! browser.on_download_created(move |item| { emitter.emit(item); });
//! bridge.run(events).await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::Result;
use crate::identifiers::DownloadId;
use crate::protocol::Header;

// ============================================================================
// DownloadState
// ============================================================================

/// Browser-side state of a download when the event was observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    /// Transfer running.
    #[default]
    InProgress,
    /// Transfer stopped with an error.
    Interrupted,
    /// Transfer finished.
    Complete,
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InProgress => "in_progress",
            Self::Interrupted => "interrupted",
            Self::Complete => "complete",
        })
    }
}

// ============================================================================
// DownloadItem
// ============================================================================

/// A download-created event as reported by the browser.
///
/// Every field but `id` and `url` is optional and passed through as present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadItem {
    /// Browser-assigned download identity.
    pub id: DownloadId,

    /// Source URL.
    pub url: String,

    /// Suggested filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,

    /// Referrer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,

    /// Request headers, in browser order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<Header>>,

    /// Transfer state at event time.
    #[serde(default)]
    pub state: DownloadState,
}

impl DownloadItem {
    /// Creates an in-progress item with only the required fields.
    #[must_use]
    pub fn new(id: DownloadId, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            filename: None,
            mime: None,
            referrer: None,
            headers: None,
            state: DownloadState::default(),
        }
    }

    /// Sets the suggested filename.
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Sets the MIME type.
    #[must_use]
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// Sets the referrer.
    #[must_use]
    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    /// Sets the request headers.
    #[must_use]
    pub fn with_headers(mut self, headers: Vec<Header>) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Sets the transfer state.
    #[must_use]
    pub fn with_state(mut self, state: DownloadState) -> Self {
        self.state = state;
        self
    }
}

// ============================================================================
// Downloads
// ============================================================================

/// Operations on the browser's download subsystem.
#[async_trait]
pub trait Downloads: Send + Sync {
    /// Cancels the browser's own handling of download `id`.
    ///
    /// Resolves once the browser has confirmed the cancellation.
    ///
    /// # Errors
    ///
    /// Returns an error if the download is already complete, was cancelled
    /// elsewhere, or the browser denies the call.
    async fn cancel(&self, id: DownloadId) -> Result<()>;
}

// ============================================================================
// Event channel
// ============================================================================

/// Creates the channel download-created events travel through.
#[must_use]
pub fn download_channel() -> (DownloadEmitter, DownloadEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DownloadEmitter { tx }, DownloadEvents { rx })
}

/// Sending half handed to the browser event listener.
#[derive(Debug, Clone)]
pub struct DownloadEmitter {
    tx: mpsc::UnboundedSender<DownloadItem>,
}

impl DownloadEmitter {
    /// Forwards a download-created event.
    ///
    /// Returns `false` if the bridge no longer listens.
    pub fn emit(&self, item: DownloadItem) -> bool {
        trace!(download_id = %item.id, "Download event emitted");
        self.tx.send(item).is_ok()
    }
}

/// Download-created events in browser order.
///
/// Ends when every [`DownloadEmitter`] is dropped.
#[derive(Debug)]
pub struct DownloadEvents {
    rx: mpsc::UnboundedReceiver<DownloadItem>,
}

impl DownloadEvents {
    /// Receives the next event.
    pub async fn recv(&mut self) -> Option<DownloadItem> {
        self.rx.recv().await
    }
}

impl Stream for DownloadEvents {
    type Item = DownloadItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::StreamExt;
    use serde_json::json;

    #[test]
    fn test_item_from_browser_json() {
        let item: DownloadItem = serde_json::from_value(json!({
            "id": 7,
            "url": "https://x/test.zip",
            "filename": "test.zip",
            "mime": "application/zip",
            "state": "in_progress",
            "bytesReceived": 0
        }))
        .unwrap();

        assert_eq!(item.id, DownloadId::new(7));
        assert_eq!(item.filename.as_deref(), Some("test.zip"));
        assert_eq!(item.mime.as_deref(), Some("application/zip"));
        assert_eq!(item.referrer, None);
        assert_eq!(item.state, DownloadState::InProgress);
    }

    #[test]
    fn test_item_state_defaults() {
        let item: DownloadItem =
            serde_json::from_value(json!({ "id": 1, "url": "https://x/a" })).unwrap();
        assert_eq!(item.state, DownloadState::InProgress);
        assert_eq!(DownloadState::Complete.to_string(), "complete");
    }

    #[tokio::test]
    async fn test_events_arrive_in_order_and_end() {
        let (emitter, mut events) = download_channel();
        assert!(emitter.emit(DownloadItem::new(DownloadId::new(1), "https://x/1")));
        assert!(emitter.emit(DownloadItem::new(DownloadId::new(2), "https://x/2")));
        drop(emitter);

        let ids: Vec<_> = events.by_ref().map(|item| item.id.as_u64()).collect().await;
        assert_eq!(ids, vec![1, 2]);
        assert!(events.recv().await.is_none());
    }

    #[test]
    fn test_emit_after_receiver_dropped() {
        let (emitter, events) = download_channel();
        drop(events);
        assert!(!emitter.emit(DownloadItem::new(DownloadId::new(1), "https://x/1")));
    }
}
