//! Download interception.
//!
//! Turns a download-created event into a [`DownloadRequest`]. The browser's
//! own handling is cancelled first, and the request only exists once that
//! cancellation has been confirmed.
//!
//! ```text
//! DownloadItem ──validate url──► cancel(id).await ──ok──► DownloadRequest
//!                     │                   │
//!                     └── ignored         └── dropped (SuppressFailed)
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::DownloadRequest;
use crate::protocol::message::validate_url;

use super::download::{DownloadItem, Downloads};

// ============================================================================
// DownloadInterceptor
// ============================================================================

/// Suppresses browser downloads and builds requests from them.
#[derive(Clone)]
pub struct DownloadInterceptor {
    downloads: Arc<dyn Downloads>,
}

impl DownloadInterceptor {
    /// Creates an interceptor cancelling through `downloads`.
    #[must_use]
    pub fn new(downloads: Arc<dyn Downloads>) -> Self {
        Self { downloads }
    }

    /// Intercepts one download.
    ///
    /// Items without a usable URL are left to the browser. Otherwise the
    /// download is cancelled and, once the browser confirms, the request is
    /// built from the item's fields.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] if the URL is missing or unparsable; no
    ///   cancel call is made
    /// - [`Error::SuppressFailed`] if the browser refused to cancel; no
    ///   request is built
    pub async fn intercept(&self, item: DownloadItem) -> Result<DownloadRequest> {
        validate_url(&item.url)?;

        debug!(download_id = %item.id, state = %item.state, "Suppressing browser download");

        self.downloads.cancel(item.id).await.map_err(|e| match e {
            e @ Error::SuppressFailed { .. } => e,
            other => Error::suppress_failed(item.id, other.to_string()),
        })?;

        let DownloadItem {
            id,
            url,
            filename,
            mime,
            referrer,
            headers,
            ..
        } = item;

        let request = DownloadRequest::new(url, filename, mime, referrer, headers)?;
        debug!(download_id = %id, url = request.url(), "Download request built");

        Ok(request)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::identifiers::DownloadId;
    use crate::protocol::Header;

    #[derive(Default)]
    struct FakeDownloads {
        cancelled: Mutex<Vec<DownloadId>>,
        refuse: bool,
    }

    #[async_trait]
    impl Downloads for FakeDownloads {
        async fn cancel(&self, id: DownloadId) -> Result<()> {
            self.cancelled.lock().push(id);
            if self.refuse {
                return Err(Error::invalid_request("Download is already complete"));
            }
            Ok(())
        }
    }

    fn item() -> DownloadItem {
        DownloadItem::new(DownloadId::new(3), "https://x/test.zip")
            .with_filename("test.zip")
            .with_mime("application/zip")
    }

    #[tokio::test]
    async fn test_cancels_then_builds() {
        let downloads = Arc::new(FakeDownloads::default());
        let interceptor = DownloadInterceptor::new(Arc::clone(&downloads) as Arc<dyn Downloads>);

        let request = interceptor.intercept(item()).await.expect("request");

        assert_eq!(*downloads.cancelled.lock(), vec![DownloadId::new(3)]);
        assert_eq!(request.url(), "https://x/test.zip");
        assert_eq!(request.filename(), Some("test.zip"));
        assert_eq!(request.mime_type(), Some("application/zip"));
        assert_eq!(request.referrer(), None);
    }

    #[tokio::test]
    async fn test_headers_pass_through_in_order() {
        let downloads = Arc::new(FakeDownloads::default());
        let interceptor = DownloadInterceptor::new(downloads);

        let headers = vec![Header::new("Cookie", "a=b"), Header::new("Accept", "*/*")];
        let request = interceptor
            .intercept(item().with_headers(headers.clone()))
            .await
            .expect("request");

        assert_eq!(request.headers(), Some(headers.as_slice()));
    }

    #[tokio::test]
    async fn test_suppression_failure_drops_event() {
        let downloads = Arc::new(FakeDownloads {
            refuse: true,
            ..FakeDownloads::default()
        });
        let interceptor = DownloadInterceptor::new(Arc::clone(&downloads) as Arc<dyn Downloads>);

        let err = interceptor.intercept(item()).await.unwrap_err();

        assert!(matches!(
            err,
            Error::SuppressFailed { download_id, .. } if download_id == DownloadId::new(3)
        ));
        assert_eq!(downloads.cancelled.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_cancelled() {
        let downloads = Arc::new(FakeDownloads::default());
        let interceptor = DownloadInterceptor::new(Arc::clone(&downloads) as Arc<dyn Downloads>);

        let err = interceptor
            .intercept(DownloadItem::new(DownloadId::new(4), "not a url"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidRequest { .. }));
        assert!(downloads.cancelled.lock().is_empty());
    }
}
