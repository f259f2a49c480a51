//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde_json::Value;

use netmanthan_bridge::transport::LoopbackHosts;
use netmanthan_bridge::{
    Bridge, ConnectPolicy, ConnectionId, DiagnosticSink, DisconnectReason, DownloadId,
    DownloadItem, Downloads, Endpoint, Error, LoopbackEndpoint, MemoryStore, NativeResponse,
    Result, StatusStore,
};

// ============================================================================
// Tracing
// ============================================================================

/// Routes `tracing` output through the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

// ============================================================================
// EventLog
// ============================================================================

/// Ordered record of side effects across fakes.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

// ============================================================================
// FakeDownloads
// ============================================================================

/// Browser download subsystem that records cancel calls.
pub struct FakeDownloads {
    log: EventLog,
    refused: Mutex<FxHashSet<DownloadId>>,
    delay: Duration,
}

impl FakeDownloads {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            refused: Mutex::new(FxHashSet::default()),
            delay: Duration::ZERO,
        }
    }

    /// Cancel calls take `delay` before the browser confirms.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes the cancel call for `id` fail, as for a finished download.
    pub fn refuse(&self, id: DownloadId) {
        self.refused.lock().insert(id);
    }

    /// IDs for which a cancel was confirmed.
    pub fn cancelled(&self) -> Vec<DownloadId> {
        self.log
            .entries()
            .iter()
            .filter_map(|e| e.strip_prefix("cancelled:"))
            .filter_map(|id| id.parse().ok())
            .map(DownloadId::new)
            .collect()
    }
}

#[async_trait]
impl Downloads for FakeDownloads {
    async fn cancel(&self, id: DownloadId) -> Result<()> {
        self.log.push(format!("cancel:{id}"));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.refused.lock().contains(&id) {
            self.log.push(format!("refused:{id}"));
            return Err(Error::suppress_failed(id, "Download is already complete"));
        }

        self.log.push(format!("cancelled:{id}"));
        Ok(())
    }
}

// ============================================================================
// RecordingSink
// ============================================================================

/// Diagnostic sink keeping everything it is handed.
#[derive(Default)]
pub struct RecordingSink {
    pub responses: Mutex<Vec<Value>>,
    pub disconnects: Mutex<Vec<(ConnectionId, DisconnectReason)>>,
}

impl RecordingSink {
    /// Waits until `n` responses have been recorded.
    pub async fn wait_for_responses(&self, n: usize) -> Vec<Value> {
        for _ in 0..400 {
            if self.responses.lock().len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.responses.lock().clone()
    }
}

impl DiagnosticSink for RecordingSink {
    fn on_response(&self, _: ConnectionId, response: &NativeResponse) {
        self.responses.lock().push(response.as_value().clone());
    }

    fn on_disconnect(&self, connection_id: ConnectionId, reason: &DisconnectReason) {
        self.disconnects.lock().push((connection_id, reason.clone()));
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A bridge wired to in-process fakes.
pub struct Harness {
    pub bridge: Bridge,
    pub launcher: Arc<LoopbackEndpoint>,
    pub hosts: LoopbackHosts,
    pub downloads: Arc<FakeDownloads>,
    pub sink: Arc<RecordingSink>,
    pub store: Arc<MemoryStore>,
    pub log: EventLog,
}

pub fn harness(policy: ConnectPolicy) -> Harness {
    harness_with(policy, Duration::ZERO)
}

pub fn harness_with(policy: ConnectPolicy, cancel_delay: Duration) -> Harness {
    init_tracing();

    let log = EventLog::default();
    let (launcher, hosts) = LoopbackEndpoint::new();
    let launcher = Arc::new(launcher);
    let downloads = Arc::new(FakeDownloads::new(log.clone()).with_delay(cancel_delay));
    let sink = Arc::new(RecordingSink::default());
    let store = Arc::new(MemoryStore::default());

    let bridge = Bridge::builder()
        .connect_policy(policy)
        .downloads(Arc::clone(&downloads) as Arc<dyn Downloads>)
        .launcher(Arc::clone(&launcher) as Arc<dyn Endpoint>)
        .status_store(Arc::clone(&store) as Arc<dyn StatusStore>)
        .sink(Arc::clone(&sink) as Arc<dyn DiagnosticSink>)
        .build()
        .expect("bridge");

    Harness {
        bridge,
        launcher,
        hosts,
        downloads,
        sink,
        store,
        log,
    }
}

/// The download from the happy-path scenario.
pub fn zip_download(id: u64) -> DownloadItem {
    DownloadItem::new(DownloadId::new(id), "https://x/test.zip")
        .with_filename("test.zip")
        .with_mime("application/zip")
}
