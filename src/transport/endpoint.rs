//! Native handler endpoints.
//!
//! An [`Endpoint`] turns an [`EndpointName`] into a live byte channel
//! ([`ChannelIo`]). Two implementations are provided:
//!
//! | Type | Channel |
//! |------|---------|
//! | [`ManifestEndpoint`] | Child process resolved through a host manifest, stdio pipes |
//! | [`LoopbackEndpoint`] | In-process handler over a duplex pipe |
//!
//! # Host Manifest
//!
//! ```json
//! {
//!   "name": "com.netmanthan.nativemessaging",
//!   "description": "NetManthan download handler",
//!   "path": "/usr/lib/netmanthan/native-host",
//!   "type": "stdio",
//!   "allowed_extensions": ["netmanthan@example.org"]
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::EndpointName;
use crate::protocol::codec;

// ============================================================================
// Constants
// ============================================================================

/// Only stdio hosts are supported.
const MANIFEST_TYPE_STDIO: &str = "stdio";

/// Buffer size of the in-process duplex pipe.
const LOOPBACK_PIPE_SIZE: usize = 64 * 1024;

// ============================================================================
// Endpoint
// ============================================================================

/// Something that can launch or reach a native handler.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Establishes the byte channel to the handler registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndpointUnavailable`] when the handler cannot be
    /// found, is not permitted, or cannot be started.
    async fn launch(&self, name: &EndpointName) -> Result<ChannelIo>;
}

// ============================================================================
// ChannelIo
// ============================================================================

/// Raw halves of a native channel plus the process that serves it, if any.
pub struct ChannelIo {
    /// Bytes from the handler.
    pub(crate) reader: Box<dyn AsyncRead + Send + Unpin>,
    /// Bytes to the handler.
    pub(crate) writer: Box<dyn AsyncWrite + Send + Unpin>,
    /// Handler process, killed when the channel is torn down.
    pub(crate) process: Option<ProcessGuard>,
}

impl ChannelIo {
    /// Creates a channel from arbitrary reader/writer halves.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            process: None,
        }
    }

    /// Attaches the process serving this channel.
    #[must_use]
    pub fn with_process(mut self, child: Child) -> Self {
        self.process = Some(ProcessGuard::new(child));
        self
    }
}

// ============================================================================
// ProcessGuard
// ============================================================================

/// Guards a child process and ensures it is killed when dropped.
pub(crate) struct ProcessGuard {
    /// The child process handle.
    child: Option<Child>,
    /// Process ID for logging.
    pid: u32,
}

impl ProcessGuard {
    /// Creates a new process guard.
    fn new(child: Child) -> Self {
        let pid = child.id().unwrap_or(0);
        debug!(pid, "Process guard created");
        Self {
            child: Some(child),
            pid,
        }
    }

    /// Returns the exit status if the process has already exited.
    pub(crate) fn try_exit_status(&mut self) -> Option<ExitStatus> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(pid = self.pid, %status, "Native host exited");
                self.child = None;
                Some(status)
            }
            Ok(None) => None,
            Err(e) => {
                debug!(pid = self.pid, error = %e, "Failed to poll process");
                None
            }
        }
    }

    /// Waits up to `grace` for the process to exit on its own.
    pub(crate) async fn wait_exit(&mut self, grace: Duration) -> Option<ExitStatus> {
        let child = self.child.as_mut()?;
        match timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(pid = self.pid, %status, "Native host exited");
                self.child = None;
                Some(status)
            }
            Ok(Err(e)) => {
                debug!(pid = self.pid, error = %e, "Failed to wait for process");
                None
            }
            Err(_) => None,
        }
    }

    /// Gives the process `grace` to exit, then kills it.
    pub(crate) async fn shutdown(&mut self, grace: Duration) {
        if self.wait_exit(grace).await.is_some() {
            return;
        }

        if let Some(mut child) = self.child.take() {
            debug!(pid = self.pid, "Killing native host process");
            if let Err(e) = child.kill().await {
                debug!(pid = self.pid, error = %e, "Failed to kill process");
            }
            info!(pid = self.pid, "Native host process terminated");
        }
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take()
            && let Err(e) = child.start_kill()
        {
            debug!(pid = self.pid, error = %e, "Failed to send kill signal in Drop");
        }
    }
}

// ============================================================================
// HostManifest
// ============================================================================

/// Registration record of a native handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostManifest {
    /// Registered endpoint name.
    pub name: String,

    /// Human readable description.
    #[serde(default)]
    pub description: String,

    /// Executable to launch.
    pub path: PathBuf,

    /// Transport type (always `stdio`).
    #[serde(rename = "type")]
    pub host_type: String,

    /// Firefox extension IDs allowed to connect.
    #[serde(default)]
    pub allowed_extensions: Vec<String>,

    /// Chromium origins allowed to connect.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl HostManifest {
    /// Reads and parses a manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::Json`] on read/parse failure.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Returns `true` if `extension_id` may connect to this host.
    ///
    /// A manifest that lists nobody allows everybody.
    #[must_use]
    pub fn allows(&self, extension_id: &str) -> bool {
        if self.allowed_extensions.is_empty() && self.allowed_origins.is_empty() {
            return true;
        }

        let origin = format!("chrome-extension://{extension_id}/");
        self.allowed_extensions.iter().any(|id| id == extension_id)
            || self.allowed_origins.iter().any(|o| *o == origin)
    }
}

/// Per-user manifest directories for the current platform.
#[must_use]
pub fn default_manifest_dirs() -> Vec<PathBuf> {
    platform_manifest_dir().into_iter().collect()
}

#[cfg(target_os = "linux")]
fn platform_manifest_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".mozilla/native-messaging-hosts"))
}

#[cfg(target_os = "macos")]
fn platform_manifest_dir() -> Option<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join("Library/Application Support/Mozilla/NativeMessagingHosts"))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn platform_manifest_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|data| data.join("Mozilla").join("NativeMessagingHosts"))
}

// ============================================================================
// ManifestEndpoint
// ============================================================================

/// Launches native handlers registered through host manifests.
#[derive(Debug, Clone)]
pub struct ManifestEndpoint {
    /// Directories searched for `<name>.json`, in order.
    manifest_dirs: Vec<PathBuf>,
    /// Extension identity presented to the host.
    extension_id: Option<String>,
}

impl ManifestEndpoint {
    /// Creates an endpoint searching `manifest_dirs` in order.
    #[must_use]
    pub fn new(manifest_dirs: Vec<PathBuf>, extension_id: Option<String>) -> Self {
        Self {
            manifest_dirs,
            extension_id,
        }
    }

    /// Finds the manifest for `name`.
    fn locate(&self, name: &EndpointName) -> Option<PathBuf> {
        let file_name = name.manifest_file_name();
        self.manifest_dirs
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|path| path.is_file())
    }

    /// Loads and checks the manifest registered for `name`.
    fn resolve(&self, name: &EndpointName) -> Result<(PathBuf, HostManifest)> {
        let unavailable = |message: String| Error::endpoint_unavailable(name.as_str(), message);

        let manifest_path = self
            .locate(name)
            .ok_or_else(|| unavailable("no host manifest registered".into()))?;

        let manifest = HostManifest::from_file(&manifest_path).map_err(|e| {
            unavailable(format!(
                "invalid host manifest {}: {e}",
                manifest_path.display()
            ))
        })?;

        if manifest.name != name.as_str() {
            return Err(unavailable(format!(
                "manifest {} is registered as {:?}",
                manifest_path.display(),
                manifest.name
            )));
        }

        if manifest.host_type != MANIFEST_TYPE_STDIO {
            return Err(unavailable(format!(
                "unsupported host type {:?}",
                manifest.host_type
            )));
        }

        if let Some(extension_id) = &self.extension_id
            && !manifest.allows(extension_id)
        {
            return Err(unavailable(format!(
                "access to the native host is forbidden for {extension_id}"
            )));
        }

        Ok((manifest_path, manifest))
    }
}

#[async_trait]
impl Endpoint for ManifestEndpoint {
    async fn launch(&self, name: &EndpointName) -> Result<ChannelIo> {
        let (manifest_path, manifest) = self.resolve(name)?;

        let program = if manifest.path.is_absolute() {
            manifest.path.clone()
        } else {
            manifest_path
                .parent()
                .map(|dir| dir.join(&manifest.path))
                .unwrap_or_else(|| manifest.path.clone())
        };

        debug!(endpoint = %name, program = %program.display(), "Launching native host");

        let mut command = Command::new(&program);
        command
            .arg(&manifest_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if let Some(extension_id) = &self.extension_id {
            command.arg(extension_id);
        }

        let mut child = command.spawn().map_err(|e| {
            Error::endpoint_unavailable(
                name.as_str(),
                format!("failed to start {}: {e}", program.display()),
            )
        })?;

        if let Ok(Some(status)) = child.try_wait() {
            return Err(Error::endpoint_unavailable(
                name.as_str(),
                format!("native host exited during startup: {status}"),
            ));
        }

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(Error::endpoint_unavailable(
                name.as_str(),
                "native host stdio not captured",
            ));
        };

        info!(endpoint = %name, pid = child.id().unwrap_or(0), "Native host launched");

        Ok(ChannelIo::new(stdout, stdin).with_process(child))
    }
}

// ============================================================================
// LoopbackEndpoint
// ============================================================================

/// Serves the endpoint contract with an in-process handler.
///
/// Every successful launch hands the handler side of a fresh duplex pipe to
/// [`LoopbackHosts::accept`].
///
/// # Example
///
/// ```ignore
/// let (endpoint, mut hosts) = LoopbackEndpoint::new();
/// let connection = manager.open(&name).await?;
/// let mut host = hosts.accept().await.expect("launched");
/// let request = host.recv().await?;
/// host.reply(&serde_json::json!({ "status": "queued" })).await?;
/// ```
pub struct LoopbackEndpoint {
    /// Hands new handler sides to the embedder.
    hosts_tx: mpsc::UnboundedSender<HostChannel>,
    /// When set, launches fail with this message.
    refusal: Mutex<Option<String>>,
    /// Number of launch attempts.
    launches: AtomicUsize,
}

impl LoopbackEndpoint {
    /// Creates the endpoint and the receiver of handler sides.
    #[must_use]
    pub fn new() -> (Self, LoopbackHosts) {
        let (hosts_tx, hosts_rx) = mpsc::unbounded_channel();
        let endpoint = Self {
            hosts_tx,
            refusal: Mutex::new(None),
            launches: AtomicUsize::new(0),
        };
        (endpoint, LoopbackHosts { hosts_rx })
    }

    /// Makes subsequent launches fail, as if the handler were not registered.
    pub fn refuse(&self, message: impl Into<String>) {
        *self.refusal.lock() = Some(message.into());
    }

    /// Lets subsequent launches succeed again.
    pub fn accept_launches(&self) {
        *self.refusal.lock() = None;
    }

    /// Number of launch attempts so far, failed ones included.
    #[must_use]
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Endpoint for LoopbackEndpoint {
    async fn launch(&self, name: &EndpointName) -> Result<ChannelIo> {
        self.launches.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self.refusal.lock().clone() {
            return Err(Error::endpoint_unavailable(name.as_str(), message));
        }

        let (bridge_side, host_side) = tokio::io::duplex(LOOPBACK_PIPE_SIZE);
        let (fault_tx, fault_rx) = oneshot::channel();
        let (reader, writer) = tokio::io::split(bridge_side);

        let host = HostChannel {
            stream: host_side,
            fault_tx: Some(fault_tx),
        };

        self.hosts_tx.send(host).map_err(|_| {
            Error::endpoint_unavailable(name.as_str(), "no in-process handler is listening")
        })?;

        debug!(endpoint = %name, "Loopback host launched");

        Ok(ChannelIo::new(
            FaultReader {
                inner: reader,
                fault_rx: Some(fault_rx),
            },
            writer,
        ))
    }
}

/// Receiver of handler sides created by a [`LoopbackEndpoint`].
pub struct LoopbackHosts {
    hosts_rx: mpsc::UnboundedReceiver<HostChannel>,
}

impl LoopbackHosts {
    /// Waits for the next launched handler side.
    pub async fn accept(&mut self) -> Option<HostChannel> {
        self.hosts_rx.recv().await
    }

    /// Returns a launched handler side if one is pending.
    pub fn try_accept(&mut self) -> Option<HostChannel> {
        self.hosts_rx.try_recv().ok()
    }
}

// ============================================================================
// HostChannel
// ============================================================================

/// Handler side of a loopback channel.
///
/// Dropping it is equivalent to the handler process exiting.
pub struct HostChannel {
    stream: DuplexStream,
    fault_tx: Option<oneshot::Sender<io::Error>>,
}

impl HostChannel {
    /// Reads the next message sent by the bridge.
    ///
    /// Returns `Ok(None)` once the bridge has closed the channel.
    pub async fn recv(&mut self) -> Result<Option<Value>> {
        match codec::read_frame(&mut self.stream, codec::MAX_OUTBOUND_MESSAGE_SIZE).await? {
            Some(body) => Ok(Some(serde_json::from_slice(&body)?)),
            None => Ok(None),
        }
    }

    /// Sends a document to the bridge.
    pub async fn reply<T: Serialize + ?Sized>(&mut self, message: &T) -> Result<()> {
        let frame = codec::encode(message)?;
        codec::write_frame(&mut self.stream, &frame).await?;
        Ok(())
    }

    /// Sends raw bytes, bypassing framing.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        codec::write_frame(&mut self.stream, bytes).await?;
        Ok(())
    }

    /// Makes the bridge's next read fail with `kind` / `message`.
    pub fn fail(&mut self, kind: ErrorKind, message: &str) {
        if let Some(tx) = self.fault_tx.take()
            && tx.send(io::Error::new(kind, message.to_string())).is_err()
        {
            warn!("Loopback channel already closed, fault not delivered");
        }
    }
}

// ============================================================================
// FaultReader
// ============================================================================

/// Reader that yields an injected error before any further data.
struct FaultReader<R> {
    inner: R,
    fault_rx: Option<oneshot::Receiver<io::Error>>,
}

impl<R: AsyncRead + Unpin> AsyncRead for FaultReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(fault_rx) = self.fault_rx.as_mut() {
            let polled = Pin::new(fault_rx).poll(cx);
            match polled {
                Poll::Ready(Ok(err)) => {
                    self.fault_rx = None;
                    return Poll::Ready(Err(err));
                }
                Poll::Ready(Err(_)) => self.fault_rx = None,
                Poll::Pending => {}
            }
        }

        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

// ============================================================================
// Tests
// ============================================================================
