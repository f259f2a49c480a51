//! Native channel connection and event loop.
//!
//! A [`Connection`] owns one channel to the native handler. It spawns two
//! tokio tasks:
//!
//! - the event loop, which writes outbound frames and decides when the
//!   connection is over
//! - the reader, which decodes inbound frames and feeds the message stream
//!
//! # Lifecycle
//!
//! ```text
//! live ──send()/responses──► live ──EOF / I/O error / protocol error──► dead (Error)
//!   │                                                                      ▲
//!   └────────────────────────── close() ──────────────────────► dead (Normal)
//! ```
//!
//! On termination the liveness flag is cleared and the terminate hook runs
//! (the manager publishes the new state there) as soon as the event loop
//! stops, before any teardown await. Closing the handler's pipes and reaping
//! the process follow, and only then are [`Connection::on_disconnect`]
//! waiters released.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};

use futures_util::Stream;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, EndpointName};
use crate::protocol::{NativeResponse, codec};

use super::endpoint::{ChannelIo, ProcessGuard};

// ============================================================================
// Constants
// ============================================================================

/// Default capacity of the inbound message buffer.
pub const DEFAULT_MESSAGE_BUFFER: usize = 64;

/// Time a handler gets to exit after its stdin is closed.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

// ============================================================================
// Types
// ============================================================================

/// Callback run once, inside the event loop, when the connection dies.
pub(crate) type TerminateHook = Box<dyn FnOnce(ConnectionId, &DisconnectReason) + Send>;

// ============================================================================
// DisconnectReason
// ============================================================================

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Closed explicitly by the bridge.
    Normal,
    /// Handler exit, broken pipe, protocol violation.
    Error {
        /// Human readable detail.
        detail: String,
    },
}

impl DisconnectReason {
    /// Creates an error disconnect.
    #[inline]
    #[must_use]
    pub fn error(detail: impl Into<String>) -> Self {
        Self::Error {
            detail: detail.into(),
        }
    }

    /// Returns `true` for error disconnects.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Returns the error detail, if any.
    #[inline]
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Normal => None,
            Self::Error { detail } => Some(detail),
        }
    }
}

impl DisconnectReason {
    /// The reason as an [`Error::Disconnected`], for error disconnects.
    #[must_use]
    pub fn to_error(&self) -> Option<Error> {
        self.detail().map(Error::disconnected)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("closed normally"),
            Self::Error { detail } => write!(f, "error: {detail}"),
        }
    }
}

// ============================================================================
// ReaderOutcome
// ============================================================================

/// How the reader task stopped.
enum ReaderOutcome {
    /// Clean end-of-stream: the handler closed its stdout.
    Eof,
    /// Read or protocol failure.
    Failed(String),
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write an encoded frame.
    Send(Vec<u8>),
    /// Close the channel normally.
    Close,
}

// ============================================================================
// MessageStream
// ============================================================================

/// Inbound responses of one connection, in arrival order.
///
/// Ends after the connection is gone.
pub struct MessageStream {
    connection_id: ConnectionId,
    rx: mpsc::Receiver<NativeResponse>,
}

impl MessageStream {
    /// The connection these messages belong to.
    #[inline]
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Receives the next response.
    pub async fn recv(&mut self) -> Option<NativeResponse> {
        self.rx.recv().await
    }
}

impl Stream for MessageStream {
    type Item = NativeResponse;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageStream")
            .field("connection_id", &self.connection_id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Shared state of a connection.
struct ConnectionInner {
    id: ConnectionId,
    endpoint: EndpointName,
    created_at: SystemTime,
    /// Cleared when the event loop ends.
    live: Arc<AtomicBool>,
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Handed out once by `on_message`.
    messages: Mutex<Option<mpsc::Receiver<NativeResponse>>>,
    /// Set exactly once, after teardown finished.
    disconnect_rx: watch::Receiver<Option<DisconnectReason>>,
}

/// Channel to a native handler.
///
/// Cheap to clone; all clones refer to the same channel.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and can be shared across tasks.
/// `send` never waits for the handler.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("endpoint", &self.inner.endpoint)
            .field("live", &self.is_live())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Creates a connection over `io` and spawns its event loop.
    ///
    /// `message_buffer` bounds the inbound queue; when it is full the reader
    /// stops pulling from the handler until the consumer catches up.
    pub fn new(endpoint: EndpointName, io: ChannelIo, message_buffer: usize) -> Self {
        Self::with_hook(ConnectionId::next(), endpoint, io, message_buffer, None)
    }

    /// Creates a connection with a terminate hook.
    pub(crate) fn with_hook(
        id: ConnectionId,
        endpoint: EndpointName,
        io: ChannelIo,
        message_buffer: usize,
        on_terminate: Option<TerminateHook>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::channel(message_buffer.max(1));
        let (disconnect_tx, disconnect_rx) = watch::channel(None);
        let live = Arc::new(AtomicBool::new(true));

        tokio::spawn(Self::run_event_loop(
            id,
            io,
            command_rx,
            message_tx,
            Arc::clone(&live),
            disconnect_tx,
            on_terminate,
        ));

        info!(connection_id = %id, endpoint = %endpoint, "Native connection opened");

        Self {
            inner: Arc::new(ConnectionInner {
                id,
                endpoint,
                created_at: SystemTime::now(),
                live,
                command_tx,
                messages: Mutex::new(Some(message_rx)),
                disconnect_rx,
            }),
        }
    }

    /// Connection identity.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Endpoint this connection talks to.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &EndpointName {
        &self.inner.endpoint
    }

    /// When the connection was created.
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> SystemTime {
        self.inner.created_at
    }

    /// Returns `true` until the connection has terminated.
    #[inline]
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// The terminal reason, once the disconnect has fired.
    #[must_use]
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.inner.disconnect_rx.borrow().clone()
    }

    /// Enqueues `message` for delivery. Does not wait for any response.
    ///
    /// # Errors
    ///
    /// - [`Error::SendOnDeadChannel`] if the connection has terminated
    /// - [`Error::Json`] / [`Error::MessageTooLarge`] if encoding fails
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<()> {
        if !self.is_live() {
            return Err(Error::send_on_dead_channel(self.inner.id));
        }

        let frame = codec::encode(message)?;
        let len = frame.len();

        self.inner
            .command_tx
            .send(ConnectionCommand::Send(frame))
            .map_err(|_| Error::send_on_dead_channel(self.inner.id))?;

        trace!(connection_id = %self.inner.id, bytes = len, "Message queued");
        Ok(())
    }

    /// Takes the stream of inbound responses.
    ///
    /// Returns `None` on every call after the first.
    #[must_use]
    pub fn on_message(&self) -> Option<MessageStream> {
        self.inner
            .messages
            .lock()
            .take()
            .map(|rx| MessageStream {
                connection_id: self.inner.id,
                rx,
            })
    }

    /// Waits for the terminal event of this connection.
    ///
    /// Resolves immediately if it already happened; every waiter sees the
    /// same reason.
    pub async fn on_disconnect(&self) -> DisconnectReason {
        Self::wait_disconnect(self.inner.disconnect_rx.clone()).await
    }

    /// Like [`Connection::on_disconnect`], but the returned future does not
    /// keep the connection open while it waits.
    pub fn disconnect_signal(&self) -> impl Future<Output = DisconnectReason> + Send + 'static {
        Self::wait_disconnect(self.inner.disconnect_rx.clone())
    }

    async fn wait_disconnect(
        mut rx: watch::Receiver<Option<DisconnectReason>>,
    ) -> DisconnectReason {
        match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason
                .clone()
                .unwrap_or_else(|| DisconnectReason::error("connection task ended")),
            Err(_) => DisconnectReason::error("connection task ended"),
        }
    }

    /// Closes the connection normally.
    ///
    /// No-op if it is already dead.
    pub fn close(&self) {
        let _ = self.inner.command_tx.send(ConnectionCommand::Close);
    }

    /// Event loop that handles channel I/O.
    async fn run_event_loop(
        id: ConnectionId,
        io: ChannelIo,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        message_tx: mpsc::Sender<NativeResponse>,
        live: Arc<AtomicBool>,
        disconnect_tx: watch::Sender<Option<DisconnectReason>>,
        on_terminate: Option<TerminateHook>,
    ) {
        let ChannelIo {
            reader,
            mut writer,
            mut process,
        } = io;

        let (reader_done_tx, mut reader_done_rx) = oneshot::channel();
        let reader_task = tokio::spawn(Self::run_reader(id, reader, message_tx, reader_done_tx));

        let reason = loop {
            tokio::select! {
                outcome = &mut reader_done_rx => {
                    break match outcome {
                        Ok(ReaderOutcome::Eof) => Self::exit_reason(process.as_mut()),
                        Ok(ReaderOutcome::Failed(detail)) => DisconnectReason::error(detail),
                        Err(_) => DisconnectReason::error("reader task ended"),
                    };
                }

                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send(frame)) => {
                            if let Err(e) = codec::write_frame(&mut writer, &frame).await {
                                break DisconnectReason::error(e.to_string());
                            }
                            trace!(connection_id = %id, bytes = frame.len(), "Frame written");
                        }

                        Some(ConnectionCommand::Close) => {
                            debug!(connection_id = %id, "Close command received");
                            break DisconnectReason::Normal;
                        }

                        None => {
                            debug!(connection_id = %id, "All connection handles dropped");
                            break DisconnectReason::Normal;
                        }
                    }
                }
            }
        };

        // Dead before the first await: sends fail from here on.
        live.store(false, Ordering::SeqCst);
        command_rx.close();
        reader_task.abort();

        let mut dropped = 0usize;
        while let Ok(command) = command_rx.try_recv() {
            if matches!(command, ConnectionCommand::Send(_)) {
                dropped += 1;
            }
        }
        if dropped > 0 {
            warn!(connection_id = %id, dropped, "Frames queued during termination were not written");
        }

        if let Some(hook) = on_terminate {
            hook(id, &reason);
        }

        match &reason {
            DisconnectReason::Normal => {
                info!(connection_id = %id, "Native connection closed");
            }
            DisconnectReason::Error { detail } => {
                warn!(connection_id = %id, detail = %detail, "Native connection lost");
            }
        }

        // Closing stdin is the handler's signal to exit.
        let _ = writer.shutdown().await;
        drop(writer);

        if let Some(process) = process.as_mut() {
            process.shutdown(CLOSE_GRACE).await;
        }

        disconnect_tx.send_replace(Some(reason));
    }

    /// Decodes inbound frames until the stream ends or breaks.
    async fn run_reader(
        id: ConnectionId,
        mut reader: Box<dyn AsyncRead + Send + Unpin>,
        message_tx: mpsc::Sender<NativeResponse>,
        done_tx: oneshot::Sender<ReaderOutcome>,
    ) {
        let outcome = loop {
            let body = match codec::read_frame(&mut reader, codec::MAX_INBOUND_MESSAGE_SIZE).await
            {
                Ok(Some(body)) => body,
                Ok(None) => break ReaderOutcome::Eof,
                Err(Error::Io(e)) => break ReaderOutcome::Failed(e.to_string()),
                Err(e) => break ReaderOutcome::Failed(format!("native host protocol violation: {e}")),
            };

            let response = match serde_json::from_slice::<NativeResponse>(&body) {
                Ok(response) => response,
                Err(e) => {
                    break ReaderOutcome::Failed(format!("invalid message from native host: {e}"));
                }
            };

            trace!(connection_id = %id, bytes = body.len(), "Response received");

            // Blocks while the buffer is full; a dropped consumer discards.
            if message_tx.send(response).await.is_err() {
                trace!(connection_id = %id, "Response discarded, no consumer");
            }
        };

        let _ = done_tx.send(outcome);
    }

    /// Builds the disconnect reason for a handler that closed its stdout.
    ///
    /// Includes the exit status only if the process has already exited.
    fn exit_reason(process: Option<&mut ProcessGuard>) -> DisconnectReason {
        let status = process.and_then(ProcessGuard::try_exit_status);

        match status {
            Some(status) => {
                DisconnectReason::error(format!("native host has exited with {status}"))
            }
            None => DisconnectReason::error("native host has exited"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
