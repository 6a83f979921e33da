//! Transports carrying frames between the client and the peer.
//!
//! Both variants expose the same capability set: `connect`, `send(opcode,
//! payload)`, `close`, and a stream of [`TransportEvent`]s delivered on the
//! channel handed to [`Transport::new`]. Each open connection runs a read
//! pump and a write pump sharing one cancellation token.

mod message;
mod socket;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::RpcError;
use crate::types::{ConnectionOptions, TransportKind};

pub use message::MessageTransport;
pub use socket::SocketTransport;

/// Capacity of the outbound queue feeding a write pump.
const WRITE_QUEUE: usize = 64;

/// How long `close` waits for the pumps to flush and exit.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Events emitted by a transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The connection is established. At most once per `connect`.
    Open,
    /// One inbound frame, in receipt order.
    Message { opcode: i32, payload: Value },
    /// A recoverable protocol error or a read/write failure.
    Error(Arc<RpcError>),
    /// The connection is gone. Exactly once per `Open`.
    Close,
}

/// Sending half of the event channel, shared by a transport and its pumps.
#[derive(Clone)]
pub(crate) struct EventSink {
    tx: mpsc::Sender<TransportEvent>,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::Sender<TransportEvent>) -> Self {
        Self { tx }
    }

    pub(crate) async fn open(&self) {
        let _ = self.tx.send(TransportEvent::Open).await;
    }

    pub(crate) async fn message(&self, opcode: i32, payload: Value) {
        let _ = self
            .tx
            .send(TransportEvent::Message { opcode, payload })
            .await;
    }

    pub(crate) async fn error(&self, err: RpcError) {
        let _ = self.tx.send(TransportEvent::Error(Arc::new(err))).await;
    }

    pub(crate) async fn close(&self) {
        let _ = self.tx.send(TransportEvent::Close).await;
    }
}

/// A live connection: the write queue plus the pump tasks serving it.
pub(crate) struct Link<M> {
    write_tx: mpsc::Sender<M>,
    cancel: CancellationToken,
    read_handle: JoinHandle<()>,
    write_handle: JoinHandle<()>,
}

impl<M> Link<M> {
    pub(crate) fn new(
        write_tx: mpsc::Sender<M>,
        cancel: CancellationToken,
        read_handle: JoinHandle<()>,
        write_handle: JoinHandle<()>,
    ) -> Self {
        Self {
            write_tx,
            cancel,
            read_handle,
            write_handle,
        }
    }

    /// Either pump cancels the token when the connection fails, so a
    /// cancelled token means the link is unusable.
    pub(crate) fn is_open(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    pub(crate) async fn send(&self, msg: M) -> Result<(), RpcError> {
        if !self.is_open() {
            return Err(RpcError::Closed);
        }
        self.write_tx.send(msg).await.map_err(|_| RpcError::Closed)
    }

    /// Stops both pumps, giving the write pump a moment to flush.
    pub(crate) async fn close(&mut self) {
        self.cancel.cancel();
        let (read, write) = (&mut self.read_handle, &mut self.write_handle);
        let _ = tokio::time::timeout(CLOSE_GRACE, async move {
            let _ = write.await;
            let _ = read.await;
        })
        .await;
    }
}

impl<M> Drop for Link<M> {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.read_handle.abort();
        self.write_handle.abort();
    }
}

/// Transport selected once from [`ConnectionOptions::transport`].
pub enum Transport {
    Socket(SocketTransport),
    Message(MessageTransport),
}

impl Transport {
    /// Builds the configured variant. Events for every connection it opens
    /// are delivered on `events`.
    pub fn new(options: &ConnectionOptions, events: mpsc::Sender<TransportEvent>) -> Self {
        let sink = EventSink::new(events);
        match options.transport {
            TransportKind::Socket => Transport::Socket(SocketTransport::new(options, sink)),
            TransportKind::Message => Transport::Message(MessageTransport::new(options, sink)),
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::Socket(_) => TransportKind::Socket,
            Transport::Message(_) => TransportKind::Message,
        }
    }

    /// Human-readable endpoint, for logs.
    pub fn endpoint(&self) -> String {
        match self {
            Transport::Socket(t) => t.path().display().to_string(),
            Transport::Message(t) => t.url().to_string(),
        }
    }

    pub async fn connect(&mut self) -> Result<(), RpcError> {
        match self {
            Transport::Socket(t) => t.connect().await,
            Transport::Message(t) => t.connect().await,
        }
    }

    /// Sends one frame. Fails with [`RpcError::Closed`] if not open.
    pub async fn send<T: Serialize + ?Sized>(&self, opcode: i32, payload: &T) -> Result<(), RpcError> {
        match self {
            Transport::Socket(t) => t.send(opcode, payload).await,
            Transport::Message(t) => t.send(opcode, payload).await,
        }
    }

    /// Closes the connection. No-op if it is not open.
    pub async fn close(&mut self) {
        match self {
            Transport::Socket(t) => t.close().await,
            Transport::Message(t) => t.close().await,
        }
    }

    pub fn is_open(&self) -> bool {
        match self {
            Transport::Socket(t) => t.is_open(),
            Transport::Message(t) => t.is_open(),
        }
    }
}
