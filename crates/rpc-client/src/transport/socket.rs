//! Byte-stream transport over the peer's local socket or named pipe.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use presence_protocol::{encode_frame, endpoint};

use super::{EventSink, Link, WRITE_QUEUE};
use crate::error::RpcError;
use crate::pumps;
use crate::types::ConnectionOptions;

/// Anything the pumps can read frames from and write frames to.
pub(crate) trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

type BoxedStream = Box<dyn AsyncStream>;

/// Length-prefixed frames over a Unix domain socket (or a Windows named
/// pipe).
pub struct SocketTransport {
    path: PathBuf,
    events: EventSink,
    link: Option<Link<Vec<u8>>>,
}

impl SocketTransport {
    pub(crate) fn new(options: &ConnectionOptions, events: EventSink) -> Self {
        let path = options
            .endpoint
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| endpoint::ipc_path(options.pipe_slot));
        Self {
            path,
            events,
            link: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn connect(&mut self) -> Result<(), RpcError> {
        self.close().await;

        debug!(path = %self.path.display(), "opening local socket");
        let stream = open_stream(&self.path).await?;
        let (read, write) = tokio::io::split(stream);

        let (write_tx, write_rx) = mpsc::channel::<Vec<u8>>(WRITE_QUEUE);
        let cancel = CancellationToken::new();

        // Open goes out before the read pump can forward anything.
        self.events.open().await;

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(pumps::write::frame_write_pump(write, write_rx, cancel))
        };

        let read_handle = {
            let events = self.events.clone();
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(pumps::read::frame_read_pump(read, events, write_tx, cancel))
        };

        self.link = Some(Link::new(write_tx, cancel, read_handle, write_handle));
        Ok(())
    }

    pub async fn send<T: Serialize + ?Sized>(&self, opcode: i32, payload: &T) -> Result<(), RpcError> {
        let link = self.link.as_ref().ok_or(RpcError::Closed)?;
        let frame = encode_frame(opcode, payload)?;
        link.send(frame).await
    }

    pub async fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
    }

    pub fn is_open(&self) -> bool {
        self.link.as_ref().is_some_and(Link::is_open)
    }
}

#[cfg(unix)]
async fn open_stream(path: &Path) -> Result<BoxedStream, RpcError> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    Ok(Box::new(stream))
}

#[cfg(windows)]
async fn open_stream(path: &Path) -> Result<BoxedStream, RpcError> {
    let pipe = tokio::net::windows::named_pipe::ClientOptions::new().open(path)?;
    Ok(Box::new(pipe))
}
