//! Fake peer listening on a Unix socket in a temp directory.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use presence_client::{ConnectionOptions, SessionEvent};
use presence_protocol::{Frame, FrameDecoder, encode_frame};
use serde_json::Value;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

pub const WAIT: Duration = Duration::from_secs(5);

pub struct FakePeer {
    pub path: PathBuf,
    listener: UnixListener,
    _dir: Option<TempDir>,
}

impl FakePeer {
    pub fn bind() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discord-ipc-0");
        let listener = UnixListener::bind(&path).unwrap();
        Self {
            path,
            listener,
            _dir: Some(dir),
        }
    }

    /// Binds at `path`; the caller keeps the directory alive.
    pub fn bind_at(path: PathBuf) -> Self {
        let listener = UnixListener::bind(&path).unwrap();
        Self {
            path,
            listener,
            _dir: None,
        }
    }

    pub fn options(&self, client_id: &str) -> ConnectionOptions {
        ConnectionOptions::new(client_id).with_endpoint(self.path.to_string_lossy())
    }

    pub async fn accept(&self) -> PeerConn {
        let (stream, _) = tokio::time::timeout(WAIT, self.listener.accept())
            .await
            .expect("client should connect")
            .unwrap();
        PeerConn {
            stream,
            decoder: FrameDecoder::new(),
            ready: VecDeque::new(),
        }
    }

    /// Accepts a connection and checks its handshake.
    pub async fn accept_handshake(&self, client_id: &str) -> PeerConn {
        let mut conn = self.accept().await;
        let handshake = conn.recv().await;
        assert_eq!(handshake.opcode, 0);
        assert_eq!(handshake.payload["v"], 1);
        assert_eq!(handshake.payload["client_id"], client_id);
        conn
    }
}

pub struct PeerConn {
    stream: UnixStream,
    decoder: FrameDecoder,
    ready: VecDeque<Frame>,
}

impl PeerConn {
    /// Next frame from the client, failing the test after [`WAIT`].
    pub async fn recv(&mut self) -> Frame {
        self.recv_within(WAIT).await.expect("expected a frame")
    }

    /// Next frame, or `None` if nothing arrives within `limit` or the client
    /// hung up.
    pub async fn recv_within(&mut self, limit: Duration) -> Option<Frame> {
        if let Some(frame) = self.ready.pop_front() {
            return Some(frame);
        }
        let mut buf = [0u8; 4096];
        tokio::time::timeout(limit, async {
            loop {
                let n = self.stream.read(&mut buf).await.ok()?;
                if n == 0 {
                    return None;
                }
                for result in self.decoder.decode(&buf[..n]) {
                    self.ready.push_back(result.expect("client sent a malformed frame"));
                }
                if let Some(frame) = self.ready.pop_front() {
                    return Some(frame);
                }
            }
        })
        .await
        .ok()
        .flatten()
    }

    pub async fn send(&mut self, opcode: i32, payload: &Value) {
        let bytes = encode_frame(opcode, payload).unwrap();
        self.stream.write_all(&bytes).await.unwrap();
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }
}

pub async fn next_event(events: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("expected a session event")
        .expect("event channel closed")
}

/// Asserts that no event arrives within `limit`.
pub async fn assert_no_event(events: &mut mpsc::Receiver<SessionEvent>, limit: Duration) {
    if let Ok(Some(event)) = tokio::time::timeout(limit, events.recv()).await {
        panic!("unexpected event: {event:?}");
    }
}

/// SET_ACTIVITY `details` of a command frame.
pub fn details(frame: &Frame) -> Option<&str> {
    frame.payload["args"]["activity"]["details"].as_str()
}
