//! Public types for the presence client.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use presence_protocol::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY,
};

use crate::error::RpcError;

/// Which transport variant a client uses. Chosen once, at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Length-prefixed frames over a Unix socket or Windows named pipe.
    #[default]
    Socket,
    /// `{op, d}` envelopes over a WebSocket.
    Message,
}

/// Immutable connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    pub client_id: String,
    #[serde(default)]
    pub transport: TransportKind,
    /// Overrides the socket path (Socket) or the WebSocket URL (Message).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Well-known local endpoint slot, used when `endpoint` is unset.
    #[serde(default)]
    pub pipe_slot: u8,
}

impl ConnectionOptions {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            transport: TransportKind::default(),
            endpoint: None,
            pipe_slot: 0,
        }
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_pipe_slot(mut self, slot: u8) -> Self {
        self.pipe_slot = slot;
        self
    }
}

/// Automatic reconnection policy: a fixed delay between a bounded number of
/// attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub delay: Duration,
    /// Upper bound on transport connect plus handshake for one attempt.
    pub connect_timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ReconnectConfig {
    /// Number of automatic attempts allowed, zero when disabled.
    pub fn budget(&self) -> u32 {
        if self.enabled { self.max_attempts } else { 0 }
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Never connected.
    #[default]
    Idle,
    /// Transport connect and handshake in progress.
    Connecting,
    /// Handshake sent; commands may be issued.
    Ready,
    /// Connection lost or closed by the caller.
    Disconnected,
    /// Waiting out the delay before reconnect attempt `attempt`.
    Reconnecting { attempt: u32 },
    /// Reconnect budget exhausted. Only a manual `connect` leaves this state.
    Failed,
}

/// Events surfaced to the owner of a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Ready,
    Disconnected,
    Error(Arc<RpcError>),
    /// The peer answered a `SET_ACTIVITY` command.
    ActivityUpdate(Value),
    /// A reconnect attempt was scheduled.
    Reconnecting { attempt: u32, delay: Duration },
}

/// Outcome of a rate-limited send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Sent,
    /// Dropped because the previous send was too recent.
    Throttled,
}

/// Callback for every inbound `(opcode, payload)`.
pub type RawEventHandler = Box<dyn Fn(i32, &Value) + Send + Sync>;
