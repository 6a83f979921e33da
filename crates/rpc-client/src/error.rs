//! Error type for the presence client.

use std::time::Duration;

use presence_protocol::{ActivityError, FrameError};
use tokio_tungstenite::tungstenite;

/// Errors produced by transports, the session and the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A frame could not be decoded. Recoverable unless the length field
    /// was corrupt, in which case the transport closes.
    #[error("protocol error: {0}")]
    Protocol(#[from] FrameError),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection closed")]
    Closed,

    /// The session is not in the `Ready` state.
    #[error("not connected")]
    NotConnected,

    /// Automatic reconnection gave up. Terminal until `connect` is called
    /// again.
    #[error("reconnect budget exhausted after {attempts} attempt(s)")]
    ExhaustedRetries { attempts: u32 },

    #[error("invalid activity: {0}")]
    Activity(#[from] ActivityError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RpcError {
    /// Returns `true` for failures of the underlying connection, as opposed
    /// to bad input or protocol noise.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            RpcError::Io(_)
                | RpcError::Ws(_)
                | RpcError::Connection(_)
                | RpcError::Timeout(_)
                | RpcError::Closed
                | RpcError::NotConnected
        )
    }

    /// Returns `true` if the session stopped reconnecting because of this
    /// error.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RpcError::ExhaustedRetries { .. })
    }
}
