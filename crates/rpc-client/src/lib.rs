//! Persistent-connection client for the local rich presence RPC.
//!
//! Provides the socket and WebSocket transports, the session state machine
//! with bounded fixed-delay reconnection, and the rate-limited activity
//! scheduler.

pub mod client;
pub mod error;
pub mod manager;
mod pumps;
pub(crate) mod reconnection;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod transport;
pub mod types;

pub use client::RpcClient;
pub use error::RpcError;
pub use manager::ClientManager;
pub use scheduler::Scheduler;
pub use session::Session;
pub use transport::{Transport, TransportEvent};
pub use types::{
    ConnectionOptions, Dispatch, ReconnectConfig, SessionEvent, SessionState, TransportKind,
};
