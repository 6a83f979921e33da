//! Wire protocol for pushing rich presence updates to a local peer.
//!
//! Two framings share the same opcode semantics:
//! - the byte-stream framing used over the local socket / named pipe
//!   (see [`codec`]),
//! - the `{op, d}` envelope used over WebSocket (see [`envelope`]).

pub mod activity;
pub mod codec;
pub mod commands;
pub mod constants;
pub mod endpoint;
pub mod envelope;
pub mod presets;

// Re-export primary types for convenience.
pub use activity::{Activity, ActivityError, Button};
pub use codec::{Frame, FrameDecoder, FrameError, encode_frame};
pub use commands::{Command, Handshake, SetActivityArgs};
pub use constants::Opcode;
pub use envelope::Envelope;
