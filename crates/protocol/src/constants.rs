use std::time::Duration;

/// Version sent in the handshake payload.
pub const PROTOCOL_VERSION: u32 = 1;

/// Size of the byte-stream frame header: opcode (i32 LE) + length (i32 LE).
pub const HEADER_SIZE: usize = 8;

/// Largest payload accepted in a single frame (16 MB).
///
/// A length field above this is treated as stream corruption rather than
/// a frame still in flight.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Base name of the local IPC endpoint; the slot index is appended.
pub const IPC_BASENAME: &str = "discord-ipc";

/// First port of the local WebSocket RPC range; the slot index is added.
pub const WS_BASE_PORT: u16 = 6463;

/// Maximum length, in characters, of the `details` and `state` fields.
pub const MAX_FIELD_LEN: usize = 128;

/// Maximum number of buttons on one activity.
pub const MAX_BUTTONS: usize = 2;

/// Command name for presence updates.
pub const CMD_SET_ACTIVITY: &str = "SET_ACTIVITY";

/// Minimum spacing between two presence updates.
pub const DEFAULT_ACTIVITY_INTERVAL: Duration = Duration::from_millis(1500);

/// Fixed delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(2000);

/// Reconnect attempts allowed before the session gives up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Upper bound on transport connect + handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default period of an activity animation.
pub const DEFAULT_ANIMATION_INTERVAL: Duration = Duration::from_secs(5);

/// Frame opcode.
///
/// Frames carry the raw `i32` so unknown opcodes from the peer still reach
/// raw-event observers; this enum names the ones the client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Initial `{v, client_id}` payload.
    Handshake,
    /// Command / response / event frame.
    Frame,
    /// Peer is about to close the connection.
    Close,
    Ping,
    Pong,
}

impl Opcode {
    /// Returns the wire value.
    pub fn as_i32(self) -> i32 {
        match self {
            Opcode::Handshake => 0,
            Opcode::Frame => 1,
            Opcode::Close => 2,
            Opcode::Ping => 3,
            Opcode::Pong => 4,
        }
    }

    /// Maps a wire value back to a known opcode.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Opcode::Handshake),
            1 => Some(Opcode::Frame),
            2 => Some(Opcode::Close),
            3 => Some(Opcode::Ping),
            4 => Some(Opcode::Pong),
            _ => None,
        }
    }
}

impl From<Opcode> for i32 {
    fn from(op: Opcode) -> Self {
        op.as_i32()
    }
}
