use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{Frame, FrameError};

/// Envelope for message-based transports.
///
/// The transport already delimits messages, so there is no length field:
/// each WebSocket text message carries exactly one `{"op": .., "d": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub op: i32,
    #[serde(default)]
    pub d: Value,
}

/// Borrowing form used when encoding, so payloads are not cloned into a
/// [`Value`] first.
#[derive(Serialize)]
struct EnvelopeRef<'a, T: ?Sized> {
    op: i32,
    d: &'a T,
}

impl Envelope {
    pub fn new(op: i32, d: Value) -> Self {
        Self { op, d }
    }

    /// Serializes the envelope to a text message.
    pub fn encode(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses an inbound text message.
    ///
    /// Failures are reported as [`FrameError::InvalidPayload`]; the message
    /// is lost but the connection is still usable.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        serde_json::from_str(text).map_err(|e| FrameError::InvalidPayload {
            opcode: -1,
            reason: e.to_string(),
        })
    }

    pub fn into_frame(self) -> Frame {
        Frame {
            opcode: self.op,
            payload: self.d,
        }
    }
}

/// Encodes `{op, d}` directly from a borrowed payload.
pub fn encode_envelope<T: Serialize + ?Sized>(op: i32, d: &T) -> Result<String, FrameError> {
    Ok(serde_json::to_string(&EnvelopeRef { op, d })?)
}
