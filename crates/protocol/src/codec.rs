//! Byte-stream framing for the local socket transport.
//!
//! # Wire format
//!
//! ```text
//! [4 bytes LE i32: opcode]
//! [4 bytes LE i32: payload length]
//! [length bytes:   UTF-8 JSON payload]
//! ```
//!
//! Stream transports may split a frame across reads or coalesce several
//! frames into one read, so decoding goes through [`FrameDecoder`], which
//! buffers until a whole frame is available.

use serde::Serialize;
use serde_json::Value;

use crate::constants::{HEADER_SIZE, MAX_FRAME_SIZE};

/// Errors produced while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame was complete but its payload is not valid JSON.
    #[error("invalid payload in frame (opcode {opcode}): {reason}")]
    InvalidPayload { opcode: i32, reason: String },

    #[error("invalid frame length: {0}")]
    InvalidLength(i32),

    #[error("frame too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
}

impl FrameError {
    /// Returns `true` if decoding can continue after this error.
    ///
    /// A bad payload only poisons its own frame. A bad length field means
    /// the stream can no longer be split into frames.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::InvalidPayload { .. })
    }
}

/// One decoded message.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub opcode: i32,
    pub payload: Value,
}

/// Encodes a payload into a length-prefixed frame.
pub fn encode_frame<T: Serialize + ?Sized>(opcode: i32, payload: &T) -> Result<Vec<u8>, FrameError> {
    let body = serde_json::to_vec(payload)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge {
            size: body.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
    frame.extend_from_slice(&opcode.to_le_bytes());
    frame.extend_from_slice(&(body.len() as i32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Incremental decoder over an accumulating byte buffer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes read from the stream.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pops the next complete frame.
    ///
    /// Returns `None` until a whole frame is buffered. A payload that fails
    /// to parse yields a recoverable error and is skipped, so the following
    /// call continues with the next frame. A corrupt length field yields a
    /// non-recoverable error and discards everything buffered.
    pub fn next_frame(&mut self) -> Option<Result<Frame, FrameError>> {
        if self.buf.len() < HEADER_SIZE {
            return None;
        }

        let opcode = read_i32_le(&self.buf[0..4]);
        let len = read_i32_le(&self.buf[4..8]);

        if len < 0 {
            self.buf.clear();
            return Some(Err(FrameError::InvalidLength(len)));
        }
        let len = len as usize;
        if len > MAX_FRAME_SIZE {
            self.buf.clear();
            return Some(Err(FrameError::TooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            }));
        }

        let end = HEADER_SIZE + len;
        if self.buf.len() < end {
            return None;
        }

        let result = serde_json::from_slice::<Value>(&self.buf[HEADER_SIZE..end])
            .map(|payload| Frame { opcode, payload })
            .map_err(|e| FrameError::InvalidPayload {
                opcode,
                reason: e.to_string(),
            });

        // Advance even when the payload was bad, so it is never re-read.
        self.buf.drain(..end);
        Some(result)
    }

    /// Appends `data` and drains every frame that is now complete.
    pub fn decode(&mut self, data: &[u8]) -> Vec<Result<Frame, FrameError>> {
        self.extend(data);
        let mut out = Vec::new();
        while let Some(result) = self.next_frame() {
            out.push(result);
        }
        out
    }
}

fn read_i32_le(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
