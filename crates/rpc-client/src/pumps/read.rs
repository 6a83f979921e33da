//! Read pumps: turn inbound bytes or messages into transport events.

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use presence_protocol::{Envelope, Frame, FrameDecoder, Opcode, encode_frame};

use crate::error::RpcError;
use crate::transport::EventSink;

const READ_BUF_SIZE: usize = 8 * 1024;

/// Reads length-prefixed frames from a byte stream.
///
/// A malformed payload is reported and skipped. A corrupt length field, a
/// read error or end of stream ends the connection. Either way the token is
/// cancelled on exit so the write pump stops too, and `Close` is emitted.
pub(crate) async fn frame_read_pump<R>(
    mut read: R,
    events: EventSink,
    write_tx: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    'read: loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            n = read.read(&mut buf) => {
                match n {
                    Ok(0) => {
                        debug!("socket stream ended");
                        break;
                    }
                    Ok(n) => {
                        decoder.extend(&buf[..n]);
                        while let Some(result) = decoder.next_frame() {
                            match result {
                                Ok(frame) => handle_frame(frame, &events, &write_tx).await,
                                Err(e) if e.is_recoverable() => {
                                    warn!(error = %e, "skipping malformed frame");
                                    events.error(e.into()).await;
                                }
                                Err(e) => {
                                    warn!(error = %e, "frame stream corrupt, closing");
                                    events.error(e.into()).await;
                                    break 'read;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!("socket read error: {e}");
                        events.error(e.into()).await;
                        break;
                    }
                }
            }
        }
    }

    cancel.cancel();
    events.close().await;
}

/// Forwards a decoded frame and answers pings.
async fn handle_frame(frame: Frame, events: &EventSink, write_tx: &mpsc::Sender<Vec<u8>>) {
    trace!(opcode = frame.opcode, "received frame");

    if Opcode::from_i32(frame.opcode) == Some(Opcode::Ping) {
        match encode_frame(Opcode::Pong.as_i32(), &frame.payload) {
            Ok(pong) => {
                let _ = write_tx.send(pong).await;
            }
            Err(e) => warn!(error = %e, "failed to encode pong"),
        }
    }

    events.message(frame.opcode, frame.payload).await;
}

/// Reads `{op, d}` envelopes from a WebSocket.
pub(crate) async fn message_read_pump<S>(
    mut read: S,
    events: EventSink,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = read.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        handle_text_message(&text, &events).await;
                    }
                    Some(Ok(tungstenite::Message::Ping(data))) => {
                        trace!("received ping, sending pong");
                        let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                    }
                    Some(Ok(tungstenite::Message::Close(_))) => {
                        debug!("received close frame");
                        break;
                    }
                    Some(Ok(_)) => {} // Binary / Pong / raw frames: ignore
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        events.error(RpcError::Ws(e)).await;
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    cancel.cancel();
    events.close().await;
}

/// Handles a text message from the WebSocket.
async fn handle_text_message(text: &str, events: &EventSink) {
    match Envelope::parse(text) {
        Ok(envelope) => {
            trace!(opcode = envelope.op, "received message");
            events.message(envelope.op, envelope.d).await;
        }
        Err(e) => {
            warn!(error = %e, "failed to parse message");
            events.error(e.into()).await;
        }
    }
}
