//! Write pumps: serialise outbound traffic onto the connection.

use futures_util::SinkExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Writes encoded frames to a byte stream.
///
/// On cancellation, frames already queued are still flushed before the
/// stream is shut down.
pub(crate) async fn frame_write_pump<W>(
    mut write: W,
    mut write_rx: mpsc::Receiver<Vec<u8>>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = write_rx.recv() => {
                match frame {
                    Some(bytes) => {
                        if let Err(e) = write.write_all(&bytes).await {
                            error!("socket write error: {e}");
                            cancel.cancel();
                            return;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    while let Ok(bytes) = write_rx.try_recv() {
        if write.write_all(&bytes).await.is_err() {
            break;
        }
    }
    let _ = write.shutdown().await;
}

/// Writes messages to the WebSocket.
pub(crate) async fn message_write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                match msg {
                    Some(m) => {
                        if let Err(e) = write.send(m).await {
                            error!("WebSocket write error: {e}");
                            cancel.cancel();
                            return;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    while let Ok(m) = write_rx.try_recv() {
        if write.send(m).await.is_err() {
            return;
        }
    }
    let _ = write.send(tungstenite::Message::Close(None)).await;
}
