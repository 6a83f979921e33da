//! WebSocket transport with `{op, d}` envelopes.

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use presence_protocol::constants::MAX_FRAME_SIZE;
use presence_protocol::endpoint;
use presence_protocol::envelope::encode_envelope;

use super::{EventSink, Link, WRITE_QUEUE};
use crate::error::RpcError;
use crate::pumps;
use crate::types::ConnectionOptions;

/// One envelope per WebSocket text message.
pub struct MessageTransport {
    url: String,
    events: EventSink,
    link: Option<Link<tungstenite::Message>>,
}

impl MessageTransport {
    pub(crate) fn new(options: &ConnectionOptions, events: EventSink) -> Self {
        let url = options
            .endpoint
            .clone()
            .unwrap_or_else(|| endpoint::ws_url(options.pipe_slot));
        Self {
            url,
            events,
            link: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn connect(&mut self) -> Result<(), RpcError> {
        self.close().await;

        debug!(url = %self.url, "opening websocket");
        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(MAX_FRAME_SIZE);
        ws_config.max_frame_size = Some(MAX_FRAME_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(self.url.as_str(), Some(ws_config), false)
                .await?;
        let (write, read) = ws_stream.split();

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(WRITE_QUEUE);
        let cancel = CancellationToken::new();

        self.events.open().await;

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(pumps::write::message_write_pump(write, write_rx, cancel))
        };

        let read_handle = {
            let events = self.events.clone();
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(pumps::read::message_read_pump(read, events, write_tx, cancel))
        };

        self.link = Some(Link::new(write_tx, cancel, read_handle, write_handle));
        Ok(())
    }

    pub async fn send<T: Serialize + ?Sized>(&self, opcode: i32, payload: &T) -> Result<(), RpcError> {
        let link = self.link.as_ref().ok_or(RpcError::Closed)?;
        let text = encode_envelope(opcode, payload)?;
        link.send(tungstenite::Message::Text(text.into())).await
    }

    pub async fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
    }

    pub fn is_open(&self) -> bool {
        self.link.as_ref().is_some_and(Link::is_open)
    }
}
