//! Session state machine: connect, handshake, disconnect, reconnect.
//!
//! A session owns at most one live [`Transport`]. Every transport it opens is
//! tagged with a generation number. Events from an older generation are
//! ignored, so a replaced or closed transport can never move the state
//! machine.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use presence_protocol::commands::is_set_activity;
use presence_protocol::{Handshake, Opcode};

use crate::error::RpcError;
use crate::reconnection::{cancel_reconnect, spawn_reconnect};
use crate::registry::{RawEventObservers, lock};
use crate::transport::{Transport, TransportEvent};
use crate::types::{ConnectionOptions, RawEventHandler, ReconnectConfig, SessionEvent, SessionState};

/// Capacity of the session event channel.
const EVENT_QUEUE: usize = 64;

/// Capacity of the per-connection transport event channel.
const TRANSPORT_EVENT_QUEUE: usize = 64;

/// State shared between the session handle, its drive task and the
/// reconnect loop.
pub(crate) struct SessionShared {
    pub(crate) options: ConnectionOptions,
    pub(crate) reconnect_config: Mutex<ReconnectConfig>,
    pub(crate) transport: tokio::sync::Mutex<Option<Transport>>,
    pub(crate) state: watch::Sender<SessionState>,
    pub(crate) attempts: AtomicU32,
    pub(crate) generation: AtomicU64,
    pub(crate) events_tx: mpsc::Sender<SessionEvent>,
    pub(crate) events_rx: Mutex<Option<mpsc::Receiver<SessionEvent>>>,
    pub(crate) observers: RawEventObservers,
    /// Cancel token for the active reconnect loop, if any.
    pub(crate) reconnect_cancel: Mutex<Option<CancellationToken>>,
    /// Set by `disconnect`; suppresses automatic reconnection.
    pub(crate) manual_disconnect: AtomicBool,
}

impl SessionShared {
    /// Delivers an event, waiting for room in the channel.
    ///
    /// Until the receiver has been taken nobody can drain the channel, so
    /// events that do not fit are dropped instead of blocking the session.
    pub(crate) async fn emit(&self, event: SessionEvent) {
        let untaken = lock(&self.events_rx).is_some();
        if untaken {
            self.try_emit(event);
            return;
        }
        if let Err(e) = self.events_tx.send(event).await {
            trace!("session event not delivered: {e}");
        }
    }

    /// Delivers an event only if the channel has room. For high-volume
    /// notifications that must never stall the connection.
    pub(crate) fn try_emit(&self, event: SessionEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            trace!("session event not delivered: {e}");
        }
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    pub(crate) fn reconnect_config(&self) -> ReconnectConfig {
        lock(&self.reconnect_config).clone()
    }
}

/// Handle to a session. Clones share the same connection.
#[derive(Clone)]
pub struct Session {
    shared: Arc<SessionShared>,
}

impl Session {
    pub fn new(options: ConnectionOptions) -> Self {
        Self::with_reconnect(options, ReconnectConfig::default())
    }

    pub fn with_reconnect(options: ConnectionOptions, reconnect: ReconnectConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let (state, _) = watch::channel(SessionState::Idle);

        Self {
            shared: Arc::new(SessionShared {
                options,
                reconnect_config: Mutex::new(reconnect),
                transport: tokio::sync::Mutex::new(None),
                state,
                attempts: AtomicU32::new(0),
                generation: AtomicU64::new(0),
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
                observers: RawEventObservers::new(),
                reconnect_cancel: Mutex::new(None),
                manual_disconnect: AtomicBool::new(false),
            }),
        }
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.shared.options
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<SessionEvent>> {
        lock(&self.shared.events_rx).take()
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Watches state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Reconnect attempts made since the last successful handshake.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    pub fn reconnect_config(&self) -> ReconnectConfig {
        self.shared.reconnect_config()
    }

    /// Changes the reconnect policy. Takes effect from the next attempt.
    pub fn set_reconnect_config(&self, config: ReconnectConfig) {
        *lock(&self.shared.reconnect_config) = config;
    }

    pub fn set_auto_reconnect(&self, enabled: bool, max_attempts: u32, delay: std::time::Duration) {
        let mut config = lock(&self.shared.reconnect_config);
        config.enabled = enabled;
        config.max_attempts = max_attempts;
        config.delay = delay;
    }

    /// Registers a callback for every inbound frame.
    pub fn on_raw_event(&self, handler: RawEventHandler) {
        self.shared.observers.add(handler);
    }

    /// Connects and sends the handshake.
    ///
    /// No-op while a connection attempt is in flight or the session is
    /// ready. On failure the error is returned and, if the reconnect policy
    /// allows, automatic retries start in the background. Otherwise the
    /// session ends in `Failed` with a terminal
    /// [`RpcError::ExhaustedRetries`] event.
    pub async fn connect(&self) -> Result<(), RpcError> {
        let claimed = self.shared.state.send_if_modified(|state| match state {
            SessionState::Connecting | SessionState::Ready => false,
            _ => {
                *state = SessionState::Connecting;
                true
            }
        });
        if !claimed {
            debug!(client_id = %self.shared.options.client_id, "connect ignored: already connecting or ready");
            return Ok(());
        }

        cancel_reconnect(&self.shared.reconnect_cancel);
        self.shared.manual_disconnect.store(false, Ordering::SeqCst);
        self.shared.attempts.store(0, Ordering::SeqCst);

        info!(
            client_id = %self.shared.options.client_id,
            transport = ?self.shared.options.transport,
            "connecting"
        );

        match establish(&self.shared).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(client_id = %self.shared.options.client_id, error = %e, "connection failed");
                if self.shared.manual_disconnect.load(Ordering::SeqCst) {
                    return Err(e);
                }
                if !spawn_reconnect(&self.shared) {
                    let attempts = self.shared.attempts.load(Ordering::SeqCst);
                    self.shared.set_state(SessionState::Failed);
                    self.shared
                        .emit(SessionEvent::Error(Arc::new(RpcError::ExhaustedRetries {
                            attempts,
                        })))
                        .await;
                }
                Err(e)
            }
        }
    }

    /// Closes the connection and stops any reconnection. Always ends in
    /// `Disconnected` and always emits [`SessionEvent::Disconnected`].
    pub async fn disconnect(&self) {
        self.shared.manual_disconnect.store(true, Ordering::SeqCst);
        cancel_reconnect(&self.shared.reconnect_cancel);

        let old = {
            let mut slot = self.shared.transport.lock().await;
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            slot.take()
        };
        if let Some(mut transport) = old {
            transport.close().await;
            info!(client_id = %self.shared.options.client_id, "disconnected");
        }

        self.shared.set_state(SessionState::Disconnected);
        self.shared.emit(SessionEvent::Disconnected).await;
    }

    /// Sends one frame. Only valid in `Ready`.
    pub async fn send<T: Serialize + ?Sized>(&self, opcode: Opcode, payload: &T) -> Result<(), RpcError> {
        if !self.is_ready() {
            return Err(RpcError::NotConnected);
        }
        let slot = self.shared.transport.lock().await;
        let transport = slot.as_ref().ok_or(RpcError::NotConnected)?;
        transport.send(opcode.as_i32(), payload).await
    }

    /// Stops background reconnection without touching the connection.
    pub(crate) fn cancel_reconnect(&self) {
        cancel_reconnect(&self.shared.reconnect_cancel);
    }
}

/// Opens a fresh transport, sends the handshake and, if nothing superseded
/// this attempt meanwhile, installs it as the live transport.
pub(crate) async fn establish(shared: &Arc<SessionShared>) -> Result<(), RpcError> {
    let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

    let old = shared.transport.lock().await.take();
    if let Some(mut old) = old {
        old.close().await;
    }

    let (tx, rx) = mpsc::channel(TRANSPORT_EVENT_QUEUE);
    let mut transport = Transport::new(&shared.options, tx);
    let connect_timeout = shared.reconnect_config().connect_timeout;
    let handshake = Handshake::new(shared.options.client_id.as_str());

    debug!(endpoint = %transport.endpoint(), "opening transport");
    let attempt = async {
        transport.connect().await?;
        transport
            .send(Opcode::Handshake.as_i32(), &handshake)
            .await
    };
    let outcome = tokio::time::timeout(connect_timeout, attempt).await;

    let result = match outcome {
        Ok(result) => result,
        Err(_) => Err(RpcError::Timeout(connect_timeout)),
    };
    if let Err(e) = result {
        transport.close().await;
        return Err(e);
    }

    {
        let mut slot = shared.transport.lock().await;
        if shared.generation.load(Ordering::SeqCst) != generation {
            drop(slot);
            debug!("connection superseded during handshake");
            transport.close().await;
            return Err(RpcError::Closed);
        }
        *slot = Some(transport);
        shared.attempts.store(0, Ordering::SeqCst);
        shared.set_state(SessionState::Ready);
    }

    info!(client_id = %shared.options.client_id, "ready");
    shared.emit(SessionEvent::Ready).await;

    tokio::spawn(drive(Arc::downgrade(shared), rx, generation));
    Ok(())
}

/// Consumes one transport's events until it closes.
///
/// Holds only a weak reference so a dropped session does not keep its
/// connection alive.
async fn drive(shared: Weak<SessionShared>, mut rx: mpsc::Receiver<TransportEvent>, generation: u64) {
    while let Some(event) = rx.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if shared.generation.load(Ordering::SeqCst) != generation {
            continue;
        }

        match event {
            TransportEvent::Open => trace!("transport open"),
            TransportEvent::Message { opcode, payload } => {
                shared.observers.notify(opcode, &payload);
                if is_set_activity(&payload) {
                    shared.try_emit(SessionEvent::ActivityUpdate(payload));
                }
            }
            TransportEvent::Error(e) => {
                debug!(error = %e, "transport error");
                shared.emit(SessionEvent::Error(e)).await;
            }
            TransportEvent::Close => {
                handle_close(&shared, generation).await;
                break;
            }
        }
    }
}

/// Reacts to the live transport closing on its own.
async fn handle_close(shared: &Arc<SessionShared>, generation: u64) {
    if shared.manual_disconnect.load(Ordering::SeqCst) {
        return;
    }

    {
        let mut slot = shared.transport.lock().await;
        if shared.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        let was_ready = shared.state.send_if_modified(|state| {
            if *state == SessionState::Ready {
                *state = SessionState::Disconnected;
                true
            } else {
                false
            }
        });
        if !was_ready {
            return;
        }
        slot.take();
    }

    info!(client_id = %shared.options.client_id, "connection lost");
    shared.emit(SessionEvent::Disconnected).await;

    if !spawn_reconnect(shared) {
        info!(client_id = %shared.options.client_id, "auto-reconnect disabled, staying disconnected");
    }
}
