//! Automatic reconnection with a fixed delay and a bounded attempt budget.

use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RpcError;
use crate::registry::lock;
use crate::session::{SessionShared, establish};
use crate::types::{SessionEvent, SessionState};

/// Cancels the active reconnect loop, if any.
pub(crate) fn cancel_reconnect(reconnect_cancel: &Mutex<Option<CancellationToken>>) {
    if let Some(token) = lock(reconnect_cancel).take() {
        token.cancel();
    }
}

/// Starts a reconnect loop unless the budget is already spent.
///
/// Returns `false` when no attempt is left, in which case nothing is
/// spawned.
pub(crate) fn spawn_reconnect(shared: &Arc<SessionShared>) -> bool {
    let budget = shared.reconnect_config().budget();
    if shared.attempts.load(Ordering::SeqCst) >= budget {
        return false;
    }

    let cancel = CancellationToken::new();
    if let Some(previous) = lock(&shared.reconnect_cancel).replace(cancel.clone()) {
        previous.cancel();
    }
    tokio::spawn(reconnect_loop(shared.clone(), cancel));
    true
}

/// Reconnection loop.
///
/// Each iteration consumes one attempt: announce it, wait the fixed delay,
/// try to connect. Success resets the counter (inside `establish`). Once the
/// budget is spent the session moves to `Failed` and a single
/// [`RpcError::ExhaustedRetries`] is emitted.
///
/// Returns a boxed future to break the recursive type cycle with
/// `establish` (which spawns the drive task that may spawn this loop).
pub(crate) fn reconnect_loop(
    shared: Arc<SessionShared>,
    cancel: CancellationToken,
) -> Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async move {
        let client_id = shared.options.client_id.clone();

        loop {
            let config = shared.reconnect_config();
            let attempts = shared.attempts.load(Ordering::SeqCst);
            if attempts >= config.budget() {
                warn!(client_id = %client_id, attempts, "reconnect budget exhausted");
                shared.set_state(SessionState::Failed);
                shared
                    .emit(SessionEvent::Error(Arc::new(RpcError::ExhaustedRetries { attempts })))
                    .await;
                break;
            }

            let attempt = attempts + 1;
            shared.attempts.store(attempt, Ordering::SeqCst);
            shared.set_state(SessionState::Reconnecting { attempt });
            shared
                .emit(SessionEvent::Reconnecting {
                    attempt,
                    delay: config.delay,
                })
                .await;

            info!(
                client_id = %client_id,
                attempt,
                delay_ms = config.delay.as_millis() as u64,
                "reconnecting"
            );

            // Wait for the fixed delay (or cancellation).
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(client_id = %client_id, "reconnect cancelled");
                    return;
                }
                _ = tokio::time::sleep(config.delay) => {}
            }

            let resumed = shared.state.send_if_modified(|state| {
                if *state == (SessionState::Reconnecting { attempt }) {
                    *state = SessionState::Connecting;
                    true
                } else {
                    false
                }
            });
            if !resumed || cancel.is_cancelled() {
                return;
            }

            match establish(&shared).await {
                Ok(()) => {
                    info!(client_id = %client_id, attempt, "reconnected successfully");
                    break;
                }
                Err(e) => {
                    if cancel.is_cancelled() {
                        return;
                    }
                    warn!(client_id = %client_id, attempt, error = %e, "reconnect attempt failed");
                    shared.emit(SessionEvent::Error(Arc::new(e))).await;
                }
            }
        }
    }) // Box::pin
}
