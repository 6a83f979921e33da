//! Demo event loop: connect, show a progress bar (or a details animation)
//! whenever the session is ready, and run until interrupted.

use presence_client::{Dispatch, RpcClient, SessionEvent, SessionState};

use crate::config::Config;

pub async fn run(config: Config) -> anyhow::Result<()> {
    let client = RpcClient::with_reconnect(config.connection_options(), config.reconnect_config());
    client.set_activity_rate_limit(config.rate_limit());
    client.register_image_keys(config.progress.large_image_key.iter().cloned());

    let mut events = client
        .take_events()
        .ok_or_else(|| anyhow::anyhow!("event stream already taken"))?;

    // A failed first attempt still leaves automatic reconnection running.
    if let Err(e) = client.connect().await {
        if client.state() == SessionState::Failed {
            return Err(e.into());
        }
        tracing::warn!(error = %e, "initial connect failed");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("SIGINT received, shutting down");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                if !handle_event(&client, &config, event).await {
                    break;
                }
            }
        }
    }

    // Nothing reads events past this point; disconnect must not wait on them.
    drop(events);

    if client.is_connected()
        && let Err(e) = client.clear_activity().await
    {
        tracing::debug!(error = %e, "clearing activity on shutdown failed");
    }
    client.disconnect().await;
    Ok(())
}

/// Returns `false` once the client can no longer make progress.
async fn handle_event(client: &RpcClient, config: &Config, event: SessionEvent) -> bool {
    match event {
        SessionEvent::Ready => {
            tracing::info!("connected to presence peer");
            if config.animation.frames.is_empty() {
                show_progress(client, config).await;
            } else if let Err(e) =
                client.animate_activity(config.animation.activities(), config.animation.interval())
            {
                tracing::warn!(error = %e, "animation not started");
            }
        }
        SessionEvent::ActivityUpdate(data) => {
            tracing::info!(%data, "activity updated");
        }
        SessionEvent::Disconnected => {
            tracing::info!("disconnected from presence peer");
        }
        SessionEvent::Reconnecting { attempt, delay } => {
            tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
        }
        SessionEvent::Error(e) => {
            tracing::error!(error = %e, "presence client error");
            if e.is_terminal() {
                return false;
            }
        }
    }
    true
}

async fn show_progress(client: &RpcClient, config: &Config) {
    let progress = &config.progress;
    match client
        .set_progress_bar(&progress.label, progress.duration_secs, progress.extra())
        .await
    {
        Ok(Dispatch::Sent) => tracing::info!(label = %progress.label, "progress bar shown"),
        Ok(Dispatch::Throttled) => tracing::debug!("progress bar throttled"),
        Err(e) => tracing::warn!(error = %e, "progress bar not shown"),
    }
}
