//! The client facade: one session, its scheduler and its bookkeeping.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};

use presence_protocol::Activity;

use crate::error::RpcError;
use crate::registry::{AccessToken, ImageKeyRegistry};
use crate::scheduler::Scheduler;
use crate::session::Session;
use crate::types::{ConnectionOptions, Dispatch, ReconnectConfig, SessionEvent, SessionState};

/// A rich presence client connected to one local peer.
///
/// Dropping the client cancels every timer it armed and stops automatic
/// reconnection; the connection itself closes once the last session handle
/// is gone.
pub struct RpcClient {
    session: Session,
    scheduler: Scheduler,
    image_keys: ImageKeyRegistry,
    access_token: AccessToken,
}

impl RpcClient {
    pub fn new(options: ConnectionOptions) -> Self {
        Self::with_reconnect(options, ReconnectConfig::default())
    }

    pub fn with_reconnect(options: ConnectionOptions, reconnect: ReconnectConfig) -> Self {
        let session = Session::with_reconnect(options, reconnect);
        let scheduler = Scheduler::new(session.clone());
        Self {
            session,
            scheduler,
            image_keys: ImageKeyRegistry::new(),
            access_token: AccessToken::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn client_id(&self) -> &str {
        &self.session.options().client_id
    }

    // -- Lifecycle --

    pub async fn connect(&self) -> Result<(), RpcError> {
        self.session.connect().await
    }

    pub async fn disconnect(&self) {
        self.session.disconnect().await;
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_ready()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe_state()
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.session.take_events()
    }

    pub fn set_auto_reconnect(&self, enabled: bool, max_attempts: u32, delay: Duration) {
        self.session.set_auto_reconnect(enabled, max_attempts, delay);
    }

    // -- Activity --

    pub async fn set_activity(&self, activity: Activity) -> Result<Dispatch, RpcError> {
        self.scheduler.set_activity(activity).await
    }

    pub async fn clear_activity(&self) -> Result<(), RpcError> {
        self.scheduler.clear_activity().await
    }

    pub fn set_activity_rate_limit(&self, min_interval: Duration) {
        self.scheduler.set_rate_limit(min_interval);
    }

    pub fn enqueue_activity(&self, activity: Activity) {
        self.scheduler.enqueue_activity(activity);
    }

    pub fn schedule_activity(&self, activity: Activity, fire_at_unix_secs: f64) -> Result<u64, RpcError> {
        self.scheduler.schedule_activity(activity, fire_at_unix_secs)
    }

    pub fn clear_scheduled_activities(&self) -> usize {
        self.scheduler.clear_scheduled_activities()
    }

    pub fn animate_activity(&self, frames: Vec<Activity>, interval: Duration) -> Result<(), RpcError> {
        self.scheduler.animate_activity(frames, interval)
    }

    pub fn stop_animation(&self) {
        self.scheduler.stop_animation();
    }

    pub async fn set_progress_bar(
        &self,
        label: &str,
        duration_secs: f64,
        extra: Activity,
    ) -> Result<Dispatch, RpcError> {
        self.scheduler.set_progress_bar(label, duration_secs, extra).await
    }

    pub async fn set_progress_percent(
        &self,
        label: &str,
        percent: f64,
        duration_secs: f64,
        extra: Activity,
    ) -> Result<Dispatch, RpcError> {
        self.scheduler
            .set_progress_percent(label, percent, duration_secs, extra)
            .await
    }

    // -- Bookkeeping --

    pub fn register_image_keys<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.image_keys.register(keys);
    }

    pub fn is_image_key_valid(&self, key: &str) -> bool {
        self.image_keys.contains(key)
    }

    pub fn image_keys(&self) -> Vec<String> {
        self.image_keys.keys()
    }

    /// Registers a callback for every inbound `(opcode, payload)`, invoked
    /// in registration order.
    pub fn on_raw_event<F>(&self, handler: F)
    where
        F: Fn(i32, &Value) + Send + Sync + 'static,
    {
        self.session.on_raw_event(Box::new(handler));
    }

    pub fn set_access_token(&self, token: impl Into<String>) {
        self.access_token.set(token);
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token.get()
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.scheduler.shutdown();
        self.session.cancel_reconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RpcClient {
        RpcClient::new(ConnectionOptions::new("1234").with_endpoint("/nonexistent/ipc"))
    }

    #[test]
    fn bookkeeping_is_per_client() {
        let a = client();
        let b = client();

        a.register_image_keys(["logo"]);
        a.set_access_token("token-a");

        assert!(a.is_image_key_valid("logo"));
        assert!(!b.is_image_key_valid("logo"));
        assert_eq!(a.access_token().as_deref(), Some("token-a"));
        assert_eq!(b.access_token(), None);
    }

    #[tokio::test]
    async fn starts_idle() {
        let c = client();
        assert_eq!(c.client_id(), "1234");
        assert_eq!(c.state(), SessionState::Idle);
        assert!(!c.is_connected());
        assert!(c.take_events().is_some());
        assert!(c.take_events().is_none());
    }

    #[tokio::test]
    async fn activity_calls_fail_while_offline() {
        let c = client();
        assert!(matches!(
            c.set_activity(Activity::with_details("A")).await,
            Err(RpcError::NotConnected)
        ));
        assert!(matches!(
            c.set_progress_bar("Loading", 30.0, Activity::default()).await,
            Err(RpcError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn set_activity_rate_limit_reaches_scheduler() {
        let c = client();
        c.set_activity_rate_limit(Duration::from_millis(50));
        assert_eq!(c.scheduler().min_interval(), Duration::from_millis(50));
    }
}
