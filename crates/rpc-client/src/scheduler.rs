//! Outbound `SET_ACTIVITY` scheduling.
//!
//! Every path ends in [`Scheduler::set_activity`], which is rate limited:
//! a call less than the minimum interval after the previous send is dropped
//! and reported as [`Dispatch::Throttled`]. On top of that sit a FIFO queue
//! drained by a single task, one-shot scheduled updates and a cyclic
//! animation.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::sync::watch::error::RecvError;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use presence_protocol::activity::{progress_window, unix_now_secs};
use presence_protocol::constants::DEFAULT_ACTIVITY_INTERVAL;
use presence_protocol::{Activity, Command, Opcode};

use crate::error::RpcError;
use crate::registry::lock;
use crate::session::Session;
use crate::types::{Dispatch, SessionState};

/// Minimum-interval limiter. Only actual sends are recorded.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    min_interval: Duration,
    last_sent: Option<Instant>,
}

impl RateLimiter {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sent: None,
        }
    }

    /// Claims the send slot at `now` if the interval has elapsed.
    pub(crate) fn try_acquire_at(&mut self, now: Instant) -> bool {
        if !self.remaining_at(now).is_zero() {
            return false;
        }
        self.last_sent = Some(now);
        true
    }

    /// Time left until the next send is allowed.
    pub(crate) fn remaining_at(&self, now: Instant) -> Duration {
        match self.last_sent {
            Some(last) => (last + self.min_interval).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }
}

/// A queued update waiting for the drain task.
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub activity: Activity,
    pub enqueued_at: Instant,
}

/// A one-shot update armed by [`Scheduler::schedule_activity`].
#[derive(Debug)]
pub struct ScheduledCommand {
    pub activity: Activity,
    pub fire_at_unix_secs: f64,
    abort: Option<AbortHandle>,
}

struct SchedulerInner {
    session: Session,
    pid: u32,
    min_interval: Mutex<Duration>,
    limiter: Mutex<RateLimiter>,
    queue: Mutex<VecDeque<PendingCommand>>,
    /// Single-flight flag for the drain task.
    draining: AtomicBool,
    scheduled: Mutex<HashMap<u64, ScheduledCommand>>,
    next_schedule_id: AtomicU64,
    animation: Mutex<Option<CancellationToken>>,
    /// Parent of every timer this scheduler arms.
    shutdown: CancellationToken,
}

/// Rate-limited command scheduler bound to one session.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(session: Session) -> Self {
        Self::with_interval(session, DEFAULT_ACTIVITY_INTERVAL)
    }

    pub fn with_interval(session: Session, min_interval: Duration) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                session,
                pid: std::process::id(),
                min_interval: Mutex::new(min_interval),
                limiter: Mutex::new(RateLimiter::new(min_interval)),
                queue: Mutex::new(VecDeque::new()),
                draining: AtomicBool::new(false),
                scheduled: Mutex::new(HashMap::new()),
                next_schedule_id: AtomicU64::new(1),
                animation: Mutex::new(None),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn min_interval(&self) -> Duration {
        *lock(&self.inner.min_interval)
    }

    /// Changes the minimum spacing between sends.
    pub fn set_rate_limit(&self, min_interval: Duration) {
        *lock(&self.inner.min_interval) = min_interval;
        lock(&self.inner.limiter).min_interval = min_interval;
    }

    /// Sends `activity` now, unless the previous send was too recent.
    ///
    /// Fails with [`RpcError::NotConnected`] outside `Ready`; nothing is
    /// queued in that case.
    pub async fn set_activity(&self, activity: Activity) -> Result<Dispatch, RpcError> {
        self.inner.set_activity(activity).await
    }

    /// Clears the presence. Not subject to the rate limit.
    pub async fn clear_activity(&self) -> Result<(), RpcError> {
        let command = Command::set_activity(self.inner.pid, None);
        debug!(nonce = %command.nonce, "clearing activity");
        self.inner.session.send(Opcode::Frame, &command).await
    }

    /// Appends to the FIFO and starts the drain task if it is idle.
    pub fn enqueue_activity(&self, activity: Activity) {
        lock(&self.inner.queue).push_back(PendingCommand {
            activity,
            enqueued_at: Instant::now(),
        });
        spawn_drain(&self.inner);
    }

    pub fn queue_len(&self) -> usize {
        lock(&self.inner.queue).len()
    }

    /// Drops every queued entry. Returns how many were dropped.
    pub fn clear_queue(&self) -> usize {
        let mut queue = lock(&self.inner.queue);
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    /// Whether the drain task is running.
    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::SeqCst)
    }

    /// Arms a one-shot update at `fire_at_unix_secs` (fractional unix
    /// seconds; a time in the past fires immediately). The fired update is
    /// still rate limited. Returns the schedule id.
    pub fn schedule_activity(&self, activity: Activity, fire_at_unix_secs: f64) -> Result<u64, RpcError> {
        let delay = schedule_delay(fire_at_unix_secs, unix_now_secs())?;
        let id = self.inner.next_schedule_id.fetch_add(1, Ordering::SeqCst);

        let mut scheduled = lock(&self.inner.scheduled);
        scheduled.insert(
            id,
            ScheduledCommand {
                activity,
                fire_at_unix_secs,
                abort: None,
            },
        );

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = inner.shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let Some(command) = lock(&inner.scheduled).remove(&id) else {
                return;
            };
            match inner.set_activity(command.activity).await {
                Ok(dispatch) => debug!(id, ?dispatch, "scheduled activity fired"),
                Err(e) => warn!(id, error = %e, "scheduled activity failed"),
            }
        });
        if let Some(entry) = scheduled.get_mut(&id) {
            entry.abort = Some(handle.abort_handle());
        }

        debug!(id, delay_ms = delay.as_millis() as u64, "activity scheduled");
        Ok(id)
    }

    /// Number of scheduled updates that have not fired yet.
    pub fn scheduled_count(&self) -> usize {
        lock(&self.inner.scheduled).len()
    }

    /// Cancels every outstanding scheduled update. Returns how many.
    pub fn clear_scheduled_activities(&self) -> usize {
        let cleared: Vec<ScheduledCommand> = lock(&self.inner.scheduled)
            .drain()
            .map(|(_, command)| command)
            .collect();
        for command in &cleared {
            if let Some(abort) = &command.abort {
                abort.abort();
            }
        }
        if !cleared.is_empty() {
            debug!(count = cleared.len(), "scheduled activities cleared");
        }
        cleared.len()
    }

    /// Cycles through `frames`, one every `interval`, starting one interval
    /// from now. Replaces any running animation.
    pub fn animate_activity(&self, frames: Vec<Activity>, interval: Duration) -> Result<(), RpcError> {
        if frames.is_empty() {
            return Err(RpcError::InvalidRequest(
                "animation needs at least one activity".into(),
            ));
        }
        if interval.is_zero() {
            return Err(RpcError::InvalidRequest(
                "animation interval must be non-zero".into(),
            ));
        }

        let token = self.inner.shutdown.child_token();
        if let Some(previous) = lock(&self.inner.animation).replace(token.clone()) {
            previous.cancel();
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            for frame in frames.iter().cycle() {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if let Err(e) = inner.set_activity(frame.clone()).await {
                    trace!(error = %e, "animation frame not sent");
                }
            }
        });

        info!(interval_ms = interval.as_millis() as u64, "animation started");
        Ok(())
    }

    /// Stops the running animation, if any.
    pub fn stop_animation(&self) {
        if let Some(token) = lock(&self.inner.animation).take() {
            token.cancel();
            info!("animation stopped");
        }
    }

    pub fn is_animating(&self) -> bool {
        lock(&self.inner.animation)
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }

    /// Shows a progress bar for `label` that starts now and ends after
    /// `duration_secs`. Fields of `extra` other than the label and
    /// timestamps are kept.
    pub async fn set_progress_bar(
        &self,
        label: &str,
        duration_secs: f64,
        extra: Activity,
    ) -> Result<Dispatch, RpcError> {
        self.set_progress_percent(label, 0.0, duration_secs, extra).await
    }

    /// Like [`set_progress_bar`](Self::set_progress_bar), but with `percent`
    /// of the duration already elapsed.
    pub async fn set_progress_percent(
        &self,
        label: &str,
        percent: f64,
        duration_secs: f64,
        extra: Activity,
    ) -> Result<Dispatch, RpcError> {
        let (start, end) = progress_window(unix_now_secs(), percent, duration_secs);
        let activity = Activity {
            details: Some(label.to_string()),
            start_timestamp: Some(start),
            end_timestamp: Some(end),
            ..extra
        };
        self.set_activity(activity).await
    }

    /// Cancels every timer and task this scheduler started.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.stop_animation();
        self.clear_scheduled_activities();
    }
}

impl SchedulerInner {
    async fn set_activity(&self, activity: Activity) -> Result<Dispatch, RpcError> {
        activity.validate()?;

        if !self.session.is_ready() {
            return Err(RpcError::NotConnected);
        }
        if !lock(&self.limiter).try_acquire_at(Instant::now()) {
            debug!("activity update throttled");
            return Ok(Dispatch::Throttled);
        }

        let command = Command::set_activity(self.pid, Some(activity));
        trace!(nonce = %command.nonce, "sending activity");
        self.session.send(Opcode::Frame, &command).await?;
        Ok(Dispatch::Sent)
    }

    /// Sends queued entries in order until the queue is empty.
    async fn drain(&self) {
        loop {
            let Some(entry) = lock(&self.queue).pop_front() else {
                return;
            };

            let wait = lock(&self.limiter).remaining_at(Instant::now());
            if !wait.is_zero() && !self.sleep(wait).await {
                return;
            }

            let state = self.session.subscribe_state();
            match self.set_activity(entry.activity.clone()).await {
                Ok(Dispatch::Sent) => {
                    debug!(
                        waited_ms = entry.enqueued_at.elapsed().as_millis() as u64,
                        "queued activity sent"
                    );
                    let interval = *lock(&self.min_interval);
                    if !self.sleep(interval).await {
                        return;
                    }
                }
                Ok(Dispatch::Throttled) => {
                    // A direct send took the slot; retry after it expires.
                    lock(&self.queue).push_front(entry);
                }
                Err(e) if e.is_connection_error() => {
                    lock(&self.queue).push_front(entry);
                    info!(error = %e, "queue paused until the session is ready");
                    if !self.wait_until_ready_again(state).await {
                        return;
                    }
                    debug!("queue resumed");
                }
                Err(e) => warn!(error = %e, "dropping queued activity"),
            }
        }
    }

    /// Sleeps unless shut down first. Returns `false` on shutdown.
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Waits until the session is ready on a connection other than the one
    /// a send just failed on. `state` must be subscribed before that send.
    /// Returns `false` on shutdown or if the session is gone.
    async fn wait_until_ready_again(&self, mut state: watch::Receiver<SessionState>) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            result = ready_after_failure(&mut state) => result.is_ok(),
        }
    }
}

/// Resolves once `state` reads `Ready` for a connection established after
/// the receiver was subscribed, or immediately if it already does.
async fn ready_after_failure(state: &mut watch::Receiver<SessionState>) -> Result<(), RecvError> {
    // Unchanged Ready means the failed send saw a connection that has not
    // been torn down yet.
    let stale = !state.has_changed()? && *state.borrow() == SessionState::Ready;
    if stale {
        state.changed().await?;
    }
    state.wait_for(|s| *s == SessionState::Ready).await?;
    Ok(())
}

/// Delay until `fire_at` (unix seconds). Past times give zero; times too far
/// out to represent saturate.
fn schedule_delay(fire_at: f64, now: f64) -> Result<Duration, RpcError> {
    if !fire_at.is_finite() {
        return Err(RpcError::InvalidRequest(format!(
            "schedule time must be finite, got {fire_at}"
        )));
    }
    let ahead = fire_at - now;
    if ahead <= 0.0 {
        return Ok(Duration::ZERO);
    }
    Ok(Duration::try_from_secs_f64(ahead).unwrap_or(Duration::MAX))
}

/// Starts the drain task unless one is already running.
fn spawn_drain(inner: &Arc<SchedulerInner>) {
    if inner
        .draining
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return;
    }

    let inner = inner.clone();
    tokio::spawn(async move {
        loop {
            inner.drain().await;
            inner.draining.store(false, Ordering::SeqCst);

            // An entry may have been queued after the final pop but before
            // the flag was reset; nobody else would pick it up.
            let pending = !lock(&inner.queue).is_empty();
            if inner.shutdown.is_cancelled()
                || !pending
                || inner
                    .draining
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
            {
                break;
            }
        }
    });
}
