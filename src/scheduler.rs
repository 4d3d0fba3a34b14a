//! The phase scheduler: one pending timer per session, restart recovery, and
//! a fallback sweep that catches lost timers.
//!
//! Timers are advisory: the authoritative deadline lives on the session row,
//! and the runtime re-checks it under the per-session lock before acting. The
//! dedup guard only exists to keep a timer and a sweep that race on the same
//! deadline from both paying for a lock acquisition.

use std::num::NonZeroUsize;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, RwLock, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lru::LruCache;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::metrics::EngineMetrics;
use crate::protocol::SessionId;
use crate::retry::{with_retries, RetryConfig};
use crate::store::SessionStore;

/// What a deadline firing invokes. Implemented by the game server, which
/// routes to the owning session runtime.
#[async_trait]
pub trait DeadlineHandler: Send + Sync {
    async fn on_deadline(&self, session_id: SessionId, phase_number: u32);
}

struct TimerEntry {
    phase_number: u32,
    handle: JoinHandle<()>,
}

/// Owns the session -> pending timer mapping.
pub struct PhaseScheduler {
    timers: DashMap<SessionId, TimerEntry>,
    /// Weak: the handler (the server) owns the scheduler, not the reverse.
    handler: RwLock<Weak<dyn DeadlineHandler>>,
    /// (session, phase) pairs that already transitioned.
    transitioned: Mutex<LruCache<(SessionId, u32), ()>>,
    shutdown: CancellationToken,
    metrics: Arc<EngineMetrics>,
}

impl PhaseScheduler {
    pub fn new(dedup_capacity: usize, metrics: Arc<EngineMetrics>) -> Arc<Self> {
        let capacity = NonZeroUsize::new(dedup_capacity.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        let unwired: Weak<dyn DeadlineHandler> = Weak::<NoopHandler>::new();
        Arc::new(Self {
            timers: DashMap::new(),
            handler: RwLock::new(unwired),
            transitioned: Mutex::new(LruCache::new(capacity)),
            shutdown: CancellationToken::new(),
            metrics,
        })
    }

    /// Wire the deadline handler after construction (the server holds the
    /// scheduler, so this breaks the cycle).
    pub fn set_handler(&self, handler: Weak<dyn DeadlineHandler>) {
        if let Ok(mut slot) = self.handler.write() {
            *slot = handler;
        }
    }

    /// Arm a timer for a session's deadline, replacing any pending one.
    pub fn schedule(
        self: &Arc<Self>,
        session_id: SessionId,
        phase_number: u32,
        fire_at: DateTime<Utc>,
    ) {
        let delay = (fire_at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        let scheduler = Arc::clone(self);
        let token = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    scheduler.fire(session_id, phase_number, FireSource::Timer).await;
                }
            }
        });

        if let Some(previous) = self.timers.insert(
            session_id,
            TimerEntry {
                phase_number,
                handle,
            },
        ) {
            previous.handle.abort();
        }
        tracing::debug!(
            %session_id,
            phase_number,
            delay_ms = delay.as_millis() as u64,
            "Phase timer armed"
        );
    }

    /// Stop the pending timer for a session, if any.
    pub fn cancel(&self, session_id: &SessionId) {
        if let Some((_, entry)) = self.timers.remove(session_id) {
            entry.handle.abort();
            tracing::debug!(%session_id, "Phase timer cancelled");
        }
    }

    /// Record a completed transition so a racing timer/sweep skips it.
    pub fn mark_transitioned(&self, session_id: SessionId, phase_number: u32) {
        if let Ok(mut guard) = self.transitioned.lock() {
            guard.put((session_id, phase_number), ());
        }
    }

    fn already_transitioned(&self, session_id: SessionId, phase_number: u32) -> bool {
        self.transitioned
            .lock()
            .map(|mut guard| guard.get(&(session_id, phase_number)).is_some())
            .unwrap_or(false)
    }

    async fn fire(&self, session_id: SessionId, phase_number: u32, source: FireSource) {
        // Drop the timer entry for this firing so the sweep sees no armed
        // timer if the handler dies mid-transition.
        if matches!(source, FireSource::Timer) {
            self.timers
                .remove_if(&session_id, |_, entry| entry.phase_number == phase_number);
        }

        if self.already_transitioned(session_id, phase_number) {
            return;
        }
        let handler = self
            .handler
            .read()
            .ok()
            .and_then(|slot| slot.upgrade());
        let Some(handler) = handler else {
            tracing::warn!(%session_id, "Deadline fired with no handler attached");
            return;
        };

        match source {
            FireSource::Timer => {
                self.metrics.transitions_timer.fetch_add(1, Ordering::Relaxed);
            }
            FireSource::Sweep => {
                self.metrics.transitions_sweep.fetch_add(1, Ordering::Relaxed);
            }
            FireSource::Recovery => {
                self.metrics
                    .transitions_recovered
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
        handler.on_deadline(session_id, phase_number).await;
    }

    /// Crash recovery: rebuild timers for every active session; deadlines
    /// already in the past transition immediately. Idempotent: re-entering
    /// the current phase is a no-op at the runtime.
    pub async fn recover(self: &Arc<Self>, store: &Arc<dyn SessionStore>) {
        let sessions = match store.active_sessions().await {
            Ok(sessions) => sessions,
            Err(err) => {
                tracing::error!(error = %err, "Recovery scan failed; sweep will retry");
                return;
            }
        };

        let now = Utc::now();
        for snapshot in sessions {
            let session_id = snapshot.session.id;
            let phase_number = snapshot.session.phase_number;
            let Some(ends_at) = snapshot.session.phase_ends_at else {
                continue;
            };
            if ends_at > now {
                self.schedule(session_id, phase_number, ends_at);
            } else {
                tracing::info!(
                    %session_id,
                    phase_number,
                    overdue_secs = (now - ends_at).num_seconds(),
                    "Recovering overdue session"
                );
                self.fire(session_id, phase_number, FireSource::Recovery).await;
            }
        }
    }

    /// Start the fallback sweep: every `interval`, transition active sessions
    /// whose deadline passed without an armed timer.
    pub fn spawn_sweep(
        self: &Arc<Self>,
        store: Arc<dyn SessionStore>,
        interval: std::time::Duration,
    ) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => scheduler.sweep_once(&store).await,
                }
            }
        })
    }

    async fn sweep_once(&self, store: &Arc<dyn SessionStore>) {
        let due = with_retries("due_sessions_scan", &RetryConfig::storage(), || {
            store.due_sessions(Utc::now())
        })
        .await;

        let due = match due {
            Ok(due) => due,
            Err(err) => {
                tracing::error!(error = %err, "Fallback sweep scan failed");
                return;
            }
        };

        for (session_id, phase_number) in due {
            let timer_armed = self
                .timers
                .get(&session_id)
                .is_some_and(|entry| entry.phase_number == phase_number);
            if timer_armed || self.already_transitioned(session_id, phase_number) {
                continue;
            }
            tracing::warn!(
                %session_id,
                phase_number,
                "Sweep found overdue session without a timer; transitioning"
            );
            self.fire(session_id, phase_number, FireSource::Sweep).await;
        }
    }

    /// Tear down: stop the sweep and abort every pending timer.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        for entry in self.timers.iter() {
            entry.value().handle.abort();
        }
        self.timers.clear();
    }
}

#[derive(Debug, Clone, Copy)]
enum FireSource {
    Timer,
    Sweep,
    Recovery,
}

/// Placeholder for the unwired state; never instantiated.
struct NoopHandler;

#[async_trait]
impl DeadlineHandler for NoopHandler {
    async fn on_deadline(&self, _session_id: SessionId, _phase_number: u32) {}
}
