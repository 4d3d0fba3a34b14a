//! Server orchestration: the process-wide registries (session runtimes,
//! scheduler, notifier, connection tracker) and the three externally visible
//! operations: start a game, submit an action, fetch a view.

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

mod connections;

pub use connections::ConnectionTracker;

use crate::config::{Config, GameRulesConfig};
use crate::engine::runtime::{ActionError, ActionSubmission, SessionRuntime};
use crate::engine::{assign_roles, night, EventSink};
use crate::metrics::EngineMetrics;
use crate::notifier::Notifier;
use crate::protocol::{
    validate_roster, validate_rules, ActionId, ConnectionState, EventKind, Phase, RoomId,
    ServerMessage, SessionId, SessionStatus, SessionView, StartGameError, UserId, Visibility,
};
use crate::rate_limit::{ActionRateLimiter, RateLimitConfig};
use crate::resync::ResyncTokens;
use crate::scheduler::{DeadlineHandler, PhaseScheduler};
use crate::store::{PhaseState, SessionRecord, SessionSnapshot, SessionStore, SessionTxn};

/// The engine server. One per process; sessions are exclusively owned here
/// and never handed off to another process.
pub struct GameServer {
    store: Arc<dyn SessionStore>,
    notifier: Arc<Notifier>,
    scheduler: Arc<PhaseScheduler>,
    runtimes: DashMap<SessionId, Arc<SessionRuntime>>,
    /// user -> sessions they play in, for connection-state mirroring.
    memberships: DashMap<UserId, HashSet<SessionId>>,
    connections: Arc<ConnectionTracker>,
    rate_limiter: Arc<ActionRateLimiter>,
    resync: ResyncTokens,
    metrics: Arc<EngineMetrics>,
    config: Config,
    shutdown: CancellationToken,
}

impl GameServer {
    /// Build the server, wire the scheduler back to it, recover outstanding
    /// deadlines and start the background tasks.
    pub async fn new(config: Config, store: Arc<dyn SessionStore>) -> anyhow::Result<Arc<Self>> {
        store.initialize().await?;

        let metrics = Arc::new(EngineMetrics::new());
        let notifier = Arc::new(Notifier::new(metrics.clone()));
        let scheduler = PhaseScheduler::new(config.engine.transition_dedup_capacity, metrics.clone());
        let connections = Arc::new(ConnectionTracker::new(Duration::from_secs(
            config.engine.disconnect_grace_secs,
        )));
        let rate_limiter = Arc::new(ActionRateLimiter::new(RateLimitConfig::from_config(
            &config.rate_limit,
        )));
        let resync = ResyncTokens::new(config.security.resync_secret.as_deref())?;
        let shutdown = CancellationToken::new();

        let server = Arc::new(Self {
            store: store.clone(),
            notifier,
            scheduler: scheduler.clone(),
            runtimes: DashMap::new(),
            memberships: DashMap::new(),
            connections,
            rate_limiter: rate_limiter.clone(),
            resync,
            metrics,
            config: config.clone(),
            shutdown: shutdown.clone(),
        });

        let handler_arc: Arc<dyn DeadlineHandler> = server.clone();
        let weak: std::sync::Weak<dyn DeadlineHandler> = Arc::downgrade(&handler_arc);
        scheduler.set_handler(weak);

        // Crash recovery: rebuild timers, transition anything overdue, and
        // relearn the roster memberships.
        server.recover_memberships().await;
        scheduler.recover(&store).await;

        let _sweep_task = scheduler.spawn_sweep(
            store,
            Duration::from_secs(config.engine.sweep_interval_secs),
        );
        rate_limiter.start_cleanup_task(shutdown);

        Ok(server)
    }

    /// The lobby's entry point: create a session from a roster.
    pub async fn start_game(
        &self,
        room_id: RoomId,
        roster: &[UserId],
        rules: Option<GameRulesConfig>,
    ) -> Result<SessionId, StartGameError> {
        let rules = rules.unwrap_or_else(|| self.config.rules.clone());
        validate_roster(roster)?;
        validate_rules(&rules, roster.len())?;

        let session_id = Uuid::new_v4();
        let players = assign_roles(session_id, roster, &rules)?;
        let werewolves_alive = players
            .iter()
            .filter(|p| p.role == crate::protocol::Role::Werewolf)
            .count() as u32;
        let villagers_alive = players.len() as u32 - werewolves_alive;

        let now = Utc::now();
        let night_ends = now + ChronoDuration::seconds(rules.night_duration_secs() as i64);
        let session = SessionRecord {
            id: session_id,
            room_id,
            status: SessionStatus::Active,
            current_phase: Phase::Night,
            phase_number: 1,
            day_number: 0,
            phase_started_at: now,
            phase_ends_at: Some(night_ends),
            phase_state: PhaseState {
                scheduled_deadline: Some(night_ends),
                ..PhaseState::default()
            },
            werewolves_alive,
            villagers_alive,
            neutrals_alive: 0,
            winning_team: None,
            started_at: now,
            finished_at: None,
            version: 0,
            rules,
        };

        let mut snapshot = SessionSnapshot {
            session,
            players: players.clone(),
        };
        let pending = night::pending_roles(&snapshot, 1);
        snapshot.session.phase_state.pending_night_actions = pending;

        self.store
            .create_session(snapshot.session.clone(), players.clone())
            .await
            .map_err(|err| {
                tracing::error!(%session_id, error = %err, "Session insert failed");
                StartGameError::Internal("storage unavailable".into())
            })?;

        // The opening phase_change goes through a normal transaction so the
        // audit log starts with it.
        let mut events = EventSink::new(session_id, 1);
        events.emit(
            EventKind::PhaseChange,
            Visibility::Public,
            serde_json::json!({
                "phase": Phase::Night,
                "phase_number": 1,
                "day_number": 0,
                "phase_ends_at": night_ends,
            }),
        );
        let mut txn = SessionTxn::from_snapshot(&snapshot);
        txn.events.extend(events.into_events());
        let committed_events = txn.events.clone();
        if let Err(err) = self.store.commit(txn).await {
            tracing::error!(%session_id, error = %err, "Opening event commit failed");
        } else {
            self.notifier.publish(&snapshot, &committed_events);
        }

        for player in &players {
            self.memberships
                .entry(player.user_id)
                .or_default()
                .insert(session_id);
        }
        self.scheduler.schedule(session_id, 1, night_ends);
        self.metrics.sessions_started.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            %session_id,
            %room_id,
            roster_size = roster.len(),
            werewolves = werewolves_alive,
            "Session started"
        );
        Ok(session_id)
    }

    /// Submit one action. All failure causes surface as opaque codes, and
    /// the handler never returns before the constant-time floor, so latency
    /// reveals nothing about which cause fired.
    pub async fn submit_action(
        &self,
        user_id: UserId,
        session_id: SessionId,
        submission: ActionSubmission,
    ) -> Result<ActionId, ActionError> {
        let started = Instant::now();
        let result = self.submit_action_inner(user_id, session_id, submission).await;
        self.metrics.record_action_latency(started.elapsed());
        self.count_action_outcome(&result);

        let floor = Duration::from_millis(self.config.engine.min_response_millis);
        if let Some(remaining) = floor.checked_sub(started.elapsed()) {
            sleep(remaining).await;
        }
        result
    }

    async fn submit_action_inner(
        &self,
        user_id: UserId,
        session_id: SessionId,
        submission: ActionSubmission,
    ) -> Result<ActionId, ActionError> {
        if self.shutdown.is_cancelled() {
            return Err(ActionError::PhaseClosed);
        }
        if !self.rate_limiter.check_action(&user_id).await {
            self.metrics.rate_limit_rejections.fetch_add(1, Ordering::Relaxed);
            return Err(ActionError::Busy);
        }
        let runtime = self.runtime_for(session_id);
        runtime.submit_action(user_id, submission).await
    }

    /// Requester-filtered session snapshot.
    pub async fn get_session_view(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<SessionView, ActionError> {
        if !self.rate_limiter.check_view_fetch(&user_id).await {
            self.metrics.rate_limit_rejections.fetch_add(1, Ordering::Relaxed);
            return Err(ActionError::Busy);
        }
        self.runtime_for(session_id).view_for(user_id).await
    }

    /// Attach a principal's push channel. Returns the resync token the
    /// client presents after a disconnect.
    pub async fn attach_client(
        &self,
        user_id: UserId,
        sender: tokio::sync::mpsc::Sender<Arc<ServerMessage>>,
    ) -> String {
        self.notifier.subscribe(user_id, sender);
        self.connections.mark_connected(user_id);
        self.mirror_connection_state(user_id, ConnectionState::Connected)
            .await;
        tracing::info!(%user_id, "Client attached");
        self.resync.issue(&user_id)
    }

    /// Detach a principal's push channel (socket closed or errored). A stale
    /// detach racing a fresh attach is a no-op.
    pub async fn detach_client(
        &self,
        user_id: &UserId,
        sender: &tokio::sync::mpsc::Sender<Arc<ServerMessage>>,
    ) {
        if !self.notifier.unsubscribe_if_same(user_id, sender) {
            return;
        }
        self.connections.mark_disconnected(*user_id);
        self.mirror_connection_state(*user_id, ConnectionState::Disconnected)
            .await;
        tracing::info!(user_id = %user_id, "Client detached");
    }

    /// Verify a resync token and recover the principal it belongs to.
    pub fn verify_resync_token(&self, token: &str) -> Option<UserId> {
        self.resync.verify(token)
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        self.metrics.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn connections(&self) -> &ConnectionTracker {
        &self.connections
    }

    pub async fn health_check(&self) -> bool {
        self.store.health_check().await
    }

    /// Explicit teardown: stop timers and the sweep, drop subscriptions,
    /// refuse further actions.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.scheduler.shutdown();
        self.notifier.shutdown();
        tracing::info!("Game server shut down");
    }

    /// The owning runtime for a session, created on first touch (including
    /// after a restart).
    fn runtime_for(&self, session_id: SessionId) -> Arc<SessionRuntime> {
        self.runtimes
            .entry(session_id)
            .or_insert_with(|| {
                Arc::new(SessionRuntime::new(
                    session_id,
                    self.store.clone(),
                    self.notifier.clone(),
                    self.scheduler.clone(),
                    self.metrics.clone(),
                    self.connections.clone(),
                    self.config.engine.clone(),
                ))
            })
            .value()
            .clone()
    }

    async fn mirror_connection_state(&self, user_id: UserId, state: ConnectionState) {
        let sessions: Vec<SessionId> = self
            .memberships
            .get(&user_id)
            .map(|entry| entry.iter().copied().collect())
            .unwrap_or_default();
        for session_id in sessions {
            self.runtime_for(session_id)
                .set_connection_state(user_id, state)
                .await;
        }
    }

    async fn recover_memberships(&self) {
        let sessions = match self.store.active_sessions().await {
            Ok(sessions) => sessions,
            Err(err) => {
                tracing::error!(error = %err, "Membership recovery scan failed");
                return;
            }
        };
        for snapshot in sessions {
            for player in &snapshot.players {
                self.memberships
                    .entry(player.user_id)
                    .or_default()
                    .insert(snapshot.session.id);
            }
        }
    }

    fn count_action_outcome(&self, result: &Result<ActionId, ActionError>) {
        let counter = match result {
            Ok(_) => &self.metrics.actions_accepted,
            Err(ActionError::Invalid) => &self.metrics.actions_invalid,
            Err(ActionError::PhaseClosed) => &self.metrics.actions_phase_closed,
            Err(ActionError::Busy) => &self.metrics.actions_busy,
            Err(ActionError::Conflict) => &self.metrics.actions_conflict,
            Err(ActionError::Internal) => &self.metrics.actions_failed_internal,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl DeadlineHandler for GameServer {
    async fn on_deadline(&self, session_id: SessionId, phase_number: u32) {
        self.runtime_for(session_id).on_deadline(phase_number).await;
    }
}
