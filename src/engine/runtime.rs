//! The per-session runtime: one owning object per active session.
//!
//! Every mutation (action submission, deadline transition, connection-state
//! change) serializes on the runtime's lock, loads the committed snapshot,
//! mutates a working copy through the pure engine modules, and commits one
//! store transaction. Events reach the notifier only after the commit
//! succeeds.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{death, night, phase, phase_seed, view, vote, win, EventSink};
use crate::config::EngineConfig;
use crate::metrics::EngineMetrics;
use crate::notifier::Notifier;
use crate::protocol::{
    ActionId, ActionKind, ConnectionState, DeathReason, ErrorCode, Phase, PlayerId, SessionId,
    SessionView, UserId,
};
use crate::scheduler::PhaseScheduler;
use crate::store::{
    ActionRecord, RevengeResume, SessionSnapshot, SessionStore, SessionTxn, StoreError,
};

/// How an action submission failed. Maps one-to-one onto the opaque client
/// codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("invalid action")]
    Invalid,
    #[error("phase closed")]
    PhaseClosed,
    #[error("busy")]
    Busy,
    #[error("conflict")]
    Conflict,
    #[error("internal error")]
    Internal,
}

impl ActionError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Invalid => ErrorCode::InvalidAction,
            Self::PhaseClosed => ErrorCode::PhaseClosed,
            Self::Busy => ErrorCode::Busy,
            Self::Conflict => ErrorCode::Conflict,
            Self::Internal => ErrorCode::ServerError,
        }
    }
}

/// One client action, as received by the transport layer.
#[derive(Debug, Clone)]
pub struct ActionSubmission {
    pub kind: ActionKind,
    pub target_id: Option<PlayerId>,
    pub payload: Option<serde_json::Value>,
}

/// Answers whether a player's disconnection has outlasted the forfeit grace
/// interval. Implemented by the server's connection tracker.
pub trait DisconnectOracle: Send + Sync {
    fn is_forfeited(&self, user_id: &UserId) -> bool;
}

/// Owns all mutation of one session.
pub struct SessionRuntime {
    session_id: SessionId,
    store: Arc<dyn SessionStore>,
    notifier: Arc<Notifier>,
    scheduler: Arc<PhaseScheduler>,
    metrics: Arc<EngineMetrics>,
    connections: Arc<dyn DisconnectOracle>,
    engine: EngineConfig,
    /// The per-session exclusive lock from the concurrency model: all state
    /// mutation for this session acquires it.
    lock: Mutex<()>,
}

impl SessionRuntime {
    pub fn new(
        session_id: SessionId,
        store: Arc<dyn SessionStore>,
        notifier: Arc<Notifier>,
        scheduler: Arc<PhaseScheduler>,
        metrics: Arc<EngineMetrics>,
        connections: Arc<dyn DisconnectOracle>,
        engine: EngineConfig,
    ) -> Self {
        Self {
            session_id,
            store,
            notifier,
            scheduler,
            metrics,
            connections,
            engine,
            lock: Mutex::new(()),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Submit one action for the principal. Validation, the action record,
    /// state mutation and the event write happen in a single transaction;
    /// nothing half-applies.
    pub async fn submit_action(
        &self,
        user_id: UserId,
        submission: ActionSubmission,
    ) -> Result<ActionId, ActionError> {
        let lock_timeout = std::time::Duration::from_secs(self.engine.lock_timeout_secs);
        let Ok(_guard) = tokio::time::timeout(lock_timeout, self.lock.lock()).await else {
            return Err(ActionError::Busy);
        };

        let snapshot = self.load_snapshot().await?.ok_or(ActionError::Invalid)?;
        if snapshot.session.is_finished() {
            return Err(ActionError::PhaseClosed);
        }
        let now = Utc::now();
        if snapshot.session.phase_ends_at.is_some_and(|ends| now >= ends) {
            // The deadline passed; the timer owns this phase now.
            return Err(ActionError::PhaseClosed);
        }

        let actor = snapshot
            .player_by_user(&user_id)
            .ok_or(ActionError::Invalid)?
            .clone();

        let mut working = snapshot.clone();
        let mut events = EventSink::new(self.session_id, working.session.phase_number);
        let mut finished = false;

        match (working.session.current_phase, submission.kind) {
            (
                Phase::Night,
                ActionKind::WerewolfVote
                | ActionKind::SeerDivine
                | ActionKind::WitchHeal
                | ActionKind::WitchPoison
                | ActionKind::BodyguardProtect
                | ActionKind::CupidChoose,
            ) => {
                if !actor.is_alive {
                    return Err(self.rejected("actor is dead", submission.kind));
                }
                night::collect_action(
                    &mut working,
                    &mut events,
                    actor.id,
                    submission.kind,
                    submission.target_id,
                    submission.payload.as_ref(),
                )
                .map_err(|rejection| self.rejected(rejection.0, submission.kind))?;
            }
            (Phase::DayVoting, ActionKind::VoteLynch) => {
                if !actor.is_alive {
                    return Err(self.rejected("actor is dead", submission.kind));
                }
                vote::collect_vote(&mut working, &mut events, actor.id, submission.target_id)
                    .map_err(|rejection| self.rejected(rejection.0, submission.kind))?;
            }
            (Phase::HunterRevenge, ActionKind::HunterShoot) => {
                let revenge = working
                    .session
                    .phase_state
                    .hunter_revenge
                    .ok_or(ActionError::Invalid)?;
                if revenge.hunter_id != actor.id {
                    return Err(self.rejected("shooter is not the pending hunter", submission.kind));
                }
                let target_id = submission.target_id.ok_or(ActionError::Invalid)?;
                let target_alive = working
                    .player(&target_id)
                    .is_some_and(|target| target.is_alive);
                if !target_alive || target_id == actor.id {
                    return Err(self.rejected("hunter target must be another alive player", submission.kind));
                }
                finished =
                    self.complete_revenge(&mut working, &mut events, Some(target_id), revenge.resume);
            }
            _ => {
                return Err(self.rejected("kind not accepted in this phase", submission.kind));
            }
        }

        let action_id = Uuid::new_v4();
        let mut txn = self.txn_from(&snapshot, &working);
        txn.actions.push(ActionRecord {
            id: action_id,
            session_id: self.session_id,
            actor_id: actor.id,
            phase_number: snapshot.session.phase_number,
            kind: submission.kind,
            target_id: submission.target_id,
            payload: submission.payload.unwrap_or(serde_json::Value::Null),
            created_at: now,
        });
        txn.events.extend(events.into_events());
        let committed_events = txn.events.clone();

        match self.store.commit(txn).await {
            Ok(_) => {}
            Err(StoreError::VersionConflict { .. }) => return Err(ActionError::Conflict),
            Err(StoreError::DuplicateAction { kind, .. }) => {
                return Err(self.rejected("duplicate submission", kind));
            }
            Err(err) => {
                tracing::error!(session_id = %self.session_id, error = %err, "Action commit failed");
                return Err(ActionError::Internal);
            }
        }

        self.notifier.publish(&working, &committed_events);
        tracing::debug!(
            session_id = %self.session_id,
            actor_id = %actor.id,
            kind = %submission.kind,
            "Action accepted"
        );

        if finished {
            self.after_finish();
        } else if working.session.current_phase != snapshot.session.current_phase {
            // The hunter shot resumed the outer phase sequence.
            self.after_transition(&snapshot, &working);
        } else if working.session.current_phase == Phase::Night {
            // Early resolution when every outstanding night action is in.
            let forfeited = self.forfeited_players(&working);
            if night::all_actions_complete(&working, &forfeited) {
                self.metrics
                    .transitions_early
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                self.advance_locked(snapshot.session.phase_number).await;
            }
        }

        Ok(action_id)
    }

    /// Deadline firing for `phase_number` (timer, sweep or recovery). No-op
    /// if the session already moved on; re-entering a phase cannot happen
    /// because the phase number only advances.
    pub async fn on_deadline(&self, phase_number: u32) {
        let _guard = self.lock.lock().await;
        self.advance_locked(phase_number).await;
    }

    /// Mirror the push channel's liveness into the player record.
    pub async fn set_connection_state(&self, user_id: UserId, state: ConnectionState) {
        let _guard = self.lock.lock().await;
        let Ok(Some(snapshot)) = self.load_snapshot().await else {
            return;
        };
        let Some(player) = snapshot.player_by_user(&user_id) else {
            return;
        };
        if player.connection_state == state || snapshot.session.is_finished() {
            return;
        }

        let mut txn = SessionTxn::from_snapshot(&snapshot);
        let mut record = player.clone();
        record.connection_state = state;
        txn.put_player(record);
        if let Err(err) = self.store.commit(txn).await {
            tracing::warn!(
                session_id = %self.session_id,
                user_id = %user_id,
                error = %err,
                "Connection state update failed"
            );
        }
    }

    /// Requester-filtered snapshot of committed state. Lock-free: reads see
    /// only committed transactions, so two calls without an intervening
    /// commit are equal.
    pub async fn view_for(&self, user_id: UserId) -> Result<SessionView, ActionError> {
        let snapshot = self.load_snapshot().await?.ok_or(ActionError::Invalid)?;
        let player = snapshot
            .player_by_user(&user_id)
            .ok_or(ActionError::Invalid)?;
        Ok(view::build_view(&snapshot, player))
    }

    async fn advance_locked(&self, expected_phase_number: u32) {
        let snapshot = match self.load_snapshot().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return,
            Err(_) => return,
        };
        if snapshot.session.is_finished()
            || snapshot.session.phase_number != expected_phase_number
        {
            return;
        }

        let now = Utc::now();
        let mut working = snapshot.clone();
        let mut events = EventSink::new(self.session_id, snapshot.session.phase_number);
        match snapshot.session.current_phase {
            Phase::Night => {
                let rules = snapshot.session.rules.clone();
                let resolution = night::resolve(&mut working, &rules, &mut events);
                if let Some(hunter_id) = resolution.hunter_pending {
                    // The win check waits for the revenge shot: it can still
                    // change the outcome.
                    phase::enter_revenge(
                        &mut working,
                        &mut events,
                        hunter_id,
                        RevengeResume::NightResolution,
                        now,
                    );
                } else if let Some(outcome) = win::check(&working) {
                    win::finalize(&mut working, &mut events, &outcome);
                } else {
                    phase::enter(&mut working, &mut events, Phase::DayDiscussion, now);
                }
            }
            Phase::DayDiscussion => {
                phase::enter(&mut working, &mut events, Phase::DayVoting, now);
            }
            Phase::DayVoting => {
                let rules = snapshot.session.rules.clone();
                let outcome = vote::tally(&working, rules.tie_rule);
                let mut hunter_pending = None;
                if let vote::LynchOutcome::Lynched(lynched) = outcome {
                    working.session.phase_state.last_lynched = Some(lynched);
                    let death_outcome = death::process_death(
                        &mut working,
                        &rules,
                        &mut events,
                        death::DeathContext {
                            player_id: lynched,
                            reason: DeathReason::Lynch,
                            phase_number: snapshot.session.phase_number,
                        },
                    );
                    hunter_pending = death_outcome.hunter_pending;
                }
                if let Some(hunter_id) = hunter_pending {
                    phase::enter_revenge(
                        &mut working,
                        &mut events,
                        hunter_id,
                        RevengeResume::LynchResolution,
                        now,
                    );
                } else if let Some(outcome) = win::check(&working) {
                    win::finalize(&mut working, &mut events, &outcome);
                } else {
                    phase::enter(&mut working, &mut events, Phase::Night, now);
                }
            }
            Phase::HunterRevenge => {
                if let Some(revenge) = working.session.phase_state.hunter_revenge {
                    // Sub-deadline expired: auto-select a random alive
                    // target, seeded for reproducibility.
                    let target = self.auto_shot_target(&working, revenge.hunter_id);
                    self.complete_revenge(&mut working, &mut events, target, revenge.resume);
                } else {
                    // Inconsistent sub-state; resume as if the night ended.
                    phase::enter(&mut working, &mut events, Phase::DayDiscussion, now);
                }
            }
        }

        self.commit_transition(&snapshot, working, events).await;
    }

    /// Apply the hunter's shot (chosen or auto-selected), run the win check,
    /// and resume the suspended phase sequence. Returns whether the game
    /// ended.
    fn complete_revenge(
        &self,
        working: &mut SessionSnapshot,
        events: &mut EventSink,
        target: Option<PlayerId>,
        resume: RevengeResume,
    ) -> bool {
        let phase_number = working.session.phase_number;
        let rules = working.session.rules.clone();

        if let Some(hunter_id) = working.session.phase_state.hunter_revenge.map(|r| r.hunter_id) {
            if let Some(crate::protocol::RoleState::Hunter { has_shot }) =
                working.player_mut(&hunter_id).map(|p| &mut p.role_state)
            {
                *has_shot = true;
            }
        }
        working.session.phase_state.hunter_revenge = None;

        if let Some(target) = target {
            death::process_death(
                working,
                &rules,
                events,
                death::DeathContext {
                    player_id: target,
                    reason: DeathReason::HunterShot,
                    phase_number,
                },
            );
        }

        if let Some(outcome) = win::check(working) {
            win::finalize(working, events, &outcome);
            true
        } else {
            phase::enter(working, events, phase::revenge_resume_phase(resume), Utc::now());
            false
        }
    }

    fn auto_shot_target(
        &self,
        working: &SessionSnapshot,
        hunter_id: PlayerId,
    ) -> Option<PlayerId> {
        let mut candidates: Vec<PlayerId> = working
            .alive_players()
            .filter(|p| p.id != hunter_id)
            .map(|p| p.id)
            .collect();
        candidates.sort();
        let seed = phase_seed(&self.session_id, working.session.phase_number);
        let mut rng = StdRng::seed_from_u64(seed);
        candidates.choose(&mut rng).copied()
    }

    async fn commit_transition(
        &self,
        snapshot: &SessionSnapshot,
        working: SessionSnapshot,
        events: EventSink,
    ) {
        let mut txn = self.txn_from(snapshot, &working);
        txn.events.extend(events.into_events());
        let committed_events = txn.events.clone();

        match self.store.commit(txn).await {
            Ok(_) => {}
            Err(err) => {
                // The deadline stays in the past, so the fallback sweep will
                // retry this transition.
                self.metrics
                    .transition_failures
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                tracing::error!(
                    session_id = %self.session_id,
                    error = %err,
                    alert = true,
                    "Phase transition failed; sweep will retry"
                );
                return;
            }
        }

        self.notifier.publish(&working, &committed_events);
        self.after_transition(snapshot, &working);
        if working.session.is_finished() {
            self.after_finish();
        }
    }

    /// Post-commit bookkeeping shared by the deadline and hunter-shot paths.
    fn after_transition(&self, snapshot: &SessionSnapshot, working: &SessionSnapshot) {
        self.scheduler
            .mark_transitioned(self.session_id, snapshot.session.phase_number);
        if let (false, Some(ends_at)) =
            (working.session.is_finished(), working.session.phase_ends_at)
        {
            self.scheduler
                .schedule(self.session_id, working.session.phase_number, ends_at);
        }
        tracing::info!(
            session_id = %self.session_id,
            from = %snapshot.session.current_phase,
            to = %working.session.current_phase,
            phase_number = working.session.phase_number,
            "Phase transition"
        );
    }

    fn after_finish(&self) {
        self.scheduler.cancel(&self.session_id);
        self.metrics
            .sessions_finished
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        tracing::info!(session_id = %self.session_id, "Session finished");
    }

    fn forfeited_players(&self, snapshot: &SessionSnapshot) -> HashSet<PlayerId> {
        snapshot
            .alive_players()
            .filter(|p| {
                p.connection_state == ConnectionState::Disconnected
                    && self.connections.is_forfeited(&p.user_id)
            })
            .map(|p| p.id)
            .collect()
    }

    /// Transaction carrying the session row plus the players that changed.
    fn txn_from(&self, snapshot: &SessionSnapshot, working: &SessionSnapshot) -> SessionTxn {
        let mut txn = SessionTxn::from_snapshot(snapshot);
        txn.session = working.session.clone();
        for player in &working.players {
            let unchanged = snapshot
                .player(&player.id)
                .is_some_and(|original| original == player);
            if !unchanged {
                txn.put_player(player.clone());
            }
        }
        txn
    }

    async fn load_snapshot(&self) -> Result<Option<SessionSnapshot>, ActionError> {
        self.store.load_session(&self.session_id).await.map_err(|err| {
            tracing::error!(session_id = %self.session_id, error = %err, "Snapshot load failed");
            ActionError::Internal
        })
    }

    fn rejected(&self, reason: &'static str, kind: ActionKind) -> ActionError {
        // The cause stays in the logs; the client sees only the opaque code.
        tracing::debug!(
            session_id = %self.session_id,
            kind = %kind,
            reason,
            "Action rejected"
        );
        ActionError::Invalid
    }
}
