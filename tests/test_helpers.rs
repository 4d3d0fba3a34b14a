//! Shared fixtures for integration tests: scripted games with prescribed
//! seat/role layouts, driven through the public server surface.
#![allow(dead_code)] // each test binary uses its own slice of the helpers

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use moonfall_server::config::{Config, EnabledRoles, GameRulesConfig};
use moonfall_server::engine::runtime::{ActionError, ActionSubmission};
use moonfall_server::engine::night;
use moonfall_server::protocol::{
    ActionId, ActionKind, ConnectionState, Phase, PlayerId, Role, RoleState, SessionId,
    SessionStatus, UserId,
};
use moonfall_server::scheduler::DeadlineHandler;
use moonfall_server::server::GameServer;
use moonfall_server::store::{
    InMemoryStore, PhaseState, PlayerRecord, SessionRecord, SessionSnapshot, SessionStore,
};

/// A running test game with a known seat -> role layout.
pub struct TestGame {
    pub server: Arc<GameServer>,
    pub store: Arc<InMemoryStore>,
    pub session_id: SessionId,
    pub player_ids: Vec<PlayerId>,
    pub user_ids: Vec<UserId>,
}

/// Config tuned for tests: long phases (transitions are driven explicitly),
/// no response-time floor, quiet sweep.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.engine.min_response_millis = 0;
    config.engine.sweep_interval_secs = 3600;
    config.security.require_metrics_auth = false;
    config.rules = long_rules(EnabledRoles::default());
    config
}

pub fn long_rules(enabled_roles: EnabledRoles) -> GameRulesConfig {
    GameRulesConfig {
        night_seconds: 600,
        day_seconds: 600,
        voting_seconds: 600,
        hunter_revenge_seconds: 600,
        enabled_roles,
        werewolf_count: None,
        tie_rule: Default::default(),
    }
}

/// Build a night-1 session whose seat layout is exactly `roles`, bypassing
/// the random deal but exercising everything downstream of it.
pub fn scripted_session(roles: &[Role], rules: &GameRulesConfig) -> (SessionRecord, Vec<PlayerRecord>) {
    let session_id = Uuid::new_v4();
    let now = Utc::now();

    let players: Vec<PlayerRecord> = roles
        .iter()
        .enumerate()
        .map(|(seat, role)| PlayerRecord {
            id: Uuid::new_v4(),
            session_id,
            user_id: Uuid::new_v4(),
            role: *role,
            team: role.starting_team(),
            is_alive: true,
            died_at_phase: None,
            death_reason: None,
            lover_id: None,
            role_state: RoleState::initial(*role),
            seat_position: seat as u8,
            connection_state: ConnectionState::Connected,
        })
        .collect();
    let werewolves_alive = players.iter().filter(|p| p.role == Role::Werewolf).count() as u32;
    let villagers_alive = players.len() as u32 - werewolves_alive;

    let night_ends = now + chrono::Duration::seconds(rules.night_duration_secs() as i64);
    let session = SessionRecord {
        id: session_id,
        room_id: Uuid::new_v4(),
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
        rules: rules.clone(),
    };

    let mut snapshot = SessionSnapshot {
        session,
        players: players.clone(),
    };
    let pending = night::pending_roles(&snapshot, 1);
    snapshot.session.phase_state.pending_night_actions = pending;

    (snapshot.session, players)
}

/// Start a server over a fresh store seeded with one scripted session.
pub async fn start_scripted_game(roles: &[Role], config: Config) -> TestGame {
    let store = Arc::new(InMemoryStore::new());
    let (session, players) = scripted_session(roles, &config.rules);
    let session_id = session.id;

    store
        .create_session(session, players.clone())
        .await
        .expect("create test session");

    let server = GameServer::new(config, store.clone())
        .await
        .expect("start test server");

    TestGame {
        server,
        store,
        session_id,
        player_ids: players.iter().map(|p| p.id).collect(),
        user_ids: players.iter().map(|p| p.user_id).collect(),
    }
}

impl TestGame {
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.store
            .load_session(&self.session_id)
            .await
            .expect("load snapshot")
            .expect("session exists")
    }

    pub async fn player(&self, seat: usize) -> PlayerRecord {
        let snapshot = self.snapshot().await;
        snapshot
            .player(&self.player_ids[seat])
            .expect("player exists")
            .clone()
    }

    /// Submit an action for the player in `seat`, targeting `target_seat`.
    pub async fn submit(
        &self,
        seat: usize,
        kind: ActionKind,
        target_seat: Option<usize>,
    ) -> Result<ActionId, ActionError> {
        self.submit_with_payload(seat, kind, target_seat, None).await
    }

    pub async fn submit_with_payload(
        &self,
        seat: usize,
        kind: ActionKind,
        target_seat: Option<usize>,
        payload: Option<serde_json::Value>,
    ) -> Result<ActionId, ActionError> {
        self.server
            .submit_action(
                self.user_ids[seat],
                self.session_id,
                ActionSubmission {
                    kind,
                    target_id: target_seat.map(|s| self.player_ids[s]),
                    payload,
                },
            )
            .await
    }

    /// Fire the deadline of the current phase, as the timer would.
    pub async fn expire_current_phase(&self) {
        let phase_number = self.snapshot().await.session.phase_number;
        self.server.on_deadline(self.session_id, phase_number).await;
    }

    /// Everybody alive votes to lynch `target_seat`.
    pub async fn unanimous_lynch(&self, target_seat: usize) {
        let snapshot = self.snapshot().await;
        let alive: Vec<usize> = snapshot
            .players
            .iter()
            .filter(|p| p.is_alive && p.seat_position as usize != target_seat)
            .map(|p| p.seat_position as usize)
            .collect();
        for seat in alive {
            self.submit(seat, ActionKind::VoteLynch, Some(target_seat))
                .await
                .expect("lynch vote accepted");
        }
    }

    /// Run one full day (discussion + voting) that lynches `target_seat`.
    pub async fn lynch_day(&self, target_seat: usize) {
        assert_eq!(self.snapshot().await.session.current_phase, Phase::DayDiscussion);
        self.expire_current_phase().await;
        assert_eq!(self.snapshot().await.session.current_phase, Phase::DayVoting);
        self.unanimous_lynch(target_seat).await;
        self.expire_current_phase().await;
    }

    /// Map of seat -> alive, for terse assertions.
    pub async fn alive_by_seat(&self) -> HashMap<usize, bool> {
        self.snapshot()
            .await
            .players
            .iter()
            .map(|p| (p.seat_position as usize, p.is_alive))
            .collect()
    }
}
