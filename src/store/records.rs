//! Persisted record types.
//!
//! These mirror the relational tables (`game_sessions`, `game_players`,
//! `game_actions`, `game_events`). The in-memory backend stores them as typed
//! structs; a relational backend would map them to rows at the
//! [`SessionStore`](super::SessionStore) seam.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::GameRulesConfig;
use crate::protocol::{
    ActionId, ActionKind, ConnectionState, DeathReason, EventId, EventKind, Phase, PlayerId, Role,
    RoleState, RoomId, SessionId, SessionStatus, Team, UserId, Visibility, WinningTeam,
};

/// One row of `game_sessions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub id: SessionId,
    pub room_id: RoomId,
    pub status: SessionStatus,
    pub current_phase: Phase,
    /// Monotone, starts at 1.
    pub phase_number: u32,
    /// Monotone, starts at 0; bumps when a new night begins.
    pub day_number: u32,
    pub phase_started_at: DateTime<Utc>,
    /// Null exactly when the session is finished.
    pub phase_ends_at: Option<DateTime<Utc>>,
    /// Phase-local mutable state, rewritten at phase boundaries.
    pub phase_state: PhaseState,
    pub werewolves_alive: u32,
    pub villagers_alive: u32,
    pub neutrals_alive: u32,
    pub winning_team: Option<WinningTeam>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency counter, bumped by every committed transaction.
    pub version: u64,
    /// Rules the session was started with.
    pub rules: GameRulesConfig,
}

impl SessionRecord {
    pub fn alive_total(&self) -> u32 {
        self.werewolves_alive + self.villagers_alive + self.neutrals_alive
    }

    pub fn is_finished(&self) -> bool {
        self.status == SessionStatus::Finished
    }
}

/// One row of `game_players`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub role: Role,
    pub team: Team,
    pub is_alive: bool,
    pub died_at_phase: Option<u32>,
    pub death_reason: Option<DeathReason>,
    pub lover_id: Option<PlayerId>,
    pub role_state: RoleState,
    /// Unique within the session, stable for its lifetime.
    pub seat_position: u8,
    pub connection_state: ConnectionState,
}

/// One row of `game_actions`. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionRecord {
    pub id: ActionId,
    pub session_id: SessionId,
    pub actor_id: PlayerId,
    pub phase_number: u32,
    pub kind: ActionKind,
    pub target_id: Option<PlayerId>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// One row of `game_events`. Append-only; drives the notifier and the audit
/// log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    pub id: EventId,
    pub session_id: SessionId,
    pub phase_number: u32,
    pub kind: EventKind,
    pub public: bool,
    pub visibility: Visibility,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Who the bodyguard shields tonight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProtectChoice {
    pub bodyguard: PlayerId,
    pub target: PlayerId,
}

/// Who the seer inspects tonight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DivineChoice {
    pub seer: PlayerId,
    pub target: PlayerId,
}

/// Collected night submissions, filled during the collect window and consumed
/// by resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NightChoices {
    pub protect: Option<ProtectChoice>,
    /// The witch spent her heal potion this night.
    pub heal_committed: bool,
    pub poison_target: Option<PlayerId>,
    pub divination: Option<DivineChoice>,
    /// Cupid's pair, valid on the first night only.
    pub cupid_pair: Option<(PlayerId, PlayerId)>,
}

/// Which outer transition the hunter-revenge sub-state suspends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RevengeResume {
    /// Entered out of night resolution; resumes into day discussion of the
    /// same round.
    NightResolution,
    /// Entered out of lynch resolution; resumes into the next night.
    LynchResolution,
}

/// Bookkeeping for a suspended hunter-revenge sub-state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HunterRevengeState {
    pub hunter_id: PlayerId,
    pub resume: RevengeResume,
}

/// The session's phase-local mutable blob. Cleared or rewritten at every
/// phase boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PhaseState {
    /// voter -> target; latest write wins.
    pub werewolf_votes: BTreeMap<PlayerId, PlayerId>,
    /// voter -> target; latest write wins.
    pub lynch_votes: BTreeMap<PlayerId, PlayerId>,
    /// role -> completed, for early night resolution and forfeit tracking.
    pub pending_night_actions: BTreeMap<Role, bool>,
    pub night: NightChoices,
    pub last_lynched: Option<PlayerId>,
    pub last_killed: Option<PlayerId>,
    pub hunter_revenge: Option<HunterRevengeState>,
    pub scheduled_deadline: Option<DateTime<Utc>>,
}

/// A consistent read of one session: the session row plus all its players,
/// taken at a single version.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session: SessionRecord,
    /// Ordered by seat position.
    pub players: Vec<PlayerRecord>,
}

impl SessionSnapshot {
    pub fn player(&self, player_id: &PlayerId) -> Option<&PlayerRecord> {
        self.players.iter().find(|p| p.id == *player_id)
    }

    pub fn player_mut(&mut self, player_id: &PlayerId) -> Option<&mut PlayerRecord> {
        self.players.iter_mut().find(|p| p.id == *player_id)
    }

    pub fn player_by_user(&self, user_id: &UserId) -> Option<&PlayerRecord> {
        self.players.iter().find(|p| p.user_id == *user_id)
    }

    pub fn alive_players(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.players.iter().filter(|p| p.is_alive)
    }

    pub fn alive_with_role(&self, role: Role) -> impl Iterator<Item = &PlayerRecord> {
        self.alive_players().filter(move |p| p.role == role)
    }

    pub fn alive_count(&self) -> u32 {
        self.alive_players().count() as u32
    }
}

/// A single atomic mutation of one session: the updated session row, any
/// changed player rows, and log appends. Applied all-or-nothing against
/// `expected_version`.
#[derive(Debug, Clone)]
pub struct SessionTxn {
    pub session_id: SessionId,
    pub expected_version: u64,
    pub session: SessionRecord,
    /// Changed players only; replaced by id.
    pub players: Vec<PlayerRecord>,
    pub actions: Vec<ActionRecord>,
    pub events: Vec<EventRecord>,
}

impl SessionTxn {
    /// Start a transaction from a snapshot; the caller mutates `session` /
    /// pushes players, actions and events before committing.
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        Self {
            session_id: snapshot.session.id,
            expected_version: snapshot.session.version,
            session: snapshot.session.clone(),
            players: Vec::new(),
            actions: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Record a changed player row, replacing any earlier change to the same
    /// player within this transaction.
    pub fn put_player(&mut self, player: PlayerRecord) {
        self.players.retain(|p| p.id != player.id);
        self.players.push(player);
    }
}
