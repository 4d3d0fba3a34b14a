use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error_codes::ErrorCode;
use super::types::{
    ActionId, ActionKind, ConnectionState, DeathReason, EventKind, Phase, PlayerId, Role,
    SessionId, Team, UserId, WinningTeam,
};

/// Message types sent from client to server over the push channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    /// Bind the connection to an authenticated principal (MUST be first
    /// message). The principal itself is produced by the external auth
    /// service; the engine only consumes its id.
    Attach {
        user_id: UserId,
        /// Token from a previous `Attached` reply; presenting it restores the
        /// subscription after a disconnect.
        #[serde(skip_serializing_if = "Option::is_none")]
        resync_token: Option<String>,
    },
    /// Submit a game action for a session the principal plays in.
    SubmitAction {
        session_id: SessionId,
        kind: ActionKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        target_id: Option<PlayerId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
    /// Request a fresh visibility-filtered snapshot of a session.
    FetchView { session_id: SessionId },
    /// Heartbeat to maintain the connection.
    Ping,
}

/// One pushed event, already projected for the recipient.
///
/// `data` differs between recipients of the same underlying event: a werewolf
/// receives the full vote tally where the witch receives only the provisional
/// victim, and most night traffic is omitted entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPush {
    pub kind: EventKind,
    pub session_id: SessionId,
    pub phase_number: u32,
    pub data: serde_json::Value,
}

/// Session header common to every view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionHeaderView {
    pub session_id: SessionId,
    pub phase: Phase,
    pub phase_number: u32,
    pub day_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_ends_at: Option<DateTime<Utc>>,
    pub werewolves_alive: u32,
    pub villagers_alive: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winning_team: Option<WinningTeam>,
}

/// Per-player slice of a view. `role`/`team` are populated only when the
/// requester is entitled to them (self, game over, fellow werewolf, lover).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerView {
    pub player_id: PlayerId,
    pub seat_position: u8,
    pub is_alive: bool,
    pub connection_state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub died_at_phase: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub death_reason: Option<DeathReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<Team>,
}

/// A requester-specific projection of session state.
///
/// Pure function of committed state and requester identity: two fetches with
/// no intervening mutation return equal views.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionView {
    pub header: SessionHeaderView,
    pub you: PlayerId,
    pub players: Vec<PlayerView>,
    /// Media-plane channels the requester may currently occupy. Empty means
    /// muted.
    pub allowed_voice_channels: Vec<String>,
    /// Action kinds the requester may submit right now.
    pub available_actions: Vec<ActionKind>,
}

/// Message types sent from server to client over the push channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    /// Connection bound to a principal; the token restores the subscription
    /// on reconnect.
    Attached { resync_token: String },
    /// Result of a `SubmitAction`.
    ActionAccepted {
        session_id: SessionId,
        action_id: ActionId,
    },
    /// An action was rejected. The code is deliberately opaque.
    ActionRejected {
        session_id: SessionId,
        error_code: ErrorCode,
    },
    /// A projected game event (boxed to reduce enum size).
    Event(Box<EventPush>),
    /// Response to `FetchView` (boxed to reduce enum size).
    View(Box<SessionView>),
    /// Pong response to ping.
    Pong,
    /// Channel-level error (attach failures, malformed frames).
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_code: Option<ErrorCode>,
    },
}

/// Body of `POST /v1/sessions`, the lobby's only entry point into the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartGameRequest {
    pub room_id: super::types::RoomId,
    /// Seat order is the order of this list.
    pub roster: Vec<UserId>,
    /// Per-session rules; deployment defaults apply when omitted.
    #[serde(default)]
    pub config: Option<crate::config::GameRulesConfig>,
}

/// Reply to a successful `StartGame`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartGameResponse {
    pub session_id: SessionId,
}

/// Body of `POST /v1/sessions/{id}/actions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitActionRequest {
    pub kind: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Reply to a successful action submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitActionResponse {
    pub action_id: ActionId,
}

/// Uniform error body for HTTP responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_code: ErrorCode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_client_message_round_trip() {
        let msg = ClientMessage::SubmitAction {
            session_id: Uuid::new_v4(),
            kind: ActionKind::WerewolfVote,
            target_id: Some(Uuid::new_v4()),
            payload: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"SubmitAction\""));
        assert!(json.contains("\"werewolf_vote\""));
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, ClientMessage::SubmitAction { .. }));
    }

    #[test]
    fn test_view_omits_hidden_fields() {
        let view = PlayerView {
            player_id: Uuid::new_v4(),
            seat_position: 3,
            is_alive: true,
            connection_state: ConnectionState::Connected,
            died_at_phase: None,
            death_reason: None,
            role: None,
            team: None,
        };
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("\"role\""), "hidden role must not serialize");
        assert!(!json.contains("\"team\""), "hidden team must not serialize");
    }

    #[test]
    fn test_action_rejected_carries_opaque_code() {
        let msg = ServerMessage::ActionRejected {
            session_id: Uuid::new_v4(),
            error_code: ErrorCode::InvalidAction,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"invalid_action\""));
        // No human text alongside the code.
        assert!(!json.contains("message"));
    }
}
