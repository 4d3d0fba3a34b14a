// Protocol module: wire types, message envelopes, error codes, validation

pub mod error_codes;
pub mod messages;
pub mod types;
pub mod validation;

pub use error_codes::ErrorCode;

pub use types::{
    ActionId, ActionKind, ConnectionState, DeathReason, EventId, EventKind, Phase, PlayerId, Role,
    RoleState, RoomId, SessionId, SessionStatus, Team, TieRule, UserId, Visibility, WinningTeam,
    MAX_ROSTER_SIZE, MIN_ROSTER_SIZE, VOICE_CHANNEL_DEAD, VOICE_CHANNEL_MAIN,
    VOICE_CHANNEL_WEREWOLF,
};

pub use messages::{
    ClientMessage, ErrorResponse, EventPush, PlayerView, ServerMessage, SessionHeaderView,
    SessionView, StartGameRequest, StartGameResponse, SubmitActionRequest, SubmitActionResponse,
};

pub use validation::{validate_roster, validate_rules, StartGameError};
