use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque error codes surfaced to clients.
///
/// Action failures deliberately collapse into `InvalidAction` regardless of
/// cause (wrong role, wrong phase, bad target, spent potion, repeat protect)
/// so a client cannot probe for hidden role or phase information by trial.
/// The human-readable descriptions below exist for server logs and admin
/// tooling only and are never included in action responses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Action errors
    InvalidAction,
    PhaseClosed,
    Busy,
    Conflict,

    // Session creation errors
    InsufficientPlayers,
    BadConfig,

    // Push channel errors
    Unauthorized,
    ResyncTokenInvalid,

    // Server errors
    ServerError,
}

impl ErrorCode {
    /// Log-side description of this code. Not sent to clients.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidAction => {
                "The action was rejected. The kind, target, phase, or role state did not permit it."
            }
            Self::PhaseClosed => {
                "The submission arrived after the phase deadline or after resolution had started."
            }
            Self::Busy => {
                "The session lock or a rate limit could not be acquired in time. Safe to retry."
            }
            Self::Conflict => {
                "The session changed underneath the transaction (version mismatch). Safe to retry."
            }
            Self::InsufficientPlayers => {
                "A session needs at least six and at most twenty-four roster entries."
            }
            Self::BadConfig => {
                "The session configuration failed validation (durations, roles, or tie rule)."
            }
            Self::Unauthorized => {
                "The push channel was used without an attached authenticated principal."
            }
            Self::ResyncTokenInvalid => {
                "The resync token did not verify for this session and player."
            }
            Self::ServerError => {
                "An internal fault occurred. Details are in the server logs, not the response."
            }
        }
    }

    /// Codes a client may retry without changing the request.
    pub fn is_retry_safe(&self) -> bool {
        matches!(self, Self::Busy | Self::Conflict | Self::ServerError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Display renders the wire name, not the description: codes are what
        // clients and logs key on.
        let name = match self {
            Self::InvalidAction => "invalid_action",
            Self::PhaseClosed => "phase_closed",
            Self::Busy => "busy",
            Self::Conflict => "conflict",
            Self::InsufficientPlayers => "insufficient_players",
            Self::BadConfig => "bad_config",
            Self::Unauthorized => "unauthorized",
            Self::ResyncTokenInvalid => "resync_token_invalid",
            Self::ServerError => "server_error",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_CODES: [ErrorCode; 9] = [
        ErrorCode::InvalidAction,
        ErrorCode::PhaseClosed,
        ErrorCode::Busy,
        ErrorCode::Conflict,
        ErrorCode::InsufficientPlayers,
        ErrorCode::BadConfig,
        ErrorCode::Unauthorized,
        ErrorCode::ResyncTokenInvalid,
        ErrorCode::ServerError,
    ];

    #[test]
    fn test_all_error_codes_have_descriptions() {
        for code in &ALL_CODES {
            let description = code.description();
            assert!(
                description.len() > 10,
                "ErrorCode::{code:?} has suspiciously short description: '{description}'"
            );
        }
    }

    #[test]
    fn test_display_matches_wire_name() {
        assert_eq!(ErrorCode::InvalidAction.to_string(), "invalid_action");
        assert_eq!(ErrorCode::PhaseClosed.to_string(), "phase_closed");
        assert_eq!(
            ErrorCode::InsufficientPlayers.to_string(),
            "insufficient_players"
        );
    }

    #[test]
    fn test_serialization_uses_snake_case() {
        let json = serde_json::to_string(&ErrorCode::PhaseClosed).unwrap();
        assert_eq!(json, "\"phase_closed\"");
        let json = serde_json::to_string(&ErrorCode::ServerError).unwrap();
        assert_eq!(json, "\"server_error\"");
    }

    #[test]
    fn test_retry_safety() {
        assert!(ErrorCode::Busy.is_retry_safe());
        assert!(ErrorCode::Conflict.is_retry_safe());
        assert!(!ErrorCode::InvalidAction.is_retry_safe());
        assert!(!ErrorCode::PhaseClosed.is_retry_safe());
    }

    #[test]
    fn test_descriptions_never_leak_into_display() {
        for code in &ALL_CODES {
            assert_ne!(code.to_string(), code.description());
        }
    }
}
