//! Validation for the lobby's `StartGame` call.
//!
//! Everything here runs before a session row exists; failures map onto the
//! two creation error codes (`insufficient_players`, `bad_config`).

use std::collections::HashSet;

use crate::config::GameRulesConfig;
use crate::protocol::{ErrorCode, TieRule, UserId, MAX_ROSTER_SIZE, MIN_ROSTER_SIZE};

/// Why a `StartGame` call was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartGameError {
    #[error("roster has {0} entries, need {MIN_ROSTER_SIZE}..={MAX_ROSTER_SIZE}")]
    RosterSize(usize),
    #[error("roster contains duplicate user {0}")]
    DuplicateUser(UserId),
    #[error("invalid rules config: {0}")]
    BadRules(String),
    #[error("session creation failed: {0}")]
    Internal(String),
}

impl StartGameError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::RosterSize(n) if *n < MIN_ROSTER_SIZE => ErrorCode::InsufficientPlayers,
            Self::Internal(_) => ErrorCode::ServerError,
            _ => ErrorCode::BadConfig,
        }
    }
}

/// Validate the roster: size bounds and uniqueness.
pub fn validate_roster(roster: &[UserId]) -> Result<(), StartGameError> {
    if roster.len() < MIN_ROSTER_SIZE || roster.len() > MAX_ROSTER_SIZE {
        return Err(StartGameError::RosterSize(roster.len()));
    }
    let mut seen = HashSet::with_capacity(roster.len());
    for user_id in roster {
        if !seen.insert(*user_id) {
            return Err(StartGameError::DuplicateUser(*user_id));
        }
    }
    Ok(())
}

/// Validate the per-session rules config against what the engine supports.
pub fn validate_rules(rules: &GameRulesConfig, roster_size: usize) -> Result<(), StartGameError> {
    if rules.tie_rule == TieRule::MayorBreaksTie {
        return Err(StartGameError::BadRules(
            "mayor_breaks_tie requires a mayor role, which is not implemented".into(),
        ));
    }
    if rules.werewolf_count == Some(0) {
        // Overrides above the clamp are accepted and clamped at assignment
        // time; a zero count would make the game unwinnable for one side.
        return Err(StartGameError::BadRules(
            "werewolf_count override must be at least 1".into(),
        ));
    }
    let enabled = &rules.enabled_roles;
    let special_count = [
        enabled.seer,
        enabled.witch,
        enabled.bodyguard,
        enabled.hunter,
        enabled.cupid,
    ]
    .into_iter()
    .filter(|enabled| *enabled)
    .count();
    let pool = rules.werewolf_count_for(roster_size) as usize + special_count;
    if pool > roster_size {
        return Err(StartGameError::BadRules(format!(
            "role pool of {pool} exceeds roster of {roster_size}; disable special roles"
        )));
    }
    if rules.night_seconds < GameRulesConfig::MIN_NIGHT_SECONDS {
        return Err(StartGameError::BadRules(format!(
            "night_seconds {} below minimum {}",
            rules.night_seconds,
            GameRulesConfig::MIN_NIGHT_SECONDS
        )));
    }
    if rules.day_seconds < GameRulesConfig::MIN_DAY_SECONDS {
        return Err(StartGameError::BadRules(format!(
            "day_seconds {} below minimum {}",
            rules.day_seconds,
            GameRulesConfig::MIN_DAY_SECONDS
        )));
    }
    if rules.voting_seconds < GameRulesConfig::MIN_VOTING_SECONDS {
        return Err(StartGameError::BadRules(format!(
            "voting_seconds {} below minimum {}",
            rules.voting_seconds,
            GameRulesConfig::MIN_VOTING_SECONDS
        )));
    }
    Ok(())
}
