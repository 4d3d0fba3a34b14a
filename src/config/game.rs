//! Per-session game rules configuration.
//!
//! The lobby may pass a `GameRulesConfig` with `StartGame`; omitted fields
//! fall back to the deployment defaults below. Durations are clamped to the
//! floors the engine can meaningfully schedule.

use serde::{Deserialize, Serialize};

use super::defaults::{
    default_day_seconds, default_hunter_revenge_seconds, default_night_seconds,
    default_role_enabled, default_voting_seconds,
};
use crate::protocol::TieRule;

/// Which optional special roles are in the deal pool.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct EnabledRoles {
    #[serde(default = "default_role_enabled")]
    pub seer: bool,
    #[serde(default = "default_role_enabled")]
    pub witch: bool,
    #[serde(default = "default_role_enabled")]
    pub bodyguard: bool,
    /// Enabling the hunter also enables the revenge sub-phase.
    #[serde(default = "default_role_enabled")]
    pub hunter: bool,
    #[serde(default = "default_role_enabled")]
    pub cupid: bool,
}

impl Default for EnabledRoles {
    fn default() -> Self {
        Self {
            seer: true,
            witch: true,
            bodyguard: true,
            hunter: true,
            cupid: true,
        }
    }
}

/// Rules governing one session: phase durations, role pool, tie handling.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GameRulesConfig {
    #[serde(default = "default_night_seconds")]
    pub night_seconds: u64,
    #[serde(default = "default_day_seconds")]
    pub day_seconds: u64,
    #[serde(default = "default_voting_seconds")]
    pub voting_seconds: u64,
    /// Sub-deadline for a dead hunter to pick a target.
    #[serde(default = "default_hunter_revenge_seconds")]
    pub hunter_revenge_seconds: u64,
    #[serde(default)]
    pub enabled_roles: EnabledRoles,
    /// Overrides the roster-size default; clamped to ceil(roster/4).
    #[serde(default)]
    pub werewolf_count: Option<u8>,
    #[serde(default)]
    pub tie_rule: TieRule,
}

impl GameRulesConfig {
    pub const MIN_NIGHT_SECONDS: u64 = 30;
    pub const MIN_DAY_SECONDS: u64 = 30;
    pub const MIN_VOTING_SECONDS: u64 = 15;

    /// Night duration with the floor applied.
    pub fn night_duration_secs(&self) -> u64 {
        self.night_seconds.max(Self::MIN_NIGHT_SECONDS)
    }

    /// Day-discussion duration with the floor applied.
    pub fn day_duration_secs(&self) -> u64 {
        self.day_seconds.max(Self::MIN_DAY_SECONDS)
    }

    /// Day-voting duration with the floor applied.
    pub fn voting_duration_secs(&self) -> u64 {
        self.voting_seconds.max(Self::MIN_VOTING_SECONDS)
    }

    /// Default werewolf count for a roster size, before any override.
    pub fn default_werewolf_count(roster_size: usize) -> u8 {
        match roster_size {
            0..=8 => 2,
            9..=12 => 3,
            13..=18 => 4,
            _ => 5,
        }
    }

    /// Effective werewolf count: override if present, clamped to
    /// ceil(roster/4), never below 1.
    pub fn werewolf_count_for(&self, roster_size: usize) -> u8 {
        let cap = roster_size.div_ceil(4) as u8;
        let count = self
            .werewolf_count
            .unwrap_or_else(|| Self::default_werewolf_count(roster_size));
        count.clamp(1, cap)
    }
}

impl Default for GameRulesConfig {
    fn default() -> Self {
        Self {
            night_seconds: default_night_seconds(),
            day_seconds: default_day_seconds(),
            voting_seconds: default_voting_seconds(),
            hunter_revenge_seconds: default_hunter_revenge_seconds(),
            enabled_roles: EnabledRoles::default(),
            werewolf_count: None,
            tie_rule: TieRule::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_werewolf_count_brackets() {
        assert_eq!(GameRulesConfig::default_werewolf_count(6), 2);
        assert_eq!(GameRulesConfig::default_werewolf_count(8), 2);
        assert_eq!(GameRulesConfig::default_werewolf_count(9), 3);
        assert_eq!(GameRulesConfig::default_werewolf_count(12), 3);
        assert_eq!(GameRulesConfig::default_werewolf_count(13), 4);
        assert_eq!(GameRulesConfig::default_werewolf_count(18), 4);
        assert_eq!(GameRulesConfig::default_werewolf_count(19), 5);
        assert_eq!(GameRulesConfig::default_werewolf_count(24), 5);
    }

    #[test]
    fn test_override_clamped_to_quarter_roster() {
        let rules = GameRulesConfig {
            werewolf_count: Some(6),
            ..GameRulesConfig::default()
        };
        // ceil(8/4) = 2
        assert_eq!(rules.werewolf_count_for(8), 2);
        // ceil(13/4) = 4
        assert_eq!(rules.werewolf_count_for(13), 4);
        // Override below cap passes through.
        let rules = GameRulesConfig {
            werewolf_count: Some(2),
            ..GameRulesConfig::default()
        };
        assert_eq!(rules.werewolf_count_for(16), 2);
    }

    #[test]
    fn test_duration_floors_applied() {
        let rules = GameRulesConfig {
            night_seconds: 1,
            day_seconds: 2,
            voting_seconds: 3,
            ..GameRulesConfig::default()
        };
        assert_eq!(rules.night_duration_secs(), 30);
        assert_eq!(rules.day_duration_secs(), 30);
        assert_eq!(rules.voting_duration_secs(), 15);
    }

    #[test]
    fn test_rules_config_round_trip() {
        let rules = GameRulesConfig::default();
        let json = serde_json::to_string(&rules).unwrap();
        let back: GameRulesConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(rules, back);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let rules: GameRulesConfig = serde_json::from_str(r#"{"night_seconds": 45}"#).unwrap();
        assert_eq!(rules.night_seconds, 45);
        assert_eq!(rules.day_seconds, default_day_seconds());
        assert!(rules.enabled_roles.hunter);
    }
}
