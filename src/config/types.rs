//! Root configuration types.

use super::defaults::{
    default_max_actions_per_window, default_max_view_fetches_per_window, default_port,
    default_rate_limit_window_secs,
};
use super::engine::EngineConfig;
use super::game::GameRulesConfig;
use super::logging::LoggingConfig;
use super::security::SecurityConfig;
use serde::{Deserialize, Serialize};

/// Root configuration struct for the Moonfall engine server.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Deployment-wide defaults; `StartGame` may override per session.
    #[serde(default)]
    pub rules: GameRulesConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            engine: EngineConfig::default(),
            rules: GameRulesConfig::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

/// Per-user submission caps. Exhaustion surfaces `busy` so the rejection is
/// indistinguishable from lock contention.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_actions_per_window")]
    pub max_actions_per_window: u32,
    #[serde(default = "default_max_view_fetches_per_window")]
    pub max_view_fetches_per_window: u32,
    /// Window length (seconds).
    #[serde(default = "default_rate_limit_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_actions_per_window: default_max_actions_per_window(),
            max_view_fetches_per_window: default_max_view_fetches_per_window(),
            window_secs: default_rate_limit_window_secs(),
        }
    }
}
