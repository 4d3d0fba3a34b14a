//! Configuration module.
//!
//! Layered configuration: JSON config file, environment overrides, and
//! compiled defaults.
//!
//! # Module Structure
//!
//! - [`types`]: Root `Config` struct and rate-limit section
//! - [`engine`]: Session runtime, scheduler and push-layer knobs
//! - [`game`]: Per-session game rules (durations, role pool, tie rule)
//! - [`security`]: CORS, metrics auth, resync secret
//! - [`logging`]: Logging configuration
//! - [`loader`]: Configuration loading functions
//! - [`validation`]: Security validation
//! - [`defaults`]: Default value functions

pub mod defaults;
pub mod engine;
pub mod game;
pub mod loader;
pub mod logging;
pub mod security;
pub mod types;
pub mod validation;

pub use engine::EngineConfig;

pub use game::{EnabledRoles, GameRulesConfig};

pub use loader::load;

pub use logging::{LogFormat, LogLevel, LoggingConfig};

pub use security::SecurityConfig;

pub use types::{Config, RateLimitConfig};

pub use validation::{is_production_mode, validate_config_security};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();

        assert_eq!(config.port, 3641);
        assert_eq!(config.engine.lock_timeout_secs, 5);
        assert_eq!(config.engine.min_response_millis, 200);
        assert_eq!(config.engine.sweep_interval_secs, 10);
        assert_eq!(config.engine.disconnect_grace_secs, 15);

        assert_eq!(config.rules.night_seconds, 120);
        assert_eq!(config.rules.day_seconds, 180);
        assert_eq!(config.rules.voting_seconds, 60);
        assert_eq!(config.rules.hunter_revenge_seconds, 30);

        assert_eq!(config.rate_limit.max_actions_per_window, 30);
        assert_eq!(config.rate_limit.window_secs, 60);

        assert_eq!(config.logging.dir, "logs");
        assert_eq!(config.logging.filename, "server.log");
        assert_eq!(config.logging.rotation, "daily");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config.port, deserialized.port);
        assert_eq!(
            config.engine.lock_timeout_secs,
            deserialized.engine.lock_timeout_secs
        );
        assert_eq!(config.rules.night_seconds, deserialized.rules.night_seconds);
        assert_eq!(
            config.rate_limit.max_actions_per_window,
            deserialized.rate_limit.max_actions_per_window
        );
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Trace.to_string(), "trace");
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert_eq!(LogLevel::Info.to_string(), "info");
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert_eq!(LogLevel::Error.to_string(), "error");
    }
}
