//! Deployment configuration validation.

use super::Config;

/// Whether the process is running in production mode
/// (`MOONFALL_ENV=production`).
#[must_use]
pub fn is_production_mode() -> bool {
    std::env::var("MOONFALL_ENV")
        .map(|v| v.eq_ignore_ascii_case("production"))
        .unwrap_or(false)
}

/// Validate security-sensitive settings. In production, missing secrets are
/// hard errors; in development they only cost a warning at startup.
pub fn validate_config_security(config: &Config) -> Result<(), String> {
    let mut problems = Vec::new();

    if config.security.require_metrics_auth && config.security.metrics_auth_token.is_none() {
        problems.push(
            "security.require_metrics_auth is enabled but security.metrics_auth_token is unset"
                .to_string(),
        );
    }

    if let Some(token) = &config.security.metrics_auth_token {
        if token.len() < 16 {
            problems.push("security.metrics_auth_token must be at least 16 characters".to_string());
        }
    }

    if is_production_mode() {
        if config.security.resync_secret.is_none() {
            problems.push(
                "security.resync_secret must be set in production; a per-process key would \
                 invalidate client resync tokens on every restart"
                    .to_string(),
            );
        }
        if config.security.cors_origins == "*" {
            problems.push("security.cors_origins must not be '*' in production".to_string());
        }
    }

    if let Some(secret) = &config.security.resync_secret {
        if secret.len() < 32 {
            problems.push("security.resync_secret must be at least 32 characters".to_string());
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        let mut config = Config::default();
        config.security.require_metrics_auth = false;
        config
    }

    #[test]
    fn test_default_dev_config_passes() {
        assert!(validate_config_security(&base_config()).is_ok());
    }

    #[test]
    fn test_metrics_auth_requires_token() {
        let mut config = base_config();
        config.security.require_metrics_auth = true;
        assert!(validate_config_security(&config).is_err());

        config.security.metrics_auth_token = Some("0123456789abcdef".to_string());
        assert!(validate_config_security(&config).is_ok());
    }

    #[test]
    fn test_short_secrets_rejected() {
        let mut config = base_config();
        config.security.metrics_auth_token = Some("short".to_string());
        assert!(validate_config_security(&config).is_err());

        let mut config = base_config();
        config.security.resync_secret = Some("short".to_string());
        assert!(validate_config_security(&config).is_err());
    }
}
