//! Security-sensitive configuration.

use serde::{Deserialize, Serialize};

use super::defaults::{
    default_cors_origins, default_max_message_size, default_require_metrics_auth,
};

/// Transport and endpoint protection settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SecurityConfig {
    /// Comma-separated allowed CORS origins, or `*` for permissive.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
    /// Require a bearer token on the metrics endpoint.
    #[serde(default = "default_require_metrics_auth")]
    pub require_metrics_auth: bool,
    /// Bearer token accepted by the metrics endpoint.
    #[serde(default)]
    pub metrics_auth_token: Option<String>,
    /// Key for resync token MACs. Generated per process when unset, which
    /// invalidates outstanding tokens on restart.
    #[serde(default)]
    pub resync_secret: Option<String>,
    /// Maximum accepted WebSocket frame size (bytes).
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            cors_origins: default_cors_origins(),
            require_metrics_auth: default_require_metrics_auth(),
            metrics_auth_token: None,
            resync_secret: None,
            max_message_size: default_max_message_size(),
        }
    }
}
