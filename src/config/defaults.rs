//! Default value functions for configuration fields.
//!
//! All the functions referenced by `#[serde(default = ...)]` attributes in the
//! configuration system, grouped by section.

use super::logging::LogFormat;

// =============================================================================
// Port & Root Config
// =============================================================================

pub const fn default_port() -> u16 {
    3641
}

// =============================================================================
// Engine Defaults
// =============================================================================

/// Per-session lock acquisition timeout for action handlers (seconds).
pub const fn default_lock_timeout_secs() -> u64 {
    5
}

/// Minimum wall time for any action response, success or failure
/// (milliseconds). Timing-leak floor.
pub const fn default_min_response_millis() -> u64 {
    200
}

/// Interval of the fallback sweep that catches lost phase timers (seconds).
pub const fn default_sweep_interval_secs() -> u64 {
    10
}

/// How long a player must be disconnected before their pending night action
/// is forfeited (seconds).
pub const fn default_disconnect_grace_secs() -> u64 {
    15
}

/// Entries kept in the transition dedup guard.
pub const fn default_transition_dedup_capacity() -> usize {
    1024
}

/// Outbound push queue depth per connection.
pub const fn default_push_queue_capacity() -> usize {
    64
}

// =============================================================================
// Game Rules Defaults
// =============================================================================

pub const fn default_night_seconds() -> u64 {
    120
}

pub const fn default_day_seconds() -> u64 {
    180
}

pub const fn default_voting_seconds() -> u64 {
    60
}

pub const fn default_hunter_revenge_seconds() -> u64 {
    30
}

pub const fn default_role_enabled() -> bool {
    true
}

// =============================================================================
// Rate Limit Defaults
// =============================================================================

pub const fn default_max_actions_per_window() -> u32 {
    30
}

pub const fn default_max_view_fetches_per_window() -> u32 {
    60
}

pub const fn default_rate_limit_window_secs() -> u64 {
    60
}

// =============================================================================
// Logging Defaults
// =============================================================================

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "server.log".to_string()
}

pub fn default_rotation() -> String {
    "daily".to_string()
}

pub const fn default_enable_file_logging() -> bool {
    true
}

pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

// =============================================================================
// Security Defaults
// =============================================================================

pub fn default_cors_origins() -> String {
    "http://localhost:3000,http://localhost:5173".to_string()
}

pub const fn default_require_metrics_auth() -> bool {
    true
}

pub const fn default_max_message_size() -> usize {
    16384 // 16KB; action frames are small
}
