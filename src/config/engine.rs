//! Engine timing and capacity configuration.

use serde::{Deserialize, Serialize};

use super::defaults::{
    default_disconnect_grace_secs, default_lock_timeout_secs, default_min_response_millis,
    default_push_queue_capacity, default_sweep_interval_secs, default_transition_dedup_capacity,
};

/// Knobs for the session runtime, the scheduler and the push layer.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    /// Soft timeout for acquiring the per-session lock in action handlers
    /// (seconds). Exceeding it surfaces `busy`.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
    /// Floor for action handler wall time (milliseconds), so latency cannot
    /// reveal whether a submission hit a real role or phase.
    #[serde(default = "default_min_response_millis")]
    pub min_response_millis: u64,
    /// Fallback sweep interval (seconds). The sweep transitions sessions
    /// whose deadline passed without an armed in-memory timer.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Disconnect duration after which a pending night action is forfeited
    /// (seconds).
    #[serde(default = "default_disconnect_grace_secs")]
    pub disconnect_grace_secs: u64,
    /// Size of the (session, phase) transition dedup guard.
    #[serde(default = "default_transition_dedup_capacity")]
    pub transition_dedup_capacity: usize,
    /// Outbound queue depth per push connection. Delivery is best-effort: a
    /// full queue drops the push and the client recovers via snapshot
    /// re-fetch.
    #[serde(default = "default_push_queue_capacity")]
    pub push_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_secs: default_lock_timeout_secs(),
            min_response_millis: default_min_response_millis(),
            sweep_interval_secs: default_sweep_interval_secs(),
            disconnect_grace_secs: default_disconnect_grace_secs(),
            transition_dedup_capacity: default_transition_dedup_capacity(),
            push_queue_capacity: default_push_queue_capacity(),
        }
    }
}
