//! Per-user submission rate limiting.
//!
//! Sliding-window counters keyed by user id. These counters are cache-grade
//! state: losing them on restart costs nothing but a briefly more generous
//! window; they never hold authoritative game state. Exhaustion is surfaced
//! as `busy` so a rate-limited client cannot distinguish the rejection from
//! lock contention.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

use crate::protocol::UserId;

/// Rate limiting configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Action submissions allowed per window.
    pub max_actions: u32,
    /// View fetches allowed per window.
    pub max_view_fetches: u32,
    /// Window length.
    pub time_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_actions: 30,
            max_view_fetches: 60,
            time_window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn from_config(config: &crate::config::RateLimitConfig) -> Self {
        Self {
            max_actions: config.max_actions_per_window,
            max_view_fetches: config.max_view_fetches_per_window,
            time_window: Duration::from_secs(config.window_secs),
        }
    }
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    actions: u32,
    view_fetches: u32,
    window_start: Instant,
}

impl RateLimitEntry {
    fn new() -> Self {
        Self {
            actions: 0,
            view_fetches: 0,
            window_start: Instant::now(),
        }
    }

    fn maybe_reset_window(&mut self, config: &RateLimitConfig) {
        if self.window_start.elapsed() >= config.time_window {
            self.actions = 0;
            self.view_fetches = 0;
            self.window_start = Instant::now();
        }
    }

    fn try_action(&mut self, config: &RateLimitConfig) -> bool {
        self.maybe_reset_window(config);
        if self.actions < config.max_actions {
            self.actions += 1;
            true
        } else {
            false
        }
    }

    fn try_view_fetch(&mut self, config: &RateLimitConfig) -> bool {
        self.maybe_reset_window(config);
        if self.view_fetches < config.max_view_fetches {
            self.view_fetches += 1;
            true
        } else {
            false
        }
    }
}

/// Rate limiter over action submissions and view fetches.
pub struct ActionRateLimiter {
    config: RateLimitConfig,
    entries: Arc<RwLock<HashMap<UserId, RateLimitEntry>>>,
}

impl ActionRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Account one action submission. `false` means over budget.
    pub async fn check_action(&self, user_id: &UserId) -> bool {
        let mut entries = self.entries.write().await;
        entries
            .entry(*user_id)
            .or_insert_with(RateLimitEntry::new)
            .try_action(&self.config)
    }

    /// Account one view fetch. `false` means over budget.
    pub async fn check_view_fetch(&self, user_id: &UserId) -> bool {
        let mut entries = self.entries.write().await;
        entries
            .entry(*user_id)
            .or_insert_with(RateLimitEntry::new)
            .try_view_fetch(&self.config)
    }

    /// Drop entries idle for two windows.
    pub async fn cleanup_old_entries(&self) {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let cleanup_threshold = self.config.time_window * 2;
        entries.retain(|_, entry| now.duration_since(entry.window_start) < cleanup_threshold);
    }

    /// Background task evicting stale windows.
    pub fn start_cleanup_task(self: Arc<Self>, shutdown: tokio_util::sync::CancellationToken) {
        let limiter = Arc::clone(&self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(limiter.config.time_window);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = interval.tick() => limiter.cleanup_old_entries().await,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn create_test_config() -> RateLimitConfig {
        RateLimitConfig {
            max_actions: 2,
            max_view_fetches: 3,
            time_window: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn test_action_rate_limit() {
        let limiter = ActionRateLimiter::new(create_test_config());
        let user_id = Uuid::new_v4();

        assert!(limiter.check_action(&user_id).await);
        assert!(limiter.check_action(&user_id).await);
        assert!(!limiter.check_action(&user_id).await);

        // Window resets.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(limiter.check_action(&user_id).await);
    }

    #[tokio::test]
    async fn test_view_fetch_budget_is_separate() {
        let limiter = ActionRateLimiter::new(create_test_config());
        let user_id = Uuid::new_v4();

        assert!(limiter.check_action(&user_id).await);
        assert!(limiter.check_action(&user_id).await);
        assert!(!limiter.check_action(&user_id).await);

        // Views still have budget.
        assert!(limiter.check_view_fetch(&user_id).await);
        assert!(limiter.check_view_fetch(&user_id).await);
        assert!(limiter.check_view_fetch(&user_id).await);
        assert!(!limiter.check_view_fetch(&user_id).await);
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let limiter = ActionRateLimiter::new(create_test_config());
        let user1 = Uuid::new_v4();
        let user2 = Uuid::new_v4();

        assert!(limiter.check_action(&user1).await);
        assert!(limiter.check_action(&user1).await);
        assert!(!limiter.check_action(&user1).await);

        assert!(limiter.check_action(&user2).await);
    }

    #[tokio::test]
    async fn test_cleanup_old_entries() {
        let limiter = ActionRateLimiter::new(create_test_config());
        let user_id = Uuid::new_v4();

        assert!(limiter.check_action(&user_id).await);
        tokio::time::sleep(Duration::from_millis(250)).await;
        limiter.cleanup_old_entries().await;

        let entries = limiter.entries.read().await;
        assert!(entries.is_empty());
    }
}
