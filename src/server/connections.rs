//! Connection liveness tracking.
//!
//! Tracks which principals currently hold a push channel and for how long
//! the rest have been gone. The night coordinator consults this through
//! [`DisconnectOracle`] to forfeit actions of players who stayed away past
//! the grace interval.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::engine::runtime::DisconnectOracle;
use crate::protocol::{ConnectionState, UserId};

#[derive(Debug, Clone, Copy)]
struct ConnEntry {
    state: ConnectionState,
    since: Instant,
}

/// Process-wide registry of principal liveness.
pub struct ConnectionTracker {
    entries: DashMap<UserId, ConnEntry>,
    grace: Duration,
}

impl ConnectionTracker {
    pub fn new(grace: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            grace,
        }
    }

    pub fn mark_connected(&self, user_id: UserId) {
        self.entries.insert(
            user_id,
            ConnEntry {
                state: ConnectionState::Connected,
                since: Instant::now(),
            },
        );
    }

    pub fn mark_disconnected(&self, user_id: UserId) {
        self.entries.insert(
            user_id,
            ConnEntry {
                state: ConnectionState::Disconnected,
                since: Instant::now(),
            },
        );
    }

    pub fn state(&self, user_id: &UserId) -> ConnectionState {
        self.entries
            .get(user_id)
            .map(|entry| entry.state)
            .unwrap_or(ConnectionState::Disconnected)
    }
}

impl DisconnectOracle for ConnectionTracker {
    fn is_forfeited(&self, user_id: &UserId) -> bool {
        match self.entries.get(user_id) {
            // Never attached at all: nothing to wait for.
            None => true,
            Some(entry) => {
                entry.state == ConnectionState::Disconnected && entry.since.elapsed() >= self.grace
            }
        }
    }
}
