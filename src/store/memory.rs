//! In-memory storage backend.
//!
//! Single write lock over the whole table set keeps transactions trivially
//! atomic; per-session serialization is the runtime lock's job, so this lock
//! is only ever held for map operations.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::records::{
    ActionRecord, EventRecord, PlayerRecord, SessionRecord, SessionSnapshot, SessionTxn,
};
use super::{SessionStore, StoreError};
use crate::protocol::{SessionId, SessionStatus};

#[derive(Debug, Clone)]
struct StoredSession {
    session: SessionRecord,
    /// Keyed by player id; snapshots re-sort by seat.
    players: HashMap<crate::protocol::PlayerId, PlayerRecord>,
    actions: Vec<ActionRecord>,
    events: Vec<EventRecord>,
}

/// In-memory [`SessionStore`] used by the single-process deployment and the
/// test suite.
pub struct InMemoryStore {
    sessions: RwLock<HashMap<SessionId, StoredSession>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn snapshot_of(stored: &StoredSession) -> SessionSnapshot {
        let mut players: Vec<PlayerRecord> = stored.players.values().cloned().collect();
        players.sort_by_key(|p| p.seat_position);
        SessionSnapshot {
            session: stored.session.clone(),
            players,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn initialize(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create_session(
        &self,
        session: SessionRecord,
        players: Vec<PlayerRecord>,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "session {} already exists",
                session.id
            )));
        }
        let players = players.into_iter().map(|p| (p.id, p)).collect();
        sessions.insert(
            session.id,
            StoredSession {
                session,
                players,
                actions: Vec::new(),
                events: Vec::new(),
            },
        );
        Ok(())
    }

    async fn load_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionSnapshot>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).map(Self::snapshot_of))
    }

    async fn commit(&self, txn: SessionTxn) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(&txn.session_id)
            .ok_or(StoreError::SessionNotFound(txn.session_id))?;

        if stored.session.version != txn.expected_version {
            return Err(StoreError::VersionConflict {
                session_id: txn.session_id,
                expected: txn.expected_version,
                found: stored.session.version,
            });
        }

        // Unique-key check before any write: the whole transaction aborts on
        // a duplicate first-write-wins action.
        for action in &txn.actions {
            if action.kind.is_rewritable() {
                continue;
            }
            let duplicate = stored.actions.iter().any(|existing| {
                existing.actor_id == action.actor_id
                    && existing.phase_number == action.phase_number
                    && existing.kind == action.kind
            });
            if duplicate {
                return Err(StoreError::DuplicateAction {
                    session_id: txn.session_id,
                    actor_id: action.actor_id,
                    phase_number: action.phase_number,
                    kind: action.kind,
                });
            }
        }

        let mut session = txn.session;
        session.version = txn.expected_version + 1;
        let new_version = session.version;
        stored.session = session;

        for player in txn.players {
            stored.players.insert(player.id, player);
        }
        stored.actions.extend(txn.actions);
        stored.events.extend(txn.events);

        Ok(new_version)
    }

    async fn list_actions(
        &self,
        session_id: &SessionId,
        phase_number: Option<u32>,
    ) -> Result<Vec<ActionRecord>, StoreError> {
        let sessions = self.sessions.read().await;
        let stored = sessions
            .get(session_id)
            .ok_or(StoreError::SessionNotFound(*session_id))?;
        Ok(stored
            .actions
            .iter()
            .filter(|a| phase_number.is_none_or(|n| a.phase_number == n))
            .cloned()
            .collect())
    }

    async fn list_events(
        &self,
        session_id: &SessionId,
        phase_number: Option<u32>,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let sessions = self.sessions.read().await;
        let stored = sessions
            .get(session_id)
            .ok_or(StoreError::SessionNotFound(*session_id))?;
        Ok(stored
            .events
            .iter()
            .filter(|e| phase_number.is_none_or(|n| e.phase_number == n))
            .cloned()
            .collect())
    }

    async fn active_sessions(&self) -> Result<Vec<SessionSnapshot>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .filter(|s| s.session.status == SessionStatus::Active)
            .map(Self::snapshot_of)
            .collect())
    }

    async fn due_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(SessionId, u32)>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .filter(|s| s.session.status == SessionStatus::Active)
            .filter(|s| s.session.phase_ends_at.is_some_and(|ends| ends <= now))
            .map(|s| (s.session.id, s.session.phase_number))
            .collect())
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.remove(session_id).is_some())
    }

    async fn health_check(&self) -> bool {
        true
    }
}
