//! Storage abstraction for session state.
//!
//! The engine only ever talks to [`SessionStore`]; the bundled backend is the
//! in-memory one, and a relational implementation attaches at the same seam.
//! Every engine mutation is one [`SessionTxn`]: validate, append log records,
//! replace changed rows, applied atomically against the session's version
//! counter.

mod memory;
mod records;

pub use memory::InMemoryStore;
pub use records::{
    ActionRecord, DivineChoice, EventRecord, HunterRevengeState, NightChoices, PhaseState,
    PlayerRecord, ProtectChoice, RevengeResume, SessionRecord, SessionSnapshot, SessionTxn,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::protocol::SessionId;

/// Failures at the storage seam. `VersionConflict` and `DuplicateAction` are
/// expected outcomes the engine maps to client codes; `Backend` is an
/// operational fault.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    #[error("session {session_id} version mismatch: expected {expected}, found {found}")]
    VersionConflict {
        session_id: SessionId,
        expected: u64,
        found: u64,
    },
    #[error("duplicate action for (session {session_id}, actor {actor_id}, phase {phase_number}, {kind})")]
    DuplicateAction {
        session_id: SessionId,
        actor_id: crate::protocol::PlayerId,
        phase_number: u32,
        kind: crate::protocol::ActionKind,
    },
    #[error("storage backend failure: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Transactional storage for sessions, players and the action/event logs.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Prepare the backend (connections, migrations). No-op for in-memory.
    async fn initialize(&self) -> Result<(), StoreError>;

    /// Insert a new session with its full player roster, atomically.
    async fn create_session(
        &self,
        session: SessionRecord,
        players: Vec<PlayerRecord>,
    ) -> Result<(), StoreError>;

    /// Read one session and its players at a consistent version.
    async fn load_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionSnapshot>, StoreError>;

    /// Apply a transaction. Fails with `VersionConflict` if the session
    /// version moved, or `DuplicateAction` if a first-write-wins action
    /// already exists; either failure applies nothing. Returns the new
    /// version.
    async fn commit(&self, txn: SessionTxn) -> Result<u64, StoreError>;

    /// Action log for a session, optionally restricted to one phase.
    /// Ordered by creation.
    async fn list_actions(
        &self,
        session_id: &SessionId,
        phase_number: Option<u32>,
    ) -> Result<Vec<ActionRecord>, StoreError>;

    /// Event log for a session, optionally restricted to one phase.
    /// Ordered by creation.
    async fn list_events(
        &self,
        session_id: &SessionId,
        phase_number: Option<u32>,
    ) -> Result<Vec<EventRecord>, StoreError>;

    /// All sessions with status=active, for crash recovery.
    async fn active_sessions(&self) -> Result<Vec<SessionSnapshot>, StoreError>;

    /// Active sessions whose deadline is at or before `now`, with the phase
    /// number the deadline belongs to. Backed by the `(status,
    /// phase_ends_at)` index; feeds the fallback sweep.
    async fn due_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(SessionId, u32)>, StoreError>;

    /// Delete a session and everything it owns (players, actions, events).
    async fn delete_session(&self, session_id: &SessionId) -> Result<bool, StoreError>;

    /// Liveness probe for the health endpoint.
    async fn health_check(&self) -> bool;
}
