//! The game engine: role assignment, the night pipeline, vote tallying, the
//! death cascade, win evaluation, the phase state machine and the per-session
//! runtime that serializes all of it.
//!
//! Everything below `runtime` is synchronous and side-effect free: functions
//! over a working [`SessionSnapshot`](crate::store::SessionSnapshot) that
//! accumulate events into an [`EventSink`]. The runtime owns the lock, the
//! store transaction and the publish step.

pub mod death;
pub mod night;
pub mod phase;
pub mod roles;
pub mod runtime;
pub mod view;
pub mod vote;
pub mod win;

pub use death::{DeathContext, DeathOutcome};
pub use night::NightResolution;
pub use roles::assign_roles;
pub use runtime::{ActionError, ActionSubmission, SessionRuntime};
pub use view::build_view;
pub use vote::LynchOutcome;
pub use win::WinOutcome;

use chrono::Utc;
use uuid::Uuid;

use crate::protocol::{EventKind, SessionId, Visibility};
use crate::store::EventRecord;

/// Accumulates event records during one transaction, stamping ids, session
/// and phase context.
#[derive(Debug)]
pub struct EventSink {
    session_id: SessionId,
    phase_number: u32,
    events: Vec<EventRecord>,
}

impl EventSink {
    pub fn new(session_id: SessionId, phase_number: u32) -> Self {
        Self {
            session_id,
            phase_number,
            events: Vec::new(),
        }
    }

    /// Events emitted after this point belong to `phase_number` (used when a
    /// transition crosses a phase boundary mid-transaction).
    pub fn set_phase_number(&mut self, phase_number: u32) {
        self.phase_number = phase_number;
    }

    pub fn emit(&mut self, kind: EventKind, visibility: Visibility, data: serde_json::Value) {
        self.events.push(EventRecord {
            id: Uuid::new_v4(),
            session_id: self.session_id,
            phase_number: self.phase_number,
            kind,
            public: visibility.is_public(),
            visibility,
            data,
            created_at: Utc::now(),
        });
    }

    pub fn into_events(self) -> Vec<EventRecord> {
        self.events
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }
}

/// An action rejection with a log-only cause. Clients always see the opaque
/// `invalid_action` code; the cause string goes to tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection(pub &'static str);

/// Deterministic per-(session, phase) seed for reproducible tie-breaks and
/// auto-targets.
pub(crate) fn phase_seed(session_id: &SessionId, phase_number: u32) -> u64 {
    let bytes = session_id.as_bytes();
    let mut seed = u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]);
    seed ^= u64::from(phase_number).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    seed
}
