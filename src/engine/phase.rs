//! Phase state machine bookkeeping: entering phases, computing deadlines,
//! resetting phase-local state.
//!
//! The transition *driver* lives in [`runtime`](super::runtime); this module
//! owns what it means to be in a phase.

use chrono::{DateTime, Duration, Utc};

use super::night;
use super::EventSink;
use crate::config::GameRulesConfig;
use crate::protocol::{EventKind, Phase, PlayerId, Visibility};
use crate::store::{HunterRevengeState, PhaseState, RevengeResume, SessionSnapshot};

/// Configured duration of a phase, floors applied.
pub fn duration_secs(rules: &GameRulesConfig, phase: Phase) -> u64 {
    match phase {
        Phase::Night => rules.night_duration_secs(),
        Phase::DayDiscussion => rules.day_duration_secs(),
        Phase::DayVoting => rules.voting_duration_secs(),
        Phase::HunterRevenge => rules.hunter_revenge_seconds,
    }
}

/// Enter `phase`: bump the phase counter, reset phase-local state, arm the
/// deadline fields and emit the `phase_change` event.
///
/// `day_number` bumps when a night other than the first begins. Voice
/// channel assignments are recomputed per requester in the session view, so
/// the public event carries none of them.
pub fn enter(
    snapshot: &mut SessionSnapshot,
    events: &mut EventSink,
    phase: Phase,
    now: DateTime<Utc>,
) {
    let session = &mut snapshot.session;
    session.current_phase = phase;
    session.phase_number += 1;
    if phase == Phase::Night && session.phase_number > 1 {
        session.day_number += 1;
    }
    session.phase_started_at = now;
    let ends_at = now + Duration::seconds(duration_secs(&session.rules, phase) as i64);
    session.phase_ends_at = Some(ends_at);

    // Phase-local state starts fresh; only the deadline mirror survives into
    // the new blob.
    session.phase_state = PhaseState {
        scheduled_deadline: Some(ends_at),
        ..PhaseState::default()
    };

    if phase == Phase::Night {
        let pending = night::pending_roles(snapshot, snapshot.session.phase_number);
        snapshot.session.phase_state.pending_night_actions = pending;
    }

    let session = &snapshot.session;
    events.set_phase_number(session.phase_number);
    events.emit(
        EventKind::PhaseChange,
        Visibility::Public,
        serde_json::json!({
            "phase": phase,
            "phase_number": session.phase_number,
            "day_number": session.day_number,
            "phase_ends_at": session.phase_ends_at,
        }),
    );
}

/// Enter the hunter-revenge sub-state, remembering which resolution it
/// suspends.
pub fn enter_revenge(
    snapshot: &mut SessionSnapshot,
    events: &mut EventSink,
    hunter_id: PlayerId,
    resume: RevengeResume,
    now: DateTime<Utc>,
) {
    enter(snapshot, events, Phase::HunterRevenge, now);
    snapshot.session.phase_state.hunter_revenge = Some(HunterRevengeState { hunter_id, resume });
}

/// The phase that follows a completed hunter-revenge sub-state.
pub fn revenge_resume_phase(resume: RevengeResume) -> Phase {
    match resume {
        RevengeResume::NightResolution => Phase::DayDiscussion,
        RevengeResume::LynchResolution => Phase::Night,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::snapshot_with_roles;
    use crate::protocol::Role;

    #[test]
    fn test_enter_bumps_phase_number_and_sets_deadline() {
        let mut snapshot = snapshot_with_roles(&[Role::Werewolf, Role::Villager, Role::Villager]);
        let mut events = EventSink::new(snapshot.session.id, 1);
        let now = Utc::now();

        enter(&mut snapshot, &mut events, Phase::DayDiscussion, now);

        assert_eq!(snapshot.session.current_phase, Phase::DayDiscussion);
        assert_eq!(snapshot.session.phase_number, 2);
        assert_eq!(snapshot.session.phase_started_at, now);
        let expected = now + Duration::seconds(snapshot.session.rules.day_duration_secs() as i64);
        assert_eq!(snapshot.session.phase_ends_at, Some(expected));
        assert_eq!(snapshot.session.phase_state.scheduled_deadline, Some(expected));

        let events = events.into_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::PhaseChange);
        assert_eq!(events[0].phase_number, 2);
    }

    #[test]
    fn test_day_number_bumps_on_later_nights_only() {
        let mut snapshot = snapshot_with_roles(&[Role::Werewolf, Role::Villager, Role::Villager]);
        let mut events = EventSink::new(snapshot.session.id, 1);
        let now = Utc::now();
        assert_eq!(snapshot.session.day_number, 0);

        enter(&mut snapshot, &mut events, Phase::DayDiscussion, now);
        enter(&mut snapshot, &mut events, Phase::DayVoting, now);
        assert_eq!(snapshot.session.day_number, 0);

        enter(&mut snapshot, &mut events, Phase::Night, now);
        assert_eq!(snapshot.session.day_number, 1);
    }

    #[test]
    fn test_enter_clears_phase_local_state() {
        let mut snapshot = snapshot_with_roles(&[Role::Werewolf, Role::Villager, Role::Villager]);
        let (wolf, target) = (snapshot.players[0].id, snapshot.players[1].id);
        snapshot
            .session
            .phase_state
            .werewolf_votes
            .insert(wolf, target);
        snapshot.session.phase_state.last_killed = Some(target);

        let mut events = EventSink::new(snapshot.session.id, 1);
        enter(&mut snapshot, &mut events, Phase::DayDiscussion, Utc::now());

        assert!(snapshot.session.phase_state.werewolf_votes.is_empty());
        assert!(snapshot.session.phase_state.last_killed.is_none());
    }

    #[test]
    fn test_entering_night_rebuilds_pending_actions() {
        let mut snapshot =
            snapshot_with_roles(&[Role::Werewolf, Role::Seer, Role::Witch, Role::Villager]);
        let mut events = EventSink::new(snapshot.session.id, 1);
        let now = Utc::now();

        enter(&mut snapshot, &mut events, Phase::DayDiscussion, now);
        assert!(snapshot.session.phase_state.pending_night_actions.is_empty());

        enter(&mut snapshot, &mut events, Phase::Night, now);
        let pending = &snapshot.session.phase_state.pending_night_actions;
        assert!(pending.contains_key(&Role::Werewolf));
        assert!(pending.contains_key(&Role::Seer));
        assert!(pending.contains_key(&Role::Witch));
        // Cupid is only pending on night one; this is night two.
        assert!(!pending.contains_key(&Role::Cupid));
    }

    #[test]
    fn test_revenge_substate_bookkeeping() {
        let mut snapshot = snapshot_with_roles(&[Role::Werewolf, Role::Hunter, Role::Villager]);
        let hunter = snapshot.players[1].id;
        let mut events = EventSink::new(snapshot.session.id, 1);

        enter_revenge(
            &mut snapshot,
            &mut events,
            hunter,
            RevengeResume::NightResolution,
            Utc::now(),
        );

        assert_eq!(snapshot.session.current_phase, Phase::HunterRevenge);
        let revenge = snapshot.session.phase_state.hunter_revenge.unwrap();
        assert_eq!(revenge.hunter_id, hunter);
        assert_eq!(revenge.resume, RevengeResume::NightResolution);
        let expected = snapshot.session.rules.hunter_revenge_seconds;
        let window = snapshot.session.phase_ends_at.unwrap() - snapshot.session.phase_started_at;
        assert_eq!(window.num_seconds() as u64, expected);
    }

    #[test]
    fn test_revenge_resume_targets() {
        assert_eq!(
            revenge_resume_phase(RevengeResume::NightResolution),
            Phase::DayDiscussion
        );
        assert_eq!(
            revenge_resume_phase(RevengeResume::LynchResolution),
            Phase::Night
        );
    }
}
