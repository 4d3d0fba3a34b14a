//! The win checker. Runs after every death and every lynch; first matching
//! rule ends the session.

use chrono::Utc;
use smallvec::SmallVec;

use super::EventSink;
use crate::protocol::{EventKind, PlayerId, SessionStatus, Team, Visibility, WinningTeam};
use crate::store::SessionSnapshot;

/// A matched end-of-game condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinOutcome {
    pub team: WinningTeam,
    pub winners: SmallVec<[PlayerId; 8]>,
}

/// Evaluate the end conditions in priority order. Does not mutate.
///
/// The tanner rule from the rulebook would slot in ahead of the lovers rule;
/// it is absent here because no tanner role exists yet (`last_lynched` is
/// already recorded for it).
pub fn check(snapshot: &SessionSnapshot) -> Option<WinOutcome> {
    let session = &snapshot.session;

    // Lovers alone: exactly two alive, and they are each other's lovers.
    let alive: SmallVec<[&crate::store::PlayerRecord; 8]> = snapshot.alive_players().collect();
    if alive.len() == 2 {
        let (a, b) = (alive[0], alive[1]);
        if a.lover_id == Some(b.id) && b.lover_id == Some(a.id) {
            return Some(WinOutcome {
                team: WinningTeam::Lovers,
                winners: SmallVec::from_slice(&[a.id, b.id]),
            });
        }
    }

    // Werewolves reach parity.
    if session.werewolves_alive > 0
        && session.werewolves_alive >= session.villagers_alive + session.neutrals_alive
    {
        return Some(WinOutcome {
            team: WinningTeam::Werewolves,
            winners: team_members(snapshot, Team::Werewolves),
        });
    }

    // Villagers sweep.
    if session.werewolves_alive == 0 {
        return Some(WinOutcome {
            team: WinningTeam::Villagers,
            winners: team_members(snapshot, Team::Villagers),
        });
    }

    None
}

/// Finalize the session: status, winner, timers nulled, and the end-of-game
/// events (full role reveal, then the result).
pub fn finalize(snapshot: &mut SessionSnapshot, events: &mut EventSink, outcome: &WinOutcome) {
    let session = &mut snapshot.session;
    session.status = SessionStatus::Finished;
    session.winning_team = Some(outcome.team);
    session.phase_ends_at = None;
    session.finished_at = Some(Utc::now());
    session.phase_state.scheduled_deadline = None;

    let role_map: Vec<serde_json::Value> = snapshot
        .players
        .iter()
        .map(|p| serde_json::json!({"player_id": p.id, "role": p.role, "team": p.team}))
        .collect();
    events.emit(
        EventKind::RoleReveal,
        Visibility::Public,
        serde_json::json!({"roles": role_map}),
    );
    events.emit(
        EventKind::GameEnd,
        Visibility::Public,
        serde_json::json!({
            "winning_team": outcome.team,
            "winners": outcome.winners.to_vec(),
        }),
    );
}

/// Every player on a team, dead or alive. Lovers have left their original
/// teams, so a werewolf lover wins with the lovers, not the pack.
fn team_members(snapshot: &SessionSnapshot, team: Team) -> SmallVec<[PlayerId; 8]> {
    snapshot
        .players
        .iter()
        .filter(|p| p.team == team)
        .map(|p| p.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::snapshot_with_roles;
    use crate::protocol::Role;

    #[test]
    fn test_ongoing_game_has_no_winner() {
        let snapshot = snapshot_with_roles(&[
            Role::Werewolf,
            Role::Werewolf,
            Role::Villager,
            Role::Villager,
            Role::Villager,
        ]);
        assert!(check(&snapshot).is_none());
    }

    #[test]
    fn test_villagers_sweep_when_wolves_gone() {
        let mut snapshot =
            snapshot_with_roles(&[Role::Werewolf, Role::Seer, Role::Villager, Role::Villager]);
        let wolf = snapshot.players[0].id;
        snapshot.player_mut(&wolf).unwrap().is_alive = false;
        snapshot.session.werewolves_alive = 0;

        let outcome = check(&snapshot).unwrap();
        assert_eq!(outcome.team, WinningTeam::Villagers);
        // Everyone on the villager team wins, including any dead.
        assert_eq!(outcome.winners.len(), 3);
        assert!(!outcome.winners.contains(&wolf));
    }

    #[test]
    fn test_werewolf_parity_win() {
        let mut snapshot = snapshot_with_roles(&[
            Role::Werewolf,
            Role::Werewolf,
            Role::Villager,
            Role::Villager,
            Role::Villager,
        ]);
        for id in [snapshot.players[2].id, snapshot.players[3].id] {
            snapshot.player_mut(&id).unwrap().is_alive = false;
        }
        snapshot.session.villagers_alive = 1;

        let outcome = check(&snapshot).unwrap();
        assert_eq!(outcome.team, WinningTeam::Werewolves);
        assert_eq!(outcome.winners.len(), 2);
    }

    #[test]
    fn test_lovers_alone_beats_parity() {
        // One wolf and one villager left, mutual lovers: the parity rule
        // would hand it to the wolf, but the lovers rule fires first.
        let mut snapshot = snapshot_with_roles(&[
            Role::Werewolf,
            Role::Villager,
            Role::Villager,
            Role::Villager,
        ]);
        let (wolf, partner) = (snapshot.players[0].id, snapshot.players[1].id);
        for id in [snapshot.players[2].id, snapshot.players[3].id] {
            snapshot.player_mut(&id).unwrap().is_alive = false;
        }
        snapshot.session.villagers_alive = 1;
        snapshot.player_mut(&wolf).unwrap().lover_id = Some(partner);
        snapshot.player_mut(&wolf).unwrap().team = Team::Lovers;
        snapshot.player_mut(&partner).unwrap().lover_id = Some(wolf);
        snapshot.player_mut(&partner).unwrap().team = Team::Lovers;

        let outcome = check(&snapshot).unwrap();
        assert_eq!(outcome.team, WinningTeam::Lovers);
        assert_eq!(outcome.winners.as_slice(), &[wolf, partner]);
    }

    #[test]
    fn test_two_alive_non_lovers_is_not_a_lovers_win() {
        let mut snapshot =
            snapshot_with_roles(&[Role::Werewolf, Role::Villager, Role::Villager]);
        let dead = snapshot.players[2].id;
        snapshot.player_mut(&dead).unwrap().is_alive = false;
        snapshot.session.villagers_alive = 1;

        let outcome = check(&snapshot).unwrap();
        // Wolf vs one villager: parity.
        assert_eq!(outcome.team, WinningTeam::Werewolves);
    }

    #[test]
    fn test_finalize_marks_session_and_emits_reveal() {
        let mut snapshot = snapshot_with_roles(&[Role::Werewolf, Role::Villager, Role::Villager]);
        snapshot.session.werewolves_alive = 0;
        let outcome = check(&snapshot).unwrap();

        let mut events = EventSink::new(snapshot.session.id, 3);
        finalize(&mut snapshot, &mut events, &outcome);

        assert_eq!(snapshot.session.status, SessionStatus::Finished);
        assert_eq!(snapshot.session.winning_team, Some(WinningTeam::Villagers));
        assert!(snapshot.session.phase_ends_at.is_none());
        assert!(snapshot.session.finished_at.is_some());

        let events = events.into_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::RoleReveal);
        assert_eq!(events[1].kind, EventKind::GameEnd);
        assert!(events.iter().all(|e| e.public));
    }
}
