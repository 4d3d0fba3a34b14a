//! The death resolver: applies a single death and everything it drags along.
//!
//! Exactly-once semantics: a second application to an already-dead player is
//! a no-op. Lover cascades run here; the hunter-revenge entry is signalled to
//! the caller, which owns the phase machinery.

use smallvec::SmallVec;

use super::EventSink;
use crate::config::GameRulesConfig;
use crate::protocol::{DeathReason, EventKind, PlayerId, Role, RoleState, Visibility};
use crate::store::SessionSnapshot;

/// One requested death.
#[derive(Debug, Clone, Copy)]
pub struct DeathContext {
    pub player_id: PlayerId,
    pub reason: DeathReason,
    pub phase_number: u32,
}

/// Everything one `process_death` call produced, cascades included, in
/// application order.
#[derive(Debug, Default)]
pub struct DeathOutcome {
    pub deaths: SmallVec<[(PlayerId, DeathReason); 4]>,
    /// A hunter died a death that triggers revenge; the caller enters the
    /// sub-state after the current resolution finishes.
    pub hunter_pending: Option<PlayerId>,
}

impl DeathOutcome {
    pub fn is_noop(&self) -> bool {
        self.deaths.is_empty()
    }

    fn merge(&mut self, other: DeathOutcome) {
        self.deaths.extend(other.deaths);
        // A heartbreak cascade never re-triggers revenge, so at most one
        // hunter can be pending per outcome.
        if self.hunter_pending.is_none() {
            self.hunter_pending = other.hunter_pending;
        }
    }
}

/// Apply one death to the working snapshot. Idempotent: returns an empty
/// outcome if the player is already dead.
pub fn process_death(
    snapshot: &mut SessionSnapshot,
    rules: &GameRulesConfig,
    events: &mut EventSink,
    ctx: DeathContext,
) -> DeathOutcome {
    let Some(player) = snapshot.player(&ctx.player_id) else {
        return DeathOutcome::default();
    };
    if !player.is_alive {
        return DeathOutcome::default();
    }

    let role = player.role;
    let lover_id = player.lover_id;

    {
        // Counters track the original role, not the lovers team.
        let session = &mut snapshot.session;
        match role {
            Role::Werewolf => session.werewolves_alive = session.werewolves_alive.saturating_sub(1),
            _ => session.villagers_alive = session.villagers_alive.saturating_sub(1),
        }
    }

    if let Some(player) = snapshot.player_mut(&ctx.player_id) {
        player.is_alive = false;
        player.died_at_phase = Some(ctx.phase_number);
        player.death_reason = Some(ctx.reason);
    }

    // Death reveals the role to everyone.
    events.emit(
        EventKind::PlayerDeath,
        Visibility::Public,
        serde_json::json!({
            "player_id": ctx.player_id,
            "reason": ctx.reason,
            "role": role,
        }),
    );

    let mut outcome = DeathOutcome::default();
    outcome.deaths.push((ctx.player_id, ctx.reason));

    if role == Role::Hunter && ctx.reason != DeathReason::Heartbreak && rules.enabled_roles.hunter {
        let has_shot = matches!(
            snapshot.player(&ctx.player_id).map(|p| &p.role_state),
            Some(RoleState::Hunter { has_shot: true })
        );
        if !has_shot {
            outcome.hunter_pending = Some(ctx.player_id);
        }
    }

    if let Some(lover_id) = lover_id {
        let lover_alive = snapshot.player(&lover_id).is_some_and(|p| p.is_alive);
        if lover_alive {
            let cascade = process_death(
                snapshot,
                rules,
                events,
                DeathContext {
                    player_id: lover_id,
                    reason: DeathReason::Heartbreak,
                    phase_number: ctx.phase_number,
                },
            );
            outcome.merge(cascade);
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EventSink;
    use crate::protocol::{ConnectionState, SessionStatus, Team};
    use crate::store::{PhaseState, PlayerRecord, SessionRecord};
    use chrono::Utc;
    use uuid::Uuid;

    fn snapshot_with(roles: &[Role]) -> SessionSnapshot {
        let session_id = Uuid::new_v4();
        let now = Utc::now();
        let players: Vec<PlayerRecord> = roles
            .iter()
            .enumerate()
            .map(|(seat, role)| PlayerRecord {
                id: Uuid::new_v4(),
                session_id,
                user_id: Uuid::new_v4(),
                role: *role,
                team: role.starting_team(),
                is_alive: true,
                died_at_phase: None,
                death_reason: None,
                lover_id: None,
                role_state: RoleState::initial(*role),
                seat_position: seat as u8,
                connection_state: ConnectionState::Connected,
            })
            .collect();
        let werewolves = players.iter().filter(|p| p.role == Role::Werewolf).count() as u32;
        let villagers = players.len() as u32 - werewolves;
        SessionSnapshot {
            session: SessionRecord {
                id: session_id,
                room_id: Uuid::new_v4(),
                status: SessionStatus::Active,
                current_phase: crate::protocol::Phase::Night,
                phase_number: 1,
                day_number: 0,
                phase_started_at: now,
                phase_ends_at: Some(now + chrono::Duration::seconds(120)),
                phase_state: PhaseState::default(),
                werewolves_alive: werewolves,
                villagers_alive: villagers,
                neutrals_alive: 0,
                winning_team: None,
                started_at: now,
                finished_at: None,
                version: 0,
                rules: GameRulesConfig::default(),
            },
            players,
        }
    }

    fn ctx(player_id: PlayerId, reason: DeathReason) -> DeathContext {
        DeathContext {
            player_id,
            reason,
            phase_number: 1,
        }
    }

    #[test]
    fn test_death_marks_player_and_decrements_counter() {
        let mut snapshot = snapshot_with(&[Role::Werewolf, Role::Villager, Role::Villager]);
        let victim = snapshot.players[1].id;
        let mut events = EventSink::new(snapshot.session.id, 1);

        let outcome = process_death(
            &mut snapshot,
            &GameRulesConfig::default(),
            &mut events,
            ctx(victim, DeathReason::WerewolfKill),
        );

        assert_eq!(outcome.deaths.len(), 1);
        assert_eq!(snapshot.session.villagers_alive, 1);
        assert_eq!(snapshot.session.werewolves_alive, 1);
        let player = snapshot.player(&victim).unwrap();
        assert!(!player.is_alive);
        assert_eq!(player.died_at_phase, Some(1));
        assert_eq!(player.death_reason, Some(DeathReason::WerewolfKill));

        let death_events = events.events();
        assert_eq!(death_events.len(), 1);
        assert_eq!(death_events[0].kind, EventKind::PlayerDeath);
        assert!(death_events[0].public);
        // Death reveals the role.
        assert_eq!(death_events[0].data["role"], "villager");
    }

    #[test]
    fn test_second_application_is_noop() {
        let mut snapshot = snapshot_with(&[Role::Werewolf, Role::Villager, Role::Villager]);
        let victim = snapshot.players[1].id;
        let rules = GameRulesConfig::default();
        let mut events = EventSink::new(snapshot.session.id, 1);

        process_death(&mut snapshot, &rules, &mut events, ctx(victim, DeathReason::Poison));
        let counters = (
            snapshot.session.werewolves_alive,
            snapshot.session.villagers_alive,
        );
        let outcome = process_death(
            &mut snapshot,
            &rules,
            &mut events,
            ctx(victim, DeathReason::Lynch),
        );

        assert!(outcome.is_noop());
        assert_eq!(
            (
                snapshot.session.werewolves_alive,
                snapshot.session.villagers_alive
            ),
            counters
        );
        // Reason from the first application sticks.
        assert_eq!(
            snapshot.player(&victim).unwrap().death_reason,
            Some(DeathReason::Poison)
        );
        assert_eq!(events.events().len(), 1);
    }

    #[test]
    fn test_lover_cascade_kills_both() {
        let mut snapshot = snapshot_with(&[Role::Werewolf, Role::Villager, Role::Villager]);
        let (a, b) = (snapshot.players[1].id, snapshot.players[2].id);
        snapshot.player_mut(&a).unwrap().lover_id = Some(b);
        snapshot.player_mut(&a).unwrap().team = Team::Lovers;
        snapshot.player_mut(&b).unwrap().lover_id = Some(a);
        snapshot.player_mut(&b).unwrap().team = Team::Lovers;

        let mut events = EventSink::new(snapshot.session.id, 1);
        let outcome = process_death(
            &mut snapshot,
            &GameRulesConfig::default(),
            &mut events,
            ctx(a, DeathReason::WerewolfKill),
        );

        assert_eq!(outcome.deaths.len(), 2);
        assert_eq!(outcome.deaths[0], (a, DeathReason::WerewolfKill));
        assert_eq!(outcome.deaths[1], (b, DeathReason::Heartbreak));
        // Both were villagers by role, so both came off the villager counter.
        assert_eq!(snapshot.session.villagers_alive, 0);
        assert_eq!(snapshot.session.werewolves_alive, 1);
        assert_eq!(events.events().len(), 2);
    }

    #[test]
    fn test_hunter_death_triggers_revenge_except_heartbreak() {
        let mut snapshot = snapshot_with(&[Role::Werewolf, Role::Hunter, Role::Villager]);
        let hunter = snapshot.players[1].id;
        let rules = GameRulesConfig::default();

        let mut events = EventSink::new(snapshot.session.id, 1);
        let outcome = process_death(
            &mut snapshot,
            &rules,
            &mut events,
            ctx(hunter, DeathReason::Poison),
        );
        assert_eq!(outcome.hunter_pending, Some(hunter));
    }

    #[test]
    fn test_hunter_heartbreak_death_skips_revenge() {
        let mut snapshot = snapshot_with(&[Role::Werewolf, Role::Hunter, Role::Villager]);
        let (hunter, partner) = (snapshot.players[1].id, snapshot.players[2].id);
        snapshot.player_mut(&hunter).unwrap().lover_id = Some(partner);
        snapshot.player_mut(&partner).unwrap().lover_id = Some(hunter);

        let mut events = EventSink::new(snapshot.session.id, 1);
        // Killing the partner cascades into the hunter as heartbreak.
        let outcome = process_death(
            &mut snapshot,
            &GameRulesConfig::default(),
            &mut events,
            ctx(partner, DeathReason::Lynch),
        );

        assert_eq!(outcome.deaths.len(), 2);
        assert_eq!(outcome.hunter_pending, None);
    }

    #[test]
    fn test_hunter_disabled_skips_revenge() {
        let mut snapshot = snapshot_with(&[Role::Werewolf, Role::Hunter, Role::Villager]);
        let hunter = snapshot.players[1].id;
        let mut rules = GameRulesConfig::default();
        rules.enabled_roles.hunter = false;

        let mut events = EventSink::new(snapshot.session.id, 1);
        let outcome = process_death(
            &mut snapshot,
            &rules,
            &mut events,
            ctx(hunter, DeathReason::Lynch),
        );
        assert_eq!(outcome.hunter_pending, None);
    }

    #[test]
    fn test_wolf_lover_decrements_wolf_counter() {
        let mut snapshot = snapshot_with(&[Role::Werewolf, Role::Werewolf, Role::Villager, Role::Villager]);
        let (wolf, villager) = (snapshot.players[0].id, snapshot.players[2].id);
        snapshot.player_mut(&wolf).unwrap().lover_id = Some(villager);
        snapshot.player_mut(&wolf).unwrap().team = Team::Lovers;
        snapshot.player_mut(&villager).unwrap().lover_id = Some(wolf);
        snapshot.player_mut(&villager).unwrap().team = Team::Lovers;

        let mut events = EventSink::new(snapshot.session.id, 1);
        process_death(
            &mut snapshot,
            &GameRulesConfig::default(),
            &mut events,
            ctx(villager, DeathReason::Lynch),
        );

        // The villager lover came off villagers_alive, the cascading wolf
        // lover off werewolves_alive, lovers team notwithstanding.
        assert_eq!(snapshot.session.villagers_alive, 1);
        assert_eq!(snapshot.session.werewolves_alive, 1);
    }
}
