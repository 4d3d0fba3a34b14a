//! The night coordinator: collect-then-resolve.
//!
//! Submissions are recorded during the collect window and applied in one
//! canonical order at resolution, so the outcome never depends on arrival
//! time. Resolving in arrival order is exactly the bug this module exists to
//! prevent: a protect landing after a heal for the same target must not
//! change the result.

use std::collections::{BTreeMap, HashMap, HashSet};

use smallvec::SmallVec;

use super::death::{process_death, DeathContext};
use super::{EventSink, Rejection};
use crate::config::GameRulesConfig;
use crate::protocol::{
    ActionKind, DeathReason, EventKind, PlayerId, Role, RoleState, Visibility,
};
use crate::store::{DivineChoice, ProtectChoice, SessionSnapshot};

/// Outcome of resolving one night.
#[derive(Debug, Default)]
pub struct NightResolution {
    /// Deaths in application order, cascades included.
    pub deaths: SmallVec<[(PlayerId, DeathReason); 4]>,
    /// A hunter died and the revenge sub-state must be entered.
    pub hunter_pending: Option<PlayerId>,
}

/// Build the pending-action map for a night that is about to begin: every
/// role that has an alive holder with something left to do.
pub fn pending_roles(snapshot: &SessionSnapshot, phase_number: u32) -> BTreeMap<Role, bool> {
    let mut pending = BTreeMap::new();

    if snapshot.alive_with_role(Role::Werewolf).next().is_some() {
        pending.insert(Role::Werewolf, false);
    }
    if snapshot.alive_with_role(Role::Seer).next().is_some() {
        pending.insert(Role::Seer, false);
    }
    if snapshot.alive_with_role(Role::Bodyguard).next().is_some() {
        pending.insert(Role::Bodyguard, false);
    }
    // The witch is outstanding only while she has a potion left.
    if snapshot.alive_with_role(Role::Witch).any(|p| {
        matches!(
            &p.role_state,
            RoleState::Witch { heal_used, poison_used } if !heal_used || !poison_used
        )
    }) {
        pending.insert(Role::Witch, false);
    }
    // Cupid acts on the first night only.
    if phase_number == 1
        && snapshot
            .alive_with_role(Role::Cupid)
            .any(|p| matches!(&p.role_state, RoleState::Cupid { has_chosen: false }))
    {
        pending.insert(Role::Cupid, false);
    }

    pending
}

/// Current arg-max of werewolf votes over alive non-werewolves; ties go to
/// the lowest seat. Visible live to the witch only.
pub fn provisional_victim(snapshot: &SessionSnapshot) -> Option<PlayerId> {
    let votes = &snapshot.session.phase_state.werewolf_votes;
    if votes.is_empty() {
        return None;
    }

    let mut counts: HashMap<PlayerId, u32> = HashMap::new();
    for target in votes.values() {
        *counts.entry(*target).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .filter_map(|(target, count)| {
            let player = snapshot.player(&target)?;
            (player.is_alive && player.role != Role::Werewolf)
                .then_some((count, player.seat_position, target))
        })
        // Highest count wins; lowest seat breaks ties.
        .min_by_key(|(count, seat, _)| (std::cmp::Reverse(*count), *seat))
        .map(|(_, _, target)| target)
}

/// Validate and record one night submission into the working snapshot,
/// emitting the collect-time event. The actor has already been matched to an
/// alive player in the night phase.
pub fn collect_action(
    snapshot: &mut SessionSnapshot,
    events: &mut EventSink,
    actor_id: PlayerId,
    kind: ActionKind,
    target_id: Option<PlayerId>,
    payload: Option<&serde_json::Value>,
) -> Result<(), Rejection> {
    let actor = snapshot
        .player(&actor_id)
        .ok_or(Rejection("actor not in session"))?
        .clone();

    match kind {
        ActionKind::WerewolfVote => {
            if actor.role != Role::Werewolf {
                return Err(Rejection("werewolf_vote from non-werewolf"));
            }
            let target = require_alive_target(snapshot, target_id)?;
            if target.role == Role::Werewolf {
                return Err(Rejection("werewolf_vote against own team"));
            }
            let target_id = target.id;
            snapshot
                .session
                .phase_state
                .werewolf_votes
                .insert(actor_id, target_id);
            refresh_werewolf_completion(snapshot);
            emit_werewolf_tally(snapshot, events);
        }
        ActionKind::SeerDivine => {
            if actor.role != Role::Seer {
                return Err(Rejection("seer_divine from non-seer"));
            }
            if snapshot.session.phase_state.night.divination.is_some() {
                return Err(Rejection("seer already divined this night"));
            }
            let target = require_alive_target(snapshot, target_id)?;
            let target_id = target.id;
            snapshot.session.phase_state.night.divination = Some(DivineChoice {
                seer: actor_id,
                target: target_id,
            });
            if let Some(RoleState::Seer { divined_ids }) =
                snapshot.player_mut(&actor_id).map(|p| &mut p.role_state)
            {
                if !divined_ids.contains(&target_id) {
                    divined_ids.push(target_id);
                }
            }
            mark_completed(snapshot, Role::Seer);
            emit_silent(events, kind, actor_id);
        }
        ActionKind::WitchHeal => {
            if actor.role != Role::Witch {
                return Err(Rejection("witch_heal from non-witch"));
            }
            // The heal has no client-supplied target: it applies to whoever
            // the provisional victim turns out to be.
            let Some(RoleState::Witch { heal_used, .. }) =
                snapshot.player_mut(&actor_id).map(|p| &mut p.role_state)
            else {
                return Err(Rejection("witch role state missing"));
            };
            if *heal_used {
                return Err(Rejection("heal potion already spent"));
            }
            *heal_used = true;
            snapshot.session.phase_state.night.heal_committed = true;
            refresh_witch_completion(snapshot, actor_id);
            emit_silent(events, kind, actor_id);
        }
        ActionKind::WitchPoison => {
            if actor.role != Role::Witch {
                return Err(Rejection("witch_poison from non-witch"));
            }
            if snapshot.session.phase_state.night.poison_target.is_some() {
                return Err(Rejection("poison already committed this night"));
            }
            let target = require_alive_target(snapshot, target_id)?;
            let target_id = target.id;
            let Some(RoleState::Witch { poison_used, .. }) =
                snapshot.player_mut(&actor_id).map(|p| &mut p.role_state)
            else {
                return Err(Rejection("witch role state missing"));
            };
            if *poison_used {
                return Err(Rejection("poison potion already spent"));
            }
            *poison_used = true;
            snapshot.session.phase_state.night.poison_target = Some(target_id);
            refresh_witch_completion(snapshot, actor_id);
            emit_silent(events, kind, actor_id);
        }
        ActionKind::BodyguardProtect => {
            if actor.role != Role::Bodyguard {
                return Err(Rejection("bodyguard_protect from non-bodyguard"));
            }
            if snapshot.session.phase_state.night.protect.is_some() {
                return Err(Rejection("bodyguard already protected this night"));
            }
            let target = require_alive_target(snapshot, target_id)?;
            let target_id = target.id;
            if matches!(
                &actor.role_state,
                RoleState::Bodyguard { last_protected_id: Some(last) } if *last == target_id
            ) {
                return Err(Rejection("bodyguard repeated last night's target"));
            }
            snapshot.session.phase_state.night.protect = Some(ProtectChoice {
                bodyguard: actor_id,
                target: target_id,
            });
            mark_completed(snapshot, Role::Bodyguard);
            emit_silent(events, kind, actor_id);
        }
        ActionKind::CupidChoose => {
            if actor.role != Role::Cupid {
                return Err(Rejection("cupid_choose from non-cupid"));
            }
            if snapshot.session.phase_number != 1 {
                return Err(Rejection("cupid_choose outside the first night"));
            }
            if !matches!(&actor.role_state, RoleState::Cupid { has_chosen: false }) {
                return Err(Rejection("cupid already chose"));
            }
            let first = require_alive_target(snapshot, target_id)?.id;
            let second_id = payload
                .and_then(|p| p.get("second_target_id"))
                .and_then(|v| serde_json::from_value::<PlayerId>(v.clone()).ok())
                .ok_or(Rejection("cupid_choose missing second target"))?;
            let second = require_alive_target(snapshot, Some(second_id))?.id;
            if first == second {
                return Err(Rejection("cupid targets must be distinct"));
            }
            snapshot.session.phase_state.night.cupid_pair = Some((first, second));
            if let Some(RoleState::Cupid { has_chosen }) =
                snapshot.player_mut(&actor_id).map(|p| &mut p.role_state)
            {
                *has_chosen = true;
            }
            mark_completed(snapshot, Role::Cupid);
            emit_silent(events, kind, actor_id);
        }
        _ => return Err(Rejection("not a night action")),
    }

    Ok(())
}

/// Whether every outstanding night action is in, counting dead or
/// persistently disconnected actors as forfeited.
pub fn all_actions_complete(
    snapshot: &SessionSnapshot,
    forfeited: &HashSet<PlayerId>,
) -> bool {
    snapshot
        .session
        .phase_state
        .pending_night_actions
        .iter()
        .all(|(role, completed)| {
            if *completed {
                return true;
            }
            match role {
                // Satisfied when every alive werewolf has voted or forfeited.
                Role::Werewolf => snapshot.alive_with_role(Role::Werewolf).all(|wolf| {
                    snapshot
                        .session
                        .phase_state
                        .werewolf_votes
                        .contains_key(&wolf.id)
                        || forfeited.contains(&wolf.id)
                }),
                role => snapshot
                    .alive_with_role(*role)
                    .all(|holder| forfeited.contains(&holder.id)),
            }
        })
}

/// Resolve the collected night in canonical order. Forfeited submissions are
/// simply absent.
pub fn resolve(
    snapshot: &mut SessionSnapshot,
    rules: &GameRulesConfig,
    events: &mut EventSink,
) -> NightResolution {
    let phase_number = snapshot.session.phase_number;

    // Cupid links the lovers before anything else can kill one of them.
    if let Some((first, second)) = snapshot.session.phase_state.night.cupid_pair {
        apply_lovers(snapshot, events, first, second);
    }

    let victim = provisional_victim(snapshot);
    let night = snapshot.session.phase_state.night.clone();
    let is_protected =
        matches!((victim, &night.protect), (Some(v), Some(p)) if p.target == v);
    // The heal potion was spent at collect time; a protected victim does not
    // refund it.
    let is_healed = night.heal_committed;

    // Seer result is computed against the pre-death roster.
    if let Some(DivineChoice { seer, target }) = night.divination {
        let is_werewolf = snapshot
            .player(&target)
            .is_some_and(|p| p.role == Role::Werewolf);
        events.emit(
            EventKind::ActionTaken,
            Visibility::players([seer]),
            serde_json::json!({
                "kind": ActionKind::SeerDivine,
                "target_id": target,
                "result": if is_werewolf { "werewolf" } else { "not_werewolf" },
            }),
        );
    }

    let mut resolution = NightResolution::default();

    // Werewolf victim first, then poison, so a hunter killed by poison picks
    // a target with the werewolf cascade already applied.
    if let Some(victim) = victim {
        if !is_protected && !is_healed {
            let outcome = process_death(
                snapshot,
                rules,
                events,
                DeathContext {
                    player_id: victim,
                    reason: DeathReason::WerewolfKill,
                    phase_number,
                },
            );
            resolution.deaths.extend(outcome.deaths);
            resolution.hunter_pending = resolution.hunter_pending.or(outcome.hunter_pending);
        }
    }
    if let Some(poisoned) = night.poison_target {
        let outcome = process_death(
            snapshot,
            rules,
            events,
            DeathContext {
                player_id: poisoned,
                reason: DeathReason::Poison,
                phase_number,
            },
        );
        resolution.deaths.extend(outcome.deaths);
        resolution.hunter_pending = resolution.hunter_pending.or(outcome.hunter_pending);
    }

    snapshot.session.phase_state.last_killed = resolution.deaths.first().map(|(id, _)| *id);

    // The repeat-protect rule keys off what the bodyguard did tonight.
    let protect_target = night.protect.map(|p| p.target);
    for player_id in snapshot
        .players
        .iter()
        .filter(|p| p.role == Role::Bodyguard)
        .map(|p| p.id)
        .collect::<Vec<_>>()
    {
        if let Some(RoleState::Bodyguard { last_protected_id }) =
            snapshot.player_mut(&player_id).map(|p| &mut p.role_state)
        {
            *last_protected_id = protect_target;
        }
    }

    resolution
}

fn apply_lovers(
    snapshot: &mut SessionSnapshot,
    events: &mut EventSink,
    first: PlayerId,
    second: PlayerId,
) {
    let roles: Vec<(PlayerId, Role)> = [first, second]
        .iter()
        .filter_map(|id| snapshot.player(id).map(|p| (p.id, p.role)))
        .collect();
    if roles.len() != 2 {
        return;
    }

    for (id, partner) in [(first, second), (second, first)] {
        if let Some(player) = snapshot.player_mut(&id) {
            player.lover_id = Some(partner);
            player.team = crate::protocol::Team::Lovers;
        }
    }

    // Each lover learns the other's identity and role; nobody else does.
    events.emit(
        EventKind::RoleReveal,
        Visibility::players([first, second]),
        serde_json::json!({
            "lovers": roles
                .iter()
                .map(|(id, role)| serde_json::json!({"player_id": id, "role": role}))
                .collect::<Vec<_>>(),
        }),
    );
}

fn require_alive_target<'a>(
    snapshot: &'a SessionSnapshot,
    target_id: Option<PlayerId>,
) -> Result<&'a crate::store::PlayerRecord, Rejection> {
    let target_id = target_id.ok_or(Rejection("missing target"))?;
    let target = snapshot
        .player(&target_id)
        .ok_or(Rejection("target not in session"))?;
    if !target.is_alive {
        return Err(Rejection("target is dead"));
    }
    Ok(target)
}

fn mark_completed(snapshot: &mut SessionSnapshot, role: Role) {
    if let Some(completed) = snapshot
        .session
        .phase_state
        .pending_night_actions
        .get_mut(&role)
    {
        *completed = true;
    }
}

fn refresh_werewolf_completion(snapshot: &mut SessionSnapshot) {
    let all_voted = snapshot.alive_with_role(Role::Werewolf).all(|wolf| {
        snapshot
            .session
            .phase_state
            .werewolf_votes
            .contains_key(&wolf.id)
    });
    if all_voted {
        mark_completed(snapshot, Role::Werewolf);
    }
}

fn refresh_witch_completion(snapshot: &mut SessionSnapshot, witch_id: PlayerId) {
    let done = matches!(
        snapshot.player(&witch_id).map(|p| &p.role_state),
        Some(RoleState::Witch { heal_used: true, poison_used: true })
    );
    if done {
        mark_completed(snapshot, Role::Witch);
    }
}

fn emit_werewolf_tally(snapshot: &SessionSnapshot, events: &mut EventSink) {
    let tally: Vec<serde_json::Value> = snapshot
        .session
        .phase_state
        .werewolf_votes
        .iter()
        .map(|(voter, target)| serde_json::json!({"voter_id": voter, "target_id": target}))
        .collect();
    // One event, two projections: werewolves see the tally, the witch sees
    // only the provisional victim.
    events.emit(
        EventKind::ActionTaken,
        Visibility::roles([Role::Werewolf, Role::Witch]),
        serde_json::json!({
            "kind": ActionKind::WerewolfVote,
            "tally": tally,
            "provisional_victim": provisional_victim(snapshot),
        }),
    );
}

fn emit_silent(events: &mut EventSink, kind: ActionKind, actor_id: PlayerId) {
    // Stored for the audit log, never pushed.
    events.emit(
        EventKind::ActionTaken,
        Visibility::Nobody,
        serde_json::json!({"kind": kind, "actor_id": actor_id}),
    );
}
