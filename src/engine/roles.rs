//! Role assignment: roster + rules -> a legal, uniformly shuffled deal.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use uuid::Uuid;

use crate::config::GameRulesConfig;
use crate::protocol::{
    ConnectionState, Role, RoleState, SessionId, StartGameError, UserId,
};
use crate::store::PlayerRecord;

/// Deal roles to a roster. Seat positions follow roster order; the role pool
/// is shuffled with an OS-entropy-seeded RNG so the deal is uniform and
/// unpredictable.
///
/// The pool is `werewolf_count` werewolves, one of each enabled special role,
/// villagers for the rest. A pool larger than the roster is a config error:
/// the lobby must disable specials it cannot seat.
pub fn assign_roles(
    session_id: SessionId,
    roster: &[UserId],
    rules: &GameRulesConfig,
) -> Result<Vec<PlayerRecord>, StartGameError> {
    let mut pool = build_role_pool(roster.len(), rules)?;

    let mut seed = [0u8; 32];
    getrandom::fill(&mut seed).map_err(|e| {
        // Refusing to deal beats dealing predictably.
        StartGameError::Internal(format!("no entropy source available: {e}"))
    })?;
    let mut rng = StdRng::from_seed(seed);
    pool.shuffle(&mut rng);

    Ok(roster
        .iter()
        .zip(pool)
        .enumerate()
        .map(|(seat, (user_id, role))| PlayerRecord {
            id: Uuid::new_v4(),
            session_id,
            user_id: *user_id,
            role,
            team: role.starting_team(),
            is_alive: true,
            died_at_phase: None,
            death_reason: None,
            lover_id: None,
            role_state: RoleState::initial(role),
            seat_position: seat as u8,
            connection_state: ConnectionState::Connected,
        })
        .collect())
}

fn build_role_pool(roster_size: usize, rules: &GameRulesConfig) -> Result<Vec<Role>, StartGameError> {
    let werewolf_count = rules.werewolf_count_for(roster_size) as usize;

    let mut pool = vec![Role::Werewolf; werewolf_count];
    let enabled = &rules.enabled_roles;
    if enabled.seer {
        pool.push(Role::Seer);
    }
    if enabled.witch {
        pool.push(Role::Witch);
    }
    if enabled.bodyguard {
        pool.push(Role::Bodyguard);
    }
    if enabled.cupid {
        pool.push(Role::Cupid);
    }
    // The hunter is only dealt when the revenge sub-phase is enabled with it.
    if enabled.hunter {
        pool.push(Role::Hunter);
    }

    if pool.len() > roster_size {
        return Err(StartGameError::BadRules(format!(
            "role pool of {} exceeds roster of {roster_size}; disable special roles",
            pool.len()
        )));
    }
    pool.resize(roster_size, Role::Villager);
    Ok(pool)
}
