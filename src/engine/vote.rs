//! The vote manager: day lynch votes and their tally.
//!
//! Each alive voter carries at most one current vote; re-submission
//! overwrites. Abstention is simply not voting.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;

use super::{phase_seed, EventSink, Rejection};
use crate::protocol::{ActionKind, EventKind, PlayerId, TieRule, Visibility};
use crate::store::SessionSnapshot;

/// Result of tallying a day vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LynchOutcome {
    NoLynch,
    Lynched(PlayerId),
}

/// Validate and record one lynch vote into the working snapshot. The day
/// tally is public, so the updated count is emitted immediately.
pub fn collect_vote(
    snapshot: &mut SessionSnapshot,
    events: &mut EventSink,
    voter_id: PlayerId,
    target_id: Option<PlayerId>,
) -> Result<(), Rejection> {
    let target_id = target_id.ok_or(Rejection("missing lynch target"))?;
    let target = snapshot
        .player(&target_id)
        .ok_or(Rejection("lynch target not in session"))?;
    if !target.is_alive {
        return Err(Rejection("lynch target is dead"));
    }

    snapshot
        .session
        .phase_state
        .lynch_votes
        .insert(voter_id, target_id);

    let tally: Vec<serde_json::Value> = snapshot
        .session
        .phase_state
        .lynch_votes
        .iter()
        .map(|(voter, target)| serde_json::json!({"voter_id": voter, "target_id": target}))
        .collect();
    events.emit(
        EventKind::ActionTaken,
        Visibility::Public,
        serde_json::json!({"kind": ActionKind::VoteLynch, "tally": tally}),
    );

    Ok(())
}

/// Tally the collected votes at the deadline.
pub fn tally(snapshot: &SessionSnapshot, tie_rule: TieRule) -> LynchOutcome {
    let votes = &snapshot.session.phase_state.lynch_votes;
    if votes.is_empty() {
        return LynchOutcome::NoLynch;
    }

    let mut counts: HashMap<PlayerId, u32> = HashMap::new();
    for target in votes.values() {
        *counts.entry(*target).or_insert(0) += 1;
    }

    let top = counts.values().copied().max().unwrap_or(0);
    let mut tied: Vec<PlayerId> = counts
        .iter()
        .filter(|(_, count)| **count == top)
        .map(|(target, _)| *target)
        .collect();

    if tied.len() == 1 {
        return LynchOutcome::Lynched(tied[0]);
    }

    match tie_rule {
        TieRule::NoLynchOnTie | TieRule::MayorBreaksTie => LynchOutcome::NoLynch,
        TieRule::RandomAmongTied => {
            // Deterministic order before the seeded draw, or the seed buys
            // nothing.
            tied.sort_by_key(|id| snapshot.player(id).map_or(u8::MAX, |p| p.seat_position));
            let seed = phase_seed(&snapshot.session.id, snapshot.session.phase_number);
            let mut rng = StdRng::seed_from_u64(seed);
            tied.choose(&mut rng)
                .copied()
                .map_or(LynchOutcome::NoLynch, LynchOutcome::Lynched)
        }
    }
}
