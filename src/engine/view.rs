//! Per-requester projection of session state.
//!
//! `GetSessionView` is a pure function of committed state plus requester
//! identity; nothing here mutates, and two calls with no intervening commit
//! return equal views.

use crate::protocol::{
    ActionKind, Phase, PlayerView, Role, RoleState, SessionHeaderView, SessionStatus, SessionView,
    VOICE_CHANNEL_DEAD, VOICE_CHANNEL_MAIN, VOICE_CHANNEL_WEREWOLF,
};
use crate::store::{PlayerRecord, SessionSnapshot};

/// Build the requester's view of the session.
pub fn build_view(snapshot: &SessionSnapshot, requester: &PlayerRecord) -> SessionView {
    let session = &snapshot.session;
    let header = SessionHeaderView {
        session_id: session.id,
        phase: session.current_phase,
        phase_number: session.phase_number,
        day_number: session.day_number,
        phase_ends_at: session.phase_ends_at,
        werewolves_alive: session.werewolves_alive,
        villagers_alive: session.villagers_alive,
        winning_team: session.winning_team,
    };

    let game_over = session.status == SessionStatus::Finished;
    let players = snapshot
        .players
        .iter()
        .map(|player| {
            let show_role = game_over || role_visible_to(requester, player);
            PlayerView {
                player_id: player.id,
                seat_position: player.seat_position,
                is_alive: player.is_alive,
                connection_state: player.connection_state,
                died_at_phase: player.died_at_phase,
                // A revealed death shows its role; the reason travels with it.
                death_reason: player.death_reason,
                role: (show_role || !player.is_alive).then_some(player.role),
                team: show_role.then_some(player.team),
            }
        })
        .collect();

    SessionView {
        header,
        you: requester.id,
        players,
        allowed_voice_channels: voice_channels(snapshot, requester),
        available_actions: available_actions(snapshot, requester),
    }
}

/// Whether `requester` may see `target`'s role and team mid-game.
fn role_visible_to(requester: &PlayerRecord, target: &PlayerRecord) -> bool {
    if requester.id == target.id {
        return true;
    }
    // Pack members know each other.
    if requester.role == Role::Werewolf && target.role == Role::Werewolf {
        return true;
    }
    // Either lover sees the other.
    requester.lover_id == Some(target.id)
}

/// The media-plane channels the requester may occupy right now. An empty set
/// means muted.
pub fn voice_channels(snapshot: &SessionSnapshot, player: &PlayerRecord) -> Vec<String> {
    if !player.is_alive {
        return vec![VOICE_CHANNEL_DEAD.to_string()];
    }
    if snapshot.session.status == SessionStatus::Finished {
        return vec![VOICE_CHANNEL_MAIN.to_string()];
    }
    match snapshot.session.current_phase {
        Phase::Night => {
            if player.role == Role::Werewolf {
                vec![VOICE_CHANNEL_WEREWOLF.to_string()]
            } else {
                Vec::new()
            }
        }
        // The revenge pause keeps the village floor open.
        Phase::DayDiscussion | Phase::DayVoting | Phase::HunterRevenge => {
            vec![VOICE_CHANNEL_MAIN.to_string()]
        }
    }
}

/// Action kinds the requester may submit right now.
pub fn available_actions(snapshot: &SessionSnapshot, player: &PlayerRecord) -> Vec<ActionKind> {
    let session = &snapshot.session;
    if session.status == SessionStatus::Finished {
        return Vec::new();
    }

    let state = &session.phase_state;
    match session.current_phase {
        Phase::HunterRevenge => {
            // The one action a dead player can take.
            let is_pending_hunter = state
                .hunter_revenge
                .is_some_and(|revenge| revenge.hunter_id == player.id);
            if is_pending_hunter {
                vec![ActionKind::HunterShoot]
            } else {
                Vec::new()
            }
        }
        _ if !player.is_alive => Vec::new(),
        Phase::Night => {
            let mut actions = Vec::new();
            match (&player.role, &player.role_state) {
                (Role::Werewolf, _) => actions.push(ActionKind::WerewolfVote),
                (Role::Seer, _) if state.night.divination.is_none() => {
                    actions.push(ActionKind::SeerDivine);
                }
                (Role::Witch, RoleState::Witch { heal_used, poison_used }) => {
                    if !heal_used {
                        actions.push(ActionKind::WitchHeal);
                    }
                    if !poison_used && state.night.poison_target.is_none() {
                        actions.push(ActionKind::WitchPoison);
                    }
                }
                (Role::Bodyguard, _) if state.night.protect.is_none() => {
                    actions.push(ActionKind::BodyguardProtect);
                }
                (Role::Cupid, RoleState::Cupid { has_chosen: false })
                    if session.phase_number == 1 =>
                {
                    actions.push(ActionKind::CupidChoose);
                }
                _ => {}
            }
            actions
        }
        Phase::DayVoting => vec![ActionKind::VoteLynch],
        Phase::DayDiscussion => Vec::new(),
    }
}
