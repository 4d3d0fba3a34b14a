//! Benchmark of the night collect-and-resolve pipeline at realistic roster
//! sizes.

use chrono::Utc;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use uuid::Uuid;

use moonfall_server::config::GameRulesConfig;
use moonfall_server::engine::night;
use moonfall_server::engine::EventSink;
use moonfall_server::protocol::{
    ActionKind, ConnectionState, Phase, Role, RoleState, SessionStatus,
};
use moonfall_server::store::{PhaseState, PlayerRecord, SessionRecord, SessionSnapshot};

fn snapshot_for(roster_size: usize) -> SessionSnapshot {
    let session_id = Uuid::new_v4();
    let now = Utc::now();
    let mut roles = vec![Role::Werewolf; GameRulesConfig::default_werewolf_count(roster_size) as usize];
    roles.extend([Role::Seer, Role::Witch, Role::Bodyguard]);
    roles.resize(roster_size, Role::Villager);

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

    let mut snapshot = SessionSnapshot {
        session: SessionRecord {
            id: session_id,
            room_id: Uuid::new_v4(),
            status: SessionStatus::Active,
            current_phase: Phase::Night,
            phase_number: 2,
            day_number: 1,
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
    };
    snapshot.session.phase_state.pending_night_actions = night::pending_roles(&snapshot, 2);
    snapshot
}

fn collect_full_night(snapshot: &mut SessionSnapshot) {
    let session_id = snapshot.session.id;
    let mut events = EventSink::new(session_id, 2);

    let wolves: Vec<_> = snapshot
        .players
        .iter()
        .filter(|p| p.role == Role::Werewolf)
        .map(|p| p.id)
        .collect();
    let victim = snapshot
        .players
        .iter()
        .find(|p| p.role == Role::Villager)
        .map(|p| p.id)
        .expect("villager present");
    for wolf in wolves {
        night::collect_action(snapshot, &mut events, wolf, ActionKind::WerewolfVote, Some(victim), None)
            .expect("wolf vote");
    }

    let seer = snapshot.players.iter().find(|p| p.role == Role::Seer).map(|p| p.id);
    if let Some(seer) = seer {
        night::collect_action(snapshot, &mut events, seer, ActionKind::SeerDivine, Some(victim), None)
            .expect("divine");
    }
    let guard = snapshot
        .players
        .iter()
        .find(|p| p.role == Role::Bodyguard)
        .map(|p| p.id);
    if let Some(guard) = guard {
        night::collect_action(
            snapshot,
            &mut events,
            guard,
            ActionKind::BodyguardProtect,
            Some(victim),
            None,
        )
        .expect("protect");
    }
}

fn bench_night_resolution(c: &mut Criterion) {
    let rules = GameRulesConfig::default();
    for roster_size in [8usize, 16, 24] {
        c.bench_function(&format!("night_resolve_{roster_size}_players"), |b| {
            b.iter_batched(
                || {
                    let mut snapshot = snapshot_for(roster_size);
                    collect_full_night(&mut snapshot);
                    snapshot
                },
                |mut snapshot| {
                    let mut events = EventSink::new(snapshot.session.id, 2);
                    night::resolve(&mut snapshot, &rules, &mut events);
                    (snapshot, events)
                },
                BatchSize::SmallInput,
            );
        });
    }
}

criterion_group!(benches, bench_night_resolution);
criterion_main!(benches);
