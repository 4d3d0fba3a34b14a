use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Roster bounds enforced by session creation.
pub const MIN_ROSTER_SIZE: usize = 6;
pub const MAX_ROSTER_SIZE: usize = 24;

/// Stable channel identifiers handed to the external media plane.
pub const VOICE_CHANNEL_MAIN: &str = "main";
pub const VOICE_CHANNEL_WEREWOLF: &str = "werewolf";
pub const VOICE_CHANNEL_DEAD: &str = "dead";

/// Unique identifier for a running game session
pub type SessionId = Uuid;
/// Unique identifier for a session-scoped player
pub type PlayerId = Uuid;
/// Unique identifier for the authenticated human behind a player
pub type UserId = Uuid;
/// Unique identifier for an action log record
pub type ActionId = Uuid;
/// Unique identifier for an event log record
pub type EventId = Uuid;
/// Identifier of the lobby room a session was started from
pub type RoomId = Uuid;

/// The role a player was dealt at session start.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Werewolf,
    Villager,
    /// Learns one player's alignment each night.
    Seer,
    /// Carries one heal potion and one poison potion for the whole game.
    Witch,
    /// Shields one player per night, never the same player twice in a row.
    Bodyguard,
    /// Fires a revenge shot when killed (except by heartbreak).
    Hunter,
    /// Links two players as lovers on the first night.
    Cupid,
}

impl Role {
    /// Team the role starts on. Lovers are moved to [`Team::Lovers`] later.
    pub fn starting_team(self) -> Team {
        match self {
            Self::Werewolf => Team::Werewolves,
            _ => Team::Villagers,
        }
    }

    /// Whether this role owns a dedicated night action.
    pub fn has_night_action(self) -> bool {
        !matches!(self, Self::Villager | Self::Hunter)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Werewolf => "werewolf",
            Self::Villager => "villager",
            Self::Seer => "seer",
            Self::Witch => "witch",
            Self::Bodyguard => "bodyguard",
            Self::Hunter => "hunter",
            Self::Cupid => "cupid",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side a player currently wins with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Werewolves,
    Villagers,
    Lovers,
    Neutral,
}

/// Winner of a finished session. `Draw` is the sentinel for degenerate ends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WinningTeam {
    Werewolves,
    Villagers,
    Lovers,
    Tanner,
    Draw,
}

/// The named segments of a round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Night,
    DayDiscussion,
    DayVoting,
    /// Blocking sub-state: a dead hunter picks a target before the outer
    /// phase sequence resumes.
    HunterRevenge,
}

impl Phase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Night => "night",
            Self::DayDiscussion => "day_discussion",
            Self::DayVoting => "day_voting",
            Self::HunterRevenge => "hunter_revenge",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Finished,
}

/// How a player died.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeathReason {
    WerewolfKill,
    Poison,
    Lynch,
    HunterShot,
    /// Lover cascade. Not protectable, not reducible.
    Heartbreak,
}

impl DeathReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WerewolfKill => "werewolf_kill",
            Self::Poison => "poison",
            Self::Lynch => "lynch",
            Self::HunterShot => "hunter_shot",
            Self::Heartbreak => "heartbreak",
        }
    }
}

/// Every action a client can submit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    WerewolfVote,
    SeerDivine,
    WitchHeal,
    WitchPoison,
    BodyguardProtect,
    CupidChoose,
    VoteLynch,
    HunterShoot,
}

impl ActionKind {
    /// Re-writable kinds keep only the latest submission per actor; everything
    /// else is first-write-wins, enforced by the action log's unique key.
    pub fn is_rewritable(self) -> bool {
        matches!(self, Self::WerewolfVote | Self::VoteLynch)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WerewolfVote => "werewolf_vote",
            Self::SeerDivine => "seer_divine",
            Self::WitchHeal => "witch_heal",
            Self::WitchPoison => "witch_poison",
            Self::BodyguardProtect => "bodyguard_protect",
            Self::CupidChoose => "cupid_choose",
            Self::VoteLynch => "vote_lynch",
            Self::HunterShoot => "hunter_shoot",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Push-channel liveness of a player, as observed by the connection manager.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Connected,
    Disconnected,
}

/// Per-role mutable state, carried on the player record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum RoleState {
    Werewolf,
    Villager,
    Seer {
        divined_ids: Vec<PlayerId>,
    },
    Witch {
        heal_used: bool,
        poison_used: bool,
    },
    Bodyguard {
        last_protected_id: Option<PlayerId>,
    },
    Hunter {
        has_shot: bool,
    },
    Cupid {
        has_chosen: bool,
    },
}

impl RoleState {
    pub fn initial(role: Role) -> Self {
        match role {
            Role::Werewolf => Self::Werewolf,
            Role::Villager => Self::Villager,
            Role::Seer => Self::Seer {
                divined_ids: Vec::new(),
            },
            Role::Witch => Self::Witch {
                heal_used: false,
                poison_used: false,
            },
            Role::Bodyguard => Self::Bodyguard {
                last_protected_id: None,
            },
            Role::Hunter => Self::Hunter { has_shot: false },
            Role::Cupid => Self::Cupid { has_chosen: false },
        }
    }
}

/// Rule applied when the day vote ends in a tie.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TieRule {
    #[default]
    NoLynchOnTie,
    /// Reserved for a mayor role; rejected by config validation until one
    /// exists.
    MayorBreaksTie,
    /// Seeded from (session id, phase number) so replays tally identically.
    RandomAmongTied,
}

/// Narrative event kinds written to the append-only event log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PhaseChange,
    PlayerDeath,
    RoleReveal,
    ActionTaken,
    GameEnd,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PhaseChange => "phase_change",
            Self::PlayerDeath => "player_death",
            Self::RoleReveal => "role_reveal",
            Self::ActionTaken => "action_taken",
            Self::GameEnd => "game_end",
        }
    }
}

/// Who an event may be projected to. The notifier consults this before any
/// push; the stored record keeps it for the audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Visibility {
    /// Every participant, dead or alive.
    Public,
    /// Alive holders of any of the listed roles.
    Roles { roles: Vec<Role> },
    /// Exactly the listed players.
    Players { player_ids: Vec<PlayerId> },
    /// Stored for the audit log, never pushed.
    Nobody,
}

impl Visibility {
    pub fn players(ids: impl IntoIterator<Item = PlayerId>) -> Self {
        Self::Players {
            player_ids: ids.into_iter().collect(),
        }
    }

    pub fn roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self::Roles {
            roles: roles.into_iter().collect(),
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Self::Public)
    }
}
