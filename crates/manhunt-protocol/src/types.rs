//! Core vocabulary shared by every manhunt crate.
//!
//! These are the small, copyable values that flow between the session
//! controller, the role registry, the world pipeline, and the host: who a
//! player is, what team they are on, and what stage the round is in.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A unique identifier for a player.
///
/// This is a "newtype wrapper" around `u64`. The host maps its own player
/// identity (a UUID, a connection id, ...) onto this value once, and every
/// crate above it only ever sees `PlayerId`.
///
/// `#[serde(transparent)]` serializes a `PlayerId(42)` as plain `42`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

/// `tracing::info!(%player_id, ...)` prints "P-42".
impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// The team a player belongs to.
///
/// `Lobby` is the "no team" value: a player the registry has never seen
/// reads as `Lobby`. Only `Runner` and `Hunter` count as participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    Lobby,
    Runner,
    Hunter,
    Spectator,
}

impl Role {
    /// Returns `true` for the two roles that play the round.
    pub fn is_participant(self) -> bool {
        matches!(self, Self::Runner | Self::Hunter)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lobby => write!(f, "LOBBY"),
            Self::Runner => write!(f, "RUNNER"),
            Self::Hunter => write!(f, "HUNTER"),
            Self::Spectator => write!(f, "SPECTATOR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// The lifecycle phase of the session.
///
/// ```text
///             start()            spawns placed          tryEnd()
///   Lobby ───────────→ Countdown ─────────────→ Running ─────────→ Ended
///     ↑                   │  │                                     │
///     └─(eligibility lost)┘  └──────────(tryEnd)──────────→ Ended  │
///     ↑                                                            │
///     └──────────────────────(map promoted)────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    #[default]
    Lobby,
    Countdown,
    Running,
    Ended,
}

impl Phase {
    /// Returns `true` if moving from `self` to `target` is a legal edge.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Lobby, Self::Countdown)
                | (Self::Countdown, Self::Running)
                | (Self::Countdown, Self::Lobby)
                | (Self::Countdown, Self::Ended)
                | (Self::Running, Self::Ended)
                | (Self::Ended, Self::Lobby)
        )
    }

    /// Returns `true` while a round is being played or has just finished,
    /// i.e. when players live in the game map rather than the lobby.
    pub fn is_in_round(self) -> bool {
        matches!(self, Self::Running | Self::Ended)
    }

    /// Returns `true` while the lobby rules apply (roles can be picked).
    pub fn is_pregame(self) -> bool {
        matches!(self, Self::Lobby | Self::Countdown)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lobby => write!(f, "LOBBY"),
            Self::Countdown => write!(f, "COUNTDOWN"),
            Self::Running => write!(f, "RUNNING"),
            Self::Ended => write!(f, "ENDED"),
        }
    }
}

// ---------------------------------------------------------------------------
// WinReason
// ---------------------------------------------------------------------------

/// Why a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WinReason {
    /// Every runner was eliminated.
    HuntersWin,
    /// Every hunter was eliminated (timed out or left for good).
    HuntersGone,
    /// A runner killed the ender dragon.
    DragonKilled,
    /// Ended by an operator or for no recorded reason.
    Unknown,
}

impl WinReason {
    /// Template key of the outcome line broadcast when the round ends.
    pub fn outcome_key(self) -> Option<&'static str> {
        match self {
            Self::HuntersWin => Some("runner.all.dead"),
            Self::HuntersGone => Some("hunter.all.dead"),
            Self::DragonKilled => Some("enderdragon.dead"),
            Self::Unknown => None,
        }
    }
}

// ---------------------------------------------------------------------------
// GameMode / VitalsReset
// ---------------------------------------------------------------------------

/// Player interaction mode on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameMode {
    Survival,
    Adventure,
    Spectator,
}

/// How much of a player's state a vitals reset wipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VitalsReset {
    /// Health, hunger, effects, experience, inventory, ender chest, and
    /// advancement progress.
    Full,
    /// Health, hunger, effects, experience. Inventory and advancements are
    /// kept (used for in-round respawns).
    Respawn,
}
