//! Inputs and results of registry operations.

use manhunt_protocol::{BatchReport, Location, Notifier, Phase, PlayerId, Role, WinReason, WorldNames};

/// Modifiers for [`RoleRegistry::set_role`](crate::RoleRegistry::set_role).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleFlags {
    /// The player just respawned after dying.
    pub is_respawn: bool,
    /// Ask display collaborators to redraw the player's role.
    pub update_display: bool,
    /// The player is coming back from a disconnect with grace left.
    pub is_rejoining: bool,
}

impl Default for RoleFlags {
    fn default() -> Self {
        Self {
            is_respawn: false,
            update_display: true,
            is_rejoining: false,
        }
    }
}

impl RoleFlags {
    pub fn respawn() -> Self {
        Self {
            is_respawn: true,
            ..Self::default()
        }
    }

    pub fn rejoining() -> Self {
        Self {
            is_rejoining: true,
            ..Self::default()
        }
    }
}

/// What the registry needs from its owner for one call: the current phase
/// and the collaborators side effects go through.
pub struct RoleContext<'a, H> {
    pub phase: Phase,
    pub host: &'a H,
    pub notifier: &'a Notifier,
    pub worlds: &'a WorldNames,
}

impl<H> Clone for RoleContext<'_, H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H> Copy for RoleContext<'_, H> {}

/// Work the owner must finish after a role change, usually because it
/// needs a background task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    /// A runner joined a running round and must be dropped next to a
    /// teammate with temporary invulnerability.
    LateJoinDrop { player: PlayerId },
}

/// Result of [`RoleRegistry::set_role`](crate::RoleRegistry::set_role).
#[derive(Debug, Clone)]
pub struct RoleChange {
    pub player: PlayerId,
    pub old: Role,
    pub new: Role,
    /// `false` when the call was a no-op.
    pub applied: bool,
    pub report: BatchReport,
    pub follow_up: Option<FollowUp>,
}

/// The round should end.
#[derive(Debug, Clone, PartialEq)]
pub struct EndRequest {
    pub reason: WinReason,
    /// Where the last runner died, for a hunters win.
    pub location: Option<Location>,
}

/// Result of eliminating one participant.
#[derive(Debug, Clone, Default)]
pub struct Elimination {
    pub report: BatchReport,
    pub end: Option<EndRequest>,
}

/// Result of one timeout sweep.
#[derive(Debug, Clone, Default)]
pub struct TimeoutSweep {
    /// Players whose grace ran out, in id order.
    pub evicted: Vec<PlayerId>,
    pub report: BatchReport,
    /// The first end request raised by an eviction.
    pub end: Option<EndRequest>,
}
