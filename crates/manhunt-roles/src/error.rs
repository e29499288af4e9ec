//! Error types for the role registry.

use manhunt_protocol::PlayerId;

/// Why a disconnected participant could not be resumed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoleError {
    /// The player was not suspended: either never a participant, or
    /// already eliminated by the timeout sweep.
    #[error("player {0} has no suspension to resume")]
    NotSuspended(PlayerId),

    /// The grace budget ran out before the player came back. The
    /// suspension stays in place so the next sweep eliminates the player.
    #[error("grace period of player {0} has expired")]
    GraceExpired(PlayerId),
}
