//! Error types for the session layer, and the unified error of the crate.

use manhunt_protocol::{HostError, Phase};
use manhunt_roles::RoleError;
use manhunt_worlds::WorldError;

use crate::SettingsError;

/// Why the session refused a command.
///
/// Duplicate or late requests that the idempotency guards absorb (a second
/// `try_end`, a promotion while one is running) are not errors; they come
/// back as `Ok(false)` or similar.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// `start` outside LOBBY.
    #[error("a round is already under way ({0})")]
    NotInLobby(Phase),

    /// A map reset or preparation is in progress.
    #[error("worlds are being reset")]
    WorldsBusy,

    /// Not enough players, or a team is empty.
    #[error("not enough players or an empty team")]
    NotEligible,

    /// `extend_countdown` outside COUNTDOWN.
    #[error("no countdown is running ({0})")]
    NotInCountdown(Phase),

    /// `force_begin` after the round has begun.
    #[error("round cannot be force-started during {0}")]
    NotPregame(Phase),

    /// Team changes are locked for this round.
    #[error("roles are locked")]
    RolesLocked,

    /// The late-join window of the running round has closed.
    #[error("too late to join this round")]
    LateJoinClosed,

    /// A disconnected participant could not be resumed.
    #[error(transparent)]
    Resume(#[from] RoleError),

    /// The session task is gone.
    #[error("session is unavailable")]
    Unavailable,
}

impl SessionError {
    /// Template key of the message shown to whoever issued the command.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::NotInLobby(_) => "game.already",
            Self::WorldsBusy => "game.resetting",
            Self::NotEligible => "game.start.invalid",
            Self::NotInCountdown(_) => "game.countdown.none",
            Self::NotPregame(_) => "game.already",
            Self::RolesLocked => "cmd.join.locked",
            Self::LateJoinClosed => "cmd.join.late",
            Self::Resume(_) => "spec.rejoin.spectator",
            Self::Unavailable => "game.unavailable",
        }
    }
}

/// Top-level error that wraps every crate-specific error.
///
/// The `#[from]` attributes let `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum ManhuntError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Role(#[from] RoleError),

    #[error(transparent)]
    World(#[from] WorldError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}
