//! Messages into the session task.

use std::time::Duration;

use manhunt_protocol::{BlockPos, Location, PlayerId, Role, WinReason};
use manhunt_roles::RoleFlags;
use manhunt_spawn::SpawnPlan;
use manhunt_tick::TimerToken;
use manhunt_worlds::WorldEvent;
use tokio::sync::oneshot;

use crate::{PlayerStatus, SessionError};

type Reply<T> = oneshot::Sender<T>;

/// A game event forwarded by the server adapter.
///
/// Join, quit, death, and respawn are forwarded while the server still
/// reports the player in the state the event describes: a quitting player
/// is still online, a joining one already is.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Joined(PlayerId),
    Quit(PlayerId),
    Died(PlayerId),
    Respawned(PlayerId),
    /// Someone killed the ender dragon.
    DragonKilled,
    /// A player threw an ender eye and followed it.
    EnderEyeFollowed { player: PlayerId, at: BlockPos },
    /// Teams or the online count changed outside the session.
    RosterChanged,
}

/// One-shot and repeating timers owned by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum SessionTimer {
    Countdown,
    TimeoutSweep,
    RulesAnnouncement,
    EndDrain,
    PostgameDelay,
    PostgameDrain,
    AutoStart,
    Invulnerability(PlayerId),
}

impl SessionTimer {
    /// One-shot timers are retired when they fire; repeating ones stay
    /// current until cancelled.
    pub(crate) fn is_one_shot(self) -> bool {
        matches!(
            self,
            Self::RulesAnnouncement | Self::PostgameDelay | Self::AutoStart | Self::Invulnerability(_)
        )
    }
}

pub(crate) enum Command {
    // -- operator commands --------------------------------------------------
    Start {
        reply: Reply<Result<(), SessionError>>,
    },
    ForceBegin {
        reply: Reply<Result<(), SessionError>>,
    },
    TryEnd {
        reason: WinReason,
        location: Option<Location>,
        reply: Reply<bool>,
    },
    LockRoles {
        locked: bool,
        reply: Reply<()>,
    },
    ExtendCountdown {
        secs: u32,
        reply: Reply<Result<u32, SessionError>>,
    },
    SetRole {
        player: PlayerId,
        role: Role,
        flags: RoleFlags,
        reply: Reply<bool>,
    },
    SuspendPlayer {
        player: PlayerId,
        name: String,
        reply: Reply<Duration>,
    },
    TryResumePlayer {
        player: PlayerId,
        reply: Reply<Result<Duration, SessionError>>,
    },
    PickBalancedRole {
        reply: Reply<Role>,
    },
    Join {
        player: PlayerId,
        role: Option<Role>,
        reply: Reply<Result<Role, SessionError>>,
    },
    PlayerInfo {
        player: PlayerId,
        reply: Reply<PlayerStatus>,
    },
    Event {
        event: PlayerEvent,
        reply: Reply<()>,
    },
    Shutdown,

    // -- continuations ------------------------------------------------------
    World(WorldEvent),
    SpawnsPlanned {
        round: u64,
        plan: SpawnPlan,
    },
    LateJoinSpot {
        round: u64,
        player: PlayerId,
        spot: Location,
    },
    Timer {
        timer: SessionTimer,
        token: TimerToken,
    },
}

impl From<WorldEvent> for Command {
    fn from(event: WorldEvent) -> Self {
        Self::World(event)
    }
}
