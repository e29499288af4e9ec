//! The cloneable front door to the session task.

use std::time::Duration;

use manhunt_protocol::{BlockPos, Location, PlayerId, Role, WinReason};
use manhunt_roles::RoleFlags;
use tokio::sync::{mpsc, oneshot, watch};

use crate::command::{Command, PlayerEvent};
use crate::{PlayerStatus, SessionError, StatusSnapshot};

/// Sends commands to a running session and awaits their replies.
///
/// Cheap to clone; every clone talks to the same task. Once the task is
/// gone every call returns [`SessionError::Unavailable`].
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<Command>,
    status: watch::Receiver<StatusSnapshot>,
}

impl SessionHandle {
    pub(crate) fn new(sender: mpsc::Sender<Command>, status: watch::Receiver<StatusSnapshot>) -> Self {
        Self { sender, status }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The latest published snapshot. Never waits for the session task.
    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    /// A receiver that is notified whenever the snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    pub async fn player(&self, player: PlayerId) -> Result<PlayerStatus, SessionError> {
        self.request(|reply| Command::PlayerInfo { player, reply })
            .await
    }

    // -----------------------------------------------------------------------
    // Round control
    // -----------------------------------------------------------------------

    /// Starts the countdown.
    ///
    /// # Errors
    /// - [`SessionError::NotInLobby`] outside LOBBY.
    /// - [`SessionError::WorldsBusy`] while a map reset runs and starting
    ///   is blocked.
    /// - [`SessionError::NotEligible`] with too few players or an empty team.
    pub async fn start(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Start { reply }).await?
    }

    /// Skips (the rest of) the countdown.
    pub async fn force_begin(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::ForceBegin { reply }).await?
    }

    /// Ends the round. Returns `false` if it was already ending or there
    /// was nothing to end.
    pub async fn try_end(
        &self,
        reason: WinReason,
        location: Option<Location>,
    ) -> Result<bool, SessionError> {
        self.request(|reply| Command::TryEnd {
            reason,
            location,
            reply,
        })
        .await
    }

    pub async fn lock_roles(&self, locked: bool) -> Result<(), SessionError> {
        self.request(|reply| Command::LockRoles { locked, reply })
            .await
    }

    /// Adds `secs` to the running countdown and returns the new total.
    pub async fn extend_countdown(&self, secs: u32) -> Result<u32, SessionError> {
        self.request(|reply| Command::ExtendCountdown { secs, reply })
            .await?
    }

    // -----------------------------------------------------------------------
    // Roles
    // -----------------------------------------------------------------------

    /// Assigns a role as an operator would, ignoring the role lock. Returns
    /// whether anything was applied.
    pub async fn set_role(
        &self,
        player: PlayerId,
        role: Role,
        flags: RoleFlags,
    ) -> Result<bool, SessionError> {
        self.request(|reply| Command::SetRole {
            player,
            role,
            flags,
            reply,
        })
        .await
    }

    /// A player's own request to join a team; `None` picks the smaller
    /// team.
    pub async fn join(&self, player: PlayerId, role: Option<Role>) -> Result<Role, SessionError> {
        self.request(|reply| Command::Join {
            player,
            role,
            reply,
        })
        .await?
    }

    pub async fn suspend_player(
        &self,
        player: PlayerId,
        name: impl Into<String>,
    ) -> Result<Duration, SessionError> {
        let name = name.into();
        self.request(|reply| Command::SuspendPlayer {
            player,
            name,
            reply,
        })
        .await
    }

    pub async fn try_resume_player(&self, player: PlayerId) -> Result<Duration, SessionError> {
        self.request(|reply| Command::TryResumePlayer { player, reply })
            .await?
    }

    pub async fn pick_balanced_role(&self) -> Result<Role, SessionError> {
        self.request(|reply| Command::PickBalancedRole { reply })
            .await
    }

    // -----------------------------------------------------------------------
    // Forwarded events
    // -----------------------------------------------------------------------

    /// Forwards a game event and waits until the session has handled it.
    pub async fn notify(&self, event: PlayerEvent) -> Result<(), SessionError> {
        self.request(|reply| Command::Event { event, reply })
            .await
    }

    pub async fn player_joined(&self, player: PlayerId) -> Result<(), SessionError> {
        self.notify(PlayerEvent::Joined(player)).await
    }

    /// Call while the host still lists the player as online.
    pub async fn player_quit(&self, player: PlayerId) -> Result<(), SessionError> {
        self.notify(PlayerEvent::Quit(player)).await
    }

    pub async fn player_died(&self, player: PlayerId) -> Result<(), SessionError> {
        self.notify(PlayerEvent::Died(player)).await
    }

    pub async fn player_respawned(&self, player: PlayerId) -> Result<(), SessionError> {
        self.notify(PlayerEvent::Respawned(player)).await
    }

    pub async fn dragon_killed(&self) -> Result<(), SessionError> {
        self.notify(PlayerEvent::DragonKilled).await
    }

    pub async fn ender_eye_followed(&self, player: PlayerId, at: BlockPos) -> Result<(), SessionError> {
        self.notify(PlayerEvent::EnderEyeFollowed { player, at }).await
    }

    pub async fn roster_changed(&self) -> Result<(), SessionError> {
        self.notify(PlayerEvent::RosterChanged).await
    }

    /// Stops the session task. Pending timers are cancelled.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.sender
            .send(Command::Shutdown)
            .await
            .map_err(|_| SessionError::Unavailable)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("closed", &self.sender.is_closed())
            .field("status", &*self.status.borrow())
            .finish()
    }
}
