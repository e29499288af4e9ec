//! Read-only views of the session for display collaborators.

use std::time::Duration;

use manhunt_protocol::{Phase, Role};

/// Published on a `watch` channel after every handled command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub phase: Phase,
    pub roles_locked: bool,
    pub online: usize,
    pub participants: usize,
    pub runners: usize,
    pub hunters: usize,
    pub spectators: usize,
    pub resetting: bool,
    pub next_preparing: bool,
    pub next_ready: bool,
    pub next_progress: u8,
    pub countdown_remaining: u32,
}

/// One player as the session sees them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerStatus {
    pub role: Role,
    pub participant: bool,
    pub suspended: bool,
    pub grace_remaining: Duration,
}
