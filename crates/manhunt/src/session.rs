//! Round-scoped session state.

use manhunt_protocol::Phase;
use tokio::time::Instant;
use tracing::{info, warn};

/// The session singleton: phase, role lock, and the ending latch.
///
/// Only the session task touches it. Round-scoped fields are reset by
/// [`Session::reset_round`] when the phase returns to LOBBY.
#[derive(Debug)]
pub(crate) struct Session {
    phase: Phase,
    pub(crate) roles_locked: bool,
    /// The role lock was taken by this round's begin, not by an operator.
    pub(crate) locked_on_begin: bool,
    /// Set by the first `try_end` of a round; later calls are no-ops.
    pub(crate) ending: bool,
    pub(crate) countdown_remaining: u32,
    pub(crate) round_started_at: Option<Instant>,
    /// The current round was force-started.
    pub(crate) forced: bool,
    /// Spawn placement for the current round is in flight.
    pub(crate) begin_pending: bool,
    /// Auto-start may fire on the next eligible roster change.
    pub(crate) armed: bool,
    /// Bumped whenever a round begins; stale continuations carry an old one.
    pub(crate) round: u64,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Lobby,
            roles_locked: false,
            locked_on_begin: false,
            ending: false,
            countdown_remaining: 0,
            round_started_at: None,
            forced: false,
            begin_pending: false,
            armed: true,
            round: 0,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    /// Moves to `to` if that is a legal edge. Returns `false` and leaves
    /// the phase alone otherwise.
    pub(crate) fn transition(&mut self, to: Phase) -> bool {
        if !self.phase.can_transition_to(to) {
            warn!(from = ?self.phase, to = ?to, "illegal phase transition refused");
            return false;
        }
        info!(from = ?self.phase, to = ?to, "phase changed");
        self.phase = to;
        true
    }

    /// Clears everything a round leaves behind.
    pub(crate) fn reset_round(&mut self) {
        self.roles_locked = false;
        self.locked_on_begin = false;
        self.ending = false;
        self.countdown_remaining = 0;
        self.round_started_at = None;
        self.forced = false;
        self.begin_pending = false;
        self.armed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_follows_round_cycle() {
        let mut s = Session::new();
        for to in [Phase::Countdown, Phase::Running, Phase::Ended, Phase::Lobby] {
            assert!(s.transition(to), "{to}");
            assert_eq!(s.phase(), to);
        }
    }

    #[test]
    fn test_transition_illegal_edge_is_refused() {
        let mut s = Session::new();
        assert!(!s.transition(Phase::Running));
        assert!(!s.transition(Phase::Ended));
        assert_eq!(s.phase(), Phase::Lobby);
    }

    #[test]
    fn test_transition_countdown_can_fall_back_to_lobby() {
        let mut s = Session::new();
        s.transition(Phase::Countdown);
        assert!(s.transition(Phase::Lobby));
    }

    #[test]
    fn test_reset_round_clears_latch_and_lock() {
        let mut s = Session::new();
        s.roles_locked = true;
        s.locked_on_begin = true;
        s.ending = true;
        s.forced = true;
        s.armed = false;
        s.countdown_remaining = 4;
        s.reset_round();
        assert!(!s.roles_locked);
        assert!(!s.locked_on_begin);
        assert!(!s.ending);
        assert!(!s.forced);
        assert!(s.armed);
        assert_eq!(s.countdown_remaining, 0);
    }
}
