//! Typed outcomes for per-player side effects.
//!
//! A teleport or game-mode change can fail for one player without that
//! failure mattering to anyone else. Every effect therefore produces an
//! [`EffectOutcome`], and operations that touch many players (round start,
//! end-of-round drains) fold those outcomes into a [`BatchReport`] instead
//! of stopping at the first error.

use std::fmt;

use crate::{HostError, PlayerId};

/// The kind of side effect that was attempted on a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    Teleport,
    GameMode,
    Vitals,
    Invulnerability,
    ClearFallAndFire,
    TrackingItem,
}

impl Effect {
    /// Converts a raw host result into an [`EffectOutcome`], logging the
    /// failure.
    pub fn check(self, player: PlayerId, result: Result<(), HostError>) -> EffectOutcome {
        result.map_err(|error| {
            tracing::warn!(%player, effect = %self, %error, "player side effect failed");
            EffectFailure {
                player,
                effect: self,
                error,
            }
        })
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Teleport => "teleport",
            Self::GameMode => "game_mode",
            Self::Vitals => "vitals",
            Self::Invulnerability => "invulnerability",
            Self::ClearFallAndFire => "clear_fall_and_fire",
            Self::TrackingItem => "tracking_item",
        };
        f.write_str(name)
    }
}

/// One failed side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectFailure {
    pub player: PlayerId,
    pub effect: Effect,
    pub error: HostError,
}

/// The result of a single side effect on a single player.
pub type EffectOutcome = Result<(), EffectFailure>;

/// Aggregated outcomes of a batch of side effects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<EffectFailure>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: EffectOutcome) {
        self.attempted += 1;
        match outcome {
            Ok(()) => self.succeeded += 1,
            Err(failure) => self.failures.push(failure),
        }
    }

    /// Folds another report into this one.
    pub fn merge(&mut self, other: BatchReport) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failures.extend(other.failures);
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Players that had at least one failed effect, without duplicates.
    pub fn failed_players(&self) -> Vec<PlayerId> {
        let mut players: Vec<PlayerId> = self.failures.iter().map(|f| f.player).collect();
        players.sort();
        players.dedup();
        players
    }
}
