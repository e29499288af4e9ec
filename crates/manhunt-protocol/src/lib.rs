//! Shared vocabulary for the manhunt round engine.
//!
//! This crate defines what every other manhunt crate talks about:
//!
//! - **Types** ([`PlayerId`], [`Role`], [`Phase`], [`WinReason`]): who is
//!   playing, on which team, and where the round is in its lifecycle.
//! - **Geometry and worlds** ([`Location`], [`BlockPos`], [`WorldNames`],
//!   [`Block`], [`Biome`]): positions and the terrain model the spawn
//!   search reads.
//! - **Host traits** ([`PlayerHost`], [`WorldHost`], [`Terrain`],
//!   [`GameHost`]): the only way the engine reaches the game server.
//! - **Notifications** ([`Notification`], [`Notifier`]): template keys
//!   and role changes for display collaborators.
//! - **Effects** ([`EffectOutcome`], [`BatchReport`]): typed results of
//!   per-player side effects.
//!
//! # Architecture
//!
//! ```text
//! game server ──(GameHost)──→ session task ──(Notifier)──→ chat / scoreboard
//! ```
//!
//! With the `sim` feature, [`SimHost`] provides an in-memory server.

mod effect;
mod error;
mod geometry;
mod host;
mod notify;
#[cfg(feature = "sim")]
mod sim;
mod types;
mod world;

pub use effect::{BatchReport, Effect, EffectFailure, EffectOutcome};
pub use error::HostError;
pub use geometry::{BlockPos, Location};
pub use host::{GameHost, PlayerHost, Terrain, WorldHost, chunk_coord};
pub use notify::{Notification, Notifier, TemplateArg};
#[cfg(feature = "sim")]
pub use sim::{PregenMode, SEED_FILE, SimColumn, SimEvent, SimHost};
pub use types::{GameMode, Phase, PlayerId, Role, VitalsReset, WinReason};
pub use world::{
    Biome, Block, Dimension, DimensionInfo, PregenEvent, RoundEnvironment, WeatherReset,
    WorldNames, WorldTriple,
};
