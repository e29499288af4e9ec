//! The host traits: everything the engine needs from the game server.
//!
//! The engine never touches players or worlds directly. It calls these
//! traits, and the server adapter (or [`SimHost`](crate::SimHost) in tests)
//! implements them.
//!
//! Three traits split the surface by who calls them:
//!
//! - [`PlayerHost`]: player queries and side effects. Called only from the
//!   session task.
//! - [`WorldHost`]: world loading, saving, spawn points, game rules, and
//!   chunk pre-generation. Also called only from the session task.
//! - [`Terrain`]: block and biome reads for spawn placement. These run in a
//!   background task while spawns are being searched, which is why
//!   [`Terrain::load_chunk`] is asynchronous and returns a `Send` future.
//!
//! [`GameHost`] bundles all three so generic code can name one bound.

use std::future::Future;
use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::{
    Biome, Block, BlockPos, Dimension, DimensionInfo, GameMode, HostError, Location, PlayerId,
    PregenEvent, RoundEnvironment, VitalsReset,
};

// ---------------------------------------------------------------------------
// PlayerHost
// ---------------------------------------------------------------------------

/// Player queries and side effects.
///
/// Side effects return `Result<(), HostError>`; the engine wraps each one
/// in an [`EffectOutcome`](crate::EffectOutcome) and never lets a single
/// failure abort work on other players.
pub trait PlayerHost: Send + Sync + 'static {
    /// Every currently connected player.
    fn online_players(&self) -> Vec<PlayerId>;

    fn is_online(&self, player: PlayerId) -> bool;

    /// Display name, if the host knows the player.
    fn player_name(&self, player: PlayerId) -> Option<String>;

    /// Current position of an online player.
    fn location(&self, player: PlayerId) -> Option<Location>;

    /// The player's own respawn point (bed or anchor), if one is set.
    fn respawn_location(&self, player: PlayerId) -> Option<Location>;

    fn teleport(&self, player: PlayerId, to: &Location) -> Result<(), HostError>;

    fn set_game_mode(&self, player: PlayerId, mode: GameMode) -> Result<(), HostError>;

    fn reset_vitals(&self, player: PlayerId, reset: VitalsReset) -> Result<(), HostError>;

    fn set_invulnerable(&self, player: PlayerId, invulnerable: bool) -> Result<(), HostError>;

    /// Zeroes fall distance and fire ticks.
    fn clear_fall_and_fire(&self, player: PlayerId) -> Result<(), HostError>;

    /// Gives a hunter the item that points at runners.
    fn give_tracking_item(&self, player: PlayerId) -> Result<(), HostError>;

    /// Tells the tracking collaborator the round is over.
    fn tracking_round_ended(&self);

    /// Tells the tracking collaborator that `player` can no longer be tracked.
    fn tracking_target_lost(&self, player: PlayerId);
}

// ---------------------------------------------------------------------------
// WorldHost
// ---------------------------------------------------------------------------

/// World management.
pub trait WorldHost: Send + Sync + 'static {
    /// Directory holding one folder per world, named after the world.
    fn world_container(&self) -> PathBuf;

    fn is_loaded(&self, world: &str) -> bool;

    /// Loads `world`, creating it if its folder does not exist. `seed` is
    /// only used for a fresh world; `None` lets the host choose.
    fn create_world(
        &self,
        world: &str,
        dimension: Dimension,
        seed: Option<i64>,
    ) -> Result<(), HostError>;

    fn unload_world(&self, world: &str, save: bool) -> Result<(), HostError>;

    fn save_world(&self, world: &str) -> Result<(), HostError>;

    fn spawn_location(&self, world: &str) -> Option<Location>;

    /// Sets the world spawn with a spawn radius of zero.
    fn set_spawn_location(&self, world: &str, at: &Location) -> Result<(), HostError>;

    fn apply_round_environment(
        &self,
        world: &str,
        environment: &RoundEnvironment,
    ) -> Result<(), HostError>;

    fn set_spectators_generate_chunks(&self, world: &str, enabled: bool)
    -> Result<(), HostError>;

    /// Starts generating every chunk within `radius_blocks` of the world
    /// spawn. Progress and completion arrive on `events`.
    fn start_pregeneration(
        &self,
        world: &str,
        radius_blocks: u32,
        events: mpsc::UnboundedSender<PregenEvent>,
    ) -> Result<(), HostError>;

    /// Stops a running pre-generation job. No-op if none is running.
    fn cancel_pregeneration(&self, world: &str);
}

// ---------------------------------------------------------------------------
// Terrain
// ---------------------------------------------------------------------------

/// Terrain reads used by the spawn search.
///
/// `load_chunk` is awaited before any read in that chunk; the synchronous
/// reads assume the chunk is resident.
pub trait Terrain: Send + Sync + 'static {
    fn load_chunk(
        &self,
        world: &str,
        chunk_x: i32,
        chunk_z: i32,
    ) -> impl Future<Output = Result<(), HostError>> + Send;

    /// Y of the highest non-air block in the column, if the column has one.
    fn highest_block_y(&self, world: &str, x: i32, z: i32) -> Option<i32>;

    fn block_at(&self, world: &str, pos: BlockPos) -> Block;

    fn biome_at(&self, world: &str, pos: BlockPos) -> Biome;

    fn dimension_info(&self, world: &str) -> Option<DimensionInfo>;
}

/// Everything the engine needs from a server.
pub trait GameHost: PlayerHost + WorldHost + Terrain {}

impl<T: PlayerHost + WorldHost + Terrain> GameHost for T {}

/// The chunk coordinate containing block coordinate `v`.
pub fn chunk_coord(v: i32) -> i32 {
    v >> 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_coord_floors_negatives() {
        assert_eq!(chunk_coord(0), 0);
        assert_eq!(chunk_coord(15), 0);
        assert_eq!(chunk_coord(16), 1);
        assert_eq!(chunk_coord(-1), -1);
        assert_eq!(chunk_coord(-16), -1);
        assert_eq!(chunk_coord(-17), -2);
    }
}
