//! The safety predicate for a single column.

use manhunt_protocol::{BlockPos, Location, Terrain, chunk_coord};
use tracing::{debug, warn};

/// Returns where a player can stand in column `(x, z)` of `world`, or
/// `None` if the column is not a safe spawn.
///
/// A column is safe when:
/// - its chunk loads,
/// - the surface biome is not ocean or river,
/// - the surface block sits inside the dimension's safe height band,
/// - the surface block is solid and not a hazard,
/// - the two blocks above it leave room for a player.
pub async fn safe_surface<T: Terrain>(terrain: &T, world: &str, x: i32, z: i32) -> Option<Location> {
    if let Err(error) = terrain.load_chunk(world, chunk_coord(x), chunk_coord(z)).await {
        warn!(world, x, z, %error, "chunk load failed during spawn search");
        return None;
    }

    let info = terrain.dimension_info(world)?;
    let top = terrain.highest_block_y(world, x, z)?;
    let mut ground = BlockPos::new(x, top, z);
    if terrain.block_at(world, ground).is_air() {
        ground = ground.offset_y(-1);
    }

    if terrain.biome_at(world, ground).is_water() {
        debug!(x, z, "candidate rejected: water biome");
        return None;
    }
    if !info.safe_y_range().contains(&ground.y) {
        debug!(x, z, y = ground.y, "candidate rejected: outside safe height");
        return None;
    }
    let block = terrain.block_at(world, ground);
    if !block.is_solid() || block.is_hazard() {
        debug!(x, z, ?block, "candidate rejected: unsafe ground");
        return None;
    }
    let feet = terrain.block_at(world, ground.offset_y(1));
    let head = terrain.block_at(world, ground.offset_y(2));
    if !feet.is_clear_space() || !head.is_clear_space() {
        debug!(x, z, "candidate rejected: no headroom");
        return None;
    }

    Some(Location::standing_on(world, ground))
}
