//! Positions in a named world.

use serde::{Deserialize, Serialize};

use std::fmt;

/// An integer block coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The block `dy` above (or below, if negative) this one.
    pub const fn offset_y(self, dy: i32) -> Self {
        Self {
            x: self.x,
            y: self.y + dy,
            z: self.z,
        }
    }
}

/// A precise position inside a named world.
///
/// The world is referenced by name rather than by handle: worlds are
/// unloaded and swapped between rounds, and a stored location must stay
/// meaningful (or at least harmless) across that swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// The location standing on top of `block`: centered on the block and
    /// slightly above its top face.
    pub fn standing_on(world: impl Into<String>, block: BlockPos) -> Self {
        Self::new(
            world,
            f64::from(block.x) + 0.5,
            f64::from(block.y) + 1.01,
            f64::from(block.z) + 0.5,
        )
    }

    /// The block containing this location.
    pub fn block(&self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }

    /// Squared distance on the horizontal (x/z) plane. Worlds are compared
    /// too: locations in different worlds are infinitely far apart.
    pub fn horizontal_distance_squared(&self, other: &Location) -> f64 {
        if self.world != other.world {
            return f64::INFINITY;
        }
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        dx * dx + dz * dz
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@({:.1}, {:.1}, {:.1})", self.world, self.x, self.y, self.z)
    }
}
