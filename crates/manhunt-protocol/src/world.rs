//! World naming and the block/biome model the placement search reads.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Dimensions and world names
// ---------------------------------------------------------------------------

/// One of the three dimensions that make up a playable map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Overworld,
    Nether,
    End,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Self::Overworld, Self::Nether, Self::End];

    /// Folder/world-name suffix appended to a map's base name.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Overworld => "",
            Self::Nether => "_nether",
            Self::End => "_the_end",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overworld => write!(f, "overworld"),
            Self::Nether => write!(f, "nether"),
            Self::End => write!(f, "end"),
        }
    }
}

/// The three world names of one map, derived from a base name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldTriple {
    pub overworld: String,
    pub nether: String,
    pub end: String,
}

impl WorldTriple {
    pub fn from_base(base: &str) -> Self {
        Self {
            overworld: format!("{base}{}", Dimension::Overworld.suffix()),
            nether: format!("{base}{}", Dimension::Nether.suffix()),
            end: format!("{base}{}", Dimension::End.suffix()),
        }
    }

    pub fn name(&self, dimension: Dimension) -> &str {
        match dimension {
            Dimension::Overworld => &self.overworld,
            Dimension::Nether => &self.nether,
            Dimension::End => &self.end,
        }
    }

    /// `(dimension, name)` pairs in overworld, nether, end order.
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, &str)> {
        Dimension::ALL.into_iter().map(move |d| (d, self.name(d)))
    }

    pub fn contains(&self, world: &str) -> bool {
        self.iter().any(|(_, name)| name == world)
    }
}

/// Every world name the session touches.
///
/// The staging triple uses the `_next` prefix: base `minehunt_game` gives
/// `minehunt_game_next`, `minehunt_game_next_nether`, and
/// `minehunt_game_next_the_end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldNames {
    pub lobby: String,
    pub active: WorldTriple,
    pub staging: WorldTriple,
}

impl WorldNames {
    pub fn new(lobby: &str, game_base: &str) -> Self {
        Self {
            lobby: lobby.to_string(),
            active: WorldTriple::from_base(game_base),
            staging: WorldTriple::from_base(&format!("{game_base}_next")),
        }
    }
}

/// Height limits of a loaded world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionInfo {
    pub dimension: Dimension,
    pub min_height: i32,
    pub max_height: i32,
}

impl DimensionInfo {
    /// The vertical band a spawn surface may sit in.
    pub fn safe_y_range(&self) -> std::ops::RangeInclusive<i32> {
        match self.dimension {
            Dimension::Overworld => 54..=300,
            Dimension::Nether => (self.min_height + 6)..=(self.max_height - 6),
            Dimension::End => 40..=300,
        }
    }
}

// ---------------------------------------------------------------------------
// Blocks and biomes
// ---------------------------------------------------------------------------

/// The block kinds the placement search distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Block {
    Air,
    Water,
    Lava,
    Stone,
    Dirt,
    GrassBlock,
    SnowBlock,
    Netherrack,
    EndStone,
    Log,
    Leaves,
    Glass,
    Ice,
    ShortGrass,
    Sand,
    RedSand,
    Gravel,
    Cactus,
    Campfire,
    SoulCampfire,
    MagmaBlock,
    SweetBerryBush,
    PowderSnow,
}

impl Block {
    pub fn is_air(self) -> bool {
        matches!(self, Self::Air)
    }

    pub fn is_liquid(self) -> bool {
        matches!(self, Self::Water | Self::Lava)
    }

    /// Whether an entity can stand on the block.
    pub fn is_solid(self) -> bool {
        !matches!(
            self,
            Self::Air
                | Self::Water
                | Self::Lava
                | Self::ShortGrass
                | Self::SweetBerryBush
                | Self::PowderSnow
        )
    }

    /// Whether the block fills its whole cube and blocks vision.
    pub fn is_occluding(self) -> bool {
        matches!(
            self,
            Self::Stone
                | Self::Dirt
                | Self::GrassBlock
                | Self::SnowBlock
                | Self::Netherrack
                | Self::EndStone
                | Self::Log
                | Self::Sand
                | Self::RedSand
                | Self::Gravel
                | Self::MagmaBlock
        )
    }

    /// Ground that is standable but unsafe to be dropped onto.
    pub fn is_hazard(self) -> bool {
        matches!(
            self,
            Self::Sand
                | Self::RedSand
                | Self::Gravel
                | Self::Cactus
                | Self::Campfire
                | Self::SoulCampfire
                | Self::MagmaBlock
                | Self::SweetBerryBush
                | Self::PowderSnow
        ) || self.is_liquid()
    }

    /// Whether a player's body fits in this block.
    pub fn is_clear_space(self) -> bool {
        self.is_air() || (!self.is_liquid() && !self.is_occluding())
    }
}

/// Surface biomes. Only the water/river distinction matters to the core;
/// the land variants exist so hosts can report what they see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Biome {
    Plains,
    Forest,
    Taiga,
    Desert,
    Savanna,
    Jungle,
    Swamp,
    Beach,
    Mountains,
    SnowyPlains,
    Ocean,
    DeepOcean,
    WarmOcean,
    LukewarmOcean,
    DeepLukewarmOcean,
    ColdOcean,
    DeepColdOcean,
    FrozenOcean,
    DeepFrozenOcean,
    River,
    FrozenRiver,
    NetherWastes,
    TheEnd,
    Other,
}

impl Biome {
    pub fn is_water(self) -> bool {
        matches!(
            self,
            Self::Ocean
                | Self::DeepOcean
                | Self::WarmOcean
                | Self::LukewarmOcean
                | Self::DeepLukewarmOcean
                | Self::ColdOcean
                | Self::DeepColdOcean
                | Self::FrozenOcean
                | Self::DeepFrozenOcean
                | Self::River
                | Self::FrozenRiver
        )
    }
}

// ---------------------------------------------------------------------------
// Round environment and pre-generation
// ---------------------------------------------------------------------------

/// Clock and weather values applied to the overworld at round start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReset {
    pub time_of_day: i64,
    pub clear_weather_ticks: u32,
    pub thunder_ticks: u32,
}

/// Environment applied to each world of the active triple when a round
/// begins. `weather` is only set for the overworld.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundEnvironment {
    pub weather: Option<WeatherReset>,
    pub locator_bar: bool,
    pub spectators_generate_chunks: bool,
    pub border_center: (f64, f64),
    pub border_size: f64,
}

/// Progress reported by a host's chunk pre-generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PregenEvent {
    Progress { world: String, percent: u8 },
    Completed { world: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_names_derive_staging_prefix() {
        let names = WorldNames::new("world", "minehunt_game");
        assert_eq!(names.active.overworld, "minehunt_game");
        assert_eq!(names.active.nether, "minehunt_game_nether");
        assert_eq!(names.active.end, "minehunt_game_the_end");
        assert_eq!(names.staging.overworld, "minehunt_game_next");
        assert_eq!(names.staging.nether, "minehunt_game_next_nether");
        assert_eq!(names.staging.end, "minehunt_game_next_the_end");
        assert!(names.active.contains("minehunt_game_nether"));
        assert!(!names.active.contains("world"));
    }

    #[test]
    fn test_hazard_blocks_include_liquids_and_loose_ground() {
        for block in [
            Block::Sand,
            Block::Gravel,
            Block::Cactus,
            Block::MagmaBlock,
            Block::PowderSnow,
            Block::Water,
            Block::Lava,
        ] {
            assert!(block.is_hazard(), "{block:?} should be hazardous");
        }
        assert!(!Block::GrassBlock.is_hazard());
        assert!(!Block::Stone.is_hazard());
    }

    #[test]
    fn test_clear_space_rejects_liquid_and_full_blocks() {
        assert!(Block::Air.is_clear_space());
        assert!(Block::ShortGrass.is_clear_space());
        assert!(!Block::Water.is_clear_space());
        assert!(!Block::Stone.is_clear_space());
    }

    #[test]
    fn test_safe_y_range_by_dimension() {
        let nether = DimensionInfo {
            dimension: Dimension::Nether,
            min_height: 0,
            max_height: 256,
        };
        assert_eq!(nether.safe_y_range(), 6..=250);

        let overworld = DimensionInfo {
            dimension: Dimension::Overworld,
            min_height: -64,
            max_height: 320,
        };
        assert!(overworld.safe_y_range().contains(&64));
        assert!(!overworld.safe_y_range().contains(&40));
    }

    #[test]
    fn test_biome_is_water() {
        assert!(Biome::DeepFrozenOcean.is_water());
        assert!(Biome::River.is_water());
        assert!(!Biome::Beach.is_water());
    }
}
