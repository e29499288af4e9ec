//! Safe spawn placement for manhunt rounds.
//!
//! At round start every runner is scattered on a ring around world spawn,
//! far enough from each other that nobody starts next to another runner,
//! and every hunter is grouped around one randomly chosen "hunter center".
//! Each candidate is checked by [`safe_surface`]: no ocean, no lava, no
//! sand to sink into, and room to stand.
//!
//! # Key types
//!
//! - [`SpawnPlacementEngine`]: plans and applies start positions
//! - [`SpawnPlan`]: the chosen location of every player
//! - [`ScatterConfig`]: ring radius, jitter, and retry budget

mod config;
mod engine;
mod surface;

pub use config::ScatterConfig;
pub use engine::{
    HUNTER_INNER_RADIUS, MIN_SAMPLE_RADIUS, RUNNER_SEPARATION, SpawnPlacementEngine, SpawnPlan,
};
pub use surface::safe_surface;
