//! Scatter configuration.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// How far apart players start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScatterConfig {
    /// Nominal distance from world spawn at which runners are placed.
    pub runner_ring_radius: i32,

    /// Runners land anywhere within `radius ± jitter` of spawn.
    pub runner_ring_jitter: i32,

    /// Hunters land within this many blocks (per axis) of the hunter
    /// center.
    pub hunter_center_scatter_radius: i32,

    /// Candidate samples per player before falling back.
    pub max_tries: u32,
}

impl Default for ScatterConfig {
    fn default() -> Self {
        Self {
            runner_ring_radius: 128,
            runner_ring_jitter: 24,
            hunter_center_scatter_radius: 16,
            max_tries: 20,
        }
    }
}

impl ScatterConfig {
    pub const MIN_RING_RADIUS: i32 = 16;
    pub const MIN_TRIES: u32 = 8;

    /// Clamps degenerate values into the usable range.
    pub fn validated(mut self) -> Self {
        if self.runner_ring_radius < Self::MIN_RING_RADIUS {
            warn!(
                radius = self.runner_ring_radius,
                min = Self::MIN_RING_RADIUS,
                "runner_ring_radius below minimum, clamping"
            );
            self.runner_ring_radius = Self::MIN_RING_RADIUS;
        }
        if self.runner_ring_jitter < 0 {
            warn!(jitter = self.runner_ring_jitter, "negative runner_ring_jitter, using 0");
            self.runner_ring_jitter = 0;
        }
        if self.hunter_center_scatter_radius < 0 {
            warn!(
                radius = self.hunter_center_scatter_radius,
                "negative hunter_center_scatter_radius, using 0"
            );
            self.hunter_center_scatter_radius = 0;
        }
        if self.max_tries < Self::MIN_TRIES {
            warn!(tries = self.max_tries, min = Self::MIN_TRIES, "max_tries below minimum, clamping");
            self.max_tries = Self::MIN_TRIES;
        }
        self
    }
}
