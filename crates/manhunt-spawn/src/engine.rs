//! Runner scatter, hunter grouping, and applying a finished plan.

use std::f64::consts::TAU;

use manhunt_protocol::{
    BatchReport, Effect, Location, PlayerHost, PlayerId, Terrain, WorldHost,
};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::{ScatterConfig, safe_surface};

/// Runners never land closer to spawn than this.
pub const MIN_SAMPLE_RADIUS: i32 = 8;

/// Minimum horizontal distance between two runner spawns.
pub const RUNNER_SEPARATION: f64 = 24.0;

/// Inner edge of the annulus the hunter center is drawn from.
pub const HUNTER_INNER_RADIUS: f64 = 12.0;

/// Where every player starts a round.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnPlan {
    pub world: String,
    pub runners: Vec<(PlayerId, Location)>,
    pub hunters: Vec<(PlayerId, Location)>,
    pub hunter_center: Location,
}

impl SpawnPlan {
    pub fn location_of(&self, player: PlayerId) -> Option<&Location> {
        self.runners
            .iter()
            .chain(self.hunters.iter())
            .find(|(p, _)| *p == player)
            .map(|(_, loc)| loc)
    }
}

/// Computes and applies round start positions.
///
/// `plan` only reads terrain, so it can run in a background task; `apply`
/// performs the side effects and belongs on the session task.
#[derive(Debug, Clone)]
pub struct SpawnPlacementEngine {
    config: ScatterConfig,
}

impl SpawnPlacementEngine {
    pub fn new(config: ScatterConfig) -> Self {
        Self {
            config: config.validated(),
        }
    }

    pub fn config(&self) -> &ScatterConfig {
        &self.config
    }

    /// Picks start positions around `spawn` for every runner and hunter.
    ///
    /// Runners are placed one after another so each new spot can be checked
    /// against the ones already taken.
    pub async fn plan<T, R>(
        &self,
        terrain: &T,
        spawn: &Location,
        runners: &[PlayerId],
        hunters: &[PlayerId],
        rng: &mut R,
    ) -> SpawnPlan
    where
        T: Terrain,
        R: Rng + Send,
    {
        let world = spawn.world.as_str();
        let radius = self.config.runner_ring_radius;
        let jitter = self.config.runner_ring_jitter;

        let mut placed: Vec<(PlayerId, Location)> = Vec::with_capacity(runners.len());
        for &runner in runners {
            let mut chosen = None;
            for attempt in 0..self.config.max_tries {
                let angle = rng.random_range(0.0..TAU);
                let r = (radius + rng.random_range(-jitter..=jitter)).max(MIN_SAMPLE_RADIUS);
                let (x, z) = polar_offset(spawn, angle, f64::from(r));
                let Some(candidate) = safe_surface(terrain, world, x, z).await else {
                    continue;
                };
                let crowded = placed.iter().any(|(_, other)| {
                    candidate.horizontal_distance_squared(other) < RUNNER_SEPARATION * RUNNER_SEPARATION
                });
                if crowded {
                    debug!(%runner, attempt, "candidate rejected: too close to another runner");
                    continue;
                }
                chosen = Some(candidate);
                break;
            }
            let location = match chosen {
                Some(location) => location,
                None => {
                    warn!(%runner, tries = self.config.max_tries, "no safe runner spot, using spawn");
                    self.fallback(terrain, spawn).await
                }
            };
            placed.push((runner, location));
        }

        let hunter_center = self.hunter_center(terrain, spawn, rng).await;
        let scatter = self.config.hunter_center_scatter_radius;
        let (cx, cz) = (hunter_center.x.floor() as i32, hunter_center.z.floor() as i32);

        let mut hunter_spots = Vec::with_capacity(hunters.len());
        for &hunter in hunters {
            let mut chosen = None;
            for _ in 0..self.config.max_tries {
                let dx = rng.random_range(-scatter..=scatter);
                let dz = rng.random_range(-scatter..=scatter);
                if let Some(spot) = safe_surface(terrain, world, cx + dx, cz + dz).await {
                    chosen = Some(spot);
                    break;
                }
            }
            hunter_spots.push((hunter, chosen.unwrap_or_else(|| hunter_center.clone())));
        }

        info!(
            world,
            runners = placed.len(),
            hunters = hunter_spots.len(),
            center = %hunter_center,
            "spawn plan ready"
        );

        SpawnPlan {
            world: world.to_string(),
            runners: placed,
            hunters: hunter_spots,
            hunter_center,
        }
    }

    async fn hunter_center<T, R>(&self, terrain: &T, spawn: &Location, rng: &mut R) -> Location
    where
        T: Terrain,
        R: Rng + Send,
    {
        let outer = (HUNTER_INNER_RADIUS + 8.0)
            .max(f64::from(self.config.runner_ring_radius) - 8.0);
        for _ in 0..self.config.max_tries {
            let angle = rng.random_range(0.0..TAU);
            let distance = rng.random_range(HUNTER_INNER_RADIUS..=outer);
            let (x, z) = polar_offset(spawn, angle, distance);
            if let Some(center) = safe_surface(terrain, &spawn.world, x, z).await {
                return center;
            }
        }
        warn!(tries = self.config.max_tries, "no safe hunter center, using spawn");
        self.fallback(terrain, spawn).await
    }

    /// The safe spot at world spawn, or the raw spawn block as a last resort.
    async fn fallback<T: Terrain>(&self, terrain: &T, spawn: &Location) -> Location {
        let block = spawn.block();
        if let Some(spot) = safe_surface(terrain, &spawn.world, block.x, block.z).await {
            return spot;
        }
        Location::new(
            spawn.world.clone(),
            f64::from(block.x) + 0.5,
            f64::from(block.y) + 1.0,
            f64::from(block.z) + 0.5,
        )
    }

    /// Finds a safe spot within `radius` blocks of `center`, for dropping a
    /// late joiner next to a teammate.
    pub async fn find_safe_spot_near<T, R>(
        &self,
        terrain: &T,
        center: &Location,
        radius: i32,
        rng: &mut R,
    ) -> Option<Location>
    where
        T: Terrain,
        R: Rng + Send,
    {
        let radius = radius.max(0);
        let block = center.block();
        for _ in 0..self.config.max_tries {
            let dx = rng.random_range(-radius..=radius);
            let dz = rng.random_range(-radius..=radius);
            if let Some(spot) = safe_surface(terrain, &center.world, block.x + dx, block.z + dz).await {
                return Some(spot);
            }
        }
        None
    }

    /// Teleports everyone in `plan`, clears fall damage and fire, and moves
    /// the world spawn to the hunter center.
    ///
    /// A failure for one player never stops the others.
    pub fn apply<H: PlayerHost + WorldHost>(&self, host: &H, plan: &SpawnPlan) -> BatchReport {
        let mut report = BatchReport::new();
        for (player, location) in plan.runners.iter().chain(plan.hunters.iter()) {
            report.record(Effect::Teleport.check(*player, host.teleport(*player, location)));
            report.record(Effect::ClearFallAndFire.check(*player, host.clear_fall_and_fire(*player)));
        }
        if let Err(error) = host.set_spawn_location(&plan.world, &plan.hunter_center) {
            warn!(world = %plan.world, %error, "could not move world spawn to hunter center");
        }
        info!(
            world = %plan.world,
            succeeded = report.succeeded,
            failed = report.failures.len(),
            "spawn plan applied"
        );
        report
    }
}

fn polar_offset(origin: &Location, angle: f64, distance: f64) -> (i32, i32) {
    let x = origin.x + distance * angle.cos();
    let z = origin.z + distance * angle.sin();
    (x.floor() as i32, z.floor() as i32)
}
