//! Placement tests against the in-memory host.

use std::future::Future;

use manhunt_protocol::{
    Biome, Block, BlockPos, Dimension, DimensionInfo, HostError, Location, PlayerId, SimColumn,
    SimEvent, SimHost, Terrain, WorldHost,
};
use manhunt_spawn::{RUNNER_SEPARATION, ScatterConfig, SpawnPlacementEngine, safe_surface};
use rand::SeedableRng;
use rand::rngs::StdRng;

const WORLD: &str = "minehunt_game";

fn pid(n: u64) -> PlayerId {
    PlayerId(n)
}

fn host_with(terrain: impl Fn(&str, i32, i32) -> SimColumn + Send + Sync + 'static) -> (tempfile::TempDir, SimHost) {
    let dir = tempfile::tempdir().unwrap();
    let host = SimHost::new(dir.path()).with_terrain(terrain);
    host.create_world(WORLD, Dimension::Overworld, Some(1)).unwrap();
    (dir, host)
}

fn flat_host() -> (tempfile::TempDir, SimHost) {
    host_with(|_, _, _| SimColumn::flat())
}

fn spawn() -> Location {
    Location::new(WORLD, 0.5, 65.0, 0.5)
}

fn assert_standing_at(loc: &Location, x: f64, y: f64, z: f64) {
    assert_eq!(loc.world, WORLD);
    assert!((loc.x - x).abs() < 1e-9, "x {}", loc.x);
    assert!((loc.y - y).abs() < 1e-9, "y {}", loc.y);
    assert!((loc.z - z).abs() < 1e-9, "z {}", loc.z);
}

// =========================================================================
// Runners
// =========================================================================

#[tokio::test]
async fn test_plan_runners_are_pairwise_separated() {
    let (_dir, host) = flat_host();
    let engine = SpawnPlacementEngine::new(ScatterConfig::default());
    let runners: Vec<PlayerId> = (1..=5).map(pid).collect();

    for seed in 0..50 {
        let mut rng = StdRng::seed_from_u64(seed);
        let plan = engine.plan(&host, &spawn(), &runners, &[], &mut rng).await;
        assert_eq!(plan.runners.len(), 5);
        for (i, (_, a)) in plan.runners.iter().enumerate() {
            for (_, b) in &plan.runners[i + 1..] {
                let d = a.horizontal_distance_squared(b).sqrt();
                assert!(d >= RUNNER_SEPARATION, "seed {seed}: runners {d:.1} blocks apart");
            }
        }
    }
}

#[tokio::test]
async fn test_plan_runners_land_on_the_ring() {
    let (_dir, host) = flat_host();
    let engine = SpawnPlacementEngine::new(ScatterConfig::default());
    let mut rng = StdRng::seed_from_u64(7);

    let plan = engine.plan(&host, &spawn(), &[pid(1), pid(2)], &[], &mut rng).await;
    for (_, loc) in &plan.runners {
        let d = loc.horizontal_distance_squared(&spawn()).sqrt();
        // radius 128 ± jitter 24, plus block rounding
        assert!((102.0..=154.0).contains(&d), "distance {d}");
        assert!(loc.y > 65.0 && loc.y < 65.1);
    }
}

#[tokio::test]
async fn test_plan_all_water_falls_back_to_raw_spawn() {
    let (_dir, host) = host_with(|_, _, _| SimColumn {
        top_y: 62,
        ground: Block::Water,
        biome: Biome::Ocean,
    });
    let engine = SpawnPlacementEngine::new(ScatterConfig::default());
    let mut rng = StdRng::seed_from_u64(1);

    let plan = engine.plan(&host, &spawn(), &[pid(1)], &[pid(2)], &mut rng).await;
    let expected = Location::new(WORLD, 0.5, 66.0, 0.5);
    assert_eq!(plan.runners[0].1, expected);
    assert_eq!(plan.hunter_center, expected);
    assert_eq!(plan.hunters[0].1, expected);
}

#[tokio::test]
async fn test_plan_hazard_ring_falls_back_to_safe_spawn_spot() {
    // Sand everywhere except a small grass patch around spawn.
    let (_dir, host) = host_with(|_, x, z| {
        if x.abs() <= 4 && z.abs() <= 4 {
            SimColumn::flat()
        } else {
            SimColumn {
                ground: Block::Sand,
                ..SimColumn::flat()
            }
        }
    });
    let engine = SpawnPlacementEngine::new(ScatterConfig::default());
    let mut rng = StdRng::seed_from_u64(3);

    let plan = engine.plan(&host, &spawn(), &[pid(1)], &[], &mut rng).await;
    assert_standing_at(&plan.runners[0].1, 0.5, 65.01, 0.5);
}

#[tokio::test]
async fn test_plan_chunk_load_failure_uses_raw_spawn() {
    let (_dir, host) = flat_host();
    host.set_fail_chunk_loads(true);
    let engine = SpawnPlacementEngine::new(ScatterConfig::default());
    let mut rng = StdRng::seed_from_u64(5);

    let plan = engine.plan(&host, &spawn(), &[pid(1)], &[], &mut rng).await;
    assert_eq!(plan.runners[0].1, Location::new(WORLD, 0.5, 66.0, 0.5));
}

#[tokio::test]
async fn test_safe_surface_rejects_low_overworld_ground() {
    let (_dir, host) = host_with(|_, _, _| SimColumn {
        top_y: 30,
        ..SimColumn::flat()
    });
    assert!(safe_surface(&host, WORLD, 10, 10).await.is_none());
}

#[tokio::test]
async fn test_safe_surface_stands_on_top_block() {
    let (_dir, host) = host_with(|_, x, z| {
        if x == 0 && z == 0 {
            SimColumn {
                top_y: 66,
                ground: Block::Log,
                biome: Biome::Forest,
            }
        } else {
            SimColumn::flat()
        }
    });
    let spot = safe_surface(&host, WORLD, 0, 0).await.unwrap();
    assert_standing_at(&spot, 0.5, 67.01, 0.5);
}

/// One column: stone at y=64 with `above` at y=65.
struct Covered {
    above: Block,
}

impl Terrain for Covered {
    fn load_chunk(
        &self,
        _world: &str,
        _chunk_x: i32,
        _chunk_z: i32,
    ) -> impl Future<Output = Result<(), HostError>> + Send {
        std::future::ready(Ok(()))
    }

    fn highest_block_y(&self, _world: &str, _x: i32, _z: i32) -> Option<i32> {
        Some(64)
    }

    fn block_at(&self, _world: &str, pos: BlockPos) -> Block {
        match pos.y {
            64 => Block::Stone,
            65 => self.above,
            _ => Block::Air,
        }
    }

    fn biome_at(&self, _world: &str, _pos: BlockPos) -> Biome {
        Biome::Plains
    }

    fn dimension_info(&self, _world: &str) -> Option<DimensionInfo> {
        Some(DimensionInfo {
            dimension: Dimension::Overworld,
            min_height: -64,
            max_height: 320,
        })
    }
}

#[tokio::test]
async fn test_safe_surface_rejects_missing_headroom() {
    for above in [Block::Water, Block::Lava, Block::Dirt] {
        let terrain = Covered { above };
        assert!(safe_surface(&terrain, WORLD, 0, 0).await.is_none(), "{above:?}");
    }
    let open = Covered {
        above: Block::ShortGrass,
    };
    assert!(safe_surface(&open, WORLD, 0, 0).await.is_some());
}

// =========================================================================
// Hunters
// =========================================================================

#[tokio::test]
async fn test_plan_hunters_cluster_around_center() {
    let (_dir, host) = flat_host();
    let engine = SpawnPlacementEngine::new(ScatterConfig::default());
    let mut rng = StdRng::seed_from_u64(11);
    let hunters: Vec<PlayerId> = (10..14).map(pid).collect();

    let plan = engine.plan(&host, &spawn(), &[pid(1)], &hunters, &mut rng).await;
    assert_eq!(plan.hunters.len(), 4);

    let from_spawn = plan.hunter_center.horizontal_distance_squared(&spawn()).sqrt();
    assert!((11.0..=122.0).contains(&from_spawn), "center {from_spawn} from spawn");

    for (_, loc) in &plan.hunters {
        assert!((loc.x - plan.hunter_center.x).abs() <= 17.0);
        assert!((loc.z - plan.hunter_center.z).abs() <= 17.0);
    }
}

#[tokio::test]
async fn test_location_of_finds_both_teams() {
    let (_dir, host) = flat_host();
    let engine = SpawnPlacementEngine::new(ScatterConfig::default());
    let mut rng = StdRng::seed_from_u64(2);

    let plan = engine.plan(&host, &spawn(), &[pid(1)], &[pid(2)], &mut rng).await;
    assert!(plan.location_of(pid(1)).is_some());
    assert!(plan.location_of(pid(2)).is_some());
    assert!(plan.location_of(pid(3)).is_none());
}

// =========================================================================
// Late join / apply
// =========================================================================

#[tokio::test]
async fn test_find_safe_spot_near_stays_within_radius() {
    let (_dir, host) = flat_host();
    let engine = SpawnPlacementEngine::new(ScatterConfig::default());
    let mut rng = StdRng::seed_from_u64(9);
    let teammate = Location::new(WORLD, 200.5, 65.0, -40.5);

    let spot = engine
        .find_safe_spot_near(&host, &teammate, 10, &mut rng)
        .await
        .unwrap();
    assert!((spot.x - teammate.x).abs() <= 11.0);
    assert!((spot.z - teammate.z).abs() <= 11.0);
}

#[tokio::test]
async fn test_find_safe_spot_near_returns_none_on_water() {
    let (_dir, host) = host_with(|_, _, _| SimColumn {
        top_y: 62,
        ground: Block::Water,
        biome: Biome::River,
    });
    let engine = SpawnPlacementEngine::new(ScatterConfig::default());
    let mut rng = StdRng::seed_from_u64(9);

    let spot = engine
        .find_safe_spot_near(&host, &spawn(), 10, &mut rng)
        .await;
    assert!(spot.is_none());
}

#[tokio::test]
async fn test_apply_teleports_everyone_and_moves_spawn() {
    let (_dir, host) = flat_host();
    for n in 1..=3 {
        host.connect(pid(n), &format!("p{n}"));
    }
    let engine = SpawnPlacementEngine::new(ScatterConfig::default());
    let mut rng = StdRng::seed_from_u64(4);
    let plan = engine
        .plan(&host, &spawn(), &[pid(1), pid(2)], &[pid(3)], &mut rng)
        .await;

    let report = engine.apply(&host, &plan);
    assert!(report.is_clean());
    assert_eq!(report.attempted, 6);
    for n in 1..=3 {
        assert_eq!(host.teleports_of(pid(n)).len(), 1);
    }
    assert_eq!(host.spawn_location(WORLD), Some(plan.hunter_center.clone()));
    assert!(host.events().iter().any(|e| matches!(e, SimEvent::SpawnSet { .. })));
}

#[tokio::test]
async fn test_apply_failure_for_one_player_does_not_stop_others() {
    let (_dir, host) = flat_host();
    host.connect(pid(1), "a");
    host.connect(pid(2), "b");
    host.fail_teleports_for(pid(1));
    let engine = SpawnPlacementEngine::new(ScatterConfig::default());
    let mut rng = StdRng::seed_from_u64(4);
    let plan = engine
        .plan(&host, &spawn(), &[pid(1), pid(2)], &[], &mut rng)
        .await;

    let report = engine.apply(&host, &plan);
    assert_eq!(report.failed_players(), vec![pid(1)]);
    assert_eq!(host.teleports_of(pid(2)).len(), 1);
}
