//! In-memory host for tests and the demo.
//!
//! `SimHost` implements every host trait against plain collections and
//! records each side effect as a [`SimEvent`]. Worlds get real folders under
//! a container directory so the folder swap can be observed on disk.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::{
    Biome, Block, BlockPos, Dimension, DimensionInfo, GameMode, HostError, Location, PlayerHost,
    PlayerId, PregenEvent, RoundEnvironment, Terrain, VitalsReset, WorldHost,
};

/// The file a sim world keeps its seed in.
pub const SEED_FILE: &str = "seed";

/// What one terrain column looks like: ground block at `top_y`, stone below,
/// air above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimColumn {
    pub top_y: i32,
    pub ground: Block,
    pub biome: Biome,
}

impl SimColumn {
    /// Grass plains at y=64.
    pub const fn flat() -> Self {
        Self {
            top_y: 64,
            ground: Block::GrassBlock,
            biome: Biome::Plains,
        }
    }
}

type TerrainFn = dyn Fn(&str, i32, i32) -> SimColumn + Send + Sync;

/// A recorded side effect.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Teleport { player: PlayerId, to: Location },
    GameMode { player: PlayerId, mode: GameMode },
    Vitals { player: PlayerId, reset: VitalsReset },
    Invulnerable { player: PlayerId, invulnerable: bool },
    ClearFallAndFire { player: PlayerId },
    TrackingItem { player: PlayerId },
    TrackingRoundEnded,
    TrackingTargetLost { player: PlayerId },
    WorldCreated { world: String, seed: i64 },
    WorldUnloaded { world: String, saved: bool },
    WorldSaved { world: String },
    SpawnSet { world: String, at: Location },
    Environment { world: String },
    SpectatorsGenerateChunks { world: String, enabled: bool },
    PregenStarted { world: String, radius: u32 },
    PregenCancelled { world: String },
}

/// How pre-generation jobs finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PregenMode {
    /// Progress and completion are sent as soon as the job starts.
    Instant,
    /// The job stays open until [`SimHost::complete_pregeneration`].
    Manual,
}

struct SimPlayer {
    location: Location,
    respawn: Option<Location>,
    game_mode: Option<GameMode>,
    invulnerable: bool,
}

struct SimWorld {
    dimension: Dimension,
    seed: i64,
    spawn: Location,
    spectators_generate_chunks: bool,
    environment: Option<RoundEnvironment>,
}

struct SimState {
    online: BTreeMap<PlayerId, SimPlayer>,
    names: HashMap<PlayerId, String>,
    worlds: HashMap<String, SimWorld>,
    events: Vec<SimEvent>,
    failing_teleports: HashSet<PlayerId>,
    fail_chunk_loads: bool,
    pregen_mode: PregenMode,
    pregen_jobs: HashMap<String, mpsc::UnboundedSender<PregenEvent>>,
    next_seed: i64,
}

/// An in-memory game server.
pub struct SimHost {
    container: PathBuf,
    state: Mutex<SimState>,
    terrain: Box<TerrainFn>,
}

impl SimHost {
    /// Creates a host whose world folders live under `container`.
    pub fn new(container: impl Into<PathBuf>) -> Self {
        Self {
            container: container.into(),
            state: Mutex::new(SimState {
                online: BTreeMap::new(),
                names: HashMap::new(),
                worlds: HashMap::new(),
                events: Vec::new(),
                failing_teleports: HashSet::new(),
                fail_chunk_loads: false,
                pregen_mode: PregenMode::Instant,
                pregen_jobs: HashMap::new(),
                next_seed: 1,
            }),
            terrain: Box::new(|_, _, _| SimColumn::flat()),
        }
    }

    /// Replaces the terrain generator. The closure receives
    /// `(world, x, z)`.
    pub fn with_terrain(
        mut self,
        terrain: impl Fn(&str, i32, i32) -> SimColumn + Send + Sync + 'static,
    ) -> Self {
        self.terrain = Box::new(terrain);
        self
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- players ------------------------------------------------------------

    /// Brings a player online at `at`.
    pub fn connect_at(&self, player: PlayerId, name: &str, at: Location) {
        let mut state = self.state();
        state.names.insert(player, name.to_string());
        state.online.insert(
            player,
            SimPlayer {
                location: at,
                respawn: None,
                game_mode: None,
                invulnerable: false,
            },
        );
    }

    /// Brings a player online in the `world` world.
    pub fn connect(&self, player: PlayerId, name: &str) {
        self.connect_at(player, name, Location::new("world", 0.5, 65.0, 0.5));
    }

    pub fn disconnect(&self, player: PlayerId) {
        self.state().online.remove(&player);
    }

    pub fn set_location(&self, player: PlayerId, at: Location) {
        if let Some(p) = self.state().online.get_mut(&player) {
            p.location = at;
        }
    }

    pub fn set_respawn_location(&self, player: PlayerId, at: Option<Location>) {
        if let Some(p) = self.state().online.get_mut(&player) {
            p.respawn = at;
        }
    }

    pub fn game_mode(&self, player: PlayerId) -> Option<GameMode> {
        self.state().online.get(&player).and_then(|p| p.game_mode)
    }

    pub fn is_invulnerable(&self, player: PlayerId) -> bool {
        self.state()
            .online
            .get(&player)
            .is_some_and(|p| p.invulnerable)
    }

    /// Makes every teleport of `player` fail.
    pub fn fail_teleports_for(&self, player: PlayerId) {
        self.state().failing_teleports.insert(player);
    }

    // -- worlds -------------------------------------------------------------

    pub fn set_fail_chunk_loads(&self, fail: bool) {
        self.state().fail_chunk_loads = fail;
    }

    pub fn set_pregen_mode(&self, mode: PregenMode) {
        self.state().pregen_mode = mode;
    }

    /// Finishes a manual pre-generation job. Returns `false` if no job was
    /// running for `world`.
    pub fn complete_pregeneration(&self, world: &str) -> bool {
        let Some(tx) = self.state().pregen_jobs.remove(world) else {
            return false;
        };
        let _ = tx.send(PregenEvent::Progress {
            world: world.to_string(),
            percent: 100,
        });
        let _ = tx.send(PregenEvent::Completed {
            world: world.to_string(),
        });
        true
    }

    /// Reports intermediate progress for a manual job.
    pub fn report_pregen_progress(&self, world: &str, percent: u8) {
        if let Some(tx) = self.state().pregen_jobs.get(world) {
            let _ = tx.send(PregenEvent::Progress {
                world: world.to_string(),
                percent,
            });
        }
    }

    pub fn pregeneration_running(&self, world: &str) -> bool {
        self.state().pregen_jobs.contains_key(world)
    }

    /// Seed of a loaded world.
    pub fn world_seed(&self, world: &str) -> Option<i64> {
        self.state().worlds.get(world).map(|w| w.seed)
    }

    pub fn loaded_worlds(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state().worlds.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn environment(&self, world: &str) -> Option<RoundEnvironment> {
        self.state()
            .worlds
            .get(world)
            .and_then(|w| w.environment.clone())
    }

    pub fn spectators_generate_chunks(&self, world: &str) -> Option<bool> {
        self.state()
            .worlds
            .get(world)
            .map(|w| w.spectators_generate_chunks)
    }

    // -- effect log ---------------------------------------------------------

    pub fn events(&self) -> Vec<SimEvent> {
        self.state().events.clone()
    }

    pub fn take_events(&self) -> Vec<SimEvent> {
        std::mem::take(&mut self.state().events)
    }

    /// Every teleport destination of `player`, oldest first.
    pub fn teleports_of(&self, player: PlayerId) -> Vec<Location> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                SimEvent::Teleport { player: p, to } if *p == player => Some(to.clone()),
                _ => None,
            })
            .collect()
    }

    fn column(&self, world: &str, x: i32, z: i32) -> SimColumn {
        (self.terrain)(world, x, z)
    }
}

fn read_seed(dir: &Path) -> Option<i64> {
    std::fs::read_to_string(dir.join(SEED_FILE))
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

fn io_rejected(error: std::io::Error) -> HostError {
    HostError::Rejected(error.to_string())
}

impl PlayerHost for SimHost {
    fn online_players(&self) -> Vec<PlayerId> {
        self.state().online.keys().copied().collect()
    }

    fn is_online(&self, player: PlayerId) -> bool {
        self.state().online.contains_key(&player)
    }

    fn player_name(&self, player: PlayerId) -> Option<String> {
        self.state().names.get(&player).cloned()
    }

    fn location(&self, player: PlayerId) -> Option<Location> {
        self.state().online.get(&player).map(|p| p.location.clone())
    }

    fn respawn_location(&self, player: PlayerId) -> Option<Location> {
        self.state().online.get(&player).and_then(|p| p.respawn.clone())
    }

    fn teleport(&self, player: PlayerId, to: &Location) -> Result<(), HostError> {
        let mut state = self.state();
        if state.failing_teleports.contains(&player) {
            return Err(HostError::Rejected(format!("teleport of {player} refused")));
        }
        if !state.worlds.contains_key(&to.world) {
            return Err(HostError::WorldNotLoaded(to.world.clone()));
        }
        let p = state
            .online
            .get_mut(&player)
            .ok_or(HostError::PlayerOffline(player))?;
        p.location = to.clone();
        state.events.push(SimEvent::Teleport {
            player,
            to: to.clone(),
        });
        Ok(())
    }

    fn set_game_mode(&self, player: PlayerId, mode: GameMode) -> Result<(), HostError> {
        let mut state = self.state();
        let p = state
            .online
            .get_mut(&player)
            .ok_or(HostError::PlayerOffline(player))?;
        p.game_mode = Some(mode);
        state.events.push(SimEvent::GameMode { player, mode });
        Ok(())
    }

    fn reset_vitals(&self, player: PlayerId, reset: VitalsReset) -> Result<(), HostError> {
        let mut state = self.state();
        if !state.online.contains_key(&player) {
            return Err(HostError::PlayerOffline(player));
        }
        state.events.push(SimEvent::Vitals { player, reset });
        Ok(())
    }

    fn set_invulnerable(&self, player: PlayerId, invulnerable: bool) -> Result<(), HostError> {
        let mut state = self.state();
        let p = state
            .online
            .get_mut(&player)
            .ok_or(HostError::PlayerOffline(player))?;
        p.invulnerable = invulnerable;
        state.events.push(SimEvent::Invulnerable {
            player,
            invulnerable,
        });
        Ok(())
    }

    fn clear_fall_and_fire(&self, player: PlayerId) -> Result<(), HostError> {
        let mut state = self.state();
        if !state.online.contains_key(&player) {
            return Err(HostError::PlayerOffline(player));
        }
        state.events.push(SimEvent::ClearFallAndFire { player });
        Ok(())
    }

    fn give_tracking_item(&self, player: PlayerId) -> Result<(), HostError> {
        let mut state = self.state();
        if !state.online.contains_key(&player) {
            return Err(HostError::PlayerOffline(player));
        }
        state.events.push(SimEvent::TrackingItem { player });
        Ok(())
    }

    fn tracking_round_ended(&self) {
        self.state().events.push(SimEvent::TrackingRoundEnded);
    }

    fn tracking_target_lost(&self, player: PlayerId) {
        self.state()
            .events
            .push(SimEvent::TrackingTargetLost { player });
    }
}

impl WorldHost for SimHost {
    fn world_container(&self) -> PathBuf {
        self.container.clone()
    }

    fn is_loaded(&self, world: &str) -> bool {
        self.state().worlds.contains_key(world)
    }

    fn create_world(
        &self,
        world: &str,
        dimension: Dimension,
        seed: Option<i64>,
    ) -> Result<(), HostError> {
        let mut state = self.state();
        if state.worlds.contains_key(world) {
            return Ok(());
        }
        let dir = self.container.join(world);
        let seed = match read_seed(&dir) {
            Some(existing) => existing,
            None => {
                let seed = seed.unwrap_or_else(|| {
                    state.next_seed += 1;
                    state.next_seed
                });
                std::fs::create_dir_all(&dir).map_err(io_rejected)?;
                std::fs::write(dir.join(SEED_FILE), seed.to_string()).map_err(io_rejected)?;
                seed
            }
        };
        state.worlds.insert(
            world.to_string(),
            SimWorld {
                dimension,
                seed,
                spawn: Location::new(world, 0.5, 65.0, 0.5),
                spectators_generate_chunks: false,
                environment: None,
            },
        );
        state.events.push(SimEvent::WorldCreated {
            world: world.to_string(),
            seed,
        });
        Ok(())
    }

    fn unload_world(&self, world: &str, save: bool) -> Result<(), HostError> {
        let mut state = self.state();
        if state.worlds.remove(world).is_none() {
            return Err(HostError::WorldNotLoaded(world.to_string()));
        }
        if save {
            std::fs::write(self.container.join(world).join("level.dat"), b"saved")
                .map_err(io_rejected)?;
        }
        state.events.push(SimEvent::WorldUnloaded {
            world: world.to_string(),
            saved: save,
        });
        Ok(())
    }

    fn save_world(&self, world: &str) -> Result<(), HostError> {
        let mut state = self.state();
        if !state.worlds.contains_key(world) {
            return Err(HostError::WorldNotLoaded(world.to_string()));
        }
        std::fs::write(self.container.join(world).join("level.dat"), b"saved")
            .map_err(io_rejected)?;
        state.events.push(SimEvent::WorldSaved {
            world: world.to_string(),
        });
        Ok(())
    }

    fn spawn_location(&self, world: &str) -> Option<Location> {
        self.state().worlds.get(world).map(|w| w.spawn.clone())
    }

    fn set_spawn_location(&self, world: &str, at: &Location) -> Result<(), HostError> {
        let mut state = self.state();
        let w = state
            .worlds
            .get_mut(world)
            .ok_or_else(|| HostError::WorldNotLoaded(world.to_string()))?;
        w.spawn = at.clone();
        state.events.push(SimEvent::SpawnSet {
            world: world.to_string(),
            at: at.clone(),
        });
        Ok(())
    }

    fn apply_round_environment(
        &self,
        world: &str,
        environment: &RoundEnvironment,
    ) -> Result<(), HostError> {
        let mut state = self.state();
        let w = state
            .worlds
            .get_mut(world)
            .ok_or_else(|| HostError::WorldNotLoaded(world.to_string()))?;
        w.environment = Some(environment.clone());
        w.spectators_generate_chunks = environment.spectators_generate_chunks;
        state.events.push(SimEvent::Environment {
            world: world.to_string(),
        });
        Ok(())
    }

    fn set_spectators_generate_chunks(
        &self,
        world: &str,
        enabled: bool,
    ) -> Result<(), HostError> {
        let mut state = self.state();
        let w = state
            .worlds
            .get_mut(world)
            .ok_or_else(|| HostError::WorldNotLoaded(world.to_string()))?;
        w.spectators_generate_chunks = enabled;
        state.events.push(SimEvent::SpectatorsGenerateChunks {
            world: world.to_string(),
            enabled,
        });
        Ok(())
    }

    fn start_pregeneration(
        &self,
        world: &str,
        radius_blocks: u32,
        events: mpsc::UnboundedSender<PregenEvent>,
    ) -> Result<(), HostError> {
        let mut state = self.state();
        if !state.worlds.contains_key(world) {
            return Err(HostError::WorldNotLoaded(world.to_string()));
        }
        state.events.push(SimEvent::PregenStarted {
            world: world.to_string(),
            radius: radius_blocks,
        });
        match state.pregen_mode {
            PregenMode::Instant => {
                let _ = events.send(PregenEvent::Progress {
                    world: world.to_string(),
                    percent: 50,
                });
                let _ = events.send(PregenEvent::Progress {
                    world: world.to_string(),
                    percent: 100,
                });
                let _ = events.send(PregenEvent::Completed {
                    world: world.to_string(),
                });
            }
            PregenMode::Manual => {
                state.pregen_jobs.insert(world.to_string(), events);
            }
        }
        Ok(())
    }

    fn cancel_pregeneration(&self, world: &str) {
        let mut state = self.state();
        if state.pregen_jobs.remove(world).is_some() {
            state.events.push(SimEvent::PregenCancelled {
                world: world.to_string(),
            });
        }
    }
}

impl Terrain for SimHost {
    fn load_chunk(
        &self,
        world: &str,
        chunk_x: i32,
        chunk_z: i32,
    ) -> impl Future<Output = Result<(), HostError>> + Send {
        let state = self.state();
        let result = if state.fail_chunk_loads {
            Err(HostError::ChunkLoad {
                world: world.to_string(),
                x: chunk_x,
                z: chunk_z,
                reason: "simulated failure".to_string(),
            })
        } else if !state.worlds.contains_key(world) {
            Err(HostError::WorldNotLoaded(world.to_string()))
        } else {
            Ok(())
        };
        std::future::ready(result)
    }

    fn highest_block_y(&self, world: &str, x: i32, z: i32) -> Option<i32> {
        if !self.is_loaded(world) {
            return None;
        }
        Some(self.column(world, x, z).top_y)
    }

    fn block_at(&self, world: &str, pos: BlockPos) -> Block {
        let column = self.column(world, pos.x, pos.z);
        if pos.y == column.top_y {
            column.ground
        } else if pos.y < column.top_y {
            Block::Stone
        } else {
            Block::Air
        }
    }

    fn biome_at(&self, world: &str, pos: BlockPos) -> Biome {
        self.column(world, pos.x, pos.z).biome
    }

    fn dimension_info(&self, world: &str) -> Option<DimensionInfo> {
        let dimension = self.state().worlds.get(world)?.dimension;
        let (min_height, max_height) = match dimension {
            Dimension::Overworld => (-64, 320),
            Dimension::Nether | Dimension::End => (0, 256),
        };
        Some(DimensionInfo {
            dimension,
            min_height,
            max_height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> (tempfile::TempDir, SimHost) {
        let dir = tempfile::tempdir().unwrap();
        let host = SimHost::new(dir.path());
        (dir, host)
    }

    #[test]
    fn test_create_world_writes_seed_and_reloads_it() {
        let (dir, host) = host();
        host.create_world("w", Dimension::Overworld, Some(42)).unwrap();
        assert_eq!(host.world_seed("w"), Some(42));
        assert!(dir.path().join("w").join(SEED_FILE).exists());

        host.unload_world("w", true).unwrap();
        host.create_world("w", Dimension::Overworld, Some(7)).unwrap();
        assert_eq!(host.world_seed("w"), Some(42));
    }

    #[test]
    fn test_teleport_offline_player_fails() {
        let (_dir, host) = host();
        host.create_world("world", Dimension::Overworld, None).unwrap();
        let to = Location::new("world", 0.0, 65.0, 0.0);
        assert_eq!(
            host.teleport(PlayerId(1), &to),
            Err(HostError::PlayerOffline(PlayerId(1)))
        );
    }

    #[test]
    fn test_manual_pregeneration_completes_on_demand() {
        let (_dir, host) = host();
        host.set_pregen_mode(PregenMode::Manual);
        host.create_world("w", Dimension::Overworld, None).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        host.start_pregeneration("w", 100, tx).unwrap();
        assert!(rx.try_recv().is_err());

        assert!(host.complete_pregeneration("w"));
        assert!(matches!(rx.try_recv(), Ok(PregenEvent::Progress { percent: 100, .. })));
        assert!(matches!(rx.try_recv(), Ok(PregenEvent::Completed { .. })));
        assert!(!host.complete_pregeneration("w"));
    }

    #[test]
    fn test_flat_terrain_columns() {
        let (_dir, host) = host();
        host.create_world("w", Dimension::Overworld, None).unwrap();
        assert_eq!(host.highest_block_y("w", 5, 5), Some(64));
        assert_eq!(host.block_at("w", BlockPos::new(5, 64, 5)), Block::GrassBlock);
        assert_eq!(host.block_at("w", BlockPos::new(5, 65, 5)), Block::Air);
        assert_eq!(host.block_at("w", BlockPos::new(5, 10, 5)), Block::Stone);
    }
}
