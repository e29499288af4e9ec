//! Two-phase construction of a session.

use std::collections::VecDeque;
use std::sync::Arc;

use manhunt_protocol::{BatchReport, GameHost, Notifier};
use manhunt_roles::RoleRegistry;
use manhunt_spawn::SpawnPlacementEngine;
use manhunt_tick::TimerSet;
use manhunt_worlds::WorldLifecycle;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::actor::{Env, SessionActor};
use crate::session::Session;
use crate::{ManhuntError, SessionHandle, Settings, StatusSnapshot};

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Builder for a running session.
///
/// # Example
///
/// ```rust,ignore
/// let (notifier, notifications) = Notifier::channel();
/// let session = ManhuntBuilder::new(Arc::new(host), notifier)
///     .settings(Settings::load("manhunt.json")?)
///     .build()?;
/// session.start().await?;
/// ```
pub struct ManhuntBuilder<H> {
    host: Arc<H>,
    notifier: Notifier,
    settings: Settings,
    rng_seed: Option<u64>,
    channel_capacity: usize,
}

impl<H: GameHost> ManhuntBuilder<H> {
    pub fn new(host: Arc<H>, notifier: Notifier) -> Self {
        Self {
            host,
            notifier,
            settings: Settings::default(),
            rng_seed: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Seeds team balancing, weather, and spawn sampling.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Capacity of the session's command queue.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Loads the lobby and game worlds, then spawns the session task.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn build(self) -> Result<SessionHandle, ManhuntError> {
        let (actor, handle) = self.assemble()?;
        tokio::spawn(actor.run());
        info!("session task spawned");
        Ok(handle)
    }

    /// Everything `build` does short of spawning the task.
    pub(crate) fn assemble(self) -> Result<(SessionActor<H>, SessionHandle), ManhuntError> {
        let settings = self.settings.validated();
        let names = settings.world_names();

        // Phase one: every component, each behind its own type.
        let (loopback, commands) = mpsc::channel(self.channel_capacity);
        let roles = RoleRegistry::new(settings.disconnect_grace());
        let worlds = WorldLifecycle::new(
            names.clone(),
            settings.world.preload_radius_blocks,
            loopback.clone(),
        );
        let spawns = SpawnPlacementEngine::new(settings.scatter.clone());
        let rng = match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::random()),
        };
        let (status_tx, status_rx) = watch::channel(StatusSnapshot::default());

        worlds.ensure_worlds(self.host.as_ref())?;

        // Phase two: wire them into the one task that owns them.
        let actor = SessionActor {
            env: Env {
                host: self.host,
                notifier: self.notifier,
                names,
            },
            settings,
            session: Session::new(),
            roles,
            worlds,
            spawns,
            timers: TimerSet::new(),
            rng,
            commands,
            loopback: loopback.clone(),
            status: status_tx,
            drain: VecDeque::new(),
            drain_report: BatchReport::new(),
        };
        Ok((actor, SessionHandle::new(loopback, status_rx)))
    }
}
