//! The map pipeline state machine.
//!
//! ```text
//!            prepare_next()                  pre-generation done
//!   Idle ────────────────────→ Preparing ──────────────────────────→ Ready
//!    ↑                          │ (any step fails)                    │
//!    └──────────────────────────┘                                     │
//!    ↑                                          promote_when_ready()  │
//!    └────────────(folders swapped or swap failed)──── Resetting ←────┘
//! ```
//!
//! All state lives in [`WorldLifecycle`], owned by the session task. Every
//! slow step (deleting and moving folders, waiting for chunk generation)
//! runs in a background task that reports back with a [`WorldEvent`]
//! through the session task's own command channel; the session task hands
//! the event to [`WorldLifecycle::handle`].

use std::fmt;
use std::time::Duration;

use manhunt_protocol::{Dimension, PregenEvent, WorldHost, WorldNames};
use manhunt_tick::{TickPolicy, Ticks, TimerSet, TimerToken};
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{WorldError, delete_world_folders, swap_world_folders};

/// How often a pending promotion re-checks readiness.
pub const PROMOTION_POLL: Duration = Ticks(40).as_duration();

/// A continuation delivered back to the session task.
#[derive(Debug)]
pub enum WorldEvent {
    /// The stale staging folders of cycle `cycle` were removed. `seed` is
    /// the seed chosen for the new staging worlds.
    StagingCleared {
        cycle: u64,
        seed: Option<i64>,
        result: Result<(), WorldError>,
    },
    /// Pre-generation progress for cycle `cycle`.
    Pregen { cycle: u64, event: PregenEvent },
    /// The pre-generation job of cycle `cycle` stopped before completing.
    PregenAborted { cycle: u64 },
    /// The folder swap of a promotion finished.
    FoldersSwapped { result: Result<(), WorldError> },
    /// Periodic readiness check while a promotion waits.
    PromotionPoll { token: TimerToken },
}

/// What a handled event means for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldOutcome {
    /// The staging map is now the active map.
    Promoted,
    /// Promotion failed; the previous map stays active.
    PromotionFailed,
    /// A pending promotion gave up because preparation failed.
    PromotionAbandoned,
}

/// Result of asking for a promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionStart {
    /// Staging was ready; the swap is running.
    Started,
    /// Staging is still generating; readiness is polled.
    Waiting,
    /// A promotion is already running. Nothing was done.
    AlreadyResetting,
    /// Nothing is prepared or preparing.
    NothingPrepared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum WorldTimer {
    PromotionPoll,
}

/// Gate and progress values, for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorldStatus {
    pub preparing: bool,
    pub ready: bool,
    pub resetting: bool,
    pub progress: u8,
}

/// Owns the active/staging map pair and the two pipeline gates.
///
/// `M` is the session task's command type; events are sent to it as
/// `M::from(WorldEvent)`.
pub struct WorldLifecycle<M> {
    names: WorldNames,
    preload_radius: u32,
    preparing: bool,
    ready: bool,
    resetting: bool,
    progress: u8,
    /// Incremented by every `prepare_next`, so late events from an earlier
    /// cycle are recognized and dropped.
    cycle: u64,
    events: mpsc::Sender<M>,
    timers: TimerSet<WorldTimer>,
}

impl<M> fmt::Debug for WorldLifecycle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldLifecycle")
            .field("active", &self.names.active.overworld)
            .field("preparing", &self.preparing)
            .field("ready", &self.ready)
            .field("resetting", &self.resetting)
            .field("progress", &self.progress)
            .finish()
    }
}

impl<M> WorldLifecycle<M>
where
    M: From<WorldEvent> + Send + 'static,
{
    pub fn new(names: WorldNames, preload_radius: u32, events: mpsc::Sender<M>) -> Self {
        Self {
            names,
            preload_radius,
            preparing: false,
            ready: false,
            resetting: false,
            progress: 0,
            cycle: 0,
            events,
            timers: TimerSet::new(),
        }
    }

    pub fn names(&self) -> &WorldNames {
        &self.names
    }

    pub fn is_preparing(&self) -> bool {
        self.preparing
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_resetting(&self) -> bool {
        self.resetting
    }

    /// Pre-generation progress of the staging map, 0–100.
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// True while either gate is closed: a new round must not start.
    pub fn is_busy(&self) -> bool {
        self.preparing || self.resetting
    }

    pub fn status(&self) -> WorldStatus {
        WorldStatus {
            preparing: self.preparing,
            ready: self.ready,
            resetting: self.resetting,
            progress: self.progress,
        }
    }

    /// Loads (creating if needed) the lobby world and the active triple.
    ///
    /// Every world is attempted; the first failure is returned.
    pub fn ensure_worlds<H: WorldHost>(&self, host: &H) -> Result<(), WorldError> {
        let mut first_error = None;
        let lobby = std::iter::once((Dimension::Overworld, self.names.lobby.as_str()));
        for (dimension, world) in lobby.chain(self.names.active.iter()) {
            if let Err(e) = ensure_world(host, world, dimension) {
                warn!(world, error = %e, "could not load world");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Preparation
    // -----------------------------------------------------------------------

    /// Starts generating a fresh staging map. Returns `false` (and does
    /// nothing) if a preparation or promotion is already in flight.
    ///
    /// With `random_seed`, all three dimensions share one fresh random
    /// seed; otherwise the host chooses.
    pub fn prepare_next<H: WorldHost>(&mut self, host: &H, random_seed: bool) -> bool {
        if self.preparing {
            debug!("next map already preparing");
            return false;
        }
        if self.resetting {
            debug!("promotion in progress, not preparing");
            return false;
        }
        self.preparing = true;
        self.ready = false;
        self.progress = 0;
        self.cycle += 1;
        let cycle = self.cycle;
        info!(cycle, staging = %self.names.staging.overworld, "preparing next map");

        for (_, world) in self.names.staging.iter() {
            unload_if_loaded(host, world, false);
        }

        let seed = random_seed.then(|| rand::rng().random::<i64>());
        let container = host.world_container();
        let staging: Vec<String> = self
            .names
            .staging
            .iter()
            .map(|(_, world)| world.to_string())
            .collect();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = delete_world_folders(&container, &staging).await;
            let _ = events
                .send(M::from(WorldEvent::StagingCleared { cycle, seed, result }))
                .await;
        });
        true
    }

    fn on_staging_cleared<H: WorldHost>(
        &mut self,
        host: &H,
        seed: Option<i64>,
        result: Result<(), WorldError>,
    ) {
        if let Err(e) = result {
            error!(error = %e, "could not clear staging folders");
            self.abandon_preparation();
            return;
        }

        let staging = self.names.staging.clone();
        for (dimension, world) in staging.iter() {
            if let Err(source) = host.create_world(world, dimension, seed) {
                let e = WorldError::Host {
                    world: world.to_string(),
                    source,
                };
                error!(error = %e, "could not create staging world");
                self.abandon_preparation();
                return;
            }
            info!(world, ?seed, "staging world created");
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let overworld = self.names.staging.overworld.clone();
        if let Err(source) = host.start_pregeneration(&overworld, self.preload_radius, tx) {
            let e = WorldError::Host {
                world: overworld,
                source,
            };
            error!(error = %e, "could not start pre-generation");
            self.abandon_preparation();
            return;
        }
        info!(world = %overworld, radius = self.preload_radius, "pre-generation started");

        // Forwards host progress into the session channel until the host
        // drops its sender. A job that ends without completing is reported
        // as aborted.
        let cycle = self.cycle;
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut completed = false;
            while let Some(event) = rx.recv().await {
                completed |= matches!(event, PregenEvent::Completed { .. });
                if events
                    .send(M::from(WorldEvent::Pregen { cycle, event }))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            if !completed {
                let _ = events
                    .send(M::from(WorldEvent::PregenAborted { cycle }))
                    .await;
            }
        });
    }

    fn on_pregen<H: WorldHost>(&mut self, host: &H, event: PregenEvent) {
        match event {
            PregenEvent::Progress { world, percent } => {
                let percent = percent.min(100);
                if percent > self.progress {
                    self.progress = percent;
                    debug!(world = %world, percent, "pre-generation progress");
                }
            }
            PregenEvent::Completed { world } => {
                info!(world = %world, "pre-generation complete, saving staging map");
                for (_, staging) in self.names.staging.iter() {
                    unload_if_loaded(host, staging, true);
                }
                self.progress = 100;
                self.preparing = false;
                self.ready = true;
                info!(staging = %self.names.staging.overworld, "next map ready");
            }
        }
    }

    fn abandon_preparation(&mut self) {
        self.preparing = false;
        self.ready = false;
        warn!(cycle = self.cycle, "next map preparation abandoned");
    }

    // -----------------------------------------------------------------------
    // Promotion
    // -----------------------------------------------------------------------

    /// Swaps the staging map in as soon as it is ready.
    pub fn promote_when_ready<H: WorldHost>(&mut self, host: &H) -> PromotionStart {
        if self.resetting {
            debug!("promotion already running");
            return PromotionStart::AlreadyResetting;
        }
        if self.ready {
            self.promote(host);
            return PromotionStart::Started;
        }
        if !self.preparing {
            warn!("promotion requested but no map is prepared");
            return PromotionStart::NothingPrepared;
        }
        let events = self.events.clone();
        self.timers.repeat(
            WorldTimer::PromotionPoll,
            PROMOTION_POLL,
            TickPolicy::Skip,
            events,
            |token| M::from(WorldEvent::PromotionPoll { token }),
        );
        info!(progress = self.progress, "waiting for next map before promotion");
        PromotionStart::Waiting
    }

    fn on_promotion_poll<H: WorldHost>(
        &mut self,
        host: &H,
        token: TimerToken,
    ) -> Option<WorldOutcome> {
        if !self.timers.is_current(WorldTimer::PromotionPoll, token) {
            return None;
        }
        if self.resetting {
            self.timers.cancel(WorldTimer::PromotionPoll);
            debug!("promotion started elsewhere, poll stopped");
            return None;
        }
        if self.ready {
            self.timers.cancel(WorldTimer::PromotionPoll);
            self.promote(host);
            return None;
        }
        if !self.preparing {
            self.timers.cancel(WorldTimer::PromotionPoll);
            warn!("next map preparation failed while waiting to promote");
            return Some(WorldOutcome::PromotionAbandoned);
        }
        None
    }

    fn promote<H: WorldHost>(&mut self, host: &H) {
        self.resetting = true;
        self.timers.cancel(WorldTimer::PromotionPoll);
        info!(
            active = %self.names.active.overworld,
            staging = %self.names.staging.overworld,
            "promoting next map"
        );

        host.cancel_pregeneration(&self.names.staging.overworld);
        for (_, world) in self.names.active.iter() {
            unload_if_loaded(host, world, false);
        }
        for (_, world) in self.names.staging.iter() {
            unload_if_loaded(host, world, true);
        }

        let container = host.world_container();
        let active = self.names.active.clone();
        let staging = self.names.staging.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = swap_world_folders(&container, &active, &staging).await;
            let _ = events
                .send(M::from(WorldEvent::FoldersSwapped { result }))
                .await;
        });
    }

    fn on_folders_swapped<H: WorldHost>(
        &mut self,
        host: &H,
        result: Result<(), WorldError>,
    ) -> Option<WorldOutcome> {
        if !self.resetting {
            debug!("folder swap finished without a promotion, ignored");
            return None;
        }
        self.resetting = false;
        self.preparing = false;
        self.ready = false;

        let outcome = match result {
            Ok(()) => {
                self.progress = 100;
                info!(active = %self.names.active.overworld, "next map promoted");
                WorldOutcome::Promoted
            }
            Err(e) => {
                error!(error = %e, "map promotion failed, keeping previous map");
                WorldOutcome::PromotionFailed
            }
        };
        for (dimension, world) in self.names.active.iter() {
            if let Err(e) = ensure_world(host, world, dimension) {
                warn!(world, error = %e, "could not reload active world");
            }
        }
        Some(outcome)
    }

    // -----------------------------------------------------------------------
    // Event dispatch
    // -----------------------------------------------------------------------

    /// Applies a continuation on the session task.
    pub fn handle<H: WorldHost>(&mut self, host: &H, event: WorldEvent) -> Option<WorldOutcome> {
        match event {
            WorldEvent::StagingCleared {
                cycle,
                seed,
                result,
            } => {
                if self.is_current_cycle(cycle) {
                    self.on_staging_cleared(host, seed, result);
                }
                None
            }
            WorldEvent::Pregen { cycle, event } => {
                if self.is_current_cycle(cycle) {
                    self.on_pregen(host, event);
                }
                None
            }
            WorldEvent::PregenAborted { cycle } => {
                if self.is_current_cycle(cycle) {
                    warn!(
                        cycle,
                        staging = %self.names.staging.overworld,
                        "pre-generation stopped early"
                    );
                    for (_, world) in self.names.staging.iter() {
                        unload_if_loaded(host, world, false);
                    }
                    self.abandon_preparation();
                }
                None
            }
            WorldEvent::PromotionPoll { token } => self.on_promotion_poll(host, token),
            WorldEvent::FoldersSwapped { result } => self.on_folders_swapped(host, result),
        }
    }

    fn is_current_cycle(&self, cycle: u64) -> bool {
        let current = cycle == self.cycle && self.preparing;
        if !current {
            debug!(cycle, current = self.cycle, "stale preparation event ignored");
        }
        current
    }
}

fn ensure_world<H: WorldHost>(host: &H, world: &str, dimension: Dimension) -> Result<(), WorldError> {
    if host.is_loaded(world) {
        return Ok(());
    }
    host.create_world(world, dimension, None)
        .map_err(|source| WorldError::Host {
            world: world.to_string(),
            source,
        })?;
    info!(world, %dimension, "world loaded");
    Ok(())
}

fn unload_if_loaded<H: WorldHost>(host: &H, world: &str, save: bool) {
    if !host.is_loaded(world) {
        return;
    }
    match host.unload_world(world, save) {
        Ok(()) => info!(world, save, "world unloaded"),
        Err(e) => warn!(world, error = %e, "could not unload world"),
    }
}
