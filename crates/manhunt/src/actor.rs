//! The session task: sole owner and writer of the round state.
//!
//! Every phase transition, role change, and player-visible side effect
//! happens here, one command at a time. Work that has to wait (spawn
//! search, folder I/O, chunk generation, timers) runs in its own task and
//! comes back as a [`Command`] continuation.
//!
//! ```text
//!  LOBBY ──start──→ COUNTDOWN ──0 / force──→ (spawn plan) ──→ RUNNING
//!    ↑                  │                                        │
//!    │           eligibility lost                         team empty,
//!    │                  ↓                                 dragon, try_end
//!    ├────────────── LOBBY                                       ↓
//!    └──promotion done── postgame ←── drain ←─────────────── ENDED
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use manhunt_protocol::{
    BatchReport, Dimension, Effect, GameHost, Location, Notifier, Phase, PlayerId, Role,
    RoundEnvironment, TemplateArg, WeatherReset, WinReason, WorldNames,
};
use manhunt_roles::{
    Elimination, FollowUp, RoleChange, RoleContext, RoleError, RoleFlags, RoleRegistry,
};
use manhunt_spawn::{SpawnPlacementEngine, SpawnPlan};
use manhunt_tick::{TickPolicy, Ticks, TimerSet, TimerToken};
use manhunt_worlds::{PromotionStart, WorldEvent, WorldLifecycle, WorldOutcome};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::command::{Command, PlayerEvent, SessionTimer};
use crate::session::Session;
use crate::{PlayerStatus, SessionError, Settings, StatusSnapshot};

const SECOND: Duration = Ticks::from_secs(1).as_duration();
const RULES_DELAY: Duration = Duration::from_secs(10);
const AUTO_START_DELAY: Duration = Duration::from_secs(2);
const LATE_JOIN_INVULNERABILITY: Duration = Duration::from_secs(10);
/// Blocks around a teammate a late runner may land.
const LATE_JOIN_RADIUS: i32 = 12;
const BORDER_SIZE: f64 = 11_520.0;
/// Where spectators watch a dragon kill from.
const END_SPECTATE: (f64, f64, f64) = (0.5, 70.0, 0.5);

// ---------------------------------------------------------------------------
// Env
// ---------------------------------------------------------------------------

/// The collaborators role operations go through.
pub(crate) struct Env<H> {
    pub(crate) host: Arc<H>,
    pub(crate) notifier: Notifier,
    pub(crate) names: WorldNames,
}

impl<H> Env<H> {
    fn ctx(&self, phase: Phase) -> RoleContext<'_, H> {
        RoleContext {
            phase,
            host: &*self.host,
            notifier: &self.notifier,
            worlds: &self.names,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionActor
// ---------------------------------------------------------------------------

pub(crate) struct SessionActor<H> {
    pub(crate) env: Env<H>,
    pub(crate) settings: Settings,
    pub(crate) session: Session,
    pub(crate) roles: RoleRegistry,
    pub(crate) worlds: WorldLifecycle<Command>,
    pub(crate) spawns: SpawnPlacementEngine,
    pub(crate) timers: TimerSet<SessionTimer>,
    pub(crate) rng: StdRng,
    pub(crate) commands: mpsc::Receiver<Command>,
    /// Sender into our own queue, for timers and background tasks.
    pub(crate) loopback: mpsc::Sender<Command>,
    pub(crate) status: watch::Sender<StatusSnapshot>,
    /// Players still to be moved by the running drain.
    pub(crate) drain: VecDeque<PlayerId>,
    pub(crate) drain_report: BatchReport,
}

impl<H: GameHost> SessionActor<H> {
    /// Runs until [`Command::Shutdown`].
    pub(crate) async fn run(mut self) {
        info!(lobby = %self.env.names.lobby, game = %self.env.names.active.overworld, "session started");
        self.publish();
        while let Some(cmd) = self.commands.recv().await {
            if !self.handle(cmd) {
                break;
            }
            self.publish();
        }
        self.timers.cancel_all();
        info!("session stopped");
    }

    fn handle(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Start { reply } => {
                let _ = reply.send(self.start());
            }
            Command::ForceBegin { reply } => {
                let _ = reply.send(self.force_begin());
            }
            Command::TryEnd {
                reason,
                location,
                reply,
            } => {
                let _ = reply.send(self.try_end(reason, location));
            }
            Command::LockRoles { locked, reply } => {
                self.session.roles_locked = locked;
                self.session.locked_on_begin = false;
                info!(locked, "roles lock changed");
                let _ = reply.send(());
            }
            Command::ExtendCountdown { secs, reply } => {
                let _ = reply.send(self.extend_countdown(secs));
            }
            Command::SetRole {
                player,
                role,
                flags,
                reply,
            } => {
                let change = self.set_role(player, role, flags);
                let applied = change.applied;
                self.follow_up(change);
                if self.session.phase().is_pregame() {
                    self.roster_changed();
                }
                let _ = reply.send(applied);
            }
            Command::SuspendPlayer {
                player,
                name,
                reply,
            } => {
                let _ = reply.send(self.roles.suspend(player, name));
            }
            Command::TryResumePlayer { player, reply } => {
                let _ = reply.send(self.roles.try_resume(player).map_err(SessionError::from));
            }
            Command::PickBalancedRole { reply } => {
                let _ = reply.send(self.roles.pick_balanced_role(&mut self.rng));
            }
            Command::Join {
                player,
                role,
                reply,
            } => {
                let _ = reply.send(self.join(player, role));
            }
            Command::PlayerInfo { player, reply } => {
                let _ = reply.send(PlayerStatus {
                    role: self.roles.role(player),
                    participant: self.roles.is_participant(player),
                    suspended: self.roles.is_suspended(player),
                    grace_remaining: self.roles.grace_remaining(player),
                });
            }
            Command::Event { event, reply } => {
                self.on_player_event(event);
                let _ = reply.send(());
            }
            Command::Shutdown => return false,
            Command::World(event) => self.on_world_event(event),
            Command::SpawnsPlanned { round, plan } => self.on_spawns_planned(round, plan),
            Command::LateJoinSpot {
                round,
                player,
                spot,
            } => self.on_late_join_spot(round, player, spot),
            Command::Timer { timer, token } => self.on_timer(timer, token),
        }
        true
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn enter(&mut self, phase: Phase) -> bool {
        let moved = self.session.transition(phase);
        if moved {
            self.env.notifier.round_state_changed(phase);
        }
        moved
    }

    fn set_role(&mut self, player: PlayerId, role: Role, flags: RoleFlags) -> RoleChange {
        let phase = self.session.phase();
        self.roles.set_role(self.env.ctx(phase), player, role, flags)
    }

    fn online(&self) -> Vec<PlayerId> {
        self.env.host.online_players()
    }

    fn name_of(&self, player: PlayerId) -> String {
        self.env
            .host
            .player_name(player)
            .unwrap_or_else(|| player.to_string())
    }

    fn arm_repeat(&mut self, timer: SessionTimer, period: Duration, policy: TickPolicy) {
        self.timers.repeat(timer, period, policy, self.loopback.clone(), move |token| {
            Command::Timer { timer, token }
        });
    }

    fn arm_later(&mut self, timer: SessionTimer, delay: Duration) {
        self.timers
            .later(timer, delay, self.loopback.clone(), move |token| Command::Timer {
                timer,
                token,
            });
    }

    fn note_report(&self, stage: &'static str, report: &BatchReport) {
        if report.is_clean() {
            debug!(stage, attempted = report.attempted, "side effects applied");
        } else {
            warn!(
                stage,
                attempted = report.attempted,
                failed = ?report.failed_players(),
                "some side effects failed"
            );
        }
    }

    fn publish(&self) {
        let world = self.worlds.status();
        let runners = self.roles.runner_count();
        let hunters = self.roles.hunter_count();
        let snapshot = StatusSnapshot {
            phase: self.session.phase(),
            roles_locked: self.session.roles_locked,
            online: self.online().len(),
            participants: runners + hunters,
            runners,
            hunters,
            spectators: self.roles.spectator_count(),
            resetting: world.resetting,
            next_preparing: world.preparing,
            next_ready: world.ready,
            next_progress: world.progress,
            countdown_remaining: self.session.countdown_remaining,
        };
        self.status.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    // -----------------------------------------------------------------------
    // Eligibility and auto-start
    // -----------------------------------------------------------------------

    /// No blocking map work, enough players online, and both teams staffed.
    fn eligible_with(&self, online: usize) -> bool {
        !self.worlds_block_start() && online >= self.settings.min_players && self.teams_staffed()
    }

    /// A promotion always blocks; background preparation only does when
    /// `block_start_while_resetting` is set.
    fn worlds_block_start(&self) -> bool {
        self.worlds.is_resetting()
            || (self.settings.block_start_while_resetting && self.worlds.is_preparing())
    }

    fn teams_staffed(&self) -> bool {
        self.roles.runner_count() > 0 && self.roles.hunter_count() > 0
    }

    fn can_start_now(&self) -> bool {
        self.eligible_with(self.online().len())
    }

    fn roster_changed(&mut self) {
        let online = self.online().len();
        self.roster_changed_with(online);
    }

    fn roster_changed_with(&mut self, online: usize) {
        match self.session.phase() {
            Phase::Lobby => self.evaluate_auto_start(online),
            Phase::Countdown if !self.session.begin_pending && !self.eligible_with(online) => {
                self.cancel_countdown();
            }
            _ => {}
        }
    }

    /// Starts the countdown once per crossing of the eligibility threshold.
    fn evaluate_auto_start(&mut self, online: usize) {
        if !self.eligible_with(online) {
            if !self.session.armed {
                debug!(online, "auto-start re-armed");
            }
            self.session.armed = true;
            return;
        }
        if !self.settings.auto_start || !self.session.armed {
            return;
        }
        self.session.armed = false;
        self.env.notifier.broadcast(
            "auto.threshold",
            vec![TemplateArg::from(self.settings.countdown_secs)],
        );
        if let Err(error) = self.start() {
            debug!(%error, "auto-start refused");
        }
    }

    // -----------------------------------------------------------------------
    // Countdown
    // -----------------------------------------------------------------------

    fn start(&mut self) -> Result<(), SessionError> {
        let phase = self.session.phase();
        if phase != Phase::Lobby {
            return Err(SessionError::NotInLobby(phase));
        }
        if self.worlds_block_start() {
            return Err(SessionError::WorldsBusy);
        }
        if !self.can_start_now() {
            return Err(SessionError::NotEligible);
        }

        self.enter(Phase::Countdown);
        let secs = self.settings.countdown_secs;
        self.session.countdown_remaining = secs;
        self.env
            .notifier
            .broadcast("game.starting", vec![TemplateArg::from(secs)]);
        self.arm_repeat(SessionTimer::Countdown, SECOND, TickPolicy::Delay);
        info!(secs, "countdown started");
        Ok(())
    }

    fn on_countdown_tick(&mut self) {
        if self.session.phase() != Phase::Countdown || self.session.begin_pending {
            self.timers.cancel(SessionTimer::Countdown);
            return;
        }
        if !self.can_start_now() {
            self.cancel_countdown();
            return;
        }
        let left = self.session.countdown_remaining;
        if left == 0 {
            self.begin_round(false);
            return;
        }
        if is_milestone(left) {
            self.env
                .notifier
                .broadcast("game.countdown.countdown", vec![TemplateArg::from(left)]);
        }
        self.session.countdown_remaining = left - 1;
        trace!(left, "countdown tick");
    }

    fn cancel_countdown(&mut self) {
        self.timers.cancel(SessionTimer::Countdown);
        self.session.countdown_remaining = 0;
        self.session.armed = true;
        if self.enter(Phase::Lobby) {
            self.env.notifier.broadcast("game.countdown.cancelled", vec![]);
            info!("countdown cancelled");
        }
    }

    fn extend_countdown(&mut self, secs: u32) -> Result<u32, SessionError> {
        let phase = self.session.phase();
        if phase != Phase::Countdown || self.session.begin_pending {
            return Err(SessionError::NotInCountdown(phase));
        }
        let total = self.session.countdown_remaining.saturating_add(secs);
        self.session.countdown_remaining = total;
        self.env.notifier.broadcast(
            "game.countdown.extended",
            vec![TemplateArg::from(secs), TemplateArg::from(total)],
        );
        info!(secs, total, "countdown extended");
        Ok(total)
    }

    // -----------------------------------------------------------------------
    // Round begin
    // -----------------------------------------------------------------------

    fn force_begin(&mut self) -> Result<(), SessionError> {
        let phase = self.session.phase();
        if !phase.is_pregame() {
            return Err(SessionError::NotPregame(phase));
        }
        if self.session.begin_pending {
            debug!("force begin while spawn placement runs, ignoring");
            return Ok(());
        }
        self.begin_round(true);
        Ok(())
    }

    /// Everything before spawn placement. The phase flips to RUNNING in
    /// [`on_spawns_planned`](Self::on_spawns_planned).
    fn begin_round(&mut self, forced: bool) {
        self.timers.cancel(SessionTimer::Countdown);
        if self.session.phase() == Phase::Lobby {
            self.enter(Phase::Countdown);
        }
        self.session.countdown_remaining = 0;
        self.session.forced = forced;
        self.session.begin_pending = true;
        self.session.round += 1;
        if self.settings.auto_lock_roles_on_start && !self.session.roles_locked {
            self.session.roles_locked = true;
            self.session.locked_on_begin = true;
        }

        self.reset_environment();

        let mut report = BatchReport::new();
        for player in self.online() {
            let role = self.roles.role(player);
            report.merge(self.set_role(player, role, RoleFlags::default()).report);
        }
        self.note_report("reconcile", &report);

        self.env
            .notifier
            .broadcast("game.starting", vec![TemplateArg::from(0u32)]);
        self.spawn_plan_task();
        info!(round = self.session.round, forced, "round beginning");
    }

    fn reset_environment(&mut self) {
        let weather = WeatherReset {
            time_of_day: 0,
            clear_weather_ticks: 12_000 + self.rng.random_range(0..168_000),
            thunder_ticks: 120_000 + self.rng.random_range(0..156_000),
        };
        for (dimension, world) in self.env.names.active.iter() {
            let environment = RoundEnvironment {
                weather: (dimension == Dimension::Overworld).then(|| weather.clone()),
                locator_bar: false,
                spectators_generate_chunks: false,
                border_center: (0.0, 0.0),
                border_size: BORDER_SIZE,
            };
            if let Err(error) = self.env.host.apply_round_environment(world, &environment) {
                warn!(world, %error, "could not reset round environment");
            }
        }
    }

    fn spawn_plan_task(&mut self) {
        let overworld = &self.env.names.active.overworld;
        let spawn = self.env.host.spawn_location(overworld).unwrap_or_else(|| {
            warn!(world = %overworld, "active world has no spawn, using origin");
            Location::new(overworld.clone(), 0.5, 64.0, 0.5)
        });
        let online = self.online();
        let on_team = |players: Vec<PlayerId>| -> Vec<PlayerId> {
            players.into_iter().filter(|p| online.contains(p)).collect()
        };
        let runners = on_team(self.roles.runners());
        let hunters = on_team(self.roles.hunters());

        let host = Arc::clone(&self.env.host);
        let engine = self.spawns.clone();
        let events = self.loopback.clone();
        let round = self.session.round;
        let mut rng = StdRng::seed_from_u64(self.rng.random());
        tokio::spawn(async move {
            let plan = engine
                .plan(host.as_ref(), &spawn, &runners, &hunters, &mut rng)
                .await;
            let _ = events.send(Command::SpawnsPlanned { round, plan }).await;
        });
    }

    fn on_spawns_planned(&mut self, round: u64, plan: SpawnPlan) {
        if round != self.session.round
            || !self.session.begin_pending
            || self.session.phase() != Phase::Countdown
        {
            debug!(round, "stale spawn plan discarded");
            return;
        }
        self.session.begin_pending = false;
        if !self.teams_staffed() {
            self.abort_begin();
            return;
        }

        let mut report = self.spawns.apply(self.env.host.as_ref(), &plan);
        self.enter(Phase::Running);
        self.session.round_started_at = Some(Instant::now());
        self.arm_repeat(SessionTimer::TimeoutSweep, SECOND, TickPolicy::Skip);

        for player in self.online() {
            let ctx = self.env.ctx(Phase::Running);
            report.merge(self.roles.apply_start_attributes(ctx, player));
            self.roles.remember_location(ctx, player);
        }
        self.note_report("round start", &report);

        let key = if self.session.forced {
            "forcestart.begun"
        } else {
            "game.begun"
        };
        self.env.notifier.broadcast(key, vec![]);
        self.arm_later(SessionTimer::RulesAnnouncement, RULES_DELAY);
        self.prepare_next_if_idle();
        info!(
            round,
            runners = plan.runners.len(),
            hunters = plan.hunters.len(),
            "round running"
        );
    }

    /// Falls back to LOBBY when a team emptied while spawns were being
    /// placed.
    fn abort_begin(&mut self) {
        warn!(
            round = self.session.round,
            runners = self.roles.runner_count(),
            hunters = self.roles.hunter_count(),
            "team emptied during spawn placement, round not started"
        );
        if self.session.locked_on_begin {
            self.session.roles_locked = false;
            self.session.locked_on_begin = false;
        }
        self.session.forced = false;
        self.cancel_countdown();
    }

    // -----------------------------------------------------------------------
    // Round end
    // -----------------------------------------------------------------------

    /// Ends the round unless it is already ending. Returns whether this
    /// call did it.
    fn try_end(&mut self, reason: WinReason, location: Option<Location>) -> bool {
        if self.session.ending {
            debug!(?reason, "round already ending");
            return false;
        }
        let phase = self.session.phase();
        if !matches!(phase, Phase::Running | Phase::Countdown) {
            debug!(?reason, ?phase, "no round to end");
            return false;
        }
        self.session.ending = true;
        self.end(reason, location);
        true
    }

    fn end(&mut self, reason: WinReason, location: Option<Location>) {
        self.timers.cancel(SessionTimer::Countdown);
        self.timers.cancel(SessionTimer::TimeoutSweep);
        self.timers.cancel(SessionTimer::RulesAnnouncement);
        self.session.begin_pending = false;
        self.env.host.tracking_round_ended();
        self.enter(Phase::Ended);

        for (_, world) in self.env.names.active.iter() {
            if let Err(error) = self.env.host.set_spectators_generate_chunks(world, true) {
                warn!(world, %error, "could not restore spectator chunk generation");
            }
        }

        let spectate = self.final_spectate_location(reason, location);
        info!(?reason, spectate = ?spectate, "round ended");
        self.roles.set_end_spectate(spectate);

        if let Some(key) = reason.outcome_key() {
            self.env.notifier.broadcast(key, vec![]);
        }
        self.env.notifier.broadcast("game.ended", vec![]);

        self.start_drain(SessionTimer::EndDrain);
    }

    fn final_spectate_location(&self, reason: WinReason, location: Option<Location>) -> Option<Location> {
        match (reason, location) {
            (WinReason::DragonKilled, _) => {
                let (x, y, z) = END_SPECTATE;
                Some(Location::new(self.env.names.active.end.clone(), x, y, z))
            }
            (WinReason::HuntersWin, Some(at)) => Some(at),
            _ => self.env.host.spawn_location(&self.env.names.active.overworld),
        }
    }

    fn start_drain(&mut self, timer: SessionTimer) {
        self.drain = self.online().into();
        self.drain_report = BatchReport::new();
        self.arm_repeat(timer, Ticks::ONE.as_duration(), TickPolicy::Delay);
    }

    /// Moves the next batch of drained players. Returns `true` once the
    /// queue is empty.
    fn drain_batch(&mut self, stage: &'static str, target: impl Fn(Role) -> Role) -> bool {
        for _ in 0..self.settings.drain_batch_size {
            let Some(player) = self.drain.pop_front() else {
                break;
            };
            if !self.env.host.is_online(player) {
                continue;
            }
            let role = target(self.roles.role(player));
            let change = self.set_role(player, role, RoleFlags::default());
            self.drain_report.merge(change.report);
        }
        if !self.drain.is_empty() {
            return false;
        }
        let report = std::mem::take(&mut self.drain_report);
        self.note_report(stage, &report);
        true
    }

    fn on_end_drain_tick(&mut self) {
        let done = self.drain_batch("end drain", |role| {
            if role.is_participant() || role == Role::Spectator {
                Role::Spectator
            } else {
                Role::Lobby
            }
        });
        if done {
            self.timers.cancel(SessionTimer::EndDrain);
            self.begin_postgame();
        }
    }

    // -----------------------------------------------------------------------
    // Postgame
    // -----------------------------------------------------------------------

    fn begin_postgame(&mut self) {
        let delay = self.settings.postgame_send_back_delay_secs;
        self.env
            .notifier
            .broadcast("game.post.reset.schedule", vec![TemplateArg::from(delay)]);
        self.prepare_next_if_idle();
        self.arm_later(SessionTimer::PostgameDelay, self.settings.postgame_delay());
        info!(delay_secs = delay, "postgame started");
    }

    fn prepare_next_if_idle(&mut self) {
        if self.worlds.is_busy() || self.worlds.is_ready() {
            return;
        }
        let random_seed = self.settings.random_seed_each_round;
        self.worlds.prepare_next(self.env.host.as_ref(), random_seed);
    }

    fn on_postgame_drain_tick(&mut self) {
        if self.drain_batch("postgame drain", |_| Role::Lobby) {
            self.timers.cancel(SessionTimer::PostgameDrain);
            self.promote();
        }
    }

    fn promote(&mut self) {
        self.prepare_next_if_idle();
        match self.worlds.promote_when_ready(self.env.host.as_ref()) {
            PromotionStart::Started => debug!("promotion started"),
            PromotionStart::Waiting => info!("waiting for the next map to finish generating"),
            PromotionStart::AlreadyResetting => debug!("promotion already running"),
            PromotionStart::NothingPrepared => {
                warn!("no map prepared, keeping the current one");
                self.finish_reset();
            }
        }
    }

    fn on_world_event(&mut self, event: WorldEvent) {
        let Some(outcome) = self.worlds.handle(self.env.host.as_ref(), event) else {
            return;
        };
        match outcome {
            WorldOutcome::Promoted => info!("next map promoted"),
            WorldOutcome::PromotionFailed => warn!("promotion failed, keeping the current map"),
            WorldOutcome::PromotionAbandoned => {
                warn!("next map was never ready, keeping the current one")
            }
        }
        if self.session.phase() == Phase::Ended {
            self.finish_reset();
        }
    }

    /// Back to LOBBY with a clean slate.
    fn finish_reset(&mut self) {
        self.timers.cancel_all();
        self.session.reset_round();
        self.enter(Phase::Lobby);
        self.env.notifier.broadcast("game.reset.done", vec![]);
        self.roles.reset_round_state();

        let mut report = BatchReport::new();
        for player in self.online() {
            let role = if self.settings.auto_assign_on_join {
                self.roles.pick_balanced_role(&mut self.rng)
            } else {
                Role::Lobby
            };
            report.merge(self.set_role(player, role, RoleFlags::default()).report);
        }
        self.note_report("reset", &report);
        self.arm_later(SessionTimer::AutoStart, AUTO_START_DELAY);
        info!("session back in lobby");
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    fn on_timer(&mut self, timer: SessionTimer, token: TimerToken) {
        let current = if timer.is_one_shot() {
            self.timers.finish(timer, token)
        } else {
            self.timers.is_current(timer, token)
        };
        if !current {
            trace!(?timer, %token, "stale timer ignored");
            return;
        }
        match timer {
            SessionTimer::Countdown => self.on_countdown_tick(),
            SessionTimer::TimeoutSweep => self.on_timeout_sweep(),
            SessionTimer::RulesAnnouncement => {
                if self.session.phase() == Phase::Running {
                    self.env.notifier.broadcast("rules.announce", vec![]);
                }
            }
            SessionTimer::EndDrain => self.on_end_drain_tick(),
            SessionTimer::PostgameDelay => self.start_drain(SessionTimer::PostgameDrain),
            SessionTimer::PostgameDrain => self.on_postgame_drain_tick(),
            SessionTimer::AutoStart => self.roster_changed(),
            SessionTimer::Invulnerability(player) => {
                if let Err(error) = self.env.host.set_invulnerable(player, false) {
                    debug!(%player, %error, "could not end invulnerability");
                }
            }
        }
    }

    fn on_timeout_sweep(&mut self) {
        if self.session.phase() != Phase::Running {
            self.timers.cancel(SessionTimer::TimeoutSweep);
            return;
        }
        for player in self.online() {
            self.roles
                .remember_location(self.env.ctx(Phase::Running), player);
        }
        let sweep = self.roles.check_timeouts(self.env.ctx(Phase::Running));
        if sweep.evicted.is_empty() {
            return;
        }
        info!(evicted = ?sweep.evicted, "disconnected players timed out");
        self.note_report("timeout sweep", &sweep.report);
        if let Some(end) = sweep.end {
            self.try_end(end.reason, end.location);
        }
    }

    // -----------------------------------------------------------------------
    // Player lifecycle
    // -----------------------------------------------------------------------

    fn on_player_event(&mut self, event: PlayerEvent) {
        debug!(?event, phase = ?self.session.phase(), "player event");
        match event {
            PlayerEvent::Joined(player) => self.on_join(player),
            PlayerEvent::Quit(player) => self.on_quit(player),
            PlayerEvent::Died(player) => self.on_death(player),
            PlayerEvent::Respawned(player) => self.on_respawn(player),
            PlayerEvent::DragonKilled => {
                if self.session.phase() == Phase::Running {
                    self.try_end(WinReason::DragonKilled, None);
                }
            }
            PlayerEvent::EnderEyeFollowed { player, at } => {
                if self.session.phase() == Phase::Running && self.roles.role(player) == Role::Runner {
                    self.env.notifier.broadcast(
                        "runner.stronghold",
                        vec![
                            TemplateArg::from(self.name_of(player)),
                            TemplateArg::from(at.x),
                            TemplateArg::from(at.y),
                            TemplateArg::from(at.z),
                        ],
                    );
                }
            }
            PlayerEvent::RosterChanged => self.roster_changed(),
        }
    }

    fn on_join(&mut self, player: PlayerId) {
        match self.session.phase() {
            Phase::Running => self.rejoin_running(player),
            Phase::Ended => {
                let role = self.roles.role(player);
                let target = if role.is_participant() || role == Role::Spectator {
                    Role::Spectator
                } else {
                    Role::Lobby
                };
                let change = self.set_role(player, target, RoleFlags::default());
                self.note_report("join", &change.report);
            }
            Phase::Lobby | Phase::Countdown => {
                let current = self.roles.role(player);
                let role = if self.settings.auto_assign_on_join
                    && current == Role::Lobby
                    && !self.session.roles_locked
                {
                    let role = self.roles.pick_balanced_role(&mut self.rng);
                    self.env.notifier.direct(
                        player,
                        "autoassign.assigned",
                        vec![TemplateArg::from(role.to_string())],
                    );
                    role
                } else {
                    current
                };
                let change = self.set_role(player, role, RoleFlags::default());
                self.note_report("join", &change.report);
                self.roster_changed();
            }
        }
    }

    fn rejoin_running(&mut self, player: PlayerId) {
        match self.roles.try_resume(player) {
            Ok(left) => {
                let role = self.roles.role(player);
                let change = self.set_role(player, role, RoleFlags::rejoining());
                self.follow_up(change);
                self.env.notifier.direct(
                    player,
                    "game.rejoin.grace",
                    vec![TemplateArg::from(left.as_secs())],
                );
            }
            Err(error) => {
                debug!(%player, %error, "rejoining as spectator");
                let role = self.roles.role(player);
                if role.is_participant() {
                    let elimination =
                        self.roles
                            .eliminate(self.env.ctx(Phase::Running), player, role);
                    self.finish_elimination(elimination);
                } else {
                    let change = self.set_role(player, Role::Spectator, RoleFlags::default());
                    self.note_report("rejoin", &change.report);
                }
                self.env
                    .notifier
                    .direct(player, "spec.rejoin.spectator", vec![]);
                if let RoleError::GraceExpired(_) = error {
                    info!(%player, "participant came back after the grace deadline");
                }
            }
        }
    }

    fn on_quit(&mut self, player: PlayerId) {
        match self.session.phase() {
            Phase::Running => {
                self.roles
                    .remember_location(self.env.ctx(Phase::Running), player);
                let role = self.roles.role(player);
                if !role.is_participant() {
                    return;
                }
                let name = self.name_of(player);
                let grace = self.roles.suspend(player, name.clone());
                let key = if role == Role::Runner {
                    "spec.quit.runner"
                } else {
                    "spec.quit.hunter"
                };
                self.env.notifier.broadcast(
                    key,
                    vec![TemplateArg::from(name), TemplateArg::from(grace.as_secs())],
                );
            }
            Phase::Ended => {}
            Phase::Lobby | Phase::Countdown => {
                self.roles.clear_player(player);
                let online = self.online().into_iter().filter(|p| *p != player).count();
                self.roster_changed_with(online);
            }
        }
    }

    fn on_death(&mut self, player: PlayerId) {
        if self.session.phase() != Phase::Running || self.roles.role(player) != Role::Runner {
            return;
        }
        let elimination = self
            .roles
            .eliminate(self.env.ctx(Phase::Running), player, Role::Runner);
        self.finish_elimination(elimination);
    }

    fn on_respawn(&mut self, player: PlayerId) {
        let phase = self.session.phase();
        let role = self.roles.role(player);
        match (phase, role) {
            (Phase::Running, Role::Hunter) => {
                let change = self.set_role(player, Role::Hunter, RoleFlags::respawn());
                self.note_report("respawn", &change.report);
                self.env.notifier.direct(player, "respawn.hunter.ok", vec![]);
            }
            (Phase::Running, Role::Runner) => {
                let elimination = self
                    .roles
                    .eliminate(self.env.ctx(Phase::Running), player, Role::Runner);
                self.finish_elimination(elimination);
                self.env
                    .notifier
                    .direct(player, "respawn.runner.spectator", vec![]);
            }
            (Phase::Running | Phase::Ended, Role::Spectator) => {
                let change = self.set_role(player, Role::Spectator, RoleFlags::respawn());
                self.note_report("respawn", &change.report);
                if phase == Phase::Running {
                    self.env
                        .notifier
                        .direct(player, "respawn.runner.spectator", vec![]);
                }
            }
            _ => {}
        }
    }

    fn finish_elimination(&mut self, elimination: Elimination) {
        self.note_report("elimination", &elimination.report);
        if let Some(end) = elimination.end {
            self.try_end(end.reason, end.location);
        }
    }

    // -----------------------------------------------------------------------
    // Join requests and late joins
    // -----------------------------------------------------------------------

    fn join(&mut self, player: PlayerId, requested: Option<Role>) -> Result<Role, SessionError> {
        let phase = self.session.phase();
        if requested == Some(Role::Spectator) {
            let change = self.set_role(player, Role::Spectator, RoleFlags::default());
            self.note_report("join", &change.report);
            self.env.notifier.direct(
                player,
                "cmd.join.ok",
                vec![TemplateArg::from(Role::Spectator.to_string())],
            );
            if phase.is_pregame() {
                self.roster_changed();
            }
            return Ok(Role::Spectator);
        }
        if self.session.roles_locked {
            self.env.notifier.direct(player, "cmd.join.locked", vec![]);
            return Err(SessionError::RolesLocked);
        }
        match phase {
            Phase::Running => {
                if requested == Some(Role::Lobby) {
                    return Err(SessionError::NotPregame(phase));
                }
                let window = self.settings.late_join_window();
                let open = self
                    .session
                    .round_started_at
                    .is_some_and(|at| at.elapsed() <= window);
                if !open {
                    return Err(SessionError::LateJoinClosed);
                }
            }
            Phase::Ended => return Err(SessionError::LateJoinClosed),
            Phase::Lobby | Phase::Countdown => {}
        }

        let role = match requested {
            Some(role) => role,
            None => self.roles.pick_balanced_role(&mut self.rng),
        };
        let change = self.set_role(player, role, RoleFlags::default());
        self.follow_up(change);
        self.env.notifier.direct(
            player,
            "cmd.join.ok",
            vec![TemplateArg::from(role.to_string())],
        );
        if phase.is_pregame() {
            self.roster_changed();
        }
        info!(%player, %role, ?phase, "player joined a team");
        Ok(role)
    }

    fn follow_up(&mut self, change: RoleChange) {
        self.note_report("role change", &change.report);
        match change.follow_up {
            Some(FollowUp::LateJoinDrop { player }) => self.late_join_drop(player),
            None => {}
        }
    }

    /// Searches a spot next to a random teammate in the background.
    fn late_join_drop(&mut self, player: PlayerId) {
        let host = self.env.host.as_ref();
        let mates: Vec<Location> = self
            .roles
            .runners()
            .into_iter()
            .filter(|p| *p != player)
            .filter_map(|p| host.location(p))
            .filter(|at| self.env.names.active.contains(&at.world))
            .collect();
        let center = if mates.is_empty() {
            host.spawn_location(&self.env.names.active.overworld)
        } else {
            Some(mates[self.rng.random_range(0..mates.len())].clone())
        };
        let Some(center) = center else {
            warn!(%player, "nowhere to drop late runner");
            return;
        };

        let host = Arc::clone(&self.env.host);
        let engine = self.spawns.clone();
        let events = self.loopback.clone();
        let round = self.session.round;
        let mut rng = StdRng::seed_from_u64(self.rng.random());
        tokio::spawn(async move {
            let spot = engine
                .find_safe_spot_near(host.as_ref(), &center, LATE_JOIN_RADIUS, &mut rng)
                .await
                .unwrap_or(center);
            let _ = events
                .send(Command::LateJoinSpot {
                    round,
                    player,
                    spot,
                })
                .await;
        });
    }

    fn on_late_join_spot(&mut self, round: u64, player: PlayerId, spot: Location) {
        if round != self.session.round
            || self.session.phase() != Phase::Running
            || self.roles.role(player) != Role::Runner
            || !self.env.host.is_online(player)
        {
            debug!(%player, "late join drop no longer needed");
            return;
        }
        let host = self.env.host.as_ref();
        let mut report = BatchReport::new();
        report.record(Effect::Teleport.check(player, host.teleport(player, &spot)));
        report.record(Effect::Invulnerability.check(player, host.set_invulnerable(player, true)));
        self.note_report("late join drop", &report);
        self.arm_later(SessionTimer::Invulnerability(player), LATE_JOIN_INVULNERABILITY);
        info!(%player, at = %spot, "late runner dropped next to a teammate");
    }
}

/// 60 and 30 seconds, then every second from 10.
fn is_milestone(left: u32) -> bool {
    matches!(left, 60 | 30 | 1..=10)
}
