//! The role registry: who plays on which team, who is temporarily offline,
//! and who has been eliminated.
//!
//! # Grace periods
//!
//! A runner or hunter who disconnects during a running round is not
//! eliminated right away. [`RoleRegistry::suspend`] gives them a deadline of
//! `now + remaining budget`; reconnecting before the deadline debits the
//! time spent offline from the budget, and the periodic
//! [`RoleRegistry::check_timeouts`] sweep eliminates everyone whose
//! deadline passed.
//!
//! ```text
//!  participant ──quit──→ suspended ──rejoin before deadline──→ participant
//!                            │                                (budget − offline time)
//!                            └──deadline passed + sweep──→ spectator
//! ```
//!
//! # Concurrency note
//!
//! Like the rest of the session state, the registry uses plain `HashMap`s
//! and is owned by the single session task. All time is read through
//! `tokio::time::Instant` so paused-clock tests control it.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use manhunt_protocol::{
    BatchReport, Effect, GameMode, Location, Phase, PlayerHost, PlayerId, Role, TemplateArg,
    VitalsReset, WinReason, WorldHost,
};
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    Elimination, EndRequest, FollowUp, RoleChange, RoleContext, RoleError, RoleFlags, TimeoutSweep,
};

/// An outstanding disconnect.
#[derive(Debug, Clone, Copy)]
struct Suspension {
    since: Instant,
    deadline: Instant,
}

/// Per-player role, grace, and location bookkeeping for one round.
#[derive(Debug)]
pub struct RoleRegistry {
    roles: HashMap<PlayerId, Role>,

    // Index sets. Always mirror `roles`; a `Lobby` player is in none.
    runners: HashSet<PlayerId>,
    hunters: HashSet<PlayerId>,
    spectators: HashSet<PlayerId>,

    /// Remaining offline allowance of players who have used some of it.
    grace: HashMap<PlayerId, Duration>,
    suspended: HashMap<PlayerId, Suspension>,
    /// Names of suspended players, for broadcasts after they left.
    offline_names: HashMap<PlayerId, String>,
    /// Last position in the active map, recorded during RUNNING/ENDED.
    last_locations: HashMap<PlayerId, Location>,
    end_spectate: Option<Location>,
    default_grace: Duration,
}

impl RoleRegistry {
    pub fn new(default_grace: Duration) -> Self {
        Self {
            roles: HashMap::new(),
            runners: HashSet::new(),
            hunters: HashSet::new(),
            spectators: HashSet::new(),
            grace: HashMap::new(),
            suspended: HashMap::new(),
            offline_names: HashMap::new(),
            last_locations: HashMap::new(),
            end_spectate: None,
            default_grace,
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The player's role; `Lobby` for unknown players.
    pub fn role(&self, player: PlayerId) -> Role {
        self.roles.get(&player).copied().unwrap_or_default()
    }

    pub fn is_participant(&self, player: PlayerId) -> bool {
        self.role(player).is_participant()
    }

    pub fn runner_count(&self) -> usize {
        self.runners.len()
    }

    pub fn hunter_count(&self) -> usize {
        self.hunters.len()
    }

    pub fn spectator_count(&self) -> usize {
        self.spectators.len()
    }

    /// Current runners, sorted by id.
    pub fn runners(&self) -> Vec<PlayerId> {
        sorted(&self.runners)
    }

    /// Current hunters, sorted by id.
    pub fn hunters(&self) -> Vec<PlayerId> {
        sorted(&self.hunters)
    }

    pub fn is_suspended(&self, player: PlayerId) -> bool {
        self.suspended.contains_key(&player)
    }

    pub fn suspended_count(&self) -> usize {
        self.suspended.len()
    }

    /// Offline time the player may still use. While suspended this is the
    /// time left until the deadline.
    pub fn grace_remaining(&self, player: PlayerId) -> Duration {
        match self.suspended.get(&player) {
            Some(s) => s.deadline.saturating_duration_since(Instant::now()),
            None => self.budget(player),
        }
    }

    pub fn last_location(&self, player: PlayerId) -> Option<&Location> {
        self.last_locations.get(&player)
    }

    pub fn end_spectate(&self) -> Option<&Location> {
        self.end_spectate.as_ref()
    }

    fn budget(&self, player: PlayerId) -> Duration {
        self.grace
            .get(&player)
            .copied()
            .unwrap_or(self.default_grace)
    }

    // -----------------------------------------------------------------------
    // Role assignment
    // -----------------------------------------------------------------------

    /// Assigns `role` to `player` and applies the side effects that role
    /// has in the current phase.
    ///
    /// An unchanged role is still re-applied on first assignment, during
    /// RUNNING for runners, hunters, and spectators, and during ENDED for
    /// spectators and lobby players, because the side effects differ by
    /// phase. Otherwise the call is a no-op and `applied` is `false`.
    ///
    /// Side effects only run for online players; the index sets and the
    /// role-changed notification are updated either way.
    pub fn set_role<H>(
        &mut self,
        ctx: RoleContext<'_, H>,
        player: PlayerId,
        role: Role,
        flags: RoleFlags,
    ) -> RoleChange
    where
        H: PlayerHost + WorldHost,
    {
        let old = self.role(player);
        let first_assignment = !self.roles.contains_key(&player);

        if matches!(role, Role::Spectator | Role::Lobby) {
            self.suspended.remove(&player);
            self.offline_names.remove(&player);
        }

        let must_reapply = first_assignment
            || (ctx.phase == Phase::Running
                && matches!(role, Role::Hunter | Role::Runner | Role::Spectator))
            || (ctx.phase == Phase::Ended && matches!(role, Role::Spectator | Role::Lobby));

        if old == role && !must_reapply {
            return RoleChange {
                player,
                old,
                new: role,
                applied: false,
                report: BatchReport::new(),
                follow_up: None,
            };
        }

        let mut report = BatchReport::new();
        let follow_up = if ctx.host.is_online(player) {
            self.apply_role_effects(ctx, player, old, role, flags, &mut report)
        } else {
            None
        };

        self.index(player, role);
        ctx.notifier.role_changed(player, old, role, flags.update_display);
        info!(%player, %old, new = %role, phase = ?ctx.phase, "role set");

        RoleChange {
            player,
            old,
            new: role,
            applied: true,
            report,
            follow_up,
        }
    }

    fn apply_role_effects<H>(
        &mut self,
        ctx: RoleContext<'_, H>,
        player: PlayerId,
        old: Role,
        role: Role,
        flags: RoleFlags,
        report: &mut BatchReport,
    ) -> Option<FollowUp>
    where
        H: PlayerHost + WorldHost,
    {
        let host = ctx.host;
        let running = ctx.phase == Phase::Running;
        match role {
            Role::Hunter if running => {
                let fresh = !flags.is_rejoining
                    && !flags.is_respawn
                    && !self.last_locations.contains_key(&player);
                if fresh {
                    let name = self.display_name(host, player);
                    ctx.notifier
                        .broadcast("game.broadcast.late_join_hunter", vec![name.into()]);
                }
                let target = if flags.is_respawn {
                    self.respawn_location(ctx, player)
                } else {
                    self.resume_location(ctx, player)
                };
                if let Some(target) = target {
                    report.record(Effect::Teleport.check(player, host.teleport(player, &target)));
                }
                report.record(
                    Effect::GameMode.check(player, host.set_game_mode(player, GameMode::Survival)),
                );
                if !flags.is_rejoining {
                    let reset = if flags.is_respawn {
                        VitalsReset::Respawn
                    } else {
                        VitalsReset::Full
                    };
                    report.record(Effect::Vitals.check(player, host.reset_vitals(player, reset)));
                }
                report.record(
                    Effect::TrackingItem.check(player, host.give_tracking_item(player)),
                );
                None
            }
            Role::Runner if running => {
                let fresh = !flags.is_rejoining
                    && !self.last_locations.contains_key(&player)
                    && old != Role::Runner;
                let follow_up = if fresh {
                    let name = self.display_name(host, player);
                    ctx.notifier
                        .broadcast("game.broadcast.late_join_runner", vec![name.into()]);
                    Some(FollowUp::LateJoinDrop { player })
                } else {
                    if let Some(target) = self.resume_location(ctx, player) {
                        report.record(
                            Effect::Teleport.check(player, host.teleport(player, &target)),
                        );
                    }
                    None
                };
                report.record(
                    Effect::GameMode.check(player, host.set_game_mode(player, GameMode::Survival)),
                );
                if !flags.is_rejoining {
                    report.record(
                        Effect::Vitals.check(player, host.reset_vitals(player, VitalsReset::Full)),
                    );
                }
                follow_up
            }
            Role::Spectator if ctx.phase.is_in_round() => {
                report.record(
                    Effect::GameMode.check(player, host.set_game_mode(player, GameMode::Spectator)),
                );
                let target = match &self.end_spectate {
                    Some(loc) => Some(loc.clone()),
                    None => {
                        let in_game_world = host
                            .location(player)
                            .is_some_and(|loc| ctx.worlds.active.contains(&loc.world));
                        if in_game_world {
                            None
                        } else {
                            self.resume_location(ctx, player)
                        }
                    }
                };
                if let Some(target) = target {
                    report.record(Effect::Teleport.check(player, host.teleport(player, &target)));
                }
                host.tracking_target_lost(player);
                None
            }
            _ => {
                send_to_lobby(ctx, player, report);
                None
            }
        }
    }

    fn index(&mut self, player: PlayerId, role: Role) {
        self.runners.remove(&player);
        self.hunters.remove(&player);
        self.spectators.remove(&player);
        match role {
            Role::Runner => self.runners.insert(player),
            Role::Hunter => self.hunters.insert(player),
            Role::Spectator => self.spectators.insert(player),
            Role::Lobby => false,
        };
        self.roles.insert(player, role);
    }

    /// Where a participant goes back to: their last position if that world
    /// is still loaded, else the game spawn, else wherever they are now.
    fn resume_location<H>(&self, ctx: RoleContext<'_, H>, player: PlayerId) -> Option<Location>
    where
        H: PlayerHost + WorldHost,
    {
        if let Some(last) = self.last_locations.get(&player) {
            if ctx.host.is_loaded(&last.world) {
                return Some(last.clone());
            }
        }
        ctx.host
            .spawn_location(&ctx.worlds.active.overworld)
            .or_else(|| ctx.host.location(player))
    }

    /// The player's bed or anchor if it is in the game map, else the game
    /// spawn.
    fn respawn_location<H>(&self, ctx: RoleContext<'_, H>, player: PlayerId) -> Option<Location>
    where
        H: PlayerHost + WorldHost,
    {
        ctx.host
            .respawn_location(player)
            .filter(|loc| ctx.worlds.active.contains(&loc.world))
            .or_else(|| ctx.host.spawn_location(&ctx.worlds.active.overworld))
    }

    fn display_name<H: PlayerHost>(&self, host: &H, player: PlayerId) -> String {
        host.player_name(player)
            .or_else(|| self.offline_names.get(&player).cloned())
            .unwrap_or_else(|| player.to_string())
    }

    /// A balanced team for a new player: whichever of runners and hunters
    /// has fewer members, with ties broken at random.
    pub fn pick_balanced_role<R: Rng>(&self, rng: &mut R) -> Role {
        let runners = self.runners.len();
        let hunters = self.hunters.len();
        if runners < hunters {
            Role::Runner
        } else if hunters < runners {
            Role::Hunter
        } else if rng.random_bool(0.5) {
            Role::Runner
        } else {
            Role::Hunter
        }
    }

    /// Game mode and equipment for the first moment of a round.
    pub fn apply_start_attributes<H>(&self, ctx: RoleContext<'_, H>, player: PlayerId) -> BatchReport
    where
        H: PlayerHost + WorldHost,
    {
        let host = ctx.host;
        let mut report = BatchReport::new();
        match self.role(player) {
            Role::Hunter => {
                report.record(
                    Effect::GameMode.check(player, host.set_game_mode(player, GameMode::Survival)),
                );
                report.record(
                    Effect::Vitals.check(player, host.reset_vitals(player, VitalsReset::Full)),
                );
                report.record(
                    Effect::TrackingItem.check(player, host.give_tracking_item(player)),
                );
            }
            Role::Runner => {
                report.record(
                    Effect::GameMode.check(player, host.set_game_mode(player, GameMode::Survival)),
                );
                report.record(
                    Effect::Vitals.check(player, host.reset_vitals(player, VitalsReset::Full)),
                );
            }
            Role::Spectator => {
                report.record(
                    Effect::GameMode.check(player, host.set_game_mode(player, GameMode::Spectator)),
                );
                if let Some(spawn) = host.spawn_location(&ctx.worlds.active.overworld) {
                    report.record(Effect::Teleport.check(player, host.teleport(player, &spawn)));
                }
            }
            Role::Lobby => {}
        }
        report
    }

    // -----------------------------------------------------------------------
    // Disconnect grace
    // -----------------------------------------------------------------------

    /// Starts the grace period of a participant who just disconnected.
    /// Returns the budget the deadline was computed from.
    pub fn suspend(&mut self, player: PlayerId, name: impl Into<String>) -> Duration {
        let budget = self.budget(player);
        let now = Instant::now();
        self.suspended.insert(
            player,
            Suspension {
                since: now,
                deadline: now + budget,
            },
        );
        self.offline_names.insert(player, name.into());
        info!(%player, grace_secs = budget.as_secs(), "participant suspended");
        budget
    }

    /// Ends the suspension of a reconnecting player, debiting the offline
    /// time from their budget. Returns the budget that is left.
    ///
    /// # Errors
    /// - [`RoleError::NotSuspended`]: no suspension exists.
    /// - [`RoleError::GraceExpired`]: the deadline already passed. The
    ///   suspension is kept for the sweep.
    pub fn try_resume(&mut self, player: PlayerId) -> Result<Duration, RoleError> {
        let suspension = self
            .suspended
            .get(&player)
            .copied()
            .ok_or(RoleError::NotSuspended(player))?;

        let now = Instant::now();
        if now >= suspension.deadline {
            debug!(%player, "resume after grace deadline");
            return Err(RoleError::GraceExpired(player));
        }

        let offline = now.saturating_duration_since(suspension.since);
        let remaining = self.budget(player).saturating_sub(offline);
        self.grace.insert(player, remaining);
        self.suspended.remove(&player);
        self.offline_names.remove(&player);
        info!(
            %player,
            offline_ms = offline.as_millis() as u64,
            grace_secs = remaining.as_secs(),
            "participant resumed"
        );
        Ok(remaining)
    }

    /// Eliminates every suspended player whose deadline has passed.
    pub fn check_timeouts<H>(&mut self, ctx: RoleContext<'_, H>) -> TimeoutSweep
    where
        H: PlayerHost + WorldHost,
    {
        let mut sweep = TimeoutSweep::default();
        if self.suspended.is_empty() {
            return sweep;
        }

        let now = Instant::now();
        let mut expired: Vec<PlayerId> = self
            .suspended
            .iter()
            .filter(|(_, s)| s.deadline <= now)
            .map(|(&player, _)| player)
            .collect();
        expired.sort();

        for player in expired {
            let role_before = self.role(player);
            self.grace.insert(player, Duration::ZERO);
            info!(%player, role = %role_before, "grace expired, eliminating");
            let elimination = self.eliminate(ctx, player, role_before);
            sweep.report.merge(elimination.report);
            if sweep.end.is_none() {
                sweep.end = elimination.end;
            }
            sweep.evicted.push(player);
        }
        sweep
    }

    // -----------------------------------------------------------------------
    // Elimination
    // -----------------------------------------------------------------------

    /// Moves a participant to SPECTATOR and reports whether their team is
    /// now empty.
    ///
    /// An online player goes through [`set_role`](Self::set_role); an
    /// offline one only has the bookkeeping updated.
    pub fn eliminate<H>(
        &mut self,
        ctx: RoleContext<'_, H>,
        player: PlayerId,
        role_before: Role,
    ) -> Elimination
    where
        H: PlayerHost + WorldHost,
    {
        let mut death_location = None;
        if role_before == Role::Runner {
            let name = self.display_name(ctx.host, player);
            ctx.notifier
                .broadcast("spec.runner.death", vec![TemplateArg::from(name)]);
            death_location = ctx
                .host
                .location(player)
                .or_else(|| self.last_locations.get(&player).cloned());
        }

        let report = if ctx.host.is_online(player) {
            self.set_role(ctx, player, Role::Spectator, RoleFlags::default())
                .report
        } else {
            let old = self.role(player);
            self.index(player, Role::Spectator);
            ctx.notifier.role_changed(player, old, Role::Spectator, true);
            BatchReport::new()
        };
        self.suspended.remove(&player);
        self.offline_names.remove(&player);

        let end = match role_before {
            Role::Runner if self.runners.is_empty() => Some(EndRequest {
                reason: WinReason::HuntersWin,
                location: death_location,
            }),
            Role::Hunter if self.hunters.is_empty() => Some(EndRequest {
                reason: WinReason::HuntersGone,
                location: None,
            }),
            _ => None,
        };
        info!(%player, role = %role_before, team_empty = end.is_some(), "participant eliminated");
        Elimination { report, end }
    }

    // -----------------------------------------------------------------------
    // Round bookkeeping
    // -----------------------------------------------------------------------

    /// Records where a participant is, for resuming later. Only positions
    /// in the active map during RUNNING or ENDED are kept.
    pub fn remember_location<H>(&mut self, ctx: RoleContext<'_, H>, player: PlayerId)
    where
        H: PlayerHost + WorldHost,
    {
        if !matches!(ctx.phase, Phase::Running | Phase::Ended) || !self.is_participant(player) {
            return;
        }
        match ctx.host.location(player) {
            Some(loc) if ctx.worlds.active.contains(&loc.world) => {
                self.last_locations.insert(player, loc);
            }
            Some(_) => {}
            None => warn!(%player, "no location to remember"),
        }
    }

    /// Where participants are sent when the round ends.
    pub fn set_end_spectate(&mut self, location: Option<Location>) {
        self.end_spectate = location;
    }

    /// Forgets one player entirely.
    pub fn clear_player(&mut self, player: PlayerId) {
        self.roles.remove(&player);
        self.runners.remove(&player);
        self.hunters.remove(&player);
        self.spectators.remove(&player);
        self.grace.remove(&player);
        self.suspended.remove(&player);
        self.offline_names.remove(&player);
        self.last_locations.remove(&player);
    }

    /// Forgets every role, budget, suspension, and location. Called when the
    /// session returns to LOBBY after a promotion.
    pub fn reset_round_state(&mut self) {
        self.roles.clear();
        self.runners.clear();
        self.hunters.clear();
        self.spectators.clear();
        self.grace.clear();
        self.suspended.clear();
        self.offline_names.clear();
        self.last_locations.clear();
        self.end_spectate = None;
        info!("round state reset");
    }
}

/// Lobby spawn, adventure mode, full vitals.
pub fn send_to_lobby<H>(ctx: RoleContext<'_, H>, player: PlayerId, report: &mut BatchReport)
where
    H: PlayerHost + WorldHost,
{
    let host = ctx.host;
    match host.spawn_location(&ctx.worlds.lobby) {
        Some(spawn) => report.record(Effect::Teleport.check(player, host.teleport(player, &spawn))),
        None => warn!(%player, lobby = %ctx.worlds.lobby, "lobby world has no spawn"),
    }
    report.record(Effect::GameMode.check(player, host.set_game_mode(player, GameMode::Adventure)));
    report.record(Effect::Vitals.check(player, host.reset_vitals(player, VitalsReset::Full)));
}

fn sorted(set: &HashSet<PlayerId>) -> Vec<PlayerId> {
    let mut players: Vec<PlayerId> = set.iter().copied().collect();
    players.sort();
    players
}
