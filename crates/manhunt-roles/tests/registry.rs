//! Role registry tests against the in-memory host.

use std::time::Duration;

use manhunt_protocol::{
    Dimension, GameMode, Location, Notification, Notifier, Phase, PlayerId, Role, SimEvent,
    SimHost, VitalsReset, WinReason, WorldHost, WorldNames,
};
use manhunt_roles::{FollowUp, RoleChange, RoleContext, RoleError, RoleFlags, RoleRegistry};
use tokio::sync::mpsc;

const GRACE: Duration = Duration::from_secs(90);

fn pid(n: u64) -> PlayerId {
    PlayerId(n)
}

/// The collaborators a registry call needs, kept apart from the registry
/// so both can be borrowed at once.
struct Env {
    _dir: tempfile::TempDir,
    host: SimHost,
    notifier: Notifier,
    worlds: WorldNames,
}

impl Env {
    fn ctx(&self, phase: Phase) -> RoleContext<'_, SimHost> {
        RoleContext {
            phase,
            host: &self.host,
            notifier: &self.notifier,
            worlds: &self.worlds,
        }
    }
}

struct Fixture {
    env: Env,
    notes: mpsc::UnboundedReceiver<Notification>,
    roles: RoleRegistry,
}

impl Fixture {
    fn new(players: u64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let host = SimHost::new(dir.path());
        let worlds = WorldNames::new("world", "minehunt_game");
        host.create_world(&worlds.lobby, Dimension::Overworld, Some(1)).unwrap();
        for (dimension, world) in worlds.active.iter() {
            host.create_world(world, dimension, Some(2)).unwrap();
        }
        for n in 1..=players {
            host.connect(pid(n), &format!("player{n}"));
        }
        let (notifier, notes) = Notifier::channel();
        Self {
            env: Env {
                _dir: dir,
                host,
                notifier,
                worlds,
            },
            notes,
            roles: RoleRegistry::new(GRACE),
        }
    }

    fn set(&mut self, phase: Phase, player: PlayerId, role: Role) -> RoleChange {
        self.set_with(phase, player, role, RoleFlags::default())
    }

    fn set_with(&mut self, phase: Phase, player: PlayerId, role: Role, flags: RoleFlags) -> RoleChange {
        self.roles.set_role(self.env.ctx(phase), player, role, flags)
    }

    fn broadcasts(&mut self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        while let Ok(note) = self.notes.try_recv() {
            if let Notification::Broadcast { key, .. } = note {
                keys.push(key);
            }
        }
        keys
    }

    fn in_game(&self, x: f64, z: f64) -> Location {
        Location::new(self.env.worlds.active.overworld.clone(), x, 70.0, z)
    }

    fn assert_sets_mirror_roles(&self, players: &[PlayerId]) {
        let (mut r, mut h, mut s) = (0, 0, 0);
        for &p in players {
            match self.roles.role(p) {
                Role::Runner => r += 1,
                Role::Hunter => h += 1,
                Role::Spectator => s += 1,
                Role::Lobby => {}
            }
        }
        assert_eq!(self.roles.runner_count(), r);
        assert_eq!(self.roles.hunter_count(), h);
        assert_eq!(self.roles.spectator_count(), s);
    }
}

// =========================================================================
// set_role()
// =========================================================================

#[test]
fn test_set_role_in_lobby_sends_player_to_lobby_spawn() {
    let mut fx = Fixture::new(1);
    let change = fx.set(Phase::Lobby, pid(1), Role::Runner);

    assert!(change.applied);
    assert!(change.report.is_clean());
    assert_eq!(fx.env.host.game_mode(pid(1)), Some(GameMode::Adventure));
    assert_eq!(fx.env.host.teleports_of(pid(1))[0].world, "world");
    assert_eq!(fx.roles.runner_count(), 1);
}

#[test]
fn test_set_role_unchanged_in_lobby_is_noop() {
    let mut fx = Fixture::new(1);
    fx.set(Phase::Lobby, pid(1), Role::Hunter);
    fx.env.host.take_events();

    let change = fx.set(Phase::Lobby, pid(1), Role::Hunter);
    assert!(!change.applied);
    assert!(fx.env.host.events().is_empty());
}

#[test]
fn test_set_role_unchanged_while_running_is_reapplied() {
    let mut fx = Fixture::new(1);
    fx.set(Phase::Lobby, pid(1), Role::Hunter);
    fx.env.host.take_events();

    let change = fx.set(Phase::Running, pid(1), Role::Hunter);
    assert!(change.applied);
    assert_eq!(fx.env.host.game_mode(pid(1)), Some(GameMode::Survival));
    assert!(fx
        .env
        .host
        .events()
        .contains(&SimEvent::TrackingItem { player: pid(1) }));
}

#[test]
fn test_set_role_fresh_hunter_mid_round_is_announced() {
    let mut fx = Fixture::new(1);
    fx.set(Phase::Running, pid(1), Role::Hunter);

    assert_eq!(fx.broadcasts(), vec!["game.broadcast.late_join_hunter"]);
    let spawn = fx.env.host.spawn_location(&fx.env.worlds.active.overworld).unwrap();
    assert_eq!(fx.env.host.teleports_of(pid(1)), vec![spawn]);
}

#[test]
fn test_set_role_fresh_runner_mid_round_requests_late_join_drop() {
    let mut fx = Fixture::new(1);
    let change = fx.set(Phase::Running, pid(1), Role::Runner);

    assert_eq!(change.follow_up, Some(FollowUp::LateJoinDrop { player: pid(1) }));
    assert_eq!(fx.broadcasts(), vec!["game.broadcast.late_join_runner"]);
    assert!(fx.env.host.teleports_of(pid(1)).is_empty());
    assert_eq!(fx.env.host.game_mode(pid(1)), Some(GameMode::Survival));
}

#[test]
fn test_set_role_rejoining_runner_resumes_at_last_location() {
    let mut fx = Fixture::new(1);
    fx.set(Phase::Lobby, pid(1), Role::Runner);
    let last = fx.in_game(40.5, -12.5);
    fx.env.host.set_location(pid(1), last.clone());
    fx.roles.remember_location(fx.env.ctx(Phase::Running), pid(1));
    fx.env.host.take_events();

    let change = fx.set_with(Phase::Running, pid(1), Role::Runner, RoleFlags::rejoining());

    assert_eq!(change.follow_up, None);
    assert_eq!(fx.env.host.teleports_of(pid(1)), vec![last]);
    assert!(!fx
        .env
        .host
        .events()
        .iter()
        .any(|e| matches!(e, SimEvent::Vitals { .. })));
}

#[test]
fn test_set_role_respawning_hunter_uses_bed_in_game_map() {
    let mut fx = Fixture::new(1);
    fx.set(Phase::Running, pid(1), Role::Hunter);
    let bed = fx.in_game(-80.5, 33.5);
    fx.env.host.set_respawn_location(pid(1), Some(bed.clone()));
    fx.env.host.take_events();

    fx.set_with(Phase::Running, pid(1), Role::Hunter, RoleFlags::respawn());

    assert_eq!(fx.env.host.teleports_of(pid(1)), vec![bed]);
    assert!(fx.env.host.events().contains(&SimEvent::Vitals {
        player: pid(1),
        reset: VitalsReset::Respawn
    }));
}

#[test]
fn test_set_role_spectator_after_end_goes_to_end_spectate() {
    let mut fx = Fixture::new(1);
    fx.set(Phase::Running, pid(1), Role::Hunter);
    let spot = fx.in_game(5.5, 5.5);
    fx.roles.set_end_spectate(Some(spot.clone()));
    fx.env.host.take_events();

    fx.set(Phase::Ended, pid(1), Role::Spectator);

    assert_eq!(fx.env.host.game_mode(pid(1)), Some(GameMode::Spectator));
    assert_eq!(fx.env.host.teleports_of(pid(1)), vec![spot]);
    assert!(fx
        .env
        .host
        .events()
        .contains(&SimEvent::TrackingTargetLost { player: pid(1) }));
}

#[test]
fn test_set_role_offline_player_only_updates_bookkeeping() {
    let mut fx = Fixture::new(0);
    let change = fx.set(Phase::Lobby, pid(7), Role::Runner);
    assert!(change.applied);
    assert_eq!(change.report.attempted, 0);
    assert_eq!(fx.roles.role(pid(7)), Role::Runner);
}

#[test]
fn test_set_role_keeps_index_sets_in_sync() {
    let mut fx = Fixture::new(4);
    let players: Vec<PlayerId> = (1..=4).map(pid).collect();
    let sequence = [
        (1, Role::Runner),
        (2, Role::Hunter),
        (3, Role::Spectator),
        (1, Role::Hunter),
        (2, Role::Lobby),
        (4, Role::Runner),
        (3, Role::Runner),
        (4, Role::Spectator),
    ];
    for (n, role) in sequence {
        fx.set(Phase::Lobby, pid(n), role);
        fx.assert_sets_mirror_roles(&players);
    }
}

// =========================================================================
// eliminate() / check_timeouts()
// =========================================================================

#[test]
fn test_eliminate_last_runner_requests_hunters_win_at_death_spot() {
    let mut fx = Fixture::new(2);
    fx.set(Phase::Running, pid(1), Role::Runner);
    fx.set(Phase::Running, pid(2), Role::Hunter);
    let death = fx.in_game(12.5, 99.5);
    fx.env.host.set_location(pid(1), death.clone());
    fx.broadcasts();

    let ctx = fx.env.ctx(Phase::Running);
    let elimination = fx.roles.eliminate(ctx, pid(1), Role::Runner);

    let end = elimination.end.unwrap();
    assert_eq!(end.reason, WinReason::HuntersWin);
    assert_eq!(end.location, Some(death));
    assert_eq!(fx.roles.role(pid(1)), Role::Spectator);
    assert_eq!(fx.env.host.game_mode(pid(1)), Some(GameMode::Spectator));
    assert_eq!(fx.broadcasts(), vec!["spec.runner.death"]);
}

#[test]
fn test_eliminate_hunter_with_teammates_left_does_not_end() {
    let mut fx = Fixture::new(3);
    fx.set(Phase::Running, pid(1), Role::Runner);
    fx.set(Phase::Running, pid(2), Role::Hunter);
    fx.set(Phase::Running, pid(3), Role::Hunter);

    let ctx = fx.env.ctx(Phase::Running);
    let elimination = fx.roles.eliminate(ctx, pid(2), Role::Hunter);
    assert!(elimination.end.is_none());
    assert_eq!(fx.roles.hunter_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_check_timeouts_evicts_each_expiry_once() {
    let mut fx = Fixture::new(3);
    fx.set(Phase::Running, pid(1), Role::Runner);
    fx.set(Phase::Running, pid(2), Role::Hunter);
    fx.set(Phase::Running, pid(3), Role::Runner);
    fx.env.host.disconnect(pid(2));
    fx.roles.suspend(pid(2), "player2");

    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(fx.roles.check_timeouts(fx.env.ctx(Phase::Running)).evicted.is_empty());

    tokio::time::advance(Duration::from_secs(30)).await;
    let sweep = fx.roles.check_timeouts(fx.env.ctx(Phase::Running));
    assert_eq!(sweep.evicted, vec![pid(2)]);
    assert_eq!(sweep.end.map(|e| e.reason), Some(WinReason::HuntersGone));
    assert_eq!(fx.roles.role(pid(2)), Role::Spectator);

    let again = fx.roles.check_timeouts(fx.env.ctx(Phase::Running));
    assert!(again.evicted.is_empty());
    assert!(again.end.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_resume_after_expiry_fails_then_sweep_makes_spectator() {
    let mut fx = Fixture::new(2);
    fx.set(Phase::Running, pid(1), Role::Runner);
    fx.set(Phase::Running, pid(2), Role::Hunter);
    fx.env.host.disconnect(pid(1));
    fx.roles.suspend(pid(1), "player1");

    tokio::time::advance(GRACE).await;
    assert_eq!(fx.roles.try_resume(pid(1)), Err(RoleError::GraceExpired(pid(1))));

    let sweep = fx.roles.check_timeouts(fx.env.ctx(Phase::Running));
    assert_eq!(sweep.evicted, vec![pid(1)]);
    assert_eq!(fx.roles.role(pid(1)), Role::Spectator);
    let end = sweep.end.unwrap();
    assert_eq!(end.reason, WinReason::HuntersWin);
    assert_eq!(end.location, None);

    // Evicted players stay out for the rest of the round.
    assert_eq!(fx.roles.try_resume(pid(1)), Err(RoleError::NotSuspended(pid(1))));
}

#[tokio::test(start_paused = true)]
async fn test_check_timeouts_offline_runner_uses_last_location() {
    let mut fx = Fixture::new(2);
    fx.set(Phase::Running, pid(1), Role::Runner);
    fx.set(Phase::Running, pid(2), Role::Hunter);
    let last = fx.in_game(300.5, 300.5);
    fx.env.host.set_location(pid(1), last.clone());
    fx.roles.remember_location(fx.env.ctx(Phase::Running), pid(1));
    fx.env.host.disconnect(pid(1));
    fx.roles.suspend(pid(1), "player1");

    tokio::time::advance(GRACE + Duration::from_secs(1)).await;
    let sweep = fx.roles.check_timeouts(fx.env.ctx(Phase::Running));
    assert_eq!(sweep.end.unwrap().location, Some(last));
}

// =========================================================================
// Round bookkeeping
// =========================================================================

#[test]
fn test_remember_location_ignores_lobby_phase_and_other_worlds() {
    let mut fx = Fixture::new(1);
    fx.set(Phase::Lobby, pid(1), Role::Runner);

    fx.env.host.set_location(pid(1), fx.in_game(1.5, 1.5));
    fx.roles.remember_location(fx.env.ctx(Phase::Lobby), pid(1));
    assert!(fx.roles.last_location(pid(1)).is_none());

    fx.env.host.set_location(pid(1), Location::new("world", 0.5, 65.0, 0.5));
    fx.roles.remember_location(fx.env.ctx(Phase::Running), pid(1));
    assert!(fx.roles.last_location(pid(1)).is_none());
}

#[test]
fn test_apply_start_attributes_by_role() {
    let mut fx = Fixture::new(3);
    fx.set(Phase::Countdown, pid(1), Role::Hunter);
    fx.set(Phase::Countdown, pid(2), Role::Runner);
    fx.set(Phase::Countdown, pid(3), Role::Spectator);
    fx.env.host.take_events();

    for n in 1..=3 {
        let report = fx.roles.apply_start_attributes(fx.env.ctx(Phase::Running), pid(n));
        assert!(report.is_clean());
    }

    assert_eq!(fx.env.host.game_mode(pid(1)), Some(GameMode::Survival));
    assert_eq!(fx.env.host.game_mode(pid(2)), Some(GameMode::Survival));
    assert_eq!(fx.env.host.game_mode(pid(3)), Some(GameMode::Spectator));
    assert!(fx
        .env
        .host
        .events()
        .contains(&SimEvent::TrackingItem { player: pid(1) }));
    assert!(!fx
        .env
        .host
        .events()
        .contains(&SimEvent::TrackingItem { player: pid(2) }));
    assert_eq!(
        fx.env.host.teleports_of(pid(3))[0].world,
        fx.env.worlds.active.overworld
    );
}

#[test]
fn test_reset_round_state_clears_roles_and_budgets() {
    let mut fx = Fixture::new(2);
    fx.set(Phase::Running, pid(1), Role::Runner);
    fx.set(Phase::Running, pid(2), Role::Hunter);
    fx.roles.set_end_spectate(Some(fx.in_game(0.5, 0.5)));

    fx.roles.reset_round_state();

    assert_eq!(fx.roles.role(pid(1)), Role::Lobby);
    assert_eq!(fx.roles.runner_count() + fx.roles.hunter_count(), 0);
    assert!(fx.roles.end_spectate().is_none());
    assert_eq!(fx.roles.grace_remaining(pid(1)), GRACE);
}
