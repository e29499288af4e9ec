//! Shared rig for session tests: an in-memory host, a running session,
//! and the notifications it emitted.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use manhunt::{ManhuntBuilder, SessionError, SessionHandle, Settings};
use manhunt_protocol::{Notification, Notifier, Phase, PlayerId, Role, SimHost, TemplateArg};
use tokio::sync::mpsc;

pub const LOBBY: &str = "world";
pub const GAME: &str = "minehunt_game";
pub const GAME_END: &str = "minehunt_game_the_end";

pub fn pid(n: u64) -> PlayerId {
    PlayerId(n)
}

/// Manual control: no auto-start, no auto-assign, short postgame.
pub fn test_settings() -> Settings {
    Settings {
        auto_start: false,
        auto_assign_on_join: false,
        postgame_send_back_delay_secs: 1,
        ..Settings::default()
    }
}

pub struct Rig {
    _dir: tempfile::TempDir,
    pub host: Arc<SimHost>,
    pub session: SessionHandle,
    notes: mpsc::UnboundedReceiver<Notification>,
    seen: Vec<Notification>,
}

impl Rig {
    pub fn new(settings: Settings) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(SimHost::new(dir.path()));
        let (notifier, notes) = Notifier::channel();
        let session = ManhuntBuilder::new(Arc::clone(&host), notifier)
            .settings(settings)
            .rng_seed(7)
            .build()
            .unwrap();
        Self {
            _dir: dir,
            host,
            session,
            notes,
            seen: Vec::new(),
        }
    }

    /// Connects a player and forwards the join.
    pub async fn join(&self, n: u64) -> PlayerId {
        let player = pid(n);
        self.host.connect(player, &format!("player{n}"));
        self.session.player_joined(player).await.unwrap();
        player
    }

    /// Forwards a quit, then disconnects the player.
    pub async fn quit(&self, player: PlayerId) {
        self.session.player_quit(player).await.unwrap();
        self.host.disconnect(player);
    }

    pub async fn role(&self, player: PlayerId) -> Role {
        self.session.player(player).await.unwrap().role
    }

    pub async fn wait_phase(&self, phase: Phase) {
        let mut status = self.session.subscribe();
        tokio::time::timeout(Duration::from_secs(600), status.wait_for(|s| s.phase == phase))
            .await
            .unwrap_or_else(|_| panic!("phase {phase} not reached: {:?}", self.session.status()))
            .expect("session gone");
    }

    /// Lets timers and background tasks run for `secs` of game time.
    pub async fn settle(&self, secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    fn pull(&mut self) {
        while let Ok(note) = self.notes.try_recv() {
            self.seen.push(note);
        }
    }

    /// Every broadcast so far, in order.
    pub fn broadcasts(&mut self) -> Vec<(&'static str, Vec<TemplateArg>)> {
        self.pull();
        self.seen
            .iter()
            .filter_map(|n| match n {
                Notification::Broadcast { key, args } => Some((*key, args.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn broadcast_count(&mut self, key: &str) -> usize {
        self.broadcasts().iter().filter(|(k, _)| *k == key).count()
    }

    /// Keys of every direct message `player` received so far.
    pub fn directs(&mut self, player: PlayerId) -> Vec<(&'static str, Vec<TemplateArg>)> {
        self.pull();
        self.seen
            .iter()
            .filter_map(|n| match n {
                Notification::Direct { player: p, key, args } if *p == player => {
                    Some((*key, args.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn forget_notifications(&mut self) {
        self.pull();
        self.seen.clear();
    }

    /// Four players on balanced teams, countdown run to completion.
    /// Returns the runners and hunters.
    pub async fn running_round(settings: Settings) -> (Self, Vec<PlayerId>, Vec<PlayerId>) {
        let rig = Self::new(settings);
        for n in 1..=4 {
            let player = rig.join(n).await;
            let role = rig.session.pick_balanced_role().await.unwrap();
            rig.session.join(player, Some(role)).await.unwrap();
        }
        match rig.session.start().await {
            // Auto-start may have beaten us to it.
            Ok(()) | Err(SessionError::NotInLobby(_)) => {}
            Err(error) => panic!("start failed: {error}"),
        }
        rig.wait_phase(Phase::Running).await;

        let mut runners = Vec::new();
        let mut hunters = Vec::new();
        for n in 1..=4 {
            match rig.role(pid(n)).await {
                Role::Runner => runners.push(pid(n)),
                Role::Hunter => hunters.push(pid(n)),
                other => panic!("player {n} has role {other}"),
            }
        }
        (rig, runners, hunters)
    }
}

pub fn int(arg: &TemplateArg) -> i64 {
    match arg {
        TemplateArg::Int(v) => *v,
        TemplateArg::Text(t) => panic!("expected a number, got {t:?}"),
    }
}
