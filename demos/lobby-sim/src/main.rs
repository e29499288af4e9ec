//! Plays one round against the in-memory host and logs what a server
//! adapter would show its players.
//!
//! ```text
//! cargo run -p lobby-sim -- [settings.json]
//! RUST_LOG=manhunt=debug cargo run -p lobby-sim
//! ```

use std::sync::Arc;
use std::time::Duration;

use manhunt::{ManhuntBuilder, SessionHandle, Settings};
use manhunt_protocol::{Notification, Notifier, Phase, PlayerId, Role, SimHost};
use tracing::info;
use tracing_subscriber::EnvFilter;

const PLAYERS: u64 = 4;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lobby_sim=info,manhunt=info")),
        )
        .init();

    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    let container = tempfile::tempdir()?;
    let host = Arc::new(SimHost::new(container.path()));
    let (notifier, mut notes) = Notifier::channel();
    tokio::spawn(async move {
        while let Some(note) = notes.recv().await {
            match note {
                Notification::Broadcast { key, args } => info!(key, ?args, "broadcast"),
                Notification::Direct { player, key, args } => {
                    info!(%player, key, ?args, "direct")
                }
                Notification::RoleChanged { player, old, new, .. } => {
                    info!(%player, %old, %new, "role changed")
                }
                Notification::RoundStateChanged { phase } => info!(%phase, "round state"),
            }
        }
    });

    let session = ManhuntBuilder::new(Arc::clone(&host), notifier)
        .settings(settings)
        .build()?;

    for n in 1..=PLAYERS {
        let player = PlayerId(n);
        host.connect(player, &format!("player{n}"));
        session.player_joined(player).await?;
    }
    if session.status().phase == Phase::Lobby {
        session.start().await?;
    }
    wait_for(&session, Phase::Running).await?;

    for n in 1..=PLAYERS {
        let player = PlayerId(n);
        if session.player(player).await?.role == Role::Runner {
            info!(%player, "runner falls into lava");
            session.player_died(player).await?;
        }
    }
    wait_for(&session, Phase::Ended).await?;
    wait_for(&session, Phase::Lobby).await?;

    info!(status = ?session.status(), "round over");
    session.shutdown().await?;
    Ok(())
}

async fn wait_for(session: &SessionHandle, phase: Phase) -> Result<(), Box<dyn std::error::Error>> {
    let mut status = session.subscribe();
    tokio::time::timeout(Duration::from_secs(120), status.wait_for(|s| s.phase == phase))
        .await??;
    Ok(())
}
