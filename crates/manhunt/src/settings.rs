//! Session settings, loaded from JSON.

use std::path::{Path, PathBuf};
use std::time::Duration;

use manhunt_protocol::WorldNames;
use manhunt_spawn::ScatterConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// SettingsError
// ---------------------------------------------------------------------------

/// Errors loading a settings file.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Map pre-generation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    /// Chunks within this many blocks of the staging spawn are generated
    /// before the map is promoted.
    pub preload_radius_blocks: u32,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            preload_radius_blocks: 1000,
        }
    }
}

/// Everything an operator can tune about a session.
///
/// Missing keys take their defaults, so an empty object is a valid
/// settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// World players wait in between rounds.
    pub lobby_world: String,

    /// Base name of the game map; nether and end take suffixes.
    pub game_world: String,

    /// How long a disconnected runner or hunter may stay away.
    pub disconnect_grace_secs: u64,

    pub auto_lock_roles_on_start: bool,

    /// Pause between the end of a round and sending everyone back.
    pub postgame_send_back_delay_secs: u64,

    /// Also reject `start` while the next map is still generating. A
    /// promotion in progress always blocks it.
    pub block_start_while_resetting: bool,

    /// Use a random seed for each new map instead of letting the server
    /// pick.
    pub random_seed_each_round: bool,

    pub min_players: usize,

    pub countdown_secs: u32,

    /// Give joining lobby players a balanced team.
    pub auto_assign_on_join: bool,

    /// Start the countdown by itself once the lobby becomes eligible.
    pub auto_start: bool,

    /// How long after round start a new player may still join a team.
    pub late_join_window_secs: u64,

    /// Players moved per tick when draining after a round.
    pub drain_batch_size: usize,

    pub scatter: ScatterConfig,

    pub world: WorldSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lobby_world: "world".to_string(),
            game_world: "minehunt_game".to_string(),
            disconnect_grace_secs: 90,
            auto_lock_roles_on_start: true,
            postgame_send_back_delay_secs: 10,
            block_start_while_resetting: true,
            random_seed_each_round: true,
            min_players: 2,
            countdown_secs: 10,
            auto_assign_on_join: true,
            auto_start: true,
            late_join_window_secs: 1800,
            drain_batch_size: 5,
            scatter: ScatterConfig::default(),
            world: WorldSettings::default(),
        }
    }
}

impl Settings {
    pub const MIN_PLAYERS: usize = 2;
    pub const MIN_COUNTDOWN_SECS: u32 = 5;

    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str::<Self>(json)?.validated())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Clamps degenerate values into the usable range.
    pub fn validated(mut self) -> Self {
        if self.min_players < Self::MIN_PLAYERS {
            warn!(min_players = self.min_players, "min_players below 2, clamping");
            self.min_players = Self::MIN_PLAYERS;
        }
        if self.countdown_secs < Self::MIN_COUNTDOWN_SECS {
            warn!(
                countdown_secs = self.countdown_secs,
                min = Self::MIN_COUNTDOWN_SECS,
                "countdown_secs below minimum, clamping"
            );
            self.countdown_secs = Self::MIN_COUNTDOWN_SECS;
        }
        if self.postgame_send_back_delay_secs == 0 {
            warn!("postgame_send_back_delay_secs is 0, using 1");
            self.postgame_send_back_delay_secs = 1;
        }
        if self.drain_batch_size == 0 {
            warn!("drain_batch_size is 0, using 1");
            self.drain_batch_size = 1;
        }
        self.scatter = self.scatter.validated();
        self
    }

    pub fn world_names(&self) -> WorldNames {
        WorldNames::new(&self.lobby_world, &self.game_world)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_secs)
    }

    pub fn postgame_delay(&self) -> Duration {
        Duration::from_secs(self.postgame_send_back_delay_secs)
    }

    pub fn late_join_window(&self) -> Duration {
        Duration::from_secs(self.late_join_window_secs)
    }
}
