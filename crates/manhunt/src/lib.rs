//! # Manhunt
//!
//! Round engine for Minecraft manhunt: one team of runners tries to beat
//! the game while hunters track them down.
//!
//! The engine keeps the round state machine, team roles, disconnect
//! grace, and map rotation. Everything it does to the server goes through
//! the [`GameHost`](manhunt_protocol::GameHost) traits; everything it has
//! to say goes out as [`Notification`](manhunt_protocol::Notification)s.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use manhunt::{ManhuntBuilder, Settings};
//! use manhunt_protocol::Notifier;
//!
//! let (notifier, mut notifications) = Notifier::channel();
//! let session = ManhuntBuilder::new(Arc::new(my_host), notifier)
//!     .settings(Settings::load("manhunt.json")?)
//!     .build()?;
//!
//! session.player_joined(player).await?;
//! session.start().await?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! server adapter ──(SessionHandle)──→ session task ──(Notifier)──→ chat / scoreboard
//!                                       │    ↑
//!                  spawn search, folder I/O, chunk generation, timers
//! ```

mod actor;
mod builder;
mod command;
mod error;
mod handle;
mod session;
mod settings;
mod status;

pub use builder::ManhuntBuilder;
pub use command::PlayerEvent;
pub use error::{ManhuntError, SessionError};
pub use handle::SessionHandle;
pub use settings::{Settings, SettingsError, WorldSettings};
pub use status::{PlayerStatus, StatusSnapshot};
