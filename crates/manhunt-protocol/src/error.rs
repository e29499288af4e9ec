//! Error types for host calls.
//!
//! Each manhunt crate defines its own error enum. A `HostError` always
//! means "the server underneath refused or could not do something": the
//! player was gone, the world was not loaded, a chunk failed to load.
//! Callers treat these as transient and fall back rather than abort.

use crate::PlayerId;

/// Errors reported by a [`GameHost`](crate::GameHost) implementation.
///
/// `Clone` so the same failure can be both logged and kept in a
/// [`BatchReport`](crate::BatchReport).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// The player is not connected.
    #[error("player {0} is not online")]
    PlayerOffline(PlayerId),

    /// The named world is not loaded.
    #[error("world {0} is not loaded")]
    WorldNotLoaded(String),

    /// A chunk could not be loaded or generated.
    #[error("chunk ({x}, {z}) in {world} failed to load: {reason}")]
    ChunkLoad {
        world: String,
        x: i32,
        z: i32,
        reason: String,
    },

    /// The host refused the call for a reason of its own.
    #[error("host rejected the call: {0}")]
    Rejected(String),
}
