//! Error types for the world pipeline.

use manhunt_protocol::HostError;

/// Errors raised while preparing or promoting a map.
///
/// None of these escape the pipeline: they are logged and the owning gate
/// goes back to idle so a later cycle can retry.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// A world folder could not be removed.
    #[error("failed to delete world folder {world}: {source}")]
    Delete {
        world: String,
        #[source]
        source: std::io::Error,
    },

    /// A staging folder could not be moved into place.
    #[error("failed to move world folder {from} to {to}: {source}")]
    Move {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },

    /// The host refused a world operation.
    #[error("world {world}: {source}")]
    Host {
        world: String,
        #[source]
        source: HostError,
    },
}
