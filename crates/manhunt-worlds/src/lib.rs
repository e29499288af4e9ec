//! Background map preparation and promotion.
//!
//! Between rounds the engine generates a fresh "staging" map next to the
//! active one, pre-generates its chunks while the current round is still
//! being played, and at the end of the round swaps the staging folders in
//! under the active names.
//!
//! # Key types
//!
//! - [`WorldLifecycle`]: the preparing/ready and resetting gates
//! - [`WorldEvent`]: continuations from background folder and chunk work
//! - [`WorldOutcome`]: what a finished promotion means for the session

mod error;
mod folders;
mod lifecycle;

pub use error::WorldError;
pub use folders::{delete_world_folders, swap_world_folders};
pub use lifecycle::{
    PROMOTION_POLL, PromotionStart, WorldEvent, WorldLifecycle, WorldOutcome, WorldStatus,
};
