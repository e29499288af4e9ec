//! Role assignment and disconnect grace for manhunt rounds.
//!
//! The [`RoleRegistry`] is the only writer of who is a runner, hunter,
//! spectator, or still in the lobby. Every assignment goes through
//! [`RoleRegistry::set_role`], which also applies the side effects the
//! role has in the current phase (teleport, game mode, vitals, tracking
//! item) and reports them as a [`BatchReport`](manhunt_protocol::BatchReport).
//!
//! # Key types
//!
//! - [`RoleRegistry`]: roles, index sets, grace budgets, last locations
//! - [`RoleContext`]: phase and collaborators for one call
//! - [`RoleFlags`]: respawn / rejoin / display modifiers
//! - [`Elimination`] and [`TimeoutSweep`]: whether a team just emptied

mod context;
mod error;
mod registry;

pub use context::{
    Elimination, EndRequest, FollowUp, RoleChange, RoleContext, RoleFlags, TimeoutSweep,
};
pub use error::RoleError;
pub use registry::{RoleRegistry, send_to_lobby};
