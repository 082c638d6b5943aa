//! Core value types of the runtime.
//!
//! This module holds the plain data a machine is built from:
//! - `State`: a name plus a JSON payload
//! - `TransitionTable`: the declared edges and handlers
//! - `Outcome`: what a handler returns (immediate, deferred or phased)
//!
//! Nothing here owns mutable state; machines in [`crate::machine`] do.

mod outcome;
mod state;
mod table;

pub use outcome::{BoxFuture, Outcome, StateFuture};
pub use state::State;
pub use table::{Handler, Transition, TransitionTable};
