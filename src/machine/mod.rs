//! Machines: live state, action dispatch, subscriptions and waiters.
//!
//! # Key Concepts
//!
//! - **Commit**: the only way state changes. A commit swaps in a new
//!   `Arc<State>`, resolves matching waiters (oldest first), runs registry
//!   middleware, then notifies subscribers in subscription order.
//! - **Dispatch**: resolves an action against the current state and turns
//!   the declared transition (or handler outcome) into commits.
//! - **Wait-for**: a future settling at the first commit reaching one of a
//!   set of states.
//!
//! Deferred transitions finish on a spawned Tokio task. Nothing cancels them:
//! two in-flight transitions on one machine both commit, in the order they
//! resolve.

mod dispatch;
mod handle;
mod subscribers;
mod wait;

pub use dispatch::{Action, Dispatch, PendingTransition};
pub use handle::{Machine, MachineView};
pub use subscribers::{Listener, Subscription, SubscriptionId};
pub use wait::WaitFor;
