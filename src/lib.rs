//! Stentor: named finite-state machines with observable, awaitable state.
//!
//! Machines are declared with an initial state and a transition table, kept
//! in a [`Registry`], and driven by dispatching actions. Every state change
//! is a commit: the machine swaps in a new state value, settles any
//! [`Machine::wait_for`] request it satisfies, and notifies subscribers.
//!
//! # Core Concepts
//!
//! - **State**: a name plus a JSON payload, see [`State`]
//! - **Transition table**: per state, which actions exist and where they
//!   lead, either by naming a target or through a handler
//! - **Outcome**: handlers answer immediately, with a future, or with an
//!   intermediate state and a future, see [`Outcome`]
//! - **Registry**: the directory machines are created in and looked up from
//!
//! # Example
//!
//! ```rust
//! use stentor::{MachineConfig, Registry};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let registry = Registry::new();
//! let machine = registry
//!     .create(
//!         Some("foo"),
//!         MachineConfig::new("idle")
//!             .transition("idle", "run", "running")
//!             .transition("running", "stop", "idle"),
//!     )
//!     .unwrap();
//!
//! let notified = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&notified);
//! machine.subscribe(move |_view| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! let run = machine.action("run").unwrap();
//! run.trigger().unwrap();
//! assert_eq!(machine.state().name(), "running");
//!
//! // `run` is not declared for `running`: ignored.
//! assert!(run.trigger().unwrap().is_ignored());
//! assert_eq!(notified.load(Ordering::SeqCst), 1);
//! ```

pub mod builder;
pub mod core;
pub mod error;
pub mod machine;
pub mod registry;

// Re-export commonly used types
pub use builder::MachineConfig;
pub use crate::core::{Outcome, State, Transition, TransitionTable};
pub use error::{BoxError, MachineError, Result};
pub use machine::{
    Action, Dispatch, Machine, MachineView, PendingTransition, Subscription, SubscriptionId,
    WaitFor,
};
pub use registry::{MachineRef, Middleware, Registry};
