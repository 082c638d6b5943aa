//! Registry-wide observers of dispatches and commits.

use crate::core::State;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Observer attached to a [`Registry`](crate::Registry).
///
/// Every machine of the registry reports to every middleware, in
/// registration order. Both hooks default to doing nothing.
///
/// # Example
///
/// ```rust
/// use stentor::{Middleware, State};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// #[derive(Default)]
/// struct CountCommits(AtomicUsize);
///
/// impl Middleware for CountCommits {
///     fn on_state_changed(&self, _machine: &str, _state: &State) {
///         self.0.fetch_add(1, Ordering::SeqCst);
///     }
/// }
/// ```
pub trait Middleware: Send + Sync {
    /// Called when an action is dispatched, before the transition is looked
    /// up. Also called for actions that end up ignored.
    fn on_action_dispatched(&self, _machine: &str, _action: &str, _args: &[Value]) {}

    /// Called after a state is committed and matching waiters are resolved,
    /// before subscribers are notified.
    fn on_state_changed(&self, _machine: &str, _state: &State) {}
}

/// Shared, growable middleware list. Machines hold a clone, so middleware
/// added later still reaches machines created earlier.
#[derive(Clone, Default)]
pub(crate) struct Middlewares {
    entries: Arc<RwLock<Vec<Arc<dyn Middleware>>>>,
}

impl Middlewares {
    pub(crate) fn push(&self, middleware: Arc<dyn Middleware>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(middleware);
    }

    pub(crate) fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Copy of the list so hooks run without holding the lock.
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn Middleware>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn action_dispatched(&self, machine: &str, action: &str, args: &[Value]) {
        for middleware in self.snapshot() {
            middleware.on_action_dispatched(machine, action, args);
        }
    }

    pub(crate) fn state_changed(&self, machine: &str, state: &State) {
        for middleware in self.snapshot() {
            middleware.on_state_changed(machine, state);
        }
    }
}

impl fmt::Debug for Middlewares {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middlewares")
            .field("len", &self.len())
            .finish()
    }
}
