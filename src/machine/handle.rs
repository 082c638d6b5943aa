//! The machine handle and its commit path.

use super::subscribers::{Listener, Subscribers, Subscription, SubscriptionId};
use super::wait::{WaitFor, WaitList};
use crate::builder::ValidConfig;
use crate::core::{State, TransitionTable};
use crate::error::{MachineError, Result};
use crate::registry::Middlewares;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use tracing::{debug, warn};

/// One named state machine.
///
/// `Machine` is a cheap handle: clones share the same state, subscribers and
/// waiters. State only changes through dispatched actions, and every change
/// replaces the held `Arc<State>` with a new one.
#[derive(Clone)]
pub struct Machine {
    pub(super) inner: Arc<Inner>,
}

pub(super) struct Inner {
    pub(super) name: String,
    pub(super) transitions: TransitionTable,
    pub(super) actions: BTreeSet<String>,
    pub(super) strict: bool,
    pub(super) pending: Option<String>,
    pub(super) middleware: Middlewares,
    core: Mutex<Core>,
}

/// Everything that changes after construction. The lock is never held while
/// user code (handlers, subscribers, middleware) runs.
struct Core {
    state: Arc<State>,
    subscribers: Subscribers,
    waiters: WaitList,
    /// Committed states not yet announced, in commit order.
    outbox: VecDeque<Arc<State>>,
    /// Set while some caller is draining `outbox`.
    notifying: bool,
}

/// Non-owning handle used by subscriptions.
#[derive(Clone)]
pub(crate) struct WeakMachine(Weak<Inner>);

impl WeakMachine {
    pub(crate) fn upgrade(&self) -> Option<Machine> {
        self.0.upgrade().map(|inner| Machine { inner })
    }
}

impl fmt::Debug for WeakMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(machine) => f.debug_tuple("WeakMachine").field(&machine.name()).finish(),
            None => f.write_str("WeakMachine(<dropped>)"),
        }
    }
}

/// What subscribers receive: the committed state and the machine it
/// belongs to, through which actions can be triggered.
#[derive(Clone, Debug)]
pub struct MachineView {
    machine: Machine,
    state: Arc<State>,
}

impl MachineView {
    pub fn name(&self) -> &str {
        self.machine.name()
    }

    /// The state this notification is about.
    pub fn state(&self) -> &Arc<State> {
        &self.state
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn action(&self, name: &str) -> Option<super::Action> {
        self.machine.action(name)
    }
}

impl Machine {
    pub(crate) fn new(name: String, config: ValidConfig, middleware: Middlewares) -> Self {
        let actions = config.transitions.action_names();
        Self {
            inner: Arc::new(Inner {
                name,
                transitions: config.transitions,
                actions,
                strict: config.strict,
                pending: config.pending,
                middleware,
                core: Mutex::new(Core {
                    state: Arc::new(config.state),
                    subscribers: Subscribers::default(),
                    waiters: WaitList::default(),
                    outbox: VecDeque::new(),
                    notifying: false,
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> Arc<State> {
        Arc::clone(&self.lock().state)
    }

    /// Whether the machine currently is in the named state.
    pub fn is(&self, name: &str) -> bool {
        self.lock().state.is(name)
    }

    pub fn transitions(&self) -> &TransitionTable {
        &self.inner.transitions
    }

    /// Every action declared anywhere in the transition table, sorted.
    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.inner.actions.iter().map(String::as_str)
    }

    pub fn is_strict(&self) -> bool {
        self.inner.strict
    }

    /// Whether two handles point at the same machine.
    pub fn same(&self, other: &Machine) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Register a callback run after every commit, in subscription order.
    ///
    /// The callback may dispatch actions or (un)subscribe; the machine is
    /// not locked while it runs.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&MachineView) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(callback);
        let id = self.lock().subscribers.add(listener);
        Subscription::new(id, self.downgrade())
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock().subscribers.remove(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Wait until the machine is in `name`.
    ///
    /// Resolves right away when the machine already is in that state.
    pub fn wait_for(&self, name: &str) -> WaitFor {
        self.wait_for_any([name])
    }

    /// Wait until the machine is in any of `names`.
    pub fn wait_for_any<I, S>(&self, names: I) -> WaitFor
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut core = self.lock();
        if names.iter().any(|name| core.state.is(name)) {
            return WaitFor::ready(&self.inner.name, Arc::clone(&core.state));
        }
        debug!(machine = %self.inner.name, states = ?names, "waiting for state");
        let rx = core.waiters.register(names);
        WaitFor::waiting(&self.inner.name, rx)
    }

    /// Number of unresolved `wait_for` requests still being awaited.
    pub fn pending_waiters(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Replace the current state.
    pub(super) fn commit(&self, state: State) -> Arc<State> {
        let state = Arc::new(state);
        self.commit_shared(Arc::clone(&state), None);
        state
    }

    /// Replace the current state with `state`, but only while `expected`
    /// (when given) is still the current one. Returns whether it committed.
    ///
    /// Waiters are resolved before middleware and subscribers run. Rounds
    /// of notification are delivered strictly in commit order: a commit made
    /// while another round is running (from a callback or another thread)
    /// is queued and announced by the caller already draining the queue.
    pub(super) fn commit_shared(&self, state: Arc<State>, expected: Option<&Arc<State>>) -> bool {
        let (ready, drain) = {
            let mut core = self.lock();
            if expected.is_some_and(|expected| !Arc::ptr_eq(&core.state, expected)) {
                return false;
            }
            core.state = Arc::clone(&state);
            core.outbox.push_back(Arc::clone(&state));
            let drain = !core.notifying;
            core.notifying = true;
            (core.waiters.take_matching(state.name()), drain)
        };
        debug!(machine = %self.inner.name, state = %state.name(), "state committed");

        for waiter in ready {
            waiter.resolve(Arc::clone(&state));
        }

        if drain {
            self.drain_notifications();
        }
        true
    }

    /// Announce queued states one round at a time until the queue is empty.
    fn drain_notifications(&self) {
        let _reset = DrainGuard(self);
        loop {
            let (state, listeners) = {
                let mut core = self.lock();
                let Some(state) = core.outbox.pop_front() else {
                    core.notifying = false;
                    return;
                };
                (state, core.subscribers.snapshot())
            };

            self.inner.middleware.state_changed(&self.inner.name, &state);

            let view = MachineView {
                machine: self.clone(),
                state,
            };
            for (id, listener) in listeners {
                // Skip callbacks removed earlier in this round.
                if self.lock().subscribers.contains(id) {
                    listener(&view);
                }
            }
        }
    }

    /// Fail with `UncoveredState` when `state` leaves the machine stuck.
    pub(super) fn ensure_covered(&self, state: &State) -> Result<()> {
        if self.inner.pending.as_deref() == Some(state.name())
            || self.inner.transitions.is_covered(state.name())
        {
            return Ok(());
        }
        warn!(machine = %self.inner.name, state = %state.name(), "machine is stuck in uncovered state");
        Err(MachineError::UncoveredState {
            machine: self.inner.name.clone(),
            state: state.name().to_string(),
        })
    }

    pub(crate) fn downgrade(&self) -> WeakMachine {
        WeakMachine(Arc::downgrade(&self.inner))
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.inner
            .core
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the draining role if a callback panics, so later commits are
/// still announced.
struct DrainGuard<'a>(&'a Machine);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.lock().notifying = false;
        }
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("strict", &self.inner.strict)
            .finish_non_exhaustive()
    }
}
