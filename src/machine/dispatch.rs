//! Action dispatch: resolving an action against the current state and
//! committing what it produces.

use super::handle::Machine;
use crate::core::{Outcome, State, StateFuture, Transition};
use crate::error::{MachineError, Result};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// What happened when an action was dispatched.
#[derive(Debug)]
pub enum Dispatch {
    /// The action is not declared for the current state; nothing changed.
    Ignored,

    /// The machine synchronously moved to this state.
    Committed(Arc<State>),

    /// A deferred transition is in flight.
    Pending(PendingTransition),
}

impl Dispatch {
    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// The state committed synchronously by this dispatch, if any.
    pub fn committed(&self) -> Option<&Arc<State>> {
        match self {
            Self::Committed(state) => Some(state),
            Self::Pending(pending) => pending.intermediate(),
            Self::Ignored => None,
        }
    }

    pub fn into_pending(self) -> Option<PendingTransition> {
        match self {
            Self::Pending(pending) => Some(pending),
            _ => None,
        }
    }

    /// Wait for the dispatch to settle and return the last state it
    /// committed (`None` when ignored).
    pub async fn settled(self) -> Result<Option<Arc<State>>> {
        match self {
            Self::Ignored => Ok(None),
            Self::Committed(state) => Ok(Some(state)),
            Self::Pending(pending) => pending.await.map(Some),
        }
    }
}

/// A deferred transition running on the Tokio runtime.
///
/// The final commit happens whether or not this is awaited; awaiting only
/// observes the result. A rejection resolves to
/// [`MachineError::Rejected`].
#[derive(Debug)]
pub struct PendingTransition {
    machine: String,
    action: String,
    intermediate: Option<Arc<State>>,
    rx: oneshot::Receiver<Result<Arc<State>>>,
}

impl PendingTransition {
    /// The state committed before the dispatch returned, if any.
    pub fn intermediate(&self) -> Option<&Arc<State>> {
        self.intermediate.as_ref()
    }

    pub fn action(&self) -> &str {
        &self.action
    }
}

impl Future for PendingTransition {
    type Output = Result<Arc<State>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        Pin::new(&mut this.rx).poll(cx).map(|result| {
            result.unwrap_or_else(|_| {
                Err(MachineError::Abandoned {
                    machine: this.machine.clone(),
                })
            })
        })
    }
}

/// A bound action of one machine.
///
/// Obtained from [`Machine::action`] for any action declared in the
/// machine's transition table.
#[derive(Clone, Debug)]
pub struct Action {
    machine: Machine,
    name: Arc<str>,
}

impl Action {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// Dispatch with arguments.
    pub fn call(&self, args: Vec<Value>) -> Result<Dispatch> {
        self.machine.dispatch(&self.name, args)
    }

    /// Dispatch without arguments.
    pub fn trigger(&self) -> Result<Dispatch> {
        self.call(Vec::new())
    }
}

impl Machine {
    /// Handle for a declared action, or `None` if no state declares it.
    pub fn action(&self, name: &str) -> Option<Action> {
        self.inner.actions.contains(name).then(|| Action {
            machine: self.clone(),
            name: Arc::from(name),
        })
    }

    /// Run `action` against the current state.
    ///
    /// Undeclared actions are ignored, or rejected with
    /// [`MachineError::ActionNotAvailable`] on strict machines. Handler
    /// outcomes that defer their result need a Tokio runtime; the final
    /// commit happens on a spawned task.
    ///
    /// The commit still happens when the new state is uncovered; the
    /// returned error reports that the machine is now stuck.
    pub fn dispatch(&self, action: &str, args: Vec<Value>) -> Result<Dispatch> {
        let name = self.inner.name.as_str();
        self.inner.middleware.action_dispatched(name, action, &args);

        let current = self.state();
        let Some(transition) = self.inner.transitions.lookup(current.name(), action) else {
            if self.inner.strict {
                return Err(MachineError::ActionNotAvailable {
                    machine: name.to_string(),
                    action: action.to_string(),
                    state: current.name().to_string(),
                });
            }
            debug!(machine = %name, action, state = %current.name(), "action not available, ignored");
            return Ok(Dispatch::Ignored);
        };
        debug!(machine = %name, action, state = %current.name(), "dispatching action");

        let outcome = match transition {
            Transition::Target(target) => Outcome::Immediate(State::new(target.as_str())),
            Transition::Handler(handler) => {
                handler(current.as_ref(), args.as_slice()).map_err(|source| MachineError::HandlerFailed {
                    machine: name.to_string(),
                    action: action.to_string(),
                    state: current.name().to_string(),
                    source,
                })?
            }
        };

        match outcome {
            Outcome::Immediate(state) => {
                let state = self.commit(state);
                self.ensure_covered(&state)?;
                Ok(Dispatch::Committed(state))
            }
            Outcome::Deferred(future) => {
                let marker = self.inner.pending.as_deref().map(State::new);
                self.defer(action, current, marker, future)
            }
            Outcome::Phased {
                intermediate,
                future,
            } => self.defer(action, current, Some(intermediate), future),
        }
    }

    fn defer(
        &self,
        action: &str,
        previous: Arc<State>,
        intermediate: Option<State>,
        future: StateFuture,
    ) -> Result<Dispatch> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| MachineError::NoRuntime {
                machine: self.inner.name.clone(),
                action: action.to_string(),
            })?;

        let intermediate = intermediate.map(|state| self.commit(state));
        let (tx, rx) = oneshot::channel();
        let machine = self.clone();
        let marker = intermediate.clone();
        let action_name = action.to_string();

        runtime.spawn(async move {
            let result = match future.await {
                Ok(state) => {
                    let state = machine.commit(state);
                    machine.ensure_covered(&state).map(|()| state)
                }
                Err(source) => {
                    warn!(
                        machine = %machine.name(),
                        action = %action_name,
                        error = %source,
                        "deferred transition rejected"
                    );
                    if let Some(marker) = marker.as_ref() {
                        // Only undo our own intermediate; a newer commit wins.
                        machine.commit_shared(previous, Some(marker));
                    }
                    Err(MachineError::Rejected {
                        machine: machine.name().to_string(),
                        action: action_name,
                        source,
                    })
                }
            };
            let _ = tx.send(result);
        });

        Ok(Dispatch::Pending(PendingTransition {
            machine: self.inner.name.clone(),
            action: action.to_string(),
            intermediate,
            rx,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::MachineConfig;
    use crate::error::BoxError;
    use crate::registry::Middlewares;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::sync::oneshot as chan;

    fn machine(config: MachineConfig) -> Machine {
        Machine::new(
            "test".to_string(),
            config.validate().unwrap(),
            Middlewares::default(),
        )
    }

    fn record(machine: &Machine) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        machine.subscribe(move |view| sink.lock().unwrap().push(view.state().name().to_string()));
        seen
    }

    #[test]
    fn target_transition_commits_bare_state() {
        let machine = machine(
            MachineConfig::new(State::new("idle").with("count", 1))
                .transition("idle", "run", "running")
                .transition("running", "stop", "idle"),
        );
        let seen = record(&machine);

        let dispatch = machine.dispatch("run", vec![]).unwrap();
        let state = dispatch.committed().unwrap();
        assert!(state.is("running"));
        assert!(state.payload().is_empty());
        assert_eq!(*seen.lock().unwrap(), vec!["running"]);
    }

    #[test]
    fn undeclared_action_is_ignored_by_default() {
        let machine = machine(MachineConfig::new("idle").transition("idle", "run", "running"));
        let seen = record(&machine);
        let before = machine.state();

        assert!(machine.dispatch("stop", vec![]).unwrap().is_ignored());
        assert!(Arc::ptr_eq(&before, &machine.state()));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn strict_machine_rejects_undeclared_action() {
        let machine = machine(
            MachineConfig::new("idle")
                .transition("idle", "run", "running")
                .transition("running", "stop", "idle")
                .strict(true),
        );
        assert!(machine.is_strict());
        let err = machine.dispatch("stop", vec![]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Machine 'test': \"stop\" action is not available in \"idle\" state"
        );
        assert!(machine.is("idle"));
    }

    #[test]
    fn handler_receives_state_and_args() {
        let machine = machine(MachineConfig::new("idle").handler(
            "idle",
            "add",
            |state, args| {
                let total = state.get("total").and_then(Value::as_i64).unwrap_or(0)
                    + args.iter().filter_map(Value::as_i64).sum::<i64>();
                Ok(Outcome::immediate(State::new("idle").with("total", total)))
            },
        ));

        machine.dispatch("add", vec![json!(2), json!(3)]).unwrap();
        let action = machine.action("add").unwrap();
        action.call(vec![json!(4)]).unwrap();
        assert_eq!(machine.state().get("total"), Some(&json!(9)));
    }

    #[test]
    fn handler_failure_leaves_state_untouched() {
        let machine = machine(
            MachineConfig::new("idle").handler("idle", "run", |_, _| Err("not ready".into())),
        );
        let seen = record(&machine);
        let before = machine.state();

        let err = machine.dispatch("run", vec![]).unwrap_err();
        assert!(matches!(err, MachineError::HandlerFailed { ref action, ref state, .. } if action == "run" && state == "idle"));
        assert!(Arc::ptr_eq(&before, &machine.state()));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn uncovered_target_commits_then_reports() {
        let machine = machine(MachineConfig::new("idle").transition("idle", "finish", "done"));
        let seen = record(&machine);

        let err = machine.dispatch("finish", vec![]).unwrap_err();
        assert!(matches!(err, MachineError::UncoveredState { ref state, .. } if state == "done"));
        assert!(machine.is("done"));
        assert_eq!(*seen.lock().unwrap(), vec!["done"]);
    }

    #[test]
    fn deferred_outcome_without_runtime_fails_cleanly() {
        let machine = machine(MachineConfig::new("idle").pending("loading").handler(
            "idle",
            "fetch",
            |_, _| Ok(Outcome::deferred(async { Ok(State::new("idle")) })),
        ));
        let err = machine.dispatch("fetch", vec![]).unwrap_err();
        assert!(matches!(err, MachineError::NoRuntime { .. }));
        assert!(machine.is("idle"));
    }

    #[test]
    fn action_handles_exist_only_for_declared_actions() {
        let machine = machine(
            MachineConfig::new("idle")
                .transition("idle", "run", "running")
                .transition("running", "stop", "idle"),
        );
        assert!(machine.action("stop").is_some());
        assert!(machine.action("jump").is_none());

        let run = machine.action("run").unwrap();
        assert_eq!(run.name(), "run");
        run.trigger().unwrap();
        assert!(machine.is("running"));
    }

    #[tokio::test]
    async fn deferred_with_marker_commits_twice() {
        let (tx, rx) = chan::channel::<State>();
        let rx = Mutex::new(Some(rx));
        let machine = machine(
            MachineConfig::new("idle")
                .pending("loading")
                .transition("done", "reset", "idle")
                .handler("idle", "fetch", move |_, _| {
                    let rx = rx.lock().unwrap().take().ok_or("already fetching")?;
                    Ok(Outcome::deferred(async move { rx.await.map_err(BoxError::from) }))
                }),
        );
        let seen = record(&machine);

        let pending = machine.dispatch("fetch", vec![]).unwrap().into_pending().unwrap();
        assert_eq!(pending.action(), "fetch");
        assert!(pending.intermediate().unwrap().is("loading"));
        assert!(machine.is("loading"));

        tx.send(State::new("done").with("items", 3)).unwrap();
        let final_state = pending.await.unwrap();
        assert_eq!(final_state.get("items"), Some(&json!(3)));
        assert_eq!(*seen.lock().unwrap(), vec!["loading", "done"]);
    }

    #[tokio::test]
    async fn deferred_without_marker_commits_once() {
        let machine = machine(
            MachineConfig::new("idle")
                .transition("done", "reset", "idle")
                .handler("idle", "fetch", |_, _| {
                    Ok(Outcome::deferred(async { Ok(State::new("done")) }))
                }),
        );
        let seen = record(&machine);

        let dispatch = machine.dispatch("fetch", vec![]).unwrap();
        assert!(dispatch.committed().is_none());
        assert!(machine.is("idle"));

        let state = dispatch.settled().await.unwrap().unwrap();
        assert!(state.is("done"));
        assert_eq!(*seen.lock().unwrap(), vec!["done"]);
    }

    #[tokio::test]
    async fn phased_outcome_commits_intermediate_then_final() {
        let machine = machine(
            MachineConfig::new("idle")
                .transition("saved", "edit", "idle")
                .handler("idle", "save", |state, _| {
                    let draft = state.clone();
                    Ok(Outcome::phased(State::new("saving"), async move {
                        tokio::task::yield_now().await;
                        Ok(State::new("saved").with("previous", draft.name()))
                    }))
                }),
        );
        let seen = record(&machine);

        let pending = machine.dispatch("save", vec![]).unwrap().into_pending().unwrap();
        assert!(machine.is("saving"));
        let state = pending.await.unwrap();
        assert_eq!(state.get("previous"), Some(&json!("idle")));
        assert_eq!(*seen.lock().unwrap(), vec!["saving", "saved"]);
    }

    #[tokio::test]
    async fn rejection_restores_the_previous_state() {
        let machine = machine(
            MachineConfig::new("idle")
                .pending("loading")
                .handler("idle", "fetch", |_, _| {
                    Ok(Outcome::deferred(async { Err::<State, BoxError>("network down".into()) }))
                }),
        );
        let before = machine.state();

        let pending = machine.dispatch("fetch", vec![]).unwrap().into_pending().unwrap();
        let err = pending.await.unwrap_err();
        assert!(matches!(err, MachineError::Rejected { ref action, .. } if action == "fetch"));
        assert!(Arc::ptr_eq(&before, &machine.state()));
    }

    #[tokio::test]
    async fn rejection_without_marker_changes_nothing() {
        let machine = machine(MachineConfig::new("idle").handler("idle", "fetch", |_, _| {
            Ok(Outcome::deferred(async { Err::<State, BoxError>("network down".into()) }))
        }));
        let seen = record(&machine);
        let before = machine.state();

        let err = machine.dispatch("fetch", vec![]).unwrap().settled().await.unwrap_err();
        assert!(matches!(err, MachineError::Rejected { .. }));
        assert!(Arc::ptr_eq(&before, &machine.state()));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejection_does_not_undo_newer_commits() {
        let (tx, rx) = chan::channel::<()>();
        let rx = Mutex::new(Some(rx));
        let machine = machine(
            MachineConfig::new("idle")
                .pending("loading")
                .transition("loading", "cancel", "idle")
                .handler("idle", "fetch", move |_, _| {
                    let rx = rx.lock().unwrap().take().ok_or("already fetching")?;
                    Ok(Outcome::deferred(async move {
                        let _ = rx.await;
                        Err::<State, BoxError>("timed out".into())
                    }))
                }),
        );

        let pending = machine.dispatch("fetch", vec![]).unwrap().into_pending().unwrap();
        let cancelled = machine.dispatch("cancel", vec![]).unwrap();
        let cancelled = Arc::clone(cancelled.committed().unwrap());

        tx.send(()).unwrap();
        assert!(pending.await.is_err());
        assert!(Arc::ptr_eq(&cancelled, &machine.state()));
    }

    #[tokio::test]
    async fn pending_transitions_commit_in_resolution_order() {
        let (first_tx, first_rx) = chan::channel::<State>();
        let (second_tx, second_rx) = chan::channel::<State>();
        let receivers = Mutex::new(vec![second_rx, first_rx]);
        let machine = machine(MachineConfig::new("idle").handler("idle", "fetch", move |_, _| {
            let rx = receivers.lock().unwrap().pop().ok_or("no more")?;
            Ok(Outcome::deferred(async move { rx.await.map_err(BoxError::from) }))
        }));
        let seen = record(&machine);

        let first = machine.dispatch("fetch", vec![]).unwrap().into_pending().unwrap();
        let second = machine.dispatch("fetch", vec![]).unwrap().into_pending().unwrap();

        second_tx.send(State::new("idle").with("from", "second")).unwrap();
        second.await.unwrap();
        first_tx.send(State::new("idle").with("from", "first")).unwrap();
        first.await.unwrap();

        assert_eq!(machine.state().get("from"), Some(&json!("first")));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
