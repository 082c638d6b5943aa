//! Declarative transition table: state name -> action name -> transition.

use super::outcome::Outcome;
use super::state::State;
use crate::error::BoxError;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Function computing a transition from the current state and the action
/// arguments.
pub type Handler = Arc<dyn Fn(&State, &[Value]) -> Result<Outcome, BoxError> + Send + Sync>;

/// A single declared edge for an action.
#[derive(Clone)]
pub enum Transition {
    /// Move to the named state, carrying no payload.
    Target(String),

    /// Let a handler compute the next state.
    Handler(Handler),
}

impl Transition {
    pub fn target(name: impl Into<String>) -> Self {
        Self::Target(name.into())
    }

    pub fn handler<F>(handler: F) -> Self
    where
        F: Fn(&State, &[Value]) -> Result<Outcome, BoxError> + Send + Sync + 'static,
    {
        Self::Handler(Arc::new(handler))
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Target(name) => f.debug_tuple("Target").field(name).finish(),
            Self::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

/// Every state a machine knows about and the actions available in it.
#[derive(Clone, Debug, Default)]
pub struct TransitionTable {
    states: BTreeMap<String, BTreeMap<String, Transition>>,
}

impl TransitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a state, even one without actions.
    pub fn declare_state(&mut self, state: impl Into<String>) {
        self.states.entry(state.into()).or_default();
    }

    /// Declare (or redeclare) the transition for `action` in `state`.
    pub fn insert(
        &mut self,
        state: impl Into<String>,
        action: impl Into<String>,
        transition: Transition,
    ) {
        self.states
            .entry(state.into())
            .or_default()
            .insert(action.into(), transition);
    }

    pub fn lookup(&self, state: &str, action: &str) -> Option<&Transition> {
        self.states.get(state).and_then(|actions| actions.get(action))
    }

    pub fn contains_state(&self, state: &str) -> bool {
        self.states.contains_key(state)
    }

    /// A state is covered when it is declared and has at least one action.
    pub fn is_covered(&self, state: &str) -> bool {
        self.states
            .get(state)
            .is_some_and(|actions| !actions.is_empty())
    }

    /// Every distinct action name declared in any state, sorted.
    pub fn action_names(&self) -> BTreeSet<String> {
        self.states
            .values()
            .flat_map(|actions| actions.keys().cloned())
            .collect()
    }

    /// Actions available from `state`, sorted.
    pub fn actions_in(&self, state: &str) -> Vec<&str> {
        self.states
            .get(state)
            .map(|actions| actions.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }

    /// Target names reachable through plain edges that would leave the
    /// machine stuck. Handler results can't be known ahead of time and are
    /// not inspected.
    pub fn uncovered_targets(&self) -> Vec<String> {
        let targets: BTreeSet<&str> = self
            .states
            .values()
            .flat_map(|actions| actions.values())
            .filter_map(|transition| match transition {
                Transition::Target(name) => Some(name.as_str()),
                Transition::Handler(_) => None,
            })
            .filter(|name| !self.is_covered(name))
            .collect();
        targets.into_iter().map(str::to_string).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toggle() -> TransitionTable {
        let mut table = TransitionTable::new();
        table.insert("idle", "run", Transition::target("running"));
        table.insert("running", "stop", Transition::target("idle"));
        table.insert(
            "running",
            "crash",
            Transition::handler(|_, _| Ok(Outcome::immediate("crashed"))),
        );
        table
    }

    #[test]
    fn lookup_finds_declared_edges_only() {
        let table = toggle();
        assert!(matches!(table.lookup("idle", "run"), Some(Transition::Target(t)) if t == "running"));
        assert!(table.lookup("idle", "stop").is_none());
        assert!(table.lookup("missing", "run").is_none());
    }

    #[test]
    fn action_names_are_collected_across_states() {
        let names: Vec<String> = toggle().action_names().into_iter().collect();
        assert_eq!(names, vec!["crash", "run", "stop"]);
    }

    #[test]
    fn coverage_requires_at_least_one_action() {
        let mut table = toggle();
        table.declare_state("done");
        assert!(table.is_covered("idle"));
        assert!(table.contains_state("done"));
        assert_eq!(
            table.state_names().collect::<Vec<_>>(),
            vec!["done", "idle", "running"]
        );
        assert!(!table.is_covered("done"));
        assert!(!table.is_covered("nowhere"));
    }

    #[test]
    fn uncovered_targets_ignores_handlers() {
        let mut table = toggle();
        table.insert("idle", "finish", Transition::target("done"));
        assert_eq!(table.uncovered_targets(), vec!["done".to_string()]);
    }

    #[test]
    fn actions_in_lists_state_actions() {
        let table = toggle();
        assert_eq!(table.actions_in("running"), vec!["crash", "stop"]);
        assert!(table.actions_in("nowhere").is_empty());
    }
}
