//! Machine configuration: initial state, transition table and options.

use crate::core::{Outcome, State, Transition, TransitionTable};
use crate::error::{BoxError, MachineError, Result};
use serde_json::Value;

/// Configuration a machine is created from.
///
/// Both the initial state and the transition table are required; a config
/// missing either is rejected by [`crate::Registry::create`] and never
/// registered.
///
/// # Example
///
/// ```rust
/// use stentor::{MachineConfig, Outcome, State};
///
/// let config = MachineConfig::new("idle")
///     .transition("idle", "run", "running")
///     .transition("running", "stop", "idle")
///     .handler("running", "tick", |state, _args| {
///         let ticks = state.get("ticks").and_then(|v| v.as_u64()).unwrap_or(0);
///         Ok(Outcome::immediate(State::new("running").with("ticks", ticks + 1)))
///     });
///
/// assert!(config.uncovered_targets().is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct MachineConfig {
    state: Option<State>,
    transitions: Option<TransitionTable>,
    strict: bool,
    pending: Option<String>,
}

/// A config that passed validation.
#[derive(Clone, Debug)]
pub(crate) struct ValidConfig {
    pub state: State,
    pub transitions: TransitionTable,
    pub strict: bool,
    pub pending: Option<String>,
}

impl MachineConfig {
    /// Start a config from its initial state.
    pub fn new(state: impl Into<State>) -> Self {
        Self {
            state: Some(state.into()),
            ..Self::default()
        }
    }

    /// Set (or replace) the initial state.
    pub fn state(mut self, state: impl Into<State>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Use a prepared transition table, replacing anything declared so far.
    pub fn transitions(mut self, table: TransitionTable) -> Self {
        self.transitions = Some(table);
        self
    }

    /// Declare a plain edge from `state` to `target` for `action`.
    pub fn transition(
        mut self,
        state: impl Into<String>,
        action: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.table_mut()
            .insert(state, action, Transition::target(target));
        self
    }

    /// Declare a handler computing the next state for `action` in `state`.
    pub fn handler<F>(
        mut self,
        state: impl Into<String>,
        action: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(&State, &[Value]) -> std::result::Result<Outcome, BoxError> + Send + Sync + 'static,
    {
        self.table_mut()
            .insert(state, action, Transition::handler(handler));
        self
    }

    /// Reject actions that are not declared for the current state instead
    /// of ignoring them.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Name of the marker state entered while a `Deferred` outcome is in
    /// flight.
    pub fn pending(mut self, name: impl Into<String>) -> Self {
        self.pending = Some(name.into());
        self
    }

    /// Parse a config from JSON.
    ///
    /// Recognized keys: `state` (required), `transitions` (required, every
    /// action must map to a target state name), `strict` and `pending`.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(MachineError::missing_state());
        };

        let state = match fields.remove("state") {
            None | Some(Value::Null) => return Err(MachineError::missing_state()),
            Some(state) => State::from_value(state)?,
        };

        let table = match fields.remove("transitions") {
            None | Some(Value::Null) => return Err(MachineError::missing_transitions()),
            Some(Value::Object(states)) => parse_table(states)?,
            Some(_) => {
                return Err(MachineError::Configuration(
                    "\"transitions\" must be an object".to_string(),
                ))
            }
        };

        let strict = match fields.remove("strict") {
            None => false,
            Some(Value::Bool(strict)) => strict,
            Some(_) => {
                return Err(MachineError::Configuration(
                    "\"strict\" must be a boolean".to_string(),
                ))
            }
        };

        let pending = match fields.remove("pending") {
            None => None,
            Some(Value::String(name)) => Some(name),
            Some(_) => {
                return Err(MachineError::Configuration(
                    "\"pending\" must be a state name".to_string(),
                ))
            }
        };

        Ok(Self {
            state: Some(state),
            transitions: Some(table),
            strict,
            pending,
        })
    }

    /// Parse a config from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| MachineError::Configuration(format!("invalid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Declared target states that have no actions of their own.
    pub fn uncovered_targets(&self) -> Vec<String> {
        self.transitions
            .as_ref()
            .map(|table| {
                table
                    .uncovered_targets()
                    .into_iter()
                    .filter(|name| self.pending.as_deref() != Some(name.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn validate(self) -> Result<ValidConfig> {
        let state = self.state.ok_or_else(MachineError::missing_state)?;
        let transitions = self
            .transitions
            .ok_or_else(MachineError::missing_transitions)?;
        Ok(ValidConfig {
            state,
            transitions,
            strict: self.strict,
            pending: self.pending,
        })
    }

    fn table_mut(&mut self) -> &mut TransitionTable {
        self.transitions.get_or_insert_with(TransitionTable::new)
    }
}

fn parse_table(states: serde_json::Map<String, Value>) -> Result<TransitionTable> {
    let mut table = TransitionTable::new();
    for (state, actions) in states {
        let Value::Object(actions) = actions else {
            return Err(MachineError::Configuration(format!(
                "actions of state \"{state}\" must be an object"
            )));
        };
        table.declare_state(state.clone());
        for (action, target) in actions {
            match target {
                Value::String(target) => {
                    table.insert(state.clone(), action, Transition::Target(target))
                }
                _ => {
                    return Err(MachineError::UnsupportedHandlerType {
                        state: state.clone(),
                        action,
                    })
                }
            }
        }
    }
    Ok(table)
}
