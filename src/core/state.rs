//! The state value a machine holds.
//!
//! A state is a mandatory `name` plus an open set of caller-defined payload
//! fields. States are values: a machine never edits the one it holds, it
//! replaces it with a new one on every commit.

use crate::error::{MachineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named state with an arbitrary JSON payload.
///
/// # Example
///
/// ```rust
/// use stentor::State;
/// use serde_json::json;
///
/// let state = State::new("fetching").with("attempt", 2);
/// assert_eq!(state.name(), "fetching");
/// assert_eq!(state.get("attempt"), Some(&json!(2)));
///
/// let parsed = State::from_value(json!({ "name": "idle", "count": 0 })).unwrap();
/// assert!(parsed.is("idle"));
/// assert!(State::from_value(json!({ "count": 0 })).is_err());
/// ```
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct State {
    name: String,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

impl State {
    /// Create a state carrying only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Map::new(),
        }
    }

    /// Return a copy of this state with `key` set to `value`.
    ///
    /// The `name` key is reserved and is ignored here; use [`State::new`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != "name" {
            self.payload.insert(key, value.into());
        }
        self
    }

    /// Parse a state from a JSON value.
    ///
    /// Fails with [`MachineError::InvalidStateFormat`] when the value is not
    /// an object or has no string `name` field.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(MachineError::invalid_state(&value));
        };
        match fields.remove("name") {
            Some(Value::String(name)) => Ok(Self {
                name,
                payload: fields,
            }),
            other => {
                if let Some(name) = other {
                    fields.insert("name".to_string(), name);
                }
                Err(MachineError::invalid_state(&Value::Object(fields)))
            }
        }
    }

    /// Serialize the state back into a single JSON object.
    pub fn to_value(&self) -> Value {
        let mut fields = self.payload.clone();
        fields.insert("name".to_string(), Value::String(self.name.clone()));
        Value::Object(fields)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check whether this state carries the given name.
    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }
}

impl TryFrom<Value> for State {
    type Error = MachineError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

impl From<&str> for State {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for State {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}
