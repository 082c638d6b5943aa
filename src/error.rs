//! Error types shared by the registry, machines and configuration parsing.

use thiserror::Error;

/// Error type handlers use to signal a failed or rejected transition.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MachineError>;

/// Errors produced while creating, looking up or driving a machine.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("There's no machine with name {0}")]
    MissingMachine(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(
        "The state should be an object and it should always have at least \"name\" property. You passed {0}"
    )]
    InvalidStateFormat(String),

    #[error(
        "You just transitioned the machine '{machine}' to a state ({state}) which is not defined or it has no actions. This means that the machine is stuck."
    )]
    UncoveredState { machine: String, state: String },

    #[error("Wrong handler type passed for \"{action}\" in \"{state}\" state: only target state names can be declared in JSON")]
    UnsupportedHandlerType { state: String, action: String },

    /// Only raised by machines configured with `strict(true)`.
    #[error("Machine '{machine}': \"{action}\" action is not available in \"{state}\" state")]
    ActionNotAvailable {
        machine: String,
        action: String,
        state: String,
    },

    #[error("Machine '{machine}': handler for \"{action}\" failed in \"{state}\" state: {source}")]
    HandlerFailed {
        machine: String,
        action: String,
        state: String,
        #[source]
        source: BoxError,
    },

    #[error("Machine '{machine}': deferred transition \"{action}\" was rejected: {source}")]
    Rejected {
        machine: String,
        action: String,
        #[source]
        source: BoxError,
    },

    #[error("Machine '{machine}': \"{action}\" returned a deferred outcome outside of a Tokio runtime")]
    NoRuntime { machine: String, action: String },

    /// The machine (or the task driving a deferred transition) went away
    /// before the awaited result was produced.
    #[error("Machine '{machine}' was dropped before the awaited result settled")]
    Abandoned { machine: String },
}

impl MachineError {
    pub(crate) fn missing_state() -> Self {
        Self::Configuration("missing initial \"state\"".to_string())
    }

    pub(crate) fn missing_transitions() -> Self {
        Self::Configuration("missing \"transitions\"".to_string())
    }

    pub(crate) fn invalid_state(value: &serde_json::Value) -> Self {
        let serialized = match value {
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self::InvalidStateFormat(serialized)
    }
}
