//! Directory of live machines, keyed by name.

mod middleware;

pub use middleware::Middleware;
pub(crate) use middleware::Middlewares;

use crate::builder::MachineConfig;
use crate::error::{MachineError, Result};
use crate::machine::Machine;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{debug, warn};

/// Something a machine can be looked up by: its name or the machine itself.
#[derive(Clone, Debug)]
pub enum MachineRef<'a> {
    Name(&'a str),
    Machine(&'a Machine),
}

impl<'a> From<&'a str> for MachineRef<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a String> for MachineRef<'a> {
    fn from(name: &'a String) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a Machine> for MachineRef<'a> {
    fn from(machine: &'a Machine) -> Self {
        Self::Machine(machine)
    }
}

/// Name-to-machine directory.
///
/// Most programs need one registry for their whole lifetime;
/// [`Registry::global`] provides it. Components that look machines up should
/// take a `&Registry` so tests can hand them an isolated one.
///
/// # Example
///
/// ```rust
/// use stentor::{MachineConfig, Registry};
///
/// let registry = Registry::new();
/// let machine = registry
///     .create(
///         Some("light"),
///         MachineConfig::new("off")
///             .transition("off", "toggle", "on")
///             .transition("on", "toggle", "off"),
///     )
///     .unwrap();
///
/// machine.dispatch("toggle", vec![]).unwrap();
/// assert!(registry.get("light").unwrap().is("on"));
///
/// registry.flush();
/// assert!(registry.get("light").is_err());
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    machines: Mutex<HashMap<String, Machine>>,
    counter: AtomicU64,
    middleware: Middlewares,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry. Created on first use and never dropped.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    /// Validate `config`, build a machine and register it.
    ///
    /// Without a name, one is generated (`machine-<n>`); the returned
    /// machine reports it through [`Machine::name`]. An existing machine
    /// with the same name is replaced.
    pub fn create(&self, name: Option<&str>, config: MachineConfig) -> Result<Machine> {
        let uncovered = config.uncovered_targets();
        let config = config.validate()?;

        let name = match name {
            Some(name) => name.to_string(),
            None => self.generate_name(),
        };
        for target in uncovered {
            warn!(machine = %name, state = %target, "transition target has no actions; a machine reaching it is stuck");
        }
        let machine = Machine::new(name.clone(), config, self.middleware.clone());

        if self
            .lock()
            .insert(name.clone(), machine.clone())
            .is_some()
        {
            debug!(machine = %name, "replaced existing machine");
        } else {
            debug!(machine = %name, "machine created");
        }
        Ok(machine)
    }

    /// Look a machine up by name, or pass a machine handle through.
    pub fn get<'a>(&self, machine: impl Into<MachineRef<'a>>) -> Result<Machine> {
        match machine.into() {
            MachineRef::Machine(machine) => Ok(machine.clone()),
            MachineRef::Name(name) => self
                .lock()
                .get(name)
                .cloned()
                .ok_or_else(|| MachineError::MissingMachine(name.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forget every machine. Handles held elsewhere keep working but can no
    /// longer be found by name. Middleware stays installed.
    pub fn flush(&self) {
        let flushed = std::mem::take(&mut *self.lock());
        debug!(count = flushed.len(), "registry flushed");
    }

    /// Install middleware for every machine of this registry, including
    /// machines created before this call.
    pub fn add_middleware<M>(&self, middleware: M)
    where
        M: Middleware + 'static,
    {
        self.middleware.push(Arc::new(middleware));
    }

    pub fn clear_middleware(&self) {
        self.middleware.clear();
    }

    fn generate_name(&self) -> String {
        loop {
            let n = self.counter.fetch_add(1, Ordering::Relaxed);
            let name = format!("machine-{n}");
            if !self.contains(&name) {
                return name;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Machine>> {
        self.machines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
