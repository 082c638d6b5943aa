//! Builder API for machine configuration.
//!
//! Configs can be assembled fluently, declared with the
//! [`transitions!`](crate::transitions) macro, or parsed from JSON.

pub mod config;
pub mod macros;

pub use config::MachineConfig;
pub(crate) use config::ValidConfig;
