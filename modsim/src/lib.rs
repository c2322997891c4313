//! The register simulation engine: a periodic evaluator that maintains
//! a coherent view of a set of typed, addressable Modbus holding
//! registers while serving reads and accepting writes from network
//! clients (spec.md §1).
//!
//! Configuration parsing, interactive prompting, the terminal
//! dashboard, and log-file sinks are collaborators left to
//! `modsim-tools`; this crate consumes a parsed [`config::SimulationConfig`]
//! and exposes [`supervisor::Supervisor`] as its single entry point.

pub mod bank;
pub mod config;
pub mod error;
pub mod expr;
pub mod numeric;
pub mod planner;
pub mod schema;
pub mod server;
pub mod supervisor;
pub mod update_loop;

pub use bank::{RegisterBank, RegisterSnapshot};
pub use config::{Defaults, RegisterConfig, RootConfig, SimulationConfig};
pub use error::{
    BindError, ConfigError, EvalError, ExprError, InternalError, ProtocolError, SupervisorError,
};
pub use numeric::NumericType;
pub use schema::{validate, RegisterSchema, Role, ValidatedSchema};
pub use supervisor::{SimId, SimulationInfo, Supervisor};
pub use update_loop::{UpdateLoop, DEFAULT_TICK_INTERVAL};
