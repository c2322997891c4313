//! Error types for every failure surface of the simulation engine.
//!
//! Library-internal, `thiserror`-derived — see `SPEC_FULL.md` §3.2 for
//! the split between this crate (`thiserror`) and the CLI (`anyhow`).

use thiserror::Error;

/// Schema validation failure (spec.md §4.1, §7). Fatal to the
/// simulation being constructed, never to the process.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("register {name:?}: {reason}")]
    InvalidRegister { name: String, reason: String },

    #[error("register {name:?} sets more than one of randomize/accumulate/expression/writable")]
    RoleConflict { name: String },

    #[error("duplicate register name {name:?}")]
    DuplicateName { name: String },

    #[error("duplicate variable_name {variable_name:?} (used by {first:?} and {second:?})")]
    DuplicateVariableName {
        variable_name: String,
        first: String,
        second: String,
    },

    #[error(
        "registers {a:?} ([{a_start}, {a_end})) and {b:?} ([{b_start}, {b_end})) overlap"
    )]
    AddressOverlap {
        a: String,
        a_start: u32,
        a_end: u32,
        b: String,
        b_start: u32,
        b_end: u32,
    },

    #[error("register {register:?} references unknown identifier {identifier:?}")]
    DanglingReference { register: String, identifier: String },

    #[error("dependency cycle among registers: {registers:?}")]
    DependencyCycle { registers: Vec<String> },

    #[error("expression in register {register:?} is invalid: {source}")]
    InvalidExpression {
        register: String,
        #[source]
        source: ExprError,
    },
}

/// Listener bind failure (spec.md §4.7, §7). Fatal to the simulation
/// being constructed, never to the process.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("{ip}:{port} is already bound by this process")]
    AlreadyBoundLocally { ip: String, port: u16 },

    #[error("failed to bind {ip}:{port}: {source}")]
    Io {
        ip: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// A malformed request or one that targets the bank incorrectly
/// (spec.md §4.6, §7). Recovered locally; the connection stays open
/// and the appropriate Modbus exception code is returned on the wire.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unsupported function code")]
    IllegalFunction,
    #[error("illegal data address")]
    IllegalDataAddress,
    #[error("illegal data value")]
    IllegalDataValue,
}

impl ProtocolError {
    /// The Modbus exception code this error is reported as on the wire.
    pub fn exception_code(self) -> u8 {
        match self {
            ProtocolError::IllegalFunction => 0x01,
            ProtocolError::IllegalDataAddress => 0x02,
            ProtocolError::IllegalDataValue => 0x03,
        }
    }
}

/// Runtime evaluation produced a non-finite value (spec.md §4.5, §7).
/// Logged once per offending tick per register; the register's prior
/// value is retained.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("register {register:?} evaluated to a non-finite value ({value})")]
pub struct EvalError {
    pub register: String,
    pub value: f64,
}

/// An invariant that should be impossible was violated. Logged at high
/// severity; the offending simulation is stopped, the process
/// continues (spec.md §7).
#[derive(Debug, Error, Clone, PartialEq)]
#[error("internal invariant violated: {0}")]
pub struct InternalError(pub String);

/// Parse/evaluate-time failure for a single expression (spec.md §4.3).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("expected {expected}, found {found:?}")]
    Expected { expected: &'static str, found: String },
    #[error("unknown function {0:?}")]
    UnknownFunction(String),
    #[error("function {name:?} expects {expected} argument(s), got {got}")]
    ArityMismatch {
        name: String,
        expected: &'static str,
        got: usize,
    },
    #[error("trailing input after expression: {0:?}")]
    TrailingInput(String),
}

/// Errors raised by supervisor-level operations (spec.md §4.7).
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error("no simulation with id {0:?}")]
    UnknownSimulation(u64),
}
