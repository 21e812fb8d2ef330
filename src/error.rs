/*
 * Error Module
 *
 * Failure taxonomy for the simulation core. Validation problems (bad shapes,
 * uninitialized components, grid misses), numeric problems (non-finite values
 * reaching a state-committing boundary) and configuration problems (negative
 * physical parameters, malformed fields) are kept apart so callers can decide
 * which ones are fatal.
 */

use thiserror::Error;

use crate::agent::AgentKey;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("expected a {expected}-component vector, got {got} components")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("{what}: component {index} is not finite ({value})")]
    NonFiniteInput {
        what: &'static str,
        index: usize,
        value: f32,
    },

    #[error("{component} used before initialization")]
    Uninitialized { component: &'static str },

    #[error("cell ({i}, {j}) is outside the {width}x{height} grid")]
    CellOutOfRange {
        i: i64,
        j: i64,
        width: usize,
        height: usize,
    },

    #[error("{what} must be non-negative and finite, got {value}")]
    InvalidArgument { what: &'static str, value: f32 },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NumericError {
    #[error("agent {agent}: {quantity} became non-finite ({x}, {y})")]
    NonFinite {
        agent: AgentKey,
        quantity: &'static str,
        x: f32,
        y: f32,
    },

    #[error("agent {agent}: state would not be finite after the step")]
    NonFiniteState { agent: AgentKey },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("agent {agent}: {field} must be non-negative, got {value}")]
    NegativeParameter {
        agent: AgentKey,
        field: &'static str,
        value: f32,
    },

    #[error("agent {agent}: {field} must be finite, got {value}")]
    NonFiniteParameter {
        agent: AgentKey,
        field: &'static str,
        value: f32,
    },

    #[error("agent {agent}: mass must be positive, got {value}")]
    NonPositiveMass { agent: AgentKey, value: f32 },

    #[error("invalid field bounds: x [{x_min}, {x_max}], y [{y_min}, {y_max}]")]
    InvalidBounds {
        x_min: f32,
        x_max: f32,
        y_min: f32,
        y_max: f32,
    },

    #[error("invalid configuration: {field} = {value} ({reason})")]
    InvalidSetting {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("duplicate agent identity {0}")]
    DuplicateAgent(AgentKey),

    #[error("cannot read config file {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("malformed config: {reason}")]
    Malformed { reason: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Numeric(#[from] NumericError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SimError {
    /// True for errors that should stop initialization outright.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SimError::Config(_))
    }
}

pub type SimResult<T> = Result<T, SimError>;
