use thiserror::Error;

/// Main error type for the TuneWell system.
#[derive(Error, Debug)]
pub enum TwError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigurationError),

    #[error("data validation error: {0}")]
    Data(#[from] DataValidationError),

    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("data loading failed: {0}")]
    Loading(String),

    #[error("study error: {0}")]
    Study(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config file error: {0}")]
    ConfigFile(#[from] serde_yaml::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for TuneWell operations.
pub type TwResult<T> = Result<T, TwError>;

fn join_violations<T: std::fmt::Display>(violations: &[T]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A rejected trial configuration.
///
/// Carries every violated constraint, in the order the parameters were
/// declared in the search space, so error messages are deterministic and a
/// user can fix all problems in one pass.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", join_violations(.violations))]
pub struct ConfigurationError {
    pub violations: Vec<ConfigViolation>,
}

impl ConfigurationError {
    pub fn new(violations: Vec<ConfigViolation>) -> Self {
        debug_assert!(!violations.is_empty());
        Self { violations }
    }
}

/// A single violated constraint on a proposed hyperparameter value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigViolation {
    #[error("missing parameter: {name}")]
    Missing { name: String },

    #[error("{name} must be of type {expected}, found {found}")]
    WrongType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{name} must be a finite number")]
    NotFinite { name: String },

    #[error("{name} must be >= {min}")]
    BelowMin { name: String, min: f64 },

    #[error("{name} must be <= {max}")]
    AboveMax { name: String, max: f64 },

    #[error("{name} must be positive")]
    NotPositive { name: String },

    #[error("{name} must be one of {choices:?}")]
    NotAChoice { name: String, choices: Vec<String> },

    #[error("unknown parameter: {name}")]
    Unknown { name: String },
}

/// A rejected dataset.
///
/// Enumerates every violated schema check (not just the first), in column
/// declaration order.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", join_violations(.violations))]
pub struct DataValidationError {
    pub violations: Vec<DataViolation>,
}

impl DataValidationError {
    pub fn new(violations: Vec<DataViolation>) -> Self {
        debug_assert!(!violations.is_empty());
        Self { violations }
    }
}

/// A single violated schema check on a tabular dataset.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataViolation {
    #[error("missing column: {name}")]
    MissingColumn { name: String },

    #[error("column {name} has wrong dtype: expected {expected}, found {found}")]
    WrongDtype {
        name: String,
        expected: String,
        found: String,
    },

    #[error("column {name} has {count} null value(s) but is not nullable")]
    UnexpectedNulls { name: String, count: usize },

    #[error("column {name} has {count} value(s) below {min}")]
    BelowMin { name: String, min: f64, count: usize },

    #[error("column {name} has {count} value(s) above {max}")]
    AboveMax { name: String, max: f64, count: usize },

    #[error("column {name} has {count} value(s) outside allowed set {allowed:?}")]
    NotAllowed {
        name: String,
        allowed: Vec<String>,
        count: usize,
    },

    #[error("column {name} has {found} rows, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
}

/// A recoverable model-evaluation failure.
///
/// These never escape the trial runner: they are downgraded to a failed
/// trial result so one bad trial cannot terminate the broader search.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("model failed to converge: {0}")]
    NonConvergence(String),

    #[error("numerical instability: {0}")]
    Numerical(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("timeout")]
    Timeout,

    #[error("{0}")]
    Other(String),
}
