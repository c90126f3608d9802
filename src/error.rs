//! Error types for the planner.
//!
//! Every failure family has its own `thiserror` enum so callers can match on
//! the exact condition. `PlannerError` aggregates them for APIs that cross
//! families (fit, predict, search).

use chrono::NaiveDate;
use thiserror::Error;

/// Configuration errors. These never succeed on retry.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// The parameter table is empty.
    #[error("No parameter config set")]
    MissingParameterConfig,

    /// No parameter of this name exists.
    #[error("Unknown parameter '{name}'")]
    UnknownParameter {
        /// Requested name.
        name: String,
    },

    /// The same name appears twice in a parameter table.
    #[error("Duplicate parameter '{name}'")]
    DuplicateParameter {
        /// Repeated name.
        name: String,
    },

    /// A parameter map lacks a required entry.
    #[error("Missing value for parameter '{name}'")]
    MissingParameterValue {
        /// Name without a value.
        name: String,
    },

    /// A flat parameter vector has the wrong length.
    #[error("Expected {expected} parameter values, got {actual}")]
    ParameterCountMismatch {
        /// Size of the parameter table.
        expected: usize,
        /// Length supplied.
        actual: usize,
    },

    /// Bounds are non-finite or inverted.
    #[error("Invalid bounds for parameter '{name}': [{lo}, {hi}]")]
    InvalidBounds {
        /// Parameter name.
        name: String,
        /// Lower bound.
        lo: f64,
        /// Upper bound.
        hi: f64,
    },

    /// A dial name did not parse.
    #[error("Unknown policy dial '{name}'")]
    UnknownDial {
        /// Name as given.
        name: String,
    },

    /// A dial value lies outside `[0, 1]`.
    #[error("Dial '{dial}' value {value} is out of range [0.0, 1.0]")]
    DialOutOfRange {
        /// Dial name.
        dial: String,
        /// Rejected value.
        value: f64,
    },

    /// A search space cannot produce valid dial values.
    #[error("Invalid search space for dial '{dial}': {reason}")]
    InvalidDialSpace {
        /// Dial name.
        dial: String,
        /// What is wrong with the space.
        reason: String,
    },

    /// Any other rejected setting.
    #[error("Invalid configuration: {reason}")]
    Invalid {
        /// Description of the rejected setting.
        reason: String,
    },
}

/// Errors raised by policy timeline reads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimelineError {
    /// The timeline has no applications.
    #[error("Empty policy timeline does not support indexing or slicing")]
    Empty,

    /// The position lies outside every application.
    #[error("No policy application covers {date}")]
    NotFound {
        /// Resolved date of the position.
        date: NaiveDate,
    },

    /// Applications overlap, leave a gap or are inverted.
    #[error("Timeline is not contiguous at {date}: {reason}")]
    NotContiguous {
        /// First offending date.
        date: NaiveDate,
        /// What breaks contiguity there.
        reason: String,
    },
}

/// Errors raised by health time-series operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HealthDataError {
    /// A component series differs in length from the others.
    #[error("Component '{component}' has {actual} values, expected {expected}")]
    LengthMismatch {
        /// Component name.
        component: &'static str,
        /// Length of the confirmed-cases series.
        expected: usize,
        /// Length of this component.
        actual: usize,
    },

    /// An optional component is present in some series only.
    #[error("Series have non-matching values for component '{component}'")]
    PartialComponent {
        /// Component name.
        component: &'static str,
    },

    /// An aggregate over zero series.
    #[error("At least one series is required")]
    NoSeries,

    /// A date-based operation on an unindexed series.
    #[error("Series has no date index")]
    MissingIndex,
}

/// Numerical integration failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OdeError {
    /// A state component became NaN or infinite.
    #[error("Integration produced a non-finite state at t={t}")]
    NonFinite {
        /// Time of the accepted step.
        t: f64,
    },

    /// A compartment dropped below zero beyond tolerance.
    #[error("Compartment {index} became negative ({value}) at t={t}")]
    NegativeCompartment {
        /// Compartment position in the state vector.
        index: usize,
        /// Offending value.
        value: f64,
        /// Time of the accepted step.
        t: f64,
    },

    /// The adaptive step shrank below the minimum.
    #[error("Step size underflow at t={t} (h={h})")]
    StepSizeUnderflow {
        /// Time where stepping stalled.
        t: f64,
        /// Last attempted step.
        h: f64,
    },

    /// The step budget ran out.
    #[error("Integration exceeded {max_steps} steps")]
    TooManySteps {
        /// Configured budget.
        max_steps: usize,
    },
}

/// Global optimizer failures (as opposed to non-convergence, which is a result).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OptimizeError {
    /// No dimensions to search.
    #[error("Optimizer needs at least one bounded dimension")]
    EmptyBounds,

    /// A search interval is non-finite or inverted.
    #[error("Invalid bounds in dimension {index}: [{lo}, {hi}]")]
    InvalidBounds {
        /// Dimension position.
        index: usize,
        /// Lower bound.
        lo: f64,
        /// Upper bound.
        hi: f64,
    },

    /// An evaluation thread could not be started.
    #[error("Failed to spawn optimizer worker: {message}")]
    WorkerSpawn {
        /// Reason reported by the OS.
        message: String,
    },

    /// The solver aborted the run.
    #[error("Solver failed: {message}")]
    Solver {
        /// Error reported by the solver.
        message: String,
    },
}

/// Fit failures that are fatal to the whole call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FitError {
    /// Every attempted segment failed or was skipped.
    #[error("No policy segment converged ({attempted} attempted)")]
    NoSegmentConverged {
        /// Segments tried.
        attempted: usize,
    },
}

/// Predict precondition and execution failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PredictError {
    /// General parameters are unset.
    #[error("Model params not set ({}). Fit the model or set them manually", .missing.join(", "))]
    MissingParameters {
        /// Names without values.
        missing: Vec<String>,
    },

    /// A policy has no discounts and nothing can infer them.
    #[error("No discount known for policy [{policy}] and no parameter mapper attached")]
    NoDiscountForPolicy {
        /// Display form of the policy.
        policy: String,
    },

    /// Forecasting needs at least one observed day.
    #[error("Past health data is empty")]
    EmptyHistory,

    /// The integrator failed.
    #[error("Integration failed: {0}")]
    Integration(#[from] OdeError),
}

/// Parameter mapper failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MapperError {
    /// Training was given no samples.
    #[error("Parameter mapper has no training samples")]
    EmptyTrainingSet,

    /// Query before training.
    #[error("Parameter mapper has not been fitted")]
    NotFitted,

    /// Training targets disagree on their parameter names.
    #[error("Discount table entry is missing parameter '{name}'")]
    InconsistentKeys {
        /// Name missing from an entry.
        name: String,
    },

    /// Query features have the wrong width.
    #[error("Feature vector has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        /// Width seen during training.
        expected: usize,
        /// Width of the query.
        actual: usize,
    },
}

/// Mapper persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding failed, including checksum mismatches.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The artifact was written by an incompatible format version.
    #[error("Artifact version {found} is not supported (expected {expected})")]
    VersionMismatch {
        /// Version in the artifact header.
        found: u32,
        /// Version this build reads.
        expected: u32,
    },

    /// Failure inside a custom store.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Top-level error type for the planner.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// See [`ConfigError`].
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// See [`TimelineError`].
    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),

    /// See [`HealthDataError`].
    #[error("Health data error: {0}")]
    HealthData(#[from] HealthDataError),

    /// See [`OptimizeError`].
    #[error("Optimizer error: {0}")]
    Optimize(#[from] OptimizeError),

    /// See [`FitError`].
    #[error("Fit error: {0}")]
    Fit(#[from] FitError),

    /// See [`PredictError`].
    #[error("Predict error: {0}")]
    Predict(#[from] PredictError),

    /// See [`MapperError`].
    #[error("Mapper error: {0}")]
    Mapper(#[from] MapperError),

    /// See [`StoreError`].
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<OdeError> for PlannerError {
    fn from(err: OdeError) -> Self {
        Self::Predict(PredictError::Integration(err))
    }
}

impl PlannerError {
    /// Returns true for configuration-class failures (bad names, bounds, out-of-range lookups).
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Timeline(_))
    }

    /// Returns true if fitting failed as a whole.
    #[must_use]
    pub const fn is_fit(&self) -> bool {
        matches!(self, Self::Fit(_))
    }

    /// Returns true if a prediction precondition or integration failed.
    #[must_use]
    pub const fn is_predict(&self) -> bool {
        matches!(self, Self::Predict(_))
    }

    /// Returns true for environmental failures that may clear on retry:
    /// worker threads that could not spawn, interrupted or timed-out I/O and
    /// custom store backends. Model and input failures are deterministic.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Optimize(e) => matches!(e, OptimizeError::WorkerSpawn { .. }),
            Self::Store(e) => match e {
                StoreError::Io(io) => matches!(
                    io.kind(),
                    std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ),
                StoreError::Backend(_) => true,
                _ => false,
            },
            _ => false,
        }
    }
}

/// Result type alias for planner operations.
pub type PlannerResult<T> = Result<T, PlannerError>;
