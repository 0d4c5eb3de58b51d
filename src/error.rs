//! Error types.
//!
//! `AppError` is the fatal, process-level error: it carries the exit code the
//! binary returns. Everything below it is recoverable and scoped to a single
//! indicator, lag candidate or vintage; callers decide whether to skip or abort.

use thiserror::Error;

use crate::domain::Quarter;

/// Exit code for structurally invalid inputs (bad flags, missing columns, unreadable files).
pub const EXIT_CONFIG: u8 = 2;
/// Exit code when the inputs are well-formed but contain no usable data.
pub const EXIT_NO_DATA: u8 = 3;
/// Exit code for artifact write failures and internal errors.
pub const EXIT_INTERNAL: u8 = 4;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    /// A configuration error: aborts the run before any vintage is built.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(EXIT_CONFIG, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Failure to fit one regression (one lag count, one training cut).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelFitError {
    #[error("underdetermined system: {rows} rows for {params} parameters")]
    Underdetermined { rows: usize, params: usize },
    #[error("design matrix is singular or too ill-conditioned to solve")]
    Singular,
    #[error("fit produced non-finite residuals")]
    NonFinite,
}

/// A regressor required by a model spec is missing for the requested vintage.
///
/// This excludes the model from that vintage's combination; it never ends a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing regressor for `{indicator}` at position {position}")]
pub struct MissingRegressorError {
    pub indicator: String,
    pub position: usize,
}

/// Failure of a whole per-indicator lag search.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("no lag candidate produced a valid evaluation")]
    NoValidCandidate,
    #[error("selection cancelled: deadline exceeded")]
    Cancelled,
}

/// Why a single model could not produce a forecast for one vintage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    #[error(transparent)]
    MissingRegressor(#[from] MissingRegressorError),
    #[error(transparent)]
    Fit(#[from] ModelFitError),
}

/// Rejected update of the (indicator, period) -> model mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("model for `{indicator}` in {period} is already fixed at K={existing}")]
    Immutable {
        indicator: String,
        period: Quarter,
        existing: usize,
    },
    #[error("invalid transition for `{indicator}`: {from} -> {to}")]
    InvalidTransition {
        indicator: String,
        from: &'static str,
        to: &'static str,
    },
}
