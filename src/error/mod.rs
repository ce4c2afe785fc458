use thiserror::Error;

use crate::settings::SettingsError;

mod warning;

pub use warning::Warning;

/// Fatal errors raised by the dosing engine
///
/// Only malformed or physically impossible inputs end up here. Numerical
/// difficulties in the fit or the optimizer are reported as [`Warning`]s
/// attached to an otherwise usable result.
#[derive(Error, Debug)]
pub enum PkError {
    /// Non-positive, non-finite or out-of-range patient covariates
    #[error("Invalid patient input: {0}")]
    InvalidPatientInput(String),

    /// Dose, interval or infusion duration outside the allowed bounds
    #[error("Invalid regimen input: {0}")]
    InvalidRegimenInput(String),

    /// Non-physical level value or timing
    #[error("Invalid level input: {0}")]
    InvalidLevelInput(String),

    /// Invalid model parameter, prior or guardrail value
    #[error("Invalid parameter: {param} = {value}")]
    InvalidParameter { param: String, value: String },

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl PkError {
    pub(crate) fn parameter(param: impl Into<String>, value: impl ToString) -> Self {
        PkError::InvalidParameter {
            param: param.into(),
            value: value.to_string(),
        }
    }
}

/// Returns `true` when `value` is finite and strictly positive
#[inline]
pub(crate) fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
