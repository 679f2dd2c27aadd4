//! Error types for the decline-curve core

use crate::types::Phase;
use thiserror::Error;

/// A `ModelRecord` could not be turned into a usable `DeclineModel`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("well {well_id}: missing required field '{field}'")]
    MissingField { well_id: String, field: &'static str },

    #[error("well {well_id}: field '{field}' = {value} is invalid ({reason})")]
    InvalidValue {
        well_id: String,
        field: &'static str,
        value: f64,
        reason: &'static str,
    },
}

/// Curve-fit failures. Never fatal: the engine keeps the prior parameters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("insufficient data: need {needed} points, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("non-finite residual at t = {t:.4}")]
    NonFiniteResidual { t: f64 },

    #[error("fit bounds are empty or not numbers")]
    InvalidBounds,

    #[error("no convergence after {iterations} iterations")]
    NoConvergence { iterations: usize },

    #[error("fitted b-factor {b:.4} outside (0, 1)")]
    BOutOfRange { b: f64 },
}

/// Single-well pipeline errors surfaced to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("well {0}: no active oil or gas phase to forecast")]
    NoActivePhase(String),

    #[error("well {well_id}: {phase} decline parameters are not finite")]
    NonFiniteParameters { well_id: String, phase: Phase },

    #[error("well {0}: calendar overflow while stepping forecast dates")]
    DateOverflow(String),
}
