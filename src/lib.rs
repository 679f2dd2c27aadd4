//! well-decline: Decline-Curve Forecasting Engine
//!
//! Production forecasting for oil and gas wells from Arps decline models.
//!
//! ## Architecture
//!
//! - **Estimator**: closed-form starting models from production history
//! - **Forecast Engine**: historical replay, optional refit, monthly forecast
//!   to an economic limit
//! - **Batch**: parallel per-well pipelines with partial-failure reporting
//!   and cooperative cancellation
//! - **Config**: global default properties loaded from TOML
//!
//! The crate is a library: persistence, ingestion and presentation live
//! with the caller, which exchanges `ProductionRecord`, `ModelRecord` and
//! `ForecastRow` values with the engine.

pub mod config;
pub mod decline;
pub mod error;
pub mod estimator;
pub mod types;

// Re-export configuration
pub use config::{ConfigError, DefaultProperties};

// Re-export commonly used types
pub use types::{
    BatchReport, DeclineModel, EconomicLimit, EconomicLimitType, Economics, FitStatus,
    ForecastOutcome, ForecastRow, ModelRecord, Phase, PhaseDecline, PhaseFits, ProductionRecord,
    WellErrorSummary, WellFailure,
};

// Re-export engine components
pub use decline::{DeclineForecastEngine, FitSettings};
pub use estimator::{InitialParameterEstimator, PhaseEstimate};

// Re-export errors
pub use error::{FitError, ForecastError, ModelError};
