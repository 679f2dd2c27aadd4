//! Forecast output rows, fit-quality summaries and batch reports

use super::{DeclineModel, Phase};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median};

/// One period of one well: historical replay or forward forecast.
///
/// Actual volumes are `None` in the forecast region. `q_*` are model rates
/// and are 0 for a phase that is disabled or predates its peak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub well_id: String,
    pub date: NaiveDate,
    pub oil_volume: Option<f64>,
    pub gas_volume: Option<f64>,
    pub q_oil: f64,
    pub q_gas: f64,
    /// Absolute relative error vs actual, percent. 0 without a positive actual.
    pub error_oil: f64,
    pub error_gas: f64,
    pub cumulative_oil_volume: f64,
    pub cumulative_gas_volume: f64,
    pub cumulative_days: f64,
    pub oil_revenue: f64,
    pub gas_revenue: f64,
    pub total_revenue: f64,
    pub discounted_revenue: f64,
    pub is_forecast: bool,
}

impl ForecastRow {
    pub fn rate(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Oil => self.q_oil,
            Phase::Gas => self.q_gas,
        }
    }

    pub fn error(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Oil => self.error_oil,
            Phase::Gas => self.error_gas,
        }
    }
}

/// Per-well fit quality: median of the nonzero per-period errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellErrorSummary {
    pub well_id: String,
    pub sum_error_oil: f64,
    pub sum_error_gas: f64,
}

impl WellErrorSummary {
    /// Summarise the historical rows of one well. Forecast rows carry no
    /// error and are ignored.
    pub fn from_rows(well_id: &str, rows: &[ForecastRow]) -> Self {
        Self {
            well_id: well_id.to_string(),
            sum_error_oil: median_nonzero(rows.iter().map(|r| r.error_oil)),
            sum_error_gas: median_nonzero(rows.iter().map(|r| r.error_gas)),
        }
    }
}

/// Median of the finite, nonzero values; 0 when there are none.
///
/// Median rather than mean so a single bad month does not swamp the score.
pub fn median_nonzero(values: impl Iterator<Item = f64>) -> f64 {
    let nonzero: Vec<f64> = values.filter(|v| v.is_finite() && *v != 0.0).collect();
    if nonzero.is_empty() {
        return 0.0;
    }
    Data::new(nonzero).median()
}

/// Outcome of the optional refit for one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FitStatus {
    /// Refit not requested, or phase not modelled.
    NotRequested,
    /// Fitted parameters accepted and stored on the model.
    Accepted { qi: f64, nominal_di: f64, b: f64 },
    /// Fit ran but was discarded; prior parameters kept.
    Failed(String),
}

impl FitStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, FitStatus::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseFits {
    pub oil: FitStatus,
    pub gas: FitStatus,
}

impl Default for PhaseFits {
    fn default() -> Self {
        Self {
            oil: FitStatus::NotRequested,
            gas: FitStatus::NotRequested,
        }
    }
}

impl PhaseFits {
    pub fn get(&self, phase: Phase) -> &FitStatus {
        match phase {
            Phase::Oil => &self.oil,
            Phase::Gas => &self.gas,
        }
    }

    pub fn set(&mut self, phase: Phase, status: FitStatus) {
        match phase {
            Phase::Oil => self.oil = status,
            Phase::Gas => self.gas = status,
        }
    }
}

/// Everything one well's pipeline produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastOutcome {
    pub rows: Vec<ForecastRow>,
    pub summary: WellErrorSummary,
    /// Model after any accepted refit.
    pub model: DeclineModel,
    pub fits: PhaseFits,
    /// Forecast ended on the safety cutoff rather than an economic limit.
    pub runaway: bool,
}

impl ForecastOutcome {
    pub fn historical_rows(&self) -> impl Iterator<Item = &ForecastRow> {
        self.rows.iter().filter(|r| !r.is_forecast)
    }

    pub fn forecast_rows(&self) -> impl Iterator<Item = &ForecastRow> {
        self.rows.iter().filter(|r| r.is_forecast)
    }
}

/// A well the batch could not process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellFailure {
    pub well_id: String,
    pub reason: String,
}

/// Accumulated results of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub rows: Vec<ForecastRow>,
    pub summaries: Vec<WellErrorSummary>,
    pub models: Vec<DeclineModel>,
    pub fits: Vec<(String, PhaseFits)>,
    pub failures: Vec<WellFailure>,
    /// Wells whose forecast hit the safety cutoff.
    pub runaway_wells: Vec<String>,
    /// Wells never started because the batch was cancelled.
    pub cancelled_wells: Vec<String>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_failed(&self, well_id: &str) -> bool {
        self.failures.iter().any(|f| f.well_id == well_id)
    }

    pub fn rows_for<'a>(&'a self, well_id: &'a str) -> impl Iterator<Item = &'a ForecastRow> {
        self.rows.iter().filter(move |r| r.well_id == well_id)
    }
}
