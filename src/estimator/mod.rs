//! Initial Parameter Estimator
//!
//! Closed-form starting decline models derived from production history,
//! with no fitting involved. For each well and phase:
//!
//! 1. Peak row (max volume) gives `qi` and the peak date.
//! 2. The row 11 periods later (or the last row) gives the one-year rate.
//! 3. Effective decline `di = (qi - one_year) / qi · 100`, 0 when `qi = 0`.
//!
//! b-factors, terminal declines and economics are not derived from data:
//! they come from `DefaultProperties` and are identical for every well.
//! A phase with no non-null volume is left unmodelled.

use crate::config::{defaults::ONE_YEAR_OFFSET_PERIODS, ConfigError, DefaultProperties};
use crate::types::{
    clamp_effective_di, group_by_well, DeclineModel, Economics, Phase, PhaseDecline,
    ProductionRecord,
};
use chrono::NaiveDate;
use tracing::{debug, info};

/// Peak and one-year statistics for one phase of one well.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseEstimate {
    pub qi: f64,
    pub peak_date: NaiveDate,
    pub one_year_rate: f64,
    /// Effective annual decline, percent.
    pub di: f64,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Derive peak, one-year rate and effective decline for one phase.
///
/// `rows` must belong to one well and be sorted ascending by date.
/// Returns `None` when the phase has no non-null volume.
pub fn estimate_phase(rows: &[&ProductionRecord], phase: Phase) -> Option<PhaseEstimate> {
    // First maximum wins ties; nulls never qualify as the peak.
    let mut peak: Option<(usize, f64)> = None;
    for (i, row) in rows.iter().enumerate() {
        if let Some(v) = row.volume(phase) {
            if peak.map_or(true, |(_, best)| v > best) {
                peak = Some((i, v));
            }
        }
    }
    let (peak_idx, qi) = peak?;

    let last = rows.len() - 1;
    let one_year_idx = if rows.len() <= ONE_YEAR_OFFSET_PERIODS {
        last
    } else {
        (peak_idx + ONE_YEAR_OFFSET_PERIODS).min(last)
    };
    let one_year_rate = rows[one_year_idx].volume(phase).unwrap_or(0.0);

    let di = if qi == 0.0 {
        0.0
    } else {
        (qi - one_year_rate) / qi * 100.0
    };

    Some(PhaseEstimate {
        qi: round2(qi),
        peak_date: rows[peak_idx].date,
        one_year_rate: round2(one_year_rate),
        di: clamp_effective_di(round2(di)),
    })
}

/// Builds starting `DeclineModel`s from history plus global defaults.
#[derive(Debug, Clone)]
pub struct InitialParameterEstimator {
    defaults: DefaultProperties,
    economics: Economics,
}

impl InitialParameterEstimator {
    pub fn new(defaults: &DefaultProperties) -> Result<Self, ConfigError> {
        Ok(Self {
            economics: defaults.economics()?,
            defaults: defaults.clone(),
        })
    }

    /// Estimator over the global config, or built-in defaults when uninitialized.
    pub fn from_global() -> Result<Self, ConfigError> {
        if crate::config::is_initialized() {
            Self::new(crate::config::get())
        } else {
            Self::new(&DefaultProperties::default())
        }
    }

    /// Model for one well. `rows` must be that well's history sorted by date.
    pub fn estimate_well(&self, well_id: &str, rows: &[&ProductionRecord]) -> DeclineModel {
        let phase = |p: Phase| {
            estimate_phase(rows, p).map(|e| PhaseDecline {
                qi: e.qi,
                peak_date: e.peak_date,
                di: e.di,
                b: self.defaults.decline.b_factor(p),
                min_dec: self.defaults.decline.min_dec(p),
                one_year_rate: e.one_year_rate,
            })
        };

        let model = DeclineModel {
            well_id: well_id.to_string(),
            oil: phase(Phase::Oil),
            gas: phase(Phase::Gas),
            economics: self.economics.clone(),
        };

        debug!(
            well = %well_id,
            rows = rows.len(),
            oil = model.oil.is_some(),
            gas = model.gas.is_some(),
            "Estimated initial decline parameters"
        );
        model
    }

    /// Models for every well in `history`, ordered by well id.
    pub fn estimate(&self, history: &[ProductionRecord]) -> Vec<DeclineModel> {
        let models: Vec<DeclineModel> = group_by_well(history)
            .into_iter()
            .map(|(well_id, rows)| self.estimate_well(well_id, &rows))
            .collect();
        info!(wells = models.len(), rows = history.len(), "Initial parameter estimation complete");
        models
    }
}
