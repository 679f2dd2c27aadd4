//! Decline Forecast Engine
//!
//! Per-well pipeline:
//!
//! 1. **Replay**: predicted rate for every historical period on/after the
//!    phase peak, with per-period percent error against the actual.
//! 2. **Refit** (optional): bounded least-squares fit of `(qi, Di, b)` per
//!    phase. Failures keep the prior parameters and are reported on the
//!    outcome, never raised.
//! 3. **Forecast**: monthly steps past the last historical period until the
//!    economic limit fires or the safety cutoff year is reached.
//!
//! Every run builds fresh `PhaseRun`s, so switchover state never leaks
//! between wells or between the replay passes of one well.

use super::arps;
use super::fit::{fit_hyperbolic, FitSettings};
use super::switchover::PhaseRun;
use crate::config::{self, defaults, DefaultProperties};
use crate::error::ForecastError;
use crate::types::{
    clamp_effective_di, DeclineModel, EconomicLimit, Economics, FitStatus, ForecastOutcome,
    ForecastRow, Phase, PhaseFits, ProductionRecord, WellErrorSummary,
};
use chrono::{Datelike, Months, NaiveDate};
use tracing::{debug, warn};

/// Elapsed years between two dates.
pub fn years_between(from: NaiveDate, to: NaiveDate) -> f64 {
    (to - from).num_days() as f64 / defaults::DAYS_PER_YEAR
}

// ============================================================================
// Per-run state
// ============================================================================

/// Switchover state for both phases of one well within one run.
struct WellRuns {
    oil: Option<(NaiveDate, PhaseRun)>,
    gas: Option<(NaiveDate, PhaseRun)>,
}

impl WellRuns {
    fn new(model: &DeclineModel) -> Self {
        let run = |p: Phase| model.phase(p).map(|d| (d.peak_date, PhaseRun::new(d)));
        Self {
            oil: run(Phase::Oil),
            gas: run(Phase::Gas),
        }
    }

    /// Rates for `(oil, gas)` at `date`. `None` for a disabled phase or a
    /// period before that phase's peak.
    fn rates_at(&mut self, date: NaiveDate) -> (Option<f64>, Option<f64>) {
        let step = |slot: &mut Option<(NaiveDate, PhaseRun)>| {
            slot.as_mut()
                .and_then(|(peak, run)| run.rate_at(years_between(*peak, date)))
        };
        (step(&mut self.oil), step(&mut self.gas))
    }

    fn switch_times(&self) -> (Option<f64>, Option<f64>) {
        (
            self.oil.as_ref().and_then(|(_, r)| r.switch_time()),
            self.gas.as_ref().and_then(|(_, r)| r.switch_time()),
        )
    }
}

/// Running totals carried from the last emitted row into the forecast.
#[derive(Debug, Clone, Copy)]
struct Carry {
    /// Date the forecast steps away from.
    anchor: NaiveDate,
    cumulative_days: f64,
    cumulative_oil: f64,
    cumulative_gas: f64,
}

struct Revenue {
    oil: f64,
    gas: f64,
    total: f64,
    discounted: f64,
}

fn revenue(economics: &Economics, q_oil: f64, q_gas: f64) -> Revenue {
    let oil = q_oil * economics.net_price_oil;
    let gas = q_gas * economics.net_price_gas;
    let total = oil + gas;
    Revenue {
        oil,
        gas,
        total,
        discounted: total * economics.discount_factor(),
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Replays, refits and forecasts decline models.
#[derive(Debug, Clone)]
pub struct DeclineForecastEngine {
    fit: FitSettings,
    safety_cutoff_year: i32,
}

impl Default for DeclineForecastEngine {
    fn default() -> Self {
        Self::new(FitSettings::default(), defaults::SAFETY_CUTOFF_YEAR)
    }
}

impl DeclineForecastEngine {
    pub fn new(fit: FitSettings, safety_cutoff_year: i32) -> Self {
        Self {
            fit,
            safety_cutoff_year,
        }
    }

    pub fn from_properties(properties: &DefaultProperties) -> Self {
        Self::new(
            FitSettings::from(&properties.fit),
            properties.forecast.safety_cutoff_year,
        )
    }

    /// Engine over the global config, or built-in defaults when uninitialized.
    pub fn from_config() -> Self {
        if config::is_initialized() {
            Self::from_properties(config::get())
        } else {
            Self::default()
        }
    }

    pub fn safety_cutoff_year(&self) -> i32 {
        self.safety_cutoff_year
    }

    /// Full pipeline for an active well: replay `history`, optionally
    /// refit, then forecast forward.
    ///
    /// `history` may contain other wells and arrive unsorted; only rows
    /// for `model.well_id` are used. With no replayable history the well
    /// is projected as in [`project_planned`](Self::project_planned).
    pub fn replay_and_fit(
        &self,
        model: DeclineModel,
        history: &[ProductionRecord],
        refit: bool,
    ) -> Result<ForecastOutcome, ForecastError> {
        let mut rows: Vec<&ProductionRecord> = history
            .iter()
            .filter(|r| r.well_id == model.well_id)
            .collect();
        rows.sort_by_key(|r| r.date);
        self.replay_and_fit_rows(model, &rows, refit)
    }

    /// `replay_and_fit` over one well's rows, already sorted by date.
    pub(crate) fn replay_and_fit_rows(
        &self,
        model: DeclineModel,
        history: &[&ProductionRecord],
        refit: bool,
    ) -> Result<ForecastOutcome, ForecastError> {
        let mut model = prepare(model)?;
        let mut fits = PhaseFits::default();

        let (mut rows, mut runs) = replay(&model, history);
        if rows.is_empty() {
            debug!(well = %model.well_id, "No replayable history, projecting from peak");
            return self.project(model, fits);
        }

        if refit {
            let mut changed = false;
            for phase in Phase::ALL {
                let status = self.refit_phase(&mut model, phase, history);
                changed |= matches!(status, FitStatus::Accepted { .. });
                fits.set(phase, status);
            }
            if changed {
                (rows, runs) = replay(&model, history);
            }
        }

        debug!(
            well = %model.well_id,
            historical_rows = rows.len(),
            "Historical replay complete"
        );

        // Replay emitted at least one row, so `last` exists.
        let carry = match rows.last() {
            Some(last) => Carry {
                anchor: last.date,
                cumulative_days: last.cumulative_days,
                cumulative_oil: last.cumulative_oil_volume,
                cumulative_gas: last.cumulative_gas_volume,
            },
            None => return self.project(model, fits),
        };

        let runaway = self.forecast(&model, &mut runs, carry, 1, &mut rows)?;
        Ok(finish(model, rows, fits, runaway))
    }

    /// Project a well with no production history directly from its peak
    /// values. The first row is the earliest enabled peak date itself.
    pub fn project_planned(&self, model: DeclineModel) -> Result<ForecastOutcome, ForecastError> {
        let model = prepare(model)?;
        self.project(model, PhaseFits::default())
    }

    fn project(&self, model: DeclineModel, fits: PhaseFits) -> Result<ForecastOutcome, ForecastError> {
        let start = model
            .forecast_start()
            .ok_or_else(|| ForecastError::NoActivePhase(model.well_id.clone()))?;
        let mut runs = WellRuns::new(&model);
        let mut rows = Vec::new();
        let carry = Carry {
            anchor: start,
            cumulative_days: 0.0,
            cumulative_oil: 0.0,
            cumulative_gas: 0.0,
        };
        let runaway = self.forecast(&model, &mut runs, carry, 0, &mut rows)?;
        Ok(finish(model, rows, fits, runaway))
    }

    /// Fit one phase against history on/after its peak. Returns the status
    /// to report; the model is only touched when the fit is accepted.
    fn refit_phase(
        &self,
        model: &mut DeclineModel,
        phase: Phase,
        history: &[&ProductionRecord],
    ) -> FitStatus {
        let well_id = model.well_id.clone();
        let Some(decline) = model.phase_mut(phase) else {
            return FitStatus::NotRequested;
        };

        let (t, y): (Vec<f64>, Vec<f64>) = history
            .iter()
            .filter(|r| r.date >= decline.peak_date)
            .filter_map(|r| {
                r.volume(phase)
                    .filter(|v| *v > 0.0)
                    .map(|v| (years_between(decline.peak_date, r.date), v))
            })
            .unzip();

        let bounds = self.fit.bounds(phase, decline.qi);
        let initial = (decline.qi, decline.nominal_di(), decline.b);

        match fit_hyperbolic(&t, &y, initial, &bounds, &self.fit) {
            Ok(fit) => {
                decline.qi = fit.qi;
                decline.b = fit.b;
                decline.set_nominal_di(fit.nominal_di);
                debug!(
                    well = %well_id,
                    %phase,
                    qi = fit.qi,
                    nominal_di = fit.nominal_di,
                    b = fit.b,
                    di = decline.di,
                    "Refit accepted"
                );
                FitStatus::Accepted {
                    qi: fit.qi,
                    nominal_di: fit.nominal_di,
                    b: fit.b,
                }
            }
            Err(e) => {
                warn!(well = %well_id, %phase, error = %e, "Refit failed, keeping prior parameters");
                FitStatus::Failed(e.to_string())
            }
        }
    }

    /// Step forward month by month from `carry.anchor`, starting at offset
    /// `first_offset` months. Returns `true` when the safety cutoff ended
    /// the run.
    fn forecast(
        &self,
        model: &DeclineModel,
        runs: &mut WellRuns,
        carry: Carry,
        first_offset: u32,
        rows: &mut Vec<ForecastRow>,
    ) -> Result<bool, ForecastError> {
        let economics = &model.economics;
        if economics.economic_limit == EconomicLimit::Gor {
            debug!(well = %model.well_id, "GOR economic limit has no stop rule, forecasting to safety cutoff");
        }

        let mut cumulative_oil = carry.cumulative_oil;
        let mut cumulative_gas = carry.cumulative_gas;
        let mut offset = first_offset;
        let before = rows.len();

        let runaway = loop {
            // Offsets from a fixed anchor keep month-end dates from drifting.
            let date = carry
                .anchor
                .checked_add_months(Months::new(offset))
                .ok_or_else(|| ForecastError::DateOverflow(model.well_id.clone()))?;
            offset += 1;

            if date.year() >= self.safety_cutoff_year {
                break true;
            }
            if let EconomicLimit::EndDate(cutoff) = economics.economic_limit {
                if date > cutoff {
                    break false;
                }
            }

            let (oil, gas) = runs.rates_at(date);
            let q_oil = oil.unwrap_or(0.0);
            let q_gas = gas.unwrap_or(0.0);
            let rev = revenue(economics, q_oil, q_gas);

            if economics.economic_limit == EconomicLimit::NetDollars
                && rev.total - economics.operating_expenditures < 0.0
            {
                break false;
            }

            cumulative_oil += q_oil;
            cumulative_gas += q_gas;
            rows.push(ForecastRow {
                well_id: model.well_id.clone(),
                date,
                oil_volume: None,
                gas_volume: None,
                q_oil,
                q_gas,
                error_oil: 0.0,
                error_gas: 0.0,
                cumulative_oil_volume: cumulative_oil,
                cumulative_gas_volume: cumulative_gas,
                cumulative_days: carry.cumulative_days + years_between(carry.anchor, date),
                oil_revenue: rev.oil,
                gas_revenue: rev.gas,
                total_revenue: rev.total,
                discounted_revenue: rev.discounted,
                is_forecast: true,
            });
        };

        let (switch_oil, switch_gas) = runs.switch_times();
        if runaway {
            warn!(
                well = %model.well_id,
                cutoff_year = self.safety_cutoff_year,
                limit = ?economics.economic_limit.limit_type(),
                "Forecast reached safety cutoff without hitting the economic limit"
            );
        }
        debug!(
            well = %model.well_id,
            forecast_rows = rows.len() - before,
            ?switch_oil,
            ?switch_gas,
            "Forecast complete"
        );
        Ok(runaway)
    }
}

// ============================================================================
// Pipeline helpers
// ============================================================================

/// Reject models the engine cannot run and clamp `di = 100`.
fn prepare(mut model: DeclineModel) -> Result<DeclineModel, ForecastError> {
    if !Phase::ALL.iter().any(|&p| model.is_active(p)) {
        return Err(ForecastError::NoActivePhase(model.well_id));
    }
    for phase in Phase::ALL {
        let well_id = model.well_id.clone();
        if let Some(d) = model.phase_mut(phase) {
            if !d.is_finite() {
                return Err(ForecastError::NonFiniteParameters { well_id, phase });
            }
            d.di = clamp_effective_di(d.di);
        }
    }
    Ok(model)
}

/// Predicted rates for every historical period on/after at least one
/// enabled phase's peak.
fn replay(model: &DeclineModel, history: &[&ProductionRecord]) -> (Vec<ForecastRow>, WellRuns) {
    let mut runs = WellRuns::new(model);
    let economics = &model.economics;

    let rows = history
        .iter()
        .filter_map(|r| {
            let (oil, gas) = runs.rates_at(r.date);
            if oil.is_none() && gas.is_none() {
                return None;
            }
            let q_oil = oil.unwrap_or(0.0);
            let q_gas = gas.unwrap_or(0.0);
            let rev = revenue(economics, q_oil, q_gas);
            Some(ForecastRow {
                well_id: model.well_id.clone(),
                date: r.date,
                oil_volume: r.oil_volume,
                gas_volume: r.gas_volume,
                q_oil,
                q_gas,
                error_oil: arps::percent_error(r.volume(Phase::Oil), oil),
                error_gas: arps::percent_error(r.volume(Phase::Gas), gas),
                cumulative_oil_volume: r.cumulative_oil_volume,
                cumulative_gas_volume: r.cumulative_gas_volume,
                cumulative_days: r.cumulative_days,
                oil_revenue: rev.oil,
                gas_revenue: rev.gas,
                total_revenue: rev.total,
                discounted_revenue: rev.discounted,
                is_forecast: false,
            })
        })
        .collect();

    (rows, runs)
}

fn finish(model: DeclineModel, rows: Vec<ForecastRow>, fits: PhaseFits, runaway: bool) -> ForecastOutcome {
    ForecastOutcome {
        summary: WellErrorSummary::from_rows(&model.well_id, &rows),
        rows,
        model,
        fits,
        runaway,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PhaseDecline;

    fn date(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn oil_model(qi: f64, di: f64, b: f64, min_dec: f64, peak: NaiveDate) -> DeclineModel {
        DeclineModel {
            well_id: "W-1".to_string(),
            oil: Some(PhaseDecline {
                qi,
                peak_date: peak,
                di,
                b,
                min_dec,
                one_year_rate: 0.0,
            }),
            gas: None,
            economics: Economics {
                net_price_oil: 50.0,
                economic_limit: EconomicLimit::EndDate(date(2030, 1)),
                ..Default::default()
            },
        }
    }

    /// Monthly history generated from a pure hyperbolic curve.
    fn synthetic_history(
        peak: NaiveDate,
        months_before: u32,
        months: u32,
        qi: f64,
        nominal_di: f64,
        b: f64,
    ) -> Vec<ProductionRecord> {
        let first = peak.checked_sub_months(Months::new(months_before)).unwrap();
        let mut cumulative = 0.0;
        (0..months_before + months)
            .map(|i| {
                let d = first.checked_add_months(Months::new(i)).unwrap();
                let v = if d < peak {
                    qi * 0.5
                } else {
                    arps::arps_rate(qi, nominal_di, b, years_between(peak, d))
                };
                cumulative += v;
                ProductionRecord {
                    well_id: "W-1".to_string(),
                    date: d,
                    oil_volume: Some(v),
                    gas_volume: None,
                    cumulative_oil_volume: cumulative,
                    cumulative_gas_volume: 0.0,
                    cumulative_days: years_between(first, d),
                }
            })
            .collect()
    }

    #[test]
    fn test_replay_excludes_pre_peak_periods() {
        let peak = date(2020, 1);
        let model = oil_model(1000.0, 40.0, 0.5, 6.0, peak);
        let history = synthetic_history(peak, 3, 24, 1000.0, model.oil.as_ref().unwrap().nominal_di(), 0.5);

        let outcome = DeclineForecastEngine::default()
            .replay_and_fit(model, &history, false)
            .unwrap();
        let hist: Vec<_> = outcome.historical_rows().collect();
        assert_eq!(hist.len(), 24);
        assert_eq!(hist[0].date, peak);
        assert!((hist[0].q_oil - 1000.0).abs() < 1e-9);
        // Model matches the generator exactly
        assert!(outcome.summary.sum_error_oil < 1e-6);
        assert_eq!(outcome.summary.sum_error_gas, 0.0);
    }

    #[test]
    fn test_forecast_follows_history_and_carries_cumulatives() {
        let peak = date(2020, 1);
        let model = oil_model(1000.0, 40.0, 0.5, 6.0, peak);
        let history = synthetic_history(peak, 0, 12, 1000.0, model.oil.as_ref().unwrap().nominal_di(), 0.5);
        let last = history.last().unwrap().clone();

        let outcome = DeclineForecastEngine::default()
            .replay_and_fit(model, &history, false)
            .unwrap();
        let forecast: Vec<_> = outcome.forecast_rows().collect();
        assert_eq!(forecast[0].date, date(2021, 1));
        assert!(forecast[0].oil_volume.is_none());
        assert!(
            (forecast[0].cumulative_oil_volume - (last.cumulative_oil_volume + forecast[0].q_oil)).abs() < 1e-6
        );
        assert!(forecast[0].cumulative_days > last.cumulative_days);
        // End Date limit of 2030-01-01 is inclusive
        assert_eq!(forecast.last().unwrap().date, date(2030, 1));
        assert!(!outcome.runaway);
    }

    #[test]
    fn test_forecast_continues_exponential_tail() {
        // Aggressive terminal decline forces the switch inside the history
        let peak = date(2018, 1);
        let mut model = oil_model(5000.0, 80.0, 0.9, 40.0, peak);
        model.economics.economic_limit = EconomicLimit::EndDate(date(2024, 1));
        let nominal = model.oil.as_ref().unwrap().nominal_di();
        let history = synthetic_history(peak, 0, 48, 5000.0, nominal, 0.9);

        let outcome = DeclineForecastEngine::default()
            .replay_and_fit(model, &history, false)
            .unwrap();
        let forecast: Vec<_> = outcome.forecast_rows().collect();
        for pair in forecast.windows(2) {
            let dt = years_between(pair[0].date, pair[1].date);
            let ratio = pair[1].q_oil / pair[0].q_oil;
            assert!((ratio - (-0.4 * dt).exp()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_refit_recovers_parameters() {
        let peak = date(2019, 1);
        let history = synthetic_history(peak, 2, 36, 1200.0, 1.6, 0.6);
        let model = oil_model(1000.0, 55.0, 0.5, 6.0, peak);

        let outcome = DeclineForecastEngine::default()
            .replay_and_fit(model, &history, true)
            .unwrap();
        match outcome.fits.oil {
            FitStatus::Accepted { qi, nominal_di, b } => {
                assert!((qi - 1200.0).abs() / 1200.0 < 1e-2, "qi = {qi}");
                assert!((nominal_di - 1.6).abs() < 5e-2, "Di = {nominal_di}");
                assert!((b - 0.6).abs() < 3e-2, "b = {b}");
            }
            ref other => panic!("expected accepted fit, got {other:?}"),
        }
        let oil = outcome.model.oil.as_ref().unwrap();
        assert!((oil.nominal_di() - 1.6).abs() < 5e-2);
        assert_eq!(outcome.fits.gas, FitStatus::NotRequested);
        assert!(outcome.summary.sum_error_oil < 0.5);
    }

    #[test]
    fn test_refit_failure_keeps_prior_parameters() {
        let peak = date(2019, 1);
        let history = synthetic_history(peak, 0, 2, 1000.0, 1.5, 0.5);
        let model = oil_model(1000.0, 40.0, 0.5, 6.0, peak);
        let before = model.oil.clone();

        let outcome = DeclineForecastEngine::default()
            .replay_and_fit(model, &history, true)
            .unwrap();
        assert!(outcome.fits.oil.is_failure());
        assert_eq!(outcome.model.oil, before);
    }

    #[test]
    fn test_project_planned_starts_at_peak() {
        let peak = date(2025, 6);
        let model = oil_model(800.0, 30.0, 0.4, 6.0, peak);
        let outcome = DeclineForecastEngine::default().project_planned(model).unwrap();
        assert_eq!(outcome.rows[0].date, peak);
        assert_eq!(outcome.rows[0].q_oil, 800.0);
        assert_eq!(outcome.rows[0].cumulative_oil_volume, 800.0);
        assert!(outcome.rows.iter().all(|r| r.is_forecast));
        assert_eq!(outcome.summary.sum_error_oil, 0.0);
    }

    #[test]
    fn test_history_without_matching_rows_projects_planned() {
        let peak = date(2025, 6);
        let model = oil_model(800.0, 30.0, 0.4, 6.0, peak);
        let other = synthetic_history(date(2020, 1), 0, 5, 100.0, 1.2, 0.5)
            .into_iter()
            .map(|mut r| {
                r.well_id = "OTHER".to_string();
                r
            })
            .collect::<Vec<_>>();
        let outcome = DeclineForecastEngine::default()
            .replay_and_fit(model, &other, true)
            .unwrap();
        assert_eq!(outcome.rows[0].date, peak);
        assert_eq!(outcome.fits, PhaseFits::default());
    }

    #[test]
    fn test_revenue_uses_net_price_and_flat_discount() {
        let peak = date(2025, 1);
        let mut model = oil_model(1000.0, 30.0, 0.5, 6.0, peak);
        model.economics.discount_rate = 10.0;
        let outcome = DeclineForecastEngine::default().project_planned(model).unwrap();
        for row in outcome.rows.iter().take(5) {
            assert!((row.oil_revenue - row.q_oil * 50.0).abs() < 1e-9);
            assert_eq!(row.gas_revenue, 0.0);
            assert!((row.discounted_revenue - row.total_revenue / 1.1).abs() < 1e-9);
        }
    }

    #[test]
    fn test_safety_cutoff_flags_runaway() {
        let mut model = oil_model(100.0, 10.0, 0.5, 6.0, date(2020, 1));
        model.economics.economic_limit = EconomicLimit::Gor;
        let engine = DeclineForecastEngine::new(FitSettings::default(), 2030);
        let outcome = engine.project_planned(model).unwrap();
        assert!(outcome.runaway);
        assert_eq!(outcome.rows.last().unwrap().date, date(2029, 12));
    }

    #[test]
    fn test_model_without_phases_rejected() {
        let mut model = oil_model(100.0, 10.0, 0.5, 6.0, date(2020, 1));
        model.oil = None;
        assert_eq!(
            DeclineForecastEngine::default().project_planned(model),
            Err(ForecastError::NoActivePhase("W-1".to_string()))
        );
    }

    #[test]
    fn test_non_finite_parameters_rejected() {
        let mut model = oil_model(f64::NAN, 10.0, 0.5, 6.0, date(2020, 1));
        model.economics.economic_limit = EconomicLimit::NetDollars;
        assert!(matches!(
            DeclineForecastEngine::default().project_planned(model),
            Err(ForecastError::NonFiniteParameters { phase: Phase::Oil, .. })
        ));
    }

    #[test]
    fn test_gas_peak_after_history_contributes_zero() {
        let peak = date(2020, 1);
        let mut model = oil_model(1000.0, 40.0, 0.5, 6.0, peak);
        model.gas = Some(PhaseDecline {
            qi: 2000.0,
            peak_date: date(2022, 1),
            di: 30.0,
            b: 0.5,
            min_dec: 6.0,
            one_year_rate: 0.0,
        });
        let history = synthetic_history(peak, 0, 12, 1000.0, 0.8, 0.5);
        let outcome = DeclineForecastEngine::default()
            .replay_and_fit(model, &history, false)
            .unwrap();
        assert!(outcome.historical_rows().all(|r| r.q_gas == 0.0));
        let first_gas = outcome.forecast_rows().find(|r| r.q_gas > 0.0).unwrap();
        assert_eq!(first_gas.date, date(2022, 1));
        assert_eq!(first_gas.q_gas, 2000.0);
    }
}
