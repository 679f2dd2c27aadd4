//! Batch forecasting across a model set
//!
//! Wells are independent, so each runs its full pipeline on the rayon pool
//! with its own model and row buffer. Results are merged in input order
//! only after every task has finished. A well that fails is recorded in
//! `BatchReport::failures` and the batch carries on.
//!
//! Cancellation is cooperative: each task checks the token once before
//! starting its well. Wells already running finish normally.

use super::engine::DeclineForecastEngine;
use crate::types::{
    group_by_well, BatchReport, DeclineModel, ForecastOutcome, ModelRecord, ProductionRecord,
    WellFailure,
};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Per-well task result before merging.
enum WellResult {
    Done(ForecastOutcome),
    Failed(WellFailure),
    Cancelled(String),
}

impl DeclineForecastEngine {
    /// Run `replay_and_fit` for every model record.
    ///
    /// Malformed records and per-well forecast errors become failures in
    /// the report; nothing here returns an error.
    pub fn run_batch(
        &self,
        records: &[ModelRecord],
        history: &[ProductionRecord],
        refit: bool,
        cancel: &CancellationToken,
    ) -> BatchReport {
        info!(wells = records.len(), history_rows = history.len(), refit, "Batch forecast starting");

        let by_well = group_by_well(history);
        let results: Vec<WellResult> = records
            .par_iter()
            .map(|record| {
                if cancel.is_cancelled() {
                    return WellResult::Cancelled(record.well_id.clone());
                }
                match DeclineModel::try_from(record) {
                    Ok(model) => self.run_well(model, &by_well, refit),
                    Err(e) => {
                        warn!(well = %record.well_id, error = %e, "Skipping well with malformed model");
                        WellResult::Failed(WellFailure {
                            well_id: record.well_id.clone(),
                            reason: e.to_string(),
                        })
                    }
                }
            })
            .collect();

        let report = merge(results, cancel.is_cancelled());
        info!(
            succeeded = report.succeeded(),
            failed = report.failures.len(),
            runaway = report.runaway_wells.len(),
            cancelled = report.cancelled_wells.len(),
            rows = report.rows.len(),
            "Batch forecast finished"
        );
        report
    }

    /// Same as [`run_batch`](Self::run_batch) for models already typed.
    pub fn run_batch_models(
        &self,
        models: Vec<DeclineModel>,
        history: &[ProductionRecord],
        refit: bool,
        cancel: &CancellationToken,
    ) -> BatchReport {
        info!(wells = models.len(), history_rows = history.len(), refit, "Batch forecast starting");

        let by_well = group_by_well(history);
        let results: Vec<WellResult> = models
            .into_par_iter()
            .map(|model| {
                if cancel.is_cancelled() {
                    return WellResult::Cancelled(model.well_id);
                }
                self.run_well(model, &by_well, refit)
            })
            .collect();

        let report = merge(results, cancel.is_cancelled());
        info!(
            succeeded = report.succeeded(),
            failed = report.failures.len(),
            cancelled = report.cancelled_wells.len(),
            "Batch forecast finished"
        );
        report
    }

    fn run_well(
        &self,
        model: DeclineModel,
        by_well: &BTreeMap<&str, Vec<&ProductionRecord>>,
        refit: bool,
    ) -> WellResult {
        let well_id = model.well_id.clone();
        let rows = by_well.get(well_id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        match self.replay_and_fit_rows(model, rows, refit) {
            Ok(outcome) => WellResult::Done(outcome),
            Err(e) => {
                warn!(well = %well_id, error = %e, "Well forecast failed");
                WellResult::Failed(WellFailure {
                    well_id,
                    reason: e.to_string(),
                })
            }
        }
    }
}

fn merge(results: Vec<WellResult>, cancelled: bool) -> BatchReport {
    let mut report = BatchReport {
        cancelled,
        ..Default::default()
    };
    for result in results {
        match result {
            WellResult::Done(outcome) => {
                let well_id = outcome.model.well_id.clone();
                if outcome.runaway {
                    report.runaway_wells.push(well_id.clone());
                }
                report.rows.extend(outcome.rows);
                report.summaries.push(outcome.summary);
                report.fits.push((well_id, outcome.fits));
                report.models.push(outcome.model);
            }
            WellResult::Failed(failure) => report.failures.push(failure),
            WellResult::Cancelled(well_id) => report.cancelled_wells.push(well_id),
        }
    }
    if !report.cancelled_wells.is_empty() {
        report.cancelled = true;
        warn!(wells = report.cancelled_wells.len(), "Batch cancelled before all wells ran");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(well_id: &str) -> ModelRecord {
        ModelRecord {
            well_id: well_id.to_string(),
            max_oil_production: Some(500.0),
            max_oil_production_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            di_oil: Some(35.0),
            oil_b_factor: Some(0.5),
            min_dec_oil: Some(6.0),
            net_price_oil: Some(60.0),
            operating_expenditures: Some(3000.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_outputs_follow_input_order() {
        let records: Vec<_> = ["C", "A", "B"].iter().map(|w| record(w)).collect();
        let report = DeclineForecastEngine::default().run_batch(
            &records,
            &[],
            false,
            &CancellationToken::new(),
        );
        let ids: Vec<_> = report.summaries.iter().map(|s| s.well_id.as_str()).collect();
        assert_eq!(ids, ["C", "A", "B"]);
        assert!(!report.cancelled);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_malformed_record_reported_not_raised() {
        let mut bad = record("BAD");
        bad.di_oil = None;
        let report = DeclineForecastEngine::default().run_batch(
            &[record("OK"), bad],
            &[],
            false,
            &CancellationToken::new(),
        );
        assert_eq!(report.succeeded(), 1);
        assert!(report.is_failed("BAD"));
        assert!(report.failures[0].reason.contains("di_oil"));
        assert_eq!(report.rows_for("BAD").count(), 0);
    }

    #[test]
    fn test_cancelled_token_skips_every_well() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = DeclineForecastEngine::default().run_batch(
            &[record("A"), record("B")],
            &[],
            false,
            &cancel,
        );
        assert!(report.cancelled);
        assert_eq!(report.cancelled_wells.len(), 2);
        assert!(report.rows.is_empty());
    }

    #[test]
    fn test_typed_models_with_no_phase_fail() {
        let mut model = DeclineModel::try_from(&record("X")).unwrap();
        model.oil = None;
        let report = DeclineForecastEngine::default().run_batch_models(
            vec![model],
            &[],
            false,
            &CancellationToken::new(),
        );
        assert!(report.is_failed("X"));
    }
}
