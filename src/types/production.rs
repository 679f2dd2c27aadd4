//! Production history input rows

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fluid phase modelled by the decline engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Oil,
    Gas,
}

impl Phase {
    /// Both phases in reporting order.
    pub const ALL: [Phase; 2] = [Phase::Oil, Phase::Gas];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Oil => "oil",
            Phase::Gas => "gas",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One well's production for one period, as delivered by ingestion.
///
/// Volumes are nullable: a well that never produced gas has `gas_volume = None`
/// on every row. `cumulative_days` is expressed in years since the well's
/// first record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionRecord {
    pub well_id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub oil_volume: Option<f64>,
    #[serde(default)]
    pub gas_volume: Option<f64>,
    #[serde(default)]
    pub cumulative_oil_volume: f64,
    #[serde(default)]
    pub cumulative_gas_volume: f64,
    #[serde(default)]
    pub cumulative_days: f64,
}

impl ProductionRecord {
    /// Volume for a phase, treating NaN the same as a missing value.
    pub fn volume(&self, phase: Phase) -> Option<f64> {
        let v = match phase {
            Phase::Oil => self.oil_volume,
            Phase::Gas => self.gas_volume,
        };
        v.filter(|x| x.is_finite())
    }

    pub fn cumulative(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Oil => self.cumulative_oil_volume,
            Phase::Gas => self.cumulative_gas_volume,
        }
    }
}

/// Group rows by well, each group sorted ascending by date.
///
/// The input slice may interleave wells and arrive in any order.
pub fn group_by_well(history: &[ProductionRecord]) -> BTreeMap<&str, Vec<&ProductionRecord>> {
    let mut wells: BTreeMap<&str, Vec<&ProductionRecord>> = BTreeMap::new();
    for record in history {
        wells.entry(record.well_id.as_str()).or_default().push(record);
    }
    for rows in wells.values_mut() {
        rows.sort_by_key(|r| r.date);
    }
    wells
}
