//! Decline model records: the typed per-well model and its flat persistence row
//!
//! `DeclineModel` is what the engine works on. `ModelRecord` is the flat,
//! all-optional row exchanged with the persistence layer; it is validated
//! exactly once, in `DeclineModel::try_from`.

use super::Phase;
use crate::decline::arps;
use crate::error::ModelError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Tag written to `model_oil` / `model_gas`. Historical naming: the engine
/// applies hyperbolic decline with an exponential tail regardless.
pub const MODEL_TAG: &str = "exponential";

/// Largest effective decline the engine accepts. 100% would make the
/// nominal conversion blow up.
pub const MAX_EFFECTIVE_DI: f64 = 99.0;

/// Clamp an effective decline of exactly 100% down to 99%.
pub fn clamp_effective_di(di: f64) -> f64 {
    if di >= 100.0 {
        MAX_EFFECTIVE_DI
    } else {
        di
    }
}

// ============================================================================
// Phase parameters
// ============================================================================

/// Arps parameters for one phase of one well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseDecline {
    /// Peak rate (qi), volume per period.
    pub qi: f64,
    /// Date of the peak; forecast time zero for this phase.
    pub peak_date: NaiveDate,
    /// Effective annual decline, percent in [0, 100).
    pub di: f64,
    /// Arps hyperbolic exponent.
    pub b: f64,
    /// Terminal nominal decline (percent) that triggers the exponential tail.
    pub min_dec: f64,
    /// Rate eleven periods after the peak, as seen by the estimator.
    #[serde(default)]
    pub one_year_rate: f64,
}

impl PhaseDecline {
    /// Nominal decline used by the closed-form Arps equation.
    pub fn nominal_di(&self) -> f64 {
        arps::effective_to_nominal(self.di, self.b)
    }

    /// Store a fitted nominal decline back in effective form.
    pub fn set_nominal_di(&mut self, nominal_di: f64) {
        self.di = clamp_effective_di(arps::nominal_to_effective(nominal_di, self.b));
    }

    pub fn is_finite(&self) -> bool {
        self.qi.is_finite() && self.di.is_finite() && self.b.is_finite() && self.min_dec.is_finite()
    }
}

// ============================================================================
// Economics
// ============================================================================

/// Economic limit selector as stored on the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EconomicLimitType {
    #[default]
    #[serde(rename = "Net Dollars")]
    NetDollars,
    #[serde(rename = "End Date")]
    EndDate,
    #[serde(rename = "GOR")]
    Gor,
}

/// Forecast stop rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EconomicLimit {
    /// Stop once period net revenue falls below operating expenditures.
    NetDollars,
    /// Stop once the period date passes the cutoff.
    EndDate(NaiveDate),
    /// Selectable but carries no stop condition; runs to the safety cutoff.
    Gor,
}

impl EconomicLimit {
    pub fn limit_type(&self) -> EconomicLimitType {
        match self {
            EconomicLimit::NetDollars => EconomicLimitType::NetDollars,
            EconomicLimit::EndDate(_) => EconomicLimitType::EndDate,
            EconomicLimit::Gor => EconomicLimitType::Gor,
        }
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        match self {
            EconomicLimit::EndDate(d) => Some(*d),
            _ => None,
        }
    }
}

/// Per-well economics. Percent fields are 0-100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Economics {
    pub oil_price: f64,
    pub gas_price: f64,
    pub oil_price_dif: f64,
    pub gas_price_dif: f64,
    pub net_price_oil: f64,
    pub net_price_gas: f64,
    pub working_interest: f64,
    pub royalty: f64,
    pub discount_rate: f64,
    pub tax_rate: f64,
    pub capital_expenditures: f64,
    pub operating_expenditures: f64,
    pub economic_limit: EconomicLimit,
}

impl Default for Economics {
    fn default() -> Self {
        Self {
            oil_price: 0.0,
            gas_price: 0.0,
            oil_price_dif: 0.0,
            gas_price_dif: 0.0,
            net_price_oil: 0.0,
            net_price_gas: 0.0,
            working_interest: 100.0,
            royalty: 0.0,
            discount_rate: 0.0,
            tax_rate: 0.0,
            capital_expenditures: 0.0,
            operating_expenditures: 0.0,
            economic_limit: EconomicLimit::NetDollars,
        }
    }
}

impl Economics {
    /// Net price per unit after differential, working interest and royalty.
    pub fn derive_net_price(price: f64, price_dif: f64, working_interest: f64, royalty: f64) -> f64 {
        (price - price_dif) * (working_interest / 100.0) * (1.0 - royalty / 100.0)
    }

    pub fn net_price(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Oil => self.net_price_oil,
            Phase::Gas => self.net_price_gas,
        }
    }

    /// Flat per-period discount factor `1 / (1 + rate/100)`.
    ///
    /// Not compounded by elapsed time; NPV outputs downstream depend on this.
    pub fn discount_factor(&self) -> f64 {
        1.0 / (1.0 + self.discount_rate / 100.0)
    }
}

// ============================================================================
// Typed model
// ============================================================================

/// Decline model for one well. A `None` phase is not modelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclineModel {
    pub well_id: String,
    pub oil: Option<PhaseDecline>,
    pub gas: Option<PhaseDecline>,
    pub economics: Economics,
}

impl DeclineModel {
    pub fn phase(&self, phase: Phase) -> Option<&PhaseDecline> {
        match phase {
            Phase::Oil => self.oil.as_ref(),
            Phase::Gas => self.gas.as_ref(),
        }
    }

    pub fn phase_mut(&mut self, phase: Phase) -> Option<&mut PhaseDecline> {
        match phase {
            Phase::Oil => self.oil.as_mut(),
            Phase::Gas => self.gas.as_mut(),
        }
    }

    pub fn is_active(&self, phase: Phase) -> bool {
        self.phase(phase).is_some()
    }

    /// Earliest peak date across active phases.
    pub fn forecast_start(&self) -> Option<NaiveDate> {
        Phase::ALL
            .iter()
            .filter_map(|&p| self.phase(p).map(|d| d.peak_date))
            .min()
    }
}

// ============================================================================
// Flat record (persistence boundary)
// ============================================================================

/// Flat model row as stored by the persistence layer. Every field is
/// optional on input so that partially edited rows still deserialize;
/// `DeclineModel::try_from` decides what is actually required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelRecord {
    pub well_id: String,

    pub max_oil_production: Option<f64>,
    pub max_gas_production: Option<f64>,
    pub max_oil_production_date: Option<NaiveDate>,
    pub max_gas_production_date: Option<NaiveDate>,
    pub one_year_oil_production: Option<f64>,
    pub one_year_gas_production: Option<f64>,
    pub di_oil: Option<f64>,
    pub di_gas: Option<f64>,
    pub oil_b_factor: Option<f64>,
    pub gas_b_factor: Option<f64>,
    pub min_dec_oil: Option<f64>,
    pub min_dec_gas: Option<f64>,
    pub oil_model_status: Option<bool>,
    pub gas_model_status: Option<bool>,
    pub model_oil: Option<String>,
    pub model_gas: Option<String>,

    pub oil_price: Option<f64>,
    pub gas_price: Option<f64>,
    pub oil_price_dif: Option<f64>,
    pub gas_price_dif: Option<f64>,
    pub net_price_oil: Option<f64>,
    pub net_price_gas: Option<f64>,
    pub working_interest: Option<f64>,
    pub royalty: Option<f64>,
    pub discount_rate: Option<f64>,
    pub tax_rate: Option<f64>,
    pub capital_expenditures: Option<f64>,
    pub operating_expenditures: Option<f64>,
    pub economic_limit_type: Option<EconomicLimitType>,
    pub economic_limit_date: Option<NaiveDate>,
}

/// Borrowed view of one phase's columns on a `ModelRecord`.
struct PhaseColumns<'a> {
    status: Option<bool>,
    qi: Option<f64>,
    qi_field: &'static str,
    date: Option<NaiveDate>,
    date_field: &'static str,
    di: Option<f64>,
    di_field: &'static str,
    b: Option<f64>,
    b_field: &'static str,
    min_dec: Option<f64>,
    min_dec_field: &'static str,
    one_year: Option<f64>,
    well_id: &'a str,
}

impl ModelRecord {
    fn columns(&self, phase: Phase) -> PhaseColumns<'_> {
        match phase {
            Phase::Oil => PhaseColumns {
                status: self.oil_model_status,
                qi: self.max_oil_production,
                qi_field: "max_oil_production",
                date: self.max_oil_production_date,
                date_field: "max_oil_production_date",
                di: self.di_oil,
                di_field: "di_oil",
                b: self.oil_b_factor,
                b_field: "oil_b_factor",
                min_dec: self.min_dec_oil,
                min_dec_field: "min_dec_oil",
                one_year: self.one_year_oil_production,
                well_id: &self.well_id,
            },
            Phase::Gas => PhaseColumns {
                status: self.gas_model_status,
                qi: self.max_gas_production,
                qi_field: "max_gas_production",
                date: self.max_gas_production_date,
                date_field: "max_gas_production_date",
                di: self.di_gas,
                di_field: "di_gas",
                b: self.gas_b_factor,
                b_field: "gas_b_factor",
                min_dec: self.min_dec_gas,
                min_dec_field: "min_dec_gas",
                one_year: self.one_year_gas_production,
                well_id: &self.well_id,
            },
        }
    }
}

fn require<T>(value: Option<T>, well_id: &str, field: &'static str) -> Result<T, ModelError> {
    value.ok_or_else(|| ModelError::MissingField {
        well_id: well_id.to_string(),
        field,
    })
}

fn check(
    ok: bool,
    well_id: &str,
    field: &'static str,
    value: f64,
    reason: &'static str,
) -> Result<(), ModelError> {
    if ok {
        Ok(())
    } else {
        Err(ModelError::InvalidValue {
            well_id: well_id.to_string(),
            field,
            value,
            reason,
        })
    }
}

fn phase_from_columns(c: &PhaseColumns<'_>) -> Result<Option<PhaseDecline>, ModelError> {
    // Missing status with no peak rate reads as "not modelled".
    let active = c.status.unwrap_or(c.qi.is_some());
    if !active {
        return Ok(None);
    }

    let qi = require(c.qi, c.well_id, c.qi_field)?;
    let peak_date = require(c.date, c.well_id, c.date_field)?;
    let di = require(c.di, c.well_id, c.di_field)?;
    let b = require(c.b, c.well_id, c.b_field)?;
    let min_dec = require(c.min_dec, c.well_id, c.min_dec_field)?;

    check(qi.is_finite() && qi >= 0.0, c.well_id, c.qi_field, qi, "must be finite and >= 0")?;
    check(
        di.is_finite() && (0.0..=100.0).contains(&di),
        c.well_id,
        c.di_field,
        di,
        "must be within [0, 100]",
    )?;
    check(b.is_finite() && b >= 0.0, c.well_id, c.b_field, b, "must be finite and >= 0")?;
    check(
        min_dec.is_finite() && (0.0..100.0).contains(&min_dec),
        c.well_id,
        c.min_dec_field,
        min_dec,
        "must be within [0, 100)",
    )?;

    Ok(Some(PhaseDecline {
        qi,
        peak_date,
        di: clamp_effective_di(di),
        b,
        min_dec,
        one_year_rate: c.one_year.filter(|v| v.is_finite()).unwrap_or(0.0),
    }))
}

impl TryFrom<&ModelRecord> for DeclineModel {
    type Error = ModelError;

    fn try_from(r: &ModelRecord) -> Result<Self, Self::Error> {
        if r.well_id.trim().is_empty() {
            return Err(ModelError::MissingField {
                well_id: String::new(),
                field: "well_id",
            });
        }

        let oil = phase_from_columns(&r.columns(Phase::Oil))?;
        let gas = phase_from_columns(&r.columns(Phase::Gas))?;

        let defaults = Economics::default();
        let working_interest = r.working_interest.unwrap_or(defaults.working_interest);
        let royalty = r.royalty.unwrap_or(defaults.royalty);
        let oil_price = r.oil_price.unwrap_or(0.0);
        let gas_price = r.gas_price.unwrap_or(0.0);
        let oil_price_dif = r.oil_price_dif.unwrap_or(0.0);
        let gas_price_dif = r.gas_price_dif.unwrap_or(0.0);

        let economic_limit = match r.economic_limit_type.unwrap_or_default() {
            EconomicLimitType::NetDollars => EconomicLimit::NetDollars,
            EconomicLimitType::Gor => EconomicLimit::Gor,
            EconomicLimitType::EndDate => EconomicLimit::EndDate(require(
                r.economic_limit_date,
                &r.well_id,
                "economic_limit_date",
            )?),
        };

        let economics = Economics {
            oil_price,
            gas_price,
            oil_price_dif,
            gas_price_dif,
            net_price_oil: r.net_price_oil.unwrap_or_else(|| {
                Economics::derive_net_price(oil_price, oil_price_dif, working_interest, royalty)
            }),
            net_price_gas: r.net_price_gas.unwrap_or_else(|| {
                Economics::derive_net_price(gas_price, gas_price_dif, working_interest, royalty)
            }),
            working_interest,
            royalty,
            discount_rate: r.discount_rate.unwrap_or(0.0),
            tax_rate: r.tax_rate.unwrap_or(0.0),
            capital_expenditures: r.capital_expenditures.unwrap_or(0.0),
            operating_expenditures: r.operating_expenditures.unwrap_or(0.0),
            economic_limit,
        };

        for (field, value) in [
            ("net_price_oil", economics.net_price_oil),
            ("net_price_gas", economics.net_price_gas),
            ("discount_rate", economics.discount_rate),
            ("operating_expenditures", economics.operating_expenditures),
        ] {
            check(value.is_finite(), &r.well_id, field, value, "must be finite")?;
        }
        check(
            economics.discount_rate > -100.0,
            &r.well_id,
            "discount_rate",
            economics.discount_rate,
            "must be > -100",
        )?;

        Ok(DeclineModel {
            well_id: r.well_id.clone(),
            oil,
            gas,
            economics,
        })
    }
}

impl TryFrom<ModelRecord> for DeclineModel {
    type Error = ModelError;

    fn try_from(r: ModelRecord) -> Result<Self, Self::Error> {
        DeclineModel::try_from(&r)
    }
}

impl From<&DeclineModel> for ModelRecord {
    fn from(m: &DeclineModel) -> Self {
        let e = &m.economics;
        let qi = |p: Option<&PhaseDecline>| Some(p.map_or(0.0, |d| d.qi));
        let oil = m.oil.as_ref();
        let gas = m.gas.as_ref();
        ModelRecord {
            well_id: m.well_id.clone(),
            max_oil_production: qi(oil),
            max_gas_production: qi(gas),
            max_oil_production_date: oil.map(|d| d.peak_date),
            max_gas_production_date: gas.map(|d| d.peak_date),
            one_year_oil_production: Some(oil.map_or(0.0, |d| d.one_year_rate)),
            one_year_gas_production: Some(gas.map_or(0.0, |d| d.one_year_rate)),
            di_oil: Some(oil.map_or(0.0, |d| d.di)),
            di_gas: Some(gas.map_or(0.0, |d| d.di)),
            oil_b_factor: Some(oil.map_or(0.0, |d| d.b)),
            gas_b_factor: Some(gas.map_or(0.0, |d| d.b)),
            min_dec_oil: Some(oil.map_or(0.0, |d| d.min_dec)),
            min_dec_gas: Some(gas.map_or(0.0, |d| d.min_dec)),
            oil_model_status: Some(oil.is_some()),
            gas_model_status: Some(gas.is_some()),
            model_oil: Some(MODEL_TAG.to_string()),
            model_gas: Some(MODEL_TAG.to_string()),
            oil_price: Some(e.oil_price),
            gas_price: Some(e.gas_price),
            oil_price_dif: Some(e.oil_price_dif),
            gas_price_dif: Some(e.gas_price_dif),
            net_price_oil: Some(e.net_price_oil),
            net_price_gas: Some(e.net_price_gas),
            working_interest: Some(e.working_interest),
            royalty: Some(e.royalty),
            discount_rate: Some(e.discount_rate),
            tax_rate: Some(e.tax_rate),
            capital_expenditures: Some(e.capital_expenditures),
            operating_expenditures: Some(e.operating_expenditures),
            economic_limit_type: Some(e.economic_limit.limit_type()),
            economic_limit_date: e.economic_limit.end_date(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn oil_only_record() -> ModelRecord {
        ModelRecord {
            well_id: "W-1".to_string(),
            max_oil_production: Some(1000.0),
            max_oil_production_date: Some(date(2020, 1)),
            di_oil: Some(40.0),
            oil_b_factor: Some(0.5),
            min_dec_oil: Some(6.0),
            oil_model_status: Some(true),
            gas_model_status: Some(false),
            net_price_oil: Some(50.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_record_to_model_oil_only() {
        let model = DeclineModel::try_from(&oil_only_record()).unwrap();
        assert!(model.is_active(Phase::Oil));
        assert!(!model.is_active(Phase::Gas));
        assert_eq!(model.economics.net_price_oil, 50.0);
        assert_eq!(model.economics.economic_limit, EconomicLimit::NetDollars);
        assert_eq!(model.forecast_start(), Some(date(2020, 1)));
    }

    #[test]
    fn test_missing_peak_date_is_malformed() {
        let mut r = oil_only_record();
        r.max_oil_production_date = None;
        let err = DeclineModel::try_from(&r).unwrap_err();
        assert_eq!(
            err,
            ModelError::MissingField {
                well_id: "W-1".to_string(),
                field: "max_oil_production_date"
            }
        );
    }

    #[test]
    fn test_di_of_exactly_100_clamps_to_99() {
        let mut r = oil_only_record();
        r.di_oil = Some(100.0);
        let model = DeclineModel::try_from(&r).unwrap();
        assert_eq!(model.oil.unwrap().di, 99.0);
    }

    #[test]
    fn test_di_above_100_rejected() {
        let mut r = oil_only_record();
        r.di_oil = Some(120.0);
        assert!(matches!(
            DeclineModel::try_from(&r),
            Err(ModelError::InvalidValue { field: "di_oil", .. })
        ));
    }

    #[test]
    fn test_end_date_limit_requires_date() {
        let mut r = oil_only_record();
        r.economic_limit_type = Some(EconomicLimitType::EndDate);
        assert!(matches!(
            DeclineModel::try_from(&r),
            Err(ModelError::MissingField { field: "economic_limit_date", .. })
        ));
        r.economic_limit_date = Some(date(2030, 1));
        let model = DeclineModel::try_from(&r).unwrap();
        assert_eq!(model.economics.economic_limit, EconomicLimit::EndDate(date(2030, 1)));
    }

    #[test]
    fn test_net_price_derived_when_absent() {
        let mut r = oil_only_record();
        r.net_price_oil = None;
        r.oil_price = Some(80.0);
        r.oil_price_dif = Some(5.0);
        r.working_interest = Some(50.0);
        r.royalty = Some(20.0);
        let model = DeclineModel::try_from(&r).unwrap();
        // (80 - 5) * 0.5 * 0.8
        assert!((model.economics.net_price_oil - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_disabled_phase_written_back_as_zeros() {
        let model = DeclineModel::try_from(&oil_only_record()).unwrap();
        let back = ModelRecord::from(&model);
        assert_eq!(back.gas_model_status, Some(false));
        assert_eq!(back.max_gas_production, Some(0.0));
        assert_eq!(back.max_gas_production_date, None);
        assert_eq!(back.model_oil.as_deref(), Some(MODEL_TAG));
        assert_eq!(DeclineModel::try_from(&back).unwrap(), model);
    }

    #[test]
    fn test_economic_limit_type_serde_names() {
        let json = serde_json::to_string(&EconomicLimitType::NetDollars).unwrap();
        assert_eq!(json, "\"Net Dollars\"");
        let parsed: EconomicLimitType = serde_json::from_str("\"End Date\"").unwrap();
        assert_eq!(parsed, EconomicLimitType::EndDate);
    }
}
