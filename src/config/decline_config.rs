//! Default Properties - global decline and economic defaults as TOML values
//!
//! Every value the estimator stamps onto a fresh well model lives here.
//! Each struct implements `Default` with the built-in values from
//! `config::defaults`, so a missing file still yields a usable model set.

use crate::types::{EconomicLimit, EconomicLimitType, Economics, Phase};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "WELL_DECLINE_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "decline_defaults.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Global defaults applied to every well by the estimator.
///
/// Load with `DefaultProperties::load()` which searches:
/// 1. `$WELL_DECLINE_CONFIG` env var
/// 2. `./decline_defaults.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultProperties {
    /// Arps defaults and the refit switch
    #[serde(default)]
    pub decline: DeclineDefaults,

    /// Prices, interests and economic limit
    #[serde(default)]
    pub economics: EconomicDefaults,

    /// Curve-fit bounds and solver tuning
    #[serde(default)]
    pub fit: FitConfig,

    /// Forecast loop limits
    #[serde(default)]
    pub forecast: ForecastConfig,
}

impl DefaultProperties {
    /// Load configuration using the standard search order:
    /// 1. `$WELL_DECLINE_CONFIG` environment variable
    /// 2. `./decline_defaults.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded decline defaults from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load decline defaults, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        // 2. Check ./decline_defaults.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded decline defaults from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys only warn.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Decline defaults saved");
        Ok(())
    }

    /// Validate every section, collecting all violations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let d = &self.decline;
        for (name, b) in [("decline.oil_b_factor", d.oil_b_factor), ("decline.gas_b_factor", d.gas_b_factor)] {
            if !(0.0..=1.0).contains(&b) {
                errors.push(format!("{name} ({b}) must be within [0, 1]"));
            }
        }
        for (name, m) in [("decline.min_dec_oil", d.min_dec_oil), ("decline.min_dec_gas", d.min_dec_gas)] {
            if !(0.0..100.0).contains(&m) {
                errors.push(format!("{name} ({m}) must be within [0, 100)"));
            }
        }

        let e = &self.economics;
        for (name, pct) in [
            ("economics.working_interest", e.working_interest),
            ("economics.royalty", e.royalty),
            ("economics.tax_rate", e.tax_rate),
        ] {
            if !(0.0..=100.0).contains(&pct) {
                errors.push(format!("{name} ({pct}) must be a percentage within [0, 100]"));
            }
        }
        if e.discount_rate <= -100.0 {
            errors.push(format!(
                "economics.discount_rate ({}) must be > -100",
                e.discount_rate
            ));
        }
        if e.economic_limit_type == EconomicLimitType::EndDate && e.economic_limit_date.is_none() {
            errors.push(
                "economics.economic_limit_date is required when economic_limit_type = \"End Date\""
                    .to_string(),
            );
        }

        let f = &self.fit;
        if !(f.b_min > 0.0 && f.b_min < f.b_max && f.b_max < 1.0) {
            errors.push(format!(
                "fit.b_min ({}) and fit.b_max ({}) must satisfy 0 < b_min < b_max < 1",
                f.b_min, f.b_max
            ));
        }
        for (name, margin) in [
            ("fit.oil_qi_lower_margin", f.oil_qi_lower_margin),
            ("fit.oil_qi_upper_margin", f.oil_qi_upper_margin),
            ("fit.gas_qi_lower_margin", f.gas_qi_lower_margin),
            ("fit.gas_qi_upper_margin", f.gas_qi_upper_margin),
        ] {
            if margin < 0.0 {
                errors.push(format!("{name} ({margin}) cannot be negative"));
            }
        }
        if f.min_nominal_decline < 0.0 {
            errors.push(format!(
                "fit.min_nominal_decline ({}) cannot be negative",
                f.min_nominal_decline
            ));
        }
        if f.max_iterations == 0 {
            errors.push("fit.max_iterations must be > 0".to_string());
        }
        if f.tolerance <= 0.0 {
            errors.push("fit.tolerance must be > 0".to_string());
        }

        if self.forecast.safety_cutoff_year <= 1900 {
            errors.push(format!(
                "forecast.safety_cutoff_year ({}) must be > 1900",
                self.forecast.safety_cutoff_year
            ));
        }

        // Physical range warnings
        for w in super::validation::validate_economic_ranges(self) {
            warn!("{}", w);
        }

        // Reject NaN/Inf in any config value (sweep all f64 fields via serialization)
        if let Ok(s) = toml::to_string(self) {
            if s.contains("nan") || s.contains("inf") {
                errors.push("Config contains NaN or Inf values; all defaults must be finite numbers".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Typed economics stamped onto every estimated well.
    pub fn economics(&self) -> Result<Economics, ConfigError> {
        let e = &self.economics;
        let economic_limit = match e.economic_limit_type {
            EconomicLimitType::NetDollars => EconomicLimit::NetDollars,
            EconomicLimitType::Gor => EconomicLimit::Gor,
            EconomicLimitType::EndDate => match e.economic_limit_date {
                Some(date) => EconomicLimit::EndDate(date),
                None => {
                    return Err(ConfigError::Validation(vec![
                        "economics.economic_limit_date is required for \"End Date\"".to_string(),
                    ]))
                }
            },
        };

        Ok(Economics {
            oil_price: e.oil_price,
            gas_price: e.gas_price,
            oil_price_dif: e.oil_price_dif,
            gas_price_dif: e.gas_price_dif,
            net_price_oil: e.net_price(Phase::Oil),
            net_price_gas: e.net_price(Phase::Gas),
            working_interest: e.working_interest,
            royalty: e.royalty,
            discount_rate: e.discount_rate,
            tax_rate: e.tax_rate,
            capital_expenditures: e.capital_expenditures,
            operating_expenditures: e.operating_expenditures,
            economic_limit,
        })
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Decline Defaults
// ============================================================================

/// b-factors and terminal declines applied identically to every well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclineDefaults {
    #[serde(default = "default_b_factor")]
    pub oil_b_factor: f64,

    #[serde(default = "default_b_factor")]
    pub gas_b_factor: f64,

    /// Terminal nominal decline, percent per year
    #[serde(default = "default_min_dec")]
    pub min_dec_oil: f64,

    #[serde(default = "default_min_dec")]
    pub min_dec_gas: f64,

    /// Refit decline parameters against history when forecasting
    #[serde(default)]
    pub iterate: bool,
}

fn default_b_factor() -> f64 { defaults::B_FACTOR }
fn default_min_dec() -> f64 { defaults::MIN_DECLINE_PERCENT }

impl Default for DeclineDefaults {
    fn default() -> Self {
        Self {
            oil_b_factor: default_b_factor(),
            gas_b_factor: default_b_factor(),
            min_dec_oil: default_min_dec(),
            min_dec_gas: default_min_dec(),
            iterate: false,
        }
    }
}

impl DeclineDefaults {
    pub fn b_factor(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Oil => self.oil_b_factor,
            Phase::Gas => self.gas_b_factor,
        }
    }

    pub fn min_dec(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Oil => self.min_dec_oil,
            Phase::Gas => self.min_dec_gas,
        }
    }
}

// ============================================================================
// Economic Defaults
// ============================================================================

/// Economics copied verbatim into every well's model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicDefaults {
    #[serde(default)]
    pub oil_price: f64,

    #[serde(default)]
    pub gas_price: f64,

    #[serde(default)]
    pub oil_price_dif: f64,

    #[serde(default)]
    pub gas_price_dif: f64,

    /// Explicit net oil price; derived from price, differential, WI and royalty when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_price_oil: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_price_gas: Option<f64>,

    /// Working interest, percent
    #[serde(default = "default_working_interest")]
    pub working_interest: f64,

    /// Royalty, percent
    #[serde(default = "default_royalty")]
    pub royalty: f64,

    /// Annual discount rate, percent
    #[serde(default = "default_discount_rate")]
    pub discount_rate: f64,

    #[serde(default)]
    pub tax_rate: f64,

    #[serde(default)]
    pub capital_expenditures: f64,

    /// Operating expenditures per period
    #[serde(default)]
    pub operating_expenditures: f64,

    #[serde(default)]
    pub economic_limit_type: EconomicLimitType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economic_limit_date: Option<NaiveDate>,
}

fn default_working_interest() -> f64 { defaults::WORKING_INTEREST_PERCENT }
fn default_royalty() -> f64 { defaults::ROYALTY_PERCENT }
fn default_discount_rate() -> f64 { defaults::DISCOUNT_RATE_PERCENT }

impl Default for EconomicDefaults {
    fn default() -> Self {
        Self {
            oil_price: 0.0,
            gas_price: 0.0,
            oil_price_dif: 0.0,
            gas_price_dif: 0.0,
            net_price_oil: None,
            net_price_gas: None,
            working_interest: default_working_interest(),
            royalty: default_royalty(),
            discount_rate: default_discount_rate(),
            tax_rate: 0.0,
            capital_expenditures: 0.0,
            operating_expenditures: 0.0,
            economic_limit_type: EconomicLimitType::NetDollars,
            economic_limit_date: None,
        }
    }
}

impl EconomicDefaults {
    /// Explicit net price if configured, otherwise derived from components.
    pub fn net_price(&self, phase: Phase) -> f64 {
        let (explicit, price, dif) = match phase {
            Phase::Oil => (self.net_price_oil, self.oil_price, self.oil_price_dif),
            Phase::Gas => (self.net_price_gas, self.gas_price, self.gas_price_dif),
        };
        explicit.unwrap_or_else(|| {
            Economics::derive_net_price(price, dif, self.working_interest, self.royalty)
        })
    }
}

// ============================================================================
// Fit Config
// ============================================================================

/// Refit bounds. qi margins are absolute volumes around the current qi.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    #[serde(default = "default_oil_qi_lower")]
    pub oil_qi_lower_margin: f64,

    #[serde(default = "default_oil_qi_upper")]
    pub oil_qi_upper_margin: f64,

    #[serde(default = "default_gas_qi_lower")]
    pub gas_qi_lower_margin: f64,

    #[serde(default = "default_gas_qi_upper")]
    pub gas_qi_upper_margin: f64,

    /// Lower bound on fitted nominal decline (fraction per year)
    #[serde(default = "default_min_nominal_decline")]
    pub min_nominal_decline: f64,

    #[serde(default = "default_fit_b_min")]
    pub b_min: f64,

    #[serde(default = "default_fit_b_max")]
    pub b_max: f64,

    #[serde(default = "default_fit_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_fit_tolerance")]
    pub tolerance: f64,
}

fn default_oil_qi_lower() -> f64 { defaults::OIL_QI_LOWER_MARGIN }
fn default_oil_qi_upper() -> f64 { defaults::OIL_QI_UPPER_MARGIN }
fn default_gas_qi_lower() -> f64 { defaults::GAS_QI_LOWER_MARGIN }
fn default_gas_qi_upper() -> f64 { defaults::GAS_QI_UPPER_MARGIN }
fn default_min_nominal_decline() -> f64 { defaults::MIN_NOMINAL_DECLINE }
fn default_fit_b_min() -> f64 { defaults::FIT_B_MIN }
fn default_fit_b_max() -> f64 { defaults::FIT_B_MAX }
fn default_fit_max_iterations() -> usize { defaults::FIT_MAX_ITERATIONS }
fn default_fit_tolerance() -> f64 { defaults::FIT_TOLERANCE }

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            oil_qi_lower_margin: default_oil_qi_lower(),
            oil_qi_upper_margin: default_oil_qi_upper(),
            gas_qi_lower_margin: default_gas_qi_lower(),
            gas_qi_upper_margin: default_gas_qi_upper(),
            min_nominal_decline: default_min_nominal_decline(),
            b_min: default_fit_b_min(),
            b_max: default_fit_b_max(),
            max_iterations: default_fit_max_iterations(),
            tolerance: default_fit_tolerance(),
        }
    }
}

// ============================================================================
// Forecast Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Absolute stop year guarding against runaway forecasts
    #[serde(default = "default_safety_cutoff_year")]
    pub safety_cutoff_year: i32,
}

fn default_safety_cutoff_year() -> i32 { defaults::SAFETY_CUTOFF_YEAR }

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            safety_cutoff_year: default_safety_cutoff_year(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(DefaultProperties::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = DefaultProperties::from_toml_str(
            r#"
[decline]
oil_b_factor = 0.8
iterate = true
"#,
        )
        .unwrap();
        assert_eq!(config.decline.oil_b_factor, 0.8);
        assert_eq!(config.decline.gas_b_factor, defaults::B_FACTOR);
        assert!(config.decline.iterate);
        assert_eq!(config.forecast.safety_cutoff_year, 2200);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = DefaultProperties::default();
        config.decline.oil_b_factor = 1.5;
        config.economics.royalty = 140.0;
        config.fit.max_iterations = 0;
        match config.validate() {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 3, "{errors:?}"),
            other => panic!("expected validation errors, got {other:?}"),
        }
    }

    #[test]
    fn test_end_date_requires_date() {
        let result = DefaultProperties::from_toml_str(
            r#"
[economics]
economic_limit_type = "End Date"
"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));

        let config = DefaultProperties::from_toml_str(
            r#"
[economics]
economic_limit_type = "End Date"
economic_limit_date = "2040-06-01"
"#,
        )
        .unwrap();
        let econ = config.economics().unwrap();
        assert_eq!(
            econ.economic_limit,
            EconomicLimit::EndDate(NaiveDate::from_ymd_opt(2040, 6, 1).unwrap())
        );
    }

    #[test]
    fn test_net_price_explicit_overrides_derived() {
        let mut e = EconomicDefaults {
            oil_price: 70.0,
            working_interest: 100.0,
            royalty: 0.0,
            ..Default::default()
        };
        assert!((e.net_price(Phase::Oil) - 70.0).abs() < 1e-12);
        e.net_price_oil = Some(42.0);
        assert_eq!(e.net_price(Phase::Oil), 42.0);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = DefaultProperties::default();
        config.economics.economic_limit_type = EconomicLimitType::Gor;
        config.economics.net_price_gas = Some(2.5);
        let text = config.to_toml().unwrap();
        let parsed = DefaultProperties::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
