//! Config validation: unknown-key detection with Levenshtein suggestions
//! and economic range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ": did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for DefaultProperties.
///
/// Maintained by hand to match the struct hierarchy in decline_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [decline]
        "decline",
        "decline.oil_b_factor",
        "decline.gas_b_factor",
        "decline.min_dec_oil",
        "decline.min_dec_gas",
        "decline.iterate",
        // [economics]
        "economics",
        "economics.oil_price",
        "economics.gas_price",
        "economics.oil_price_dif",
        "economics.gas_price_dif",
        "economics.net_price_oil",
        "economics.net_price_gas",
        "economics.working_interest",
        "economics.royalty",
        "economics.discount_rate",
        "economics.tax_rate",
        "economics.capital_expenditures",
        "economics.operating_expenditures",
        "economics.economic_limit_type",
        "economics.economic_limit_date",
        // [fit]
        "fit",
        "fit.oil_qi_lower_margin",
        "fit.oil_qi_upper_margin",
        "fit.gas_qi_lower_margin",
        "fit.gas_qi_upper_margin",
        "fit.min_nominal_decline",
        "fit.b_min",
        "fit.b_max",
        "fit.max_iterations",
        "fit.tolerance",
        // [forecast]
        "forecast",
        "forecast.safety_cutoff_year",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for &k in known {
        let dist = levenshtein(unknown, k);
        if dist > 3 {
            continue;
        }
        // Ties broken alphabetically so suggestions are stable across runs
        let better = match best {
            None => true,
            Some((best_key, best_dist)) => dist < best_dist || (dist == best_dist && k < best_key),
        };
        if better {
            best = Some((k, dist));
        }
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys, it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Economic Range Validation
// ============================================================================

/// Flag suspicious but legal values. Hard errors live in `DefaultProperties::validate`.
pub fn validate_economic_ranges(config: &super::DefaultProperties) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let e = &config.economics;

    let mut warn_range = |field: &str, value: f64, lo: f64, hi: f64, unit: &str| {
        if value < lo || value > hi {
            warnings.push(ValidationWarning {
                field: field.to_string(),
                message: format!(
                    "{field} = {value:.2} is outside typical range ({lo}-{hi} {unit})"
                ),
                suggestion: None,
            });
        }
    };

    warn_range("economics.oil_price", e.oil_price, 0.0, 300.0, "$/bbl");
    warn_range("economics.gas_price", e.gas_price, 0.0, 50.0, "$/mcf");
    warn_range("economics.discount_rate", e.discount_rate, 0.0, 50.0, "%");

    // Net price above the posted price means differential/royalty inputs are off
    for (field, net, price) in [
        ("economics.net_price_oil", e.net_price_oil, e.oil_price),
        ("economics.net_price_gas", e.net_price_gas, e.gas_price),
    ] {
        if let Some(net) = net {
            if price > 0.0 && net > price {
                warnings.push(ValidationWarning {
                    field: field.to_string(),
                    message: format!("{field} = {net:.2} exceeds the posted price {price:.2}"),
                    suggestion: None,
                });
            }
        }
    }

    warnings
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultProperties;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("royalty", "royalty"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("royality", "royalty"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [fit]
            b_min = 0.1
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"fit".to_string()));
        assert!(keys.contains(&"fit.b_min".to_string()));
    }

    #[test]
    fn test_typo_suggests_correction() {
        let warnings = validate_unknown_keys(
            r#"
[economics]
royality = 12.5
"#,
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "economics.royality");
        assert_eq!(warnings[0].suggestion.as_deref(), Some("economics.royalty"));
    }

    #[test]
    fn test_unrelated_key_has_no_suggestion() {
        let warnings = validate_unknown_keys("completely_unrelated_section_name = 1\n");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].suggestion.is_none());
    }

    #[test]
    fn test_known_keys_produce_no_warnings() {
        let text = DefaultProperties::default().to_toml().unwrap();
        assert!(validate_unknown_keys(&text).is_empty());
    }

    #[test]
    fn test_suspicious_prices_warn() {
        let mut config = DefaultProperties::default();
        config.economics.oil_price = 900.0;
        config.economics.gas_price = 3.0;
        config.economics.net_price_gas = Some(4.0);
        let warnings = validate_economic_ranges(&config);
        assert_eq!(warnings.len(), 2, "{warnings:?}");
    }
}
