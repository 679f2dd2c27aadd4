//! Arps decline relations
//!
//! Closed-form rate equations and the effective/nominal decline transforms.
//! All declines here are annual; `t` is in years since the phase peak.
//!
//! - Effective decline `di` (percent): observed drop over one full year.
//! - Nominal decline `Di` (fraction/year): the instantaneous rate used by
//!   `q(t) = qi / (1 + b·Di·t)^(1/b)`.

/// b-factors closer to 0 or 1 than this are treated as exactly 0 or 1.
const B_EPSILON: f64 = 1e-12;

fn is_exponential(b: f64) -> bool {
    b.abs() < B_EPSILON
}

fn is_harmonic(b: f64) -> bool {
    (b - 1.0).abs() < B_EPSILON
}

/// Convert effective annual decline (percent) to nominal decline.
///
/// `Di = ((1 - di/100)^(-b) - 1) / b`, or `di/100` when `b = 0`.
pub fn effective_to_nominal(di_percent: f64, b: f64) -> f64 {
    let d = di_percent / 100.0;
    if is_exponential(b) {
        return d;
    }
    ((1.0 - d).powf(-b) - 1.0) / b
}

/// Convert nominal decline back to effective annual decline (percent).
///
/// Inverse of [`effective_to_nominal`]: `(1 - (1/(Di·b + 1))^(1/b)) · 100`.
pub fn nominal_to_effective(nominal_di: f64, b: f64) -> f64 {
    if is_exponential(b) {
        return nominal_di * 100.0;
    }
    (1.0 - (1.0 / (nominal_di * b + 1.0)).powf(1.0 / b)) * 100.0
}

/// Instantaneous nominal decline at time `t`: `Di / (1 + b·Di·t)`.
pub fn instantaneous_decline(nominal_di: f64, b: f64, t: f64) -> f64 {
    nominal_di / (1.0 + b * nominal_di * t)
}

/// Arps rate at time `t` (no terminal decline applied).
///
/// - `b = 0`: exponential `qi·exp(-Di·t)`
/// - `b = 1`: harmonic `qi / (1 + Di·t)`
/// - otherwise: hyperbolic `qi / (1 + b·Di·t)^(1/b)`
pub fn arps_rate(qi: f64, nominal_di: f64, b: f64, t: f64) -> f64 {
    if is_exponential(b) {
        qi * (-nominal_di * t).exp()
    } else if is_harmonic(b) {
        qi / (1.0 + nominal_di * t)
    } else {
        qi / (1.0 + b * nominal_di * t).powf(1.0 / b)
    }
}

/// Exponential tail rate: `q_switch · exp(-d_min · (t - t_switch))`.
pub fn exponential_tail_rate(q_switch: f64, min_decline: f64, t: f64, t_switch: f64) -> f64 {
    q_switch * (-min_decline * (t - t_switch)).exp()
}

/// Percent absolute relative error of `predicted` vs `actual`.
///
/// Zero when the actual is missing or not positive, or there is no prediction.
pub fn percent_error(actual: Option<f64>, predicted: Option<f64>) -> f64 {
    match (actual, predicted) {
        (Some(a), Some(q)) if a.is_finite() && a > 0.0 && q.is_finite() => (a - q).abs() / a * 100.0,
        _ => 0.0,
    }
}
