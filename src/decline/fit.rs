//! Bounded Levenberg-Marquardt fit of the hyperbolic decline curve
//!
//! Fits `q(t) = qi / (1 + b·Di·t)^(1/b)` to observed per-period volumes by
//! nonlinear least squares over `(qi, Di, b)`. Each trial step is projected
//! back into the bound box; the damping term uses Marquardt's diagonal
//! scaling so that `qi` (thousands) and `b` (fractions) move sensibly
//! together.
//!
//! The normal equations are only 3×3, so they are assembled directly from
//! the analytic Jacobian without materialising the n×3 matrix.

use crate::config::{defaults, FitConfig};
use crate::error::FitError;
use crate::types::Phase;
use nalgebra::{Matrix3, Vector3};
use tracing::debug;

/// Minimum points for a three-parameter fit.
pub const MIN_FIT_POINTS: usize = 3;

const LAMBDA_INITIAL: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e16;
const STEP_TOLERANCE: f64 = 1e-10;

// ============================================================================
// Bounds and settings
// ============================================================================

/// Closed box for `(qi, Di, b)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitBounds {
    pub lower: [f64; 3],
    pub upper: [f64; 3],
}

impl FitBounds {
    /// Parameters sitting on a bound whose descent direction leaves the box.
    /// `jtr` is the gradient of half the squared-residual cost.
    fn active_set(&self, p: &Vector3<f64>, jtr: &Vector3<f64>) -> [bool; 3] {
        let mut active = [false; 3];
        for i in 0..3 {
            active[i] = (p[i] <= self.lower[i] && jtr[i] > 0.0) || (p[i] >= self.upper[i] && jtr[i] < 0.0);
        }
        active
    }

    /// Every lower bound is a number no greater than its upper bound.
    pub fn is_valid(&self) -> bool {
        self.lower
            .iter()
            .zip(&self.upper)
            .all(|(lo, hi)| !lo.is_nan() && !hi.is_nan() && lo <= hi)
    }

    fn clamp(&self, p: Vector3<f64>) -> Vector3<f64> {
        Vector3::new(
            p[0].clamp(self.lower[0], self.upper[0]),
            p[1].clamp(self.lower[1], self.upper[1]),
            p[2].clamp(self.lower[2], self.upper[2]),
        )
    }
}

/// Fit tuning, normally read from the `[fit]` config section.
#[derive(Debug, Clone, PartialEq)]
pub struct FitSettings {
    pub oil_qi_lower_margin: f64,
    pub oil_qi_upper_margin: f64,
    pub gas_qi_lower_margin: f64,
    pub gas_qi_upper_margin: f64,
    pub min_nominal_decline: f64,
    pub b_min: f64,
    pub b_max: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            oil_qi_lower_margin: defaults::OIL_QI_LOWER_MARGIN,
            oil_qi_upper_margin: defaults::OIL_QI_UPPER_MARGIN,
            gas_qi_lower_margin: defaults::GAS_QI_LOWER_MARGIN,
            gas_qi_upper_margin: defaults::GAS_QI_UPPER_MARGIN,
            min_nominal_decline: defaults::MIN_NOMINAL_DECLINE,
            b_min: defaults::FIT_B_MIN,
            b_max: defaults::FIT_B_MAX,
            max_iterations: defaults::FIT_MAX_ITERATIONS,
            tolerance: defaults::FIT_TOLERANCE,
        }
    }
}

impl From<&FitConfig> for FitSettings {
    fn from(c: &FitConfig) -> Self {
        Self {
            oil_qi_lower_margin: c.oil_qi_lower_margin,
            oil_qi_upper_margin: c.oil_qi_upper_margin,
            gas_qi_lower_margin: c.gas_qi_lower_margin,
            gas_qi_upper_margin: c.gas_qi_upper_margin,
            min_nominal_decline: c.min_nominal_decline,
            b_min: c.b_min,
            b_max: c.b_max,
            max_iterations: c.max_iterations,
            tolerance: c.tolerance,
        }
    }
}

impl FitSettings {
    /// Bound box around the current peak rate for a phase.
    ///
    /// The qi window is per phase: with the shipped defaults gas qi is held
    /// at `[qi, qi + 1]` while oil may move ±10 000.
    pub fn bounds(&self, phase: Phase, qi: f64) -> FitBounds {
        let (lo, hi) = match phase {
            Phase::Oil => (self.oil_qi_lower_margin, self.oil_qi_upper_margin),
            Phase::Gas => (self.gas_qi_lower_margin, self.gas_qi_upper_margin),
        };
        let qi_lower = (qi - lo).max(0.0);
        FitBounds {
            lower: [qi_lower, self.min_nominal_decline, self.b_min],
            upper: [(qi + hi).max(qi_lower), f64::INFINITY, self.b_max],
        }
    }
}

/// Accepted fit parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitResult {
    pub qi: f64,
    pub nominal_di: f64,
    pub b: f64,
    pub iterations: usize,
    /// Final sum of squared residuals.
    pub cost: f64,
}

// ============================================================================
// Model and derivatives
// ============================================================================

/// Hyperbolic rate and its gradient w.r.t. `(qi, Di, b)`.
fn rate_and_gradient(p: &Vector3<f64>, t: f64) -> (f64, Vector3<f64>) {
    let (qi, d, b) = (p[0], p[1], p[2]);
    let u = 1.0 + b * d * t;
    let base = u.powf(-1.0 / b);
    let q = qi * base;
    let dq_dqi = base;
    let dq_dd = -qi * t * base / u;
    let dq_db = q * (u.ln() / (b * b) - d * t / (b * u));
    (q, Vector3::new(dq_dqi, dq_dd, dq_db))
}

fn cost(p: &Vector3<f64>, t: &[f64], y: &[f64]) -> f64 {
    t.iter()
        .zip(y)
        .map(|(&ti, &yi)| {
            let (q, _) = rate_and_gradient(p, ti);
            (q - yi).powi(2)
        })
        .sum()
}

/// Assemble `JᵀJ` and `Jᵀr` for residuals `r = q(t) - y`.
fn normal_equations(p: &Vector3<f64>, t: &[f64], y: &[f64]) -> Result<(Matrix3<f64>, Vector3<f64>), FitError> {
    let mut jtj = Matrix3::zeros();
    let mut jtr = Vector3::zeros();
    for (&ti, &yi) in t.iter().zip(y) {
        let (q, grad) = rate_and_gradient(p, ti);
        let r = q - yi;
        if !r.is_finite() || grad.iter().any(|g| !g.is_finite()) {
            return Err(FitError::NonFiniteResidual { t: ti });
        }
        jtj += grad * grad.transpose();
        jtr += grad * r;
    }
    Ok((jtj, jtr))
}

// ============================================================================
// Solver
// ============================================================================

/// Fit `(qi, Di, b)` to `(t, y)` starting from `initial`.
///
/// `t` is in years since the peak, `y` the observed volumes. The initial
/// guess is clamped into `bounds` before iterating.
pub fn fit_hyperbolic(
    t: &[f64],
    y: &[f64],
    initial: (f64, f64, f64),
    bounds: &FitBounds,
    settings: &FitSettings,
) -> Result<FitResult, FitError> {
    let n = t.len().min(y.len());
    if n < MIN_FIT_POINTS {
        return Err(FitError::InsufficientData {
            needed: MIN_FIT_POINTS,
            available: n,
        });
    }
    let (t, y) = (&t[..n], &y[..n]);
    if !bounds.is_valid() {
        return Err(FitError::InvalidBounds);
    }

    let mut p = bounds.clamp(Vector3::new(initial.0, initial.1, initial.2));
    let mut current_cost = cost(&p, t, y);
    if !current_cost.is_finite() {
        return Err(FitError::NonFiniteResidual { t: t[0] });
    }
    let mut lambda = LAMBDA_INITIAL;

    for iteration in 1..=settings.max_iterations {
        let (jtj, jtr) = normal_equations(&p, t, y)?;

        // Parameters pinned on a bound with the gradient pushing outward are
        // frozen for this iteration; the rest take a reduced LM step.
        let active = bounds.active_set(&p, &jtr);
        let mut rhs = -jtr;
        for i in 0..3 {
            if active[i] {
                rhs[i] = 0.0;
            }
        }
        if rhs.amax() == 0.0 {
            return finish(p, iteration, current_cost);
        }

        // Marquardt scaling; floor keeps a flat direction from zeroing the damping.
        let diag_floor = jtj.diagonal().amax().max(1.0) * 1e-12;
        let mut improved = false;

        while lambda <= LAMBDA_MAX {
            let mut damped = jtj;
            for i in 0..3 {
                damped[(i, i)] += lambda * jtj[(i, i)].max(diag_floor);
            }
            for i in (0..3).filter(|&i| active[i]) {
                damped.row_mut(i).fill(0.0);
                damped.column_mut(i).fill(0.0);
                damped[(i, i)] = 1.0;
            }
            let Some(step) = damped.lu().solve(&rhs) else {
                lambda *= 10.0;
                continue;
            };

            let candidate = bounds.clamp(p + step);
            let candidate_cost = cost(&candidate, t, y);
            if candidate_cost.is_finite() && candidate_cost < current_cost {
                let decrease = current_cost - candidate_cost;
                let moved = (candidate - p).amax();
                p = candidate;
                let previous_cost = current_cost;
                current_cost = candidate_cost;
                lambda = (lambda / 10.0).max(LAMBDA_MIN);
                improved = true;

                if decrease <= settings.tolerance * previous_cost
                    || moved <= STEP_TOLERANCE * (p.amax() + STEP_TOLERANCE)
                {
                    return finish(p, iteration, current_cost);
                }
                break;
            }
            lambda *= 10.0;
        }

        if !improved {
            // No downhill step exists inside the box: stationary point.
            return finish(p, iteration, current_cost);
        }
    }

    Err(FitError::NoConvergence {
        iterations: settings.max_iterations,
    })
}

fn finish(p: Vector3<f64>, iterations: usize, cost: f64) -> Result<FitResult, FitError> {
    let (qi, nominal_di, b) = (p[0], p[1], p[2]);
    if !(b > 0.0 && b < 1.0) {
        return Err(FitError::BOutOfRange { b });
    }
    debug!(qi, nominal_di, b, iterations, cost, "Decline fit converged");
    Ok(FitResult {
        qi,
        nominal_di,
        b,
        iterations,
        cost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decline::arps::arps_rate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn monthly_times(n: u32) -> Vec<f64> {
        (0..n).map(|i| f64::from(i) / 12.0).collect()
    }

    fn wide_bounds(qi: f64) -> FitBounds {
        FitSettings::default().bounds(Phase::Oil, qi)
    }

    #[test]
    fn test_recovers_noise_free_parameters() {
        let t = monthly_times(60);
        let y: Vec<f64> = t.iter().map(|&ti| arps_rate(1200.0, 1.8, 0.6, ti)).collect();

        let fit = fit_hyperbolic(&t, &y, (1000.0, 1.3, 0.4), &wide_bounds(1000.0), &FitSettings::default())
            .unwrap();
        assert!((fit.qi - 1200.0).abs() / 1200.0 < 1e-3, "qi = {}", fit.qi);
        assert!((fit.nominal_di - 1.8).abs() < 1e-2, "Di = {}", fit.nominal_di);
        assert!((fit.b - 0.6).abs() < 1e-2, "b = {}", fit.b);
    }

    #[test]
    fn test_recovers_parameters_from_noisy_history() {
        let mut rng = StdRng::seed_from_u64(7);
        let noise = Normal::new(0.0, 0.02).unwrap();
        let t = monthly_times(72);
        let y: Vec<f64> = t
            .iter()
            .map(|&ti| arps_rate(2500.0, 2.2, 0.5, ti) * (1.0 + noise.sample(&mut rng)))
            .collect();

        let fit = fit_hyperbolic(&t, &y, (2400.0, 1.5, 0.3), &wide_bounds(2400.0), &FitSettings::default())
            .unwrap();
        assert!((fit.qi - 2500.0).abs() / 2500.0 < 0.05, "qi = {}", fit.qi);
        assert!((fit.b - 0.5).abs() < 0.15, "b = {}", fit.b);
        assert!(fit.nominal_di >= 1.1);
    }

    #[test]
    fn test_respects_bounds() {
        let t = monthly_times(36);
        // True b of 1.2 lies outside the box; fit must stop at b_max
        let y: Vec<f64> = t.iter().map(|&ti| arps_rate(800.0, 3.0, 1.2, ti)).collect();
        let settings = FitSettings::default();
        let bounds = settings.bounds(Phase::Gas, 800.0);

        let fit = fit_hyperbolic(&t, &y, (800.0, 2.0, 0.5), &bounds, &settings).unwrap();
        assert!(fit.qi >= 800.0 && fit.qi <= 801.0, "gas qi pinned, got {}", fit.qi);
        assert!(fit.b <= settings.b_max + 1e-12);
        assert!(fit.nominal_di >= settings.min_nominal_decline);
    }

    #[test]
    fn test_initial_guess_is_clamped_into_box() {
        let t = monthly_times(24);
        let y: Vec<f64> = t.iter().map(|&ti| arps_rate(500.0, 1.5, 0.5, ti)).collect();
        // Di = 0.4 is below the 1.1 floor
        let fit = fit_hyperbolic(&t, &y, (500.0, 0.4, 0.5), &wide_bounds(500.0), &FitSettings::default())
            .unwrap();
        assert!(fit.nominal_di >= 1.1);
    }

    #[test]
    fn test_insufficient_data() {
        let err = fit_hyperbolic(&[0.0, 0.1], &[10.0, 9.0], (10.0, 1.2, 0.5), &wide_bounds(10.0), &FitSettings::default())
            .unwrap_err();
        assert_eq!(err, FitError::InsufficientData { needed: 3, available: 2 });
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let bounds = FitBounds {
            lower: [0.0, 1.1, 0.9],
            upper: [100.0, f64::INFINITY, 0.1],
        };
        let err = fit_hyperbolic(&[0.0, 0.1, 0.2], &[10.0, 9.0, 8.0], (10.0, 1.2, 0.5), &bounds, &FitSettings::default())
            .unwrap_err();
        assert_eq!(err, FitError::InvalidBounds);
    }

    #[test]
    fn test_negative_qi_still_yields_valid_box() {
        let bounds = FitSettings::default().bounds(Phase::Gas, -5.0);
        assert!(bounds.is_valid());
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let p = Vector3::new(900.0, 1.7, 0.45);
        let t = 2.5;
        let (_, grad) = rate_and_gradient(&p, t);
        for i in 0..3 {
            let h = 1e-6 * p[i].abs().max(1.0);
            let mut hi = p;
            let mut lo = p;
            hi[i] += h;
            lo[i] -= h;
            let fd = (rate_and_gradient(&hi, t).0 - rate_and_gradient(&lo, t).0) / (2.0 * h);
            assert!((fd - grad[i]).abs() < 1e-5 * fd.abs().max(1.0), "component {i}: {fd} vs {}", grad[i]);
        }
    }
}
