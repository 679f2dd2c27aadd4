//! System-wide default constants.
//!
//! Built-in values used when no `decline_defaults.toml` is present.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Decline defaults
// ============================================================================

/// Default Arps b-factor for both phases.
pub const B_FACTOR: f64 = 0.5;

/// Default terminal nominal decline, percent per year.
pub const MIN_DECLINE_PERCENT: f64 = 6.0;

/// Periods after the peak used for the one-year rate (12 monthly periods).
pub const ONE_YEAR_OFFSET_PERIODS: usize = 11;

/// Days per year used to turn date differences into elapsed years.
pub const DAYS_PER_YEAR: f64 = 365.25;

// ============================================================================
// Curve fit
// ============================================================================

/// Oil qi may move this far below its current value during a refit.
pub const OIL_QI_LOWER_MARGIN: f64 = 10_000.0;

/// Oil qi may move this far above its current value during a refit.
pub const OIL_QI_UPPER_MARGIN: f64 = 10_000.0;

/// Gas qi lower margin. Zero: gas qi is effectively held fixed.
pub const GAS_QI_LOWER_MARGIN: f64 = 0.0;

/// Gas qi upper margin.
pub const GAS_QI_UPPER_MARGIN: f64 = 1.0;

/// Lower bound on fitted nominal decline (fraction per year).
pub const MIN_NOMINAL_DECLINE: f64 = 1.1;

/// Lower bound on the fitted b-factor.
pub const FIT_B_MIN: f64 = 0.05;

/// Upper bound on the fitted b-factor.
pub const FIT_B_MAX: f64 = 0.95;

/// Levenberg-Marquardt iteration budget.
pub const FIT_MAX_ITERATIONS: usize = 200;

/// Relative cost decrease below which the fit is considered converged.
pub const FIT_TOLERANCE: f64 = 1e-10;

// ============================================================================
// Forecast
// ============================================================================

/// Absolute forecast horizon. Reaching it means the economic limit never fired.
pub const SAFETY_CUTOFF_YEAR: i32 = 2200;

// ============================================================================
// Economics
// ============================================================================

/// Default working interest, percent.
pub const WORKING_INTEREST_PERCENT: f64 = 100.0;

/// Default royalty, percent.
pub const ROYALTY_PERCENT: f64 = 12.5;

/// Default annual discount rate, percent.
pub const DISCOUNT_RATE_PERCENT: f64 = 10.0;
