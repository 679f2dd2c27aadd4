//! Decline-curve math and the per-well forecast engine
//!
//! - `arps`: closed-form Arps relations and decline conversions
//! - `switchover`: hyperbolic → exponential state machine per phase
//! - `fit`: bounded Levenberg-Marquardt refit of `(qi, Di, b)`
//! - `engine`: replay, refit and forward forecast for one well
//! - `batch`: parallel driver over a model set with cancellation

pub mod arps;
pub mod batch;
pub mod engine;
pub mod fit;
pub mod switchover;

pub use engine::{years_between, DeclineForecastEngine};
pub use fit::{fit_hyperbolic, FitBounds, FitResult, FitSettings};
pub use switchover::{DeclineState, PhaseRun};
