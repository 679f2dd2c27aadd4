//! Shared data structures for decline-curve analysis
//!
//! - `production`: historical input rows (`ProductionRecord`)
//! - `model`: per-well decline model, typed and flat (`DeclineModel`, `ModelRecord`)
//! - `forecast`: output rows, error summaries, fit status and batch reports

mod forecast;
mod model;
mod production;

pub use forecast::*;
pub use model::*;
pub use production::*;
