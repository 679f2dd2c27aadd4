//! Hyperbolic → exponential switchover state machine
//!
//! Each phase of each well gets its own `PhaseRun` per engine run. The run
//! starts in `Hyperbolic` and moves to `ExponentialTail` the first time the
//! instantaneous decline drops below the terminal decline. The transition is
//! one-way for the rest of the run.

use super::arps;
use crate::types::PhaseDecline;

/// Decline regime of one phase within one engine run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeclineState {
    /// Following the Arps curve. `last_rate` is the most recent rate computed.
    Hyperbolic { last_rate: Option<f64> },
    /// Terminal exponential decline anchored at the switch point.
    ExponentialTail { time_switch: f64, q_switch: f64 },
}

/// Per-run rate generator for one phase.
#[derive(Debug, Clone)]
pub struct PhaseRun {
    qi: f64,
    nominal_di: f64,
    b: f64,
    /// Terminal decline as a fraction per year.
    min_decline: f64,
    state: DeclineState,
}

impl PhaseRun {
    pub fn new(decline: &PhaseDecline) -> Self {
        Self::with_parameters(decline.qi, decline.nominal_di(), decline.b, decline.min_dec)
    }

    /// Build from raw parameters. `min_dec_percent` is the terminal decline in percent.
    pub fn with_parameters(qi: f64, nominal_di: f64, b: f64, min_dec_percent: f64) -> Self {
        Self {
            qi,
            nominal_di,
            b,
            min_decline: min_dec_percent / 100.0,
            state: DeclineState::Hyperbolic { last_rate: None },
        }
    }

    pub fn state(&self) -> DeclineState {
        self.state
    }

    /// Time (years) at which the exponential tail took over, if it has.
    pub fn switch_time(&self) -> Option<f64> {
        match self.state {
            DeclineState::ExponentialTail { time_switch, .. } => Some(time_switch),
            DeclineState::Hyperbolic { .. } => None,
        }
    }

    /// Rate for the period at elapsed time `t`. Periods must be fed in
    /// chronological order. Returns `None` before the peak.
    pub fn rate_at(&mut self, t: f64) -> Option<f64> {
        if !t.is_finite() || t < 0.0 {
            return None;
        }

        match self.state {
            DeclineState::ExponentialTail { time_switch, q_switch } => Some(
                arps::exponential_tail_rate(q_switch, self.min_decline, t, time_switch),
            ),
            DeclineState::Hyperbolic { last_rate } => {
                let dt = arps::instantaneous_decline(self.nominal_di, self.b, t);
                if dt < self.min_decline {
                    // Anchor on the previous period so the curve stays continuous.
                    let q_switch = last_rate
                        .unwrap_or_else(|| arps::arps_rate(self.qi, self.nominal_di, self.b, t));
                    self.state = DeclineState::ExponentialTail {
                        time_switch: t,
                        q_switch,
                    };
                    Some(q_switch)
                } else {
                    let q = arps::arps_rate(self.qi, self.nominal_di, self.b, t);
                    self.state = DeclineState::Hyperbolic { last_rate: Some(q) };
                    Some(q)
                }
            }
        }
    }
}
