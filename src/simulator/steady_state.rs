//! Closed-form peak and trough for a regular regimen
//!
//! For a regimen with interval `τ`, infusion duration `d` and rate `R`, the
//! peak after the `n`-th dose (1-based) occurs at `(n − 1)·τ + d` and the trough
//! just before the next dose at `n·τ`:
//!
//! ```text
//! peak(n)   = R / CL × (1 − e^(−k·d)) × (1 − e^(−n·k·τ)) / (1 − e^(−k·τ))
//! trough(n) = peak(n) × e^(−k·(τ − d))
//! ```
//!
//! Steady state is the limit `n → ∞`. These are exact for the superposition
//! model, so exposure at dose boundaries is never under- or overestimated by
//! grid sampling.

use serde::{Deserialize, Serialize};

use crate::data::{PkParameters, Regimen};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakTrough {
    pub peak: f64,
    pub peak_time: f64,
    pub trough: f64,
    pub trough_time: f64,
}

/// Time of the peak after dose `n` (1-based)
pub fn peak_time(regimen: &Regimen, n: u32) -> f64 {
    (n.max(1) - 1) as f64 * regimen.interval() + regimen.infusion()
}

/// Time of the trough before dose `n + 1`
pub fn trough_time(regimen: &Regimen, n: u32) -> f64 {
    n.max(1) as f64 * regimen.interval()
}

/// Concentration at the end of one infusion given nothing else in the body
fn single_dose_peak(regimen: &Regimen, pk: &PkParameters) -> f64 {
    -(regimen.rate() / pk.cl()) * (-pk.k() * regimen.infusion()).exp_m1()
}

/// `1 / (1 − e^(−k·τ))`
pub fn accumulation_factor(regimen: &Regimen, pk: &PkParameters) -> f64 {
    -1.0 / (-pk.k() * regimen.interval()).exp_m1()
}

/// Peak and trough around dose `n` (1-based) of a regimen started at `t = 0`
pub fn at_dose(regimen: &Regimen, pk: &PkParameters, n: u32) -> PeakTrough {
    let n = n.max(1);
    let k_tau = pk.k() * regimen.interval();
    let build_up = -(-(n as f64) * k_tau).exp_m1();
    let peak = single_dose_peak(regimen, pk) * build_up * accumulation_factor(regimen, pk);
    let trough = peak * (-pk.k() * (regimen.interval() - regimen.infusion())).exp();
    PeakTrough {
        peak,
        peak_time: peak_time(regimen, n),
        trough,
        trough_time: trough_time(regimen, n),
    }
}

/// Steady-state peak and trough, timed within the first interval
pub fn steady_state(regimen: &Regimen, pk: &PkParameters) -> PeakTrough {
    let peak = single_dose_peak(regimen, pk) * accumulation_factor(regimen, pk);
    let trough = peak * (-pk.k() * (regimen.interval() - regimen.infusion())).exp();
    PeakTrough {
        peak,
        peak_time: regimen.infusion(),
        trough,
        trough_time: regimen.interval(),
    }
}

/// Number of doses until every concentration is within `tolerance` (relative) of steady state
pub fn doses_to_steady_state(regimen: &Regimen, pk: &PkParameters, tolerance: f64) -> usize {
    let k_tau = pk.k() * regimen.interval();
    ((1.0 / tolerance).ln() / k_tau).ceil().max(1.0) as usize
}
