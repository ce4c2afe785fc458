//! 24-hour exposure (AUC24)
//!
//! Two methods are available through [AucMethod]:
//!
//! ## Dose / CL
//!
//! At steady state the exposure over one day equals the daily dose divided by
//! clearance:
//!
//! ```text
//! AUC24 = dose × (24 / τ) / CL
//! ```
//!
//! This only holds for a uniform regimen at steady state.
//!
//! ## Trapezoid
//!
//! Numeric integration of the simulated curve. Segments use either the linear
//! trapezoid or linear-up/log-down ([IntegrationRule]):
//!
//! ```text
//! Ascending (C₂ ≥ C₁):   AUC = (C₁ + C₂) / 2 × Δt
//! Descending (C₂ < C₁):  AUC = (C₁ - C₂) × Δt / ln(C₁ / C₂)
//! ```
//!
//! For a regimen the window `[n·τ, n·τ + W]` with `W = ⌈24/τ⌉·τ` is integrated
//! after `n` pre-doses bring the profile to steady state, and the result is
//! normalized to 24 hours. A history that has not reached steady state is
//! integrated as given over a 24-hour window picked by the caller.

use serde::{Deserialize, Serialize};

use crate::data::{DoseHistory, PkParameters, Regimen};
use crate::error::{is_positive, PkError, Warning};
use crate::simulator::steady_state::doses_to_steady_state;
use crate::simulator::{concentrations, time_grid};

/// Relative distance from steady state accepted before integrating
const STEADY_STATE_TOLERANCE: f64 = 1e-6;
/// Upper bound on the number of simulated pre-doses
const MAX_PRE_DOSES: usize = 10_000;
/// Distance from steady state at which a uniform history counts as its regimen
const HISTORY_STEADY_STATE_TOLERANCE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AucMethod {
    /// Daily dose divided by clearance
    #[default]
    DoseCl,
    /// Numeric integration of the simulated curve
    Trapezoid,
}

/// Segment rule for numeric integration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IntegrationRule {
    /// (C₁ + C₂) / 2 × Δt
    #[default]
    Linear,
    /// Linear for ascending segments, log-linear for descending ones
    LinUpLogDown,
}

/// AUC24 together with the quantities it was derived from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AucBreakdown {
    /// mg·h/L over 24 hours
    pub auc24: f64,
    /// Exposure over one dosing interval, if the schedule is regular
    pub auc_per_dose: Option<f64>,
    pub doses_per_day: Option<f64>,
    /// mg given per 24 hours
    pub daily_dose: f64,
    /// The method that produced `auc24`, after any fallback
    pub method: AucMethod,
}

/// AUC for a single segment between two time points
///
/// Returns 0.0 if `t2 <= t1`.
#[inline]
pub fn auc_segment(t1: f64, c1: f64, t2: f64, c2: f64, rule: IntegrationRule) -> f64 {
    let dt = t2 - t1;
    if dt <= 0.0 {
        return 0.0;
    }

    match rule {
        IntegrationRule::Linear => (c1 + c2) / 2.0 * dt,
        IntegrationRule::LinUpLogDown => {
            if c2 >= c1 || c1 <= 0.0 || c2 <= 0.0 {
                (c1 + c2) / 2.0 * dt
            } else {
                let ratio = c1 / c2;
                if (ratio - 1.0).abs() < 1e-10 {
                    (c1 + c2) / 2.0 * dt
                } else {
                    (c1 - c2) * dt / ratio.ln()
                }
            }
        }
    }
}

/// Total AUC over all points
///
/// # Panics
///
/// Panics if `times` and `concentrations` have different lengths.
pub fn auc_trapezoid(times: &[f64], concentrations: &[f64], rule: IntegrationRule) -> f64 {
    assert_eq!(
        times.len(),
        concentrations.len(),
        "times and concentrations must have the same length"
    );
    times
        .windows(2)
        .zip(concentrations.windows(2))
        .map(|(t, c)| auc_segment(t[0], c[0], t[1], c[1], rule))
        .sum()
}

/// AUC over `[start, end]`, linearly interpolating at the window edges
///
/// The window is clipped to the data; nothing is extrapolated.
///
/// # Panics
///
/// Panics if `times` and `concentrations` have different lengths.
pub fn auc_interval(
    times: &[f64],
    concentrations: &[f64],
    start: f64,
    end: f64,
    rule: IntegrationRule,
) -> f64 {
    assert_eq!(
        times.len(),
        concentrations.len(),
        "times and concentrations must have the same length"
    );
    if times.len() < 2 || end <= start {
        return 0.0;
    }

    let mut auc = 0.0;
    for i in 1..times.len() {
        let t1 = times[i - 1].max(start);
        let t2 = times[i].min(end);
        if t2 <= t1 {
            continue;
        }
        let c1 = if times[i - 1] < start {
            interpolate(times, concentrations, t1)
        } else {
            concentrations[i - 1]
        };
        let c2 = if times[i] > end {
            interpolate(times, concentrations, t2)
        } else {
            concentrations[i]
        };
        auc += auc_segment(t1, c1, t2, c2, rule);
    }
    auc
}

fn interpolate(times: &[f64], concentrations: &[f64], time: f64) -> f64 {
    let upper = times.partition_point(|&t| t < time).clamp(1, times.len() - 1);
    let (t1, t2) = (times[upper - 1], times[upper]);
    let (c1, c2) = (concentrations[upper - 1], concentrations[upper]);
    if (t2 - t1).abs() < 1e-10 {
        c1
    } else {
        c1 + (c2 - c1) * (time - t1) / (t2 - t1)
    }
}

/// Steady-state AUC24 as daily dose over clearance
pub fn auc24_dose_cl(regimen: &Regimen, pk: &PkParameters) -> f64 {
    regimen.daily_dose() / pk.cl()
}

/// Steady-state AUC24 by integrating the simulated curve
///
/// # Errors
///
/// Returns [PkError::InvalidParameter] if `step` is not positive.
pub fn auc24_steady_state(
    regimen: &Regimen,
    pk: &PkParameters,
    step: f64,
    rule: IntegrationRule,
) -> Result<f64, PkError> {
    if !is_positive(step) {
        return Err(PkError::parameter("step", step));
    }
    let tau = regimen.interval();
    let pre_doses = doses_to_steady_state(regimen, pk, STEADY_STATE_TOLERANCE).min(MAX_PRE_DOSES);
    let window_doses = (24.0 / tau).ceil().max(1.0) as usize;
    let window = window_doses as f64 * tau;
    let start = pre_doses as f64 * tau;

    let history = DoseHistory::repeated_n(regimen, pre_doses + window_doses);
    let times = time_grid(&history, start, start + window, step);
    let values = concentrations(&history, pk, &times);
    Ok(auc_trapezoid(&times, &values, rule) * 24.0 / window)
}

/// AUC over the 24 hours starting at `window_start` for an arbitrary history
pub fn auc24_window(
    history: &DoseHistory,
    pk: &PkParameters,
    window_start: f64,
    step: f64,
    rule: IntegrationRule,
) -> Result<f64, PkError> {
    if !is_positive(step) {
        return Err(PkError::parameter("step", step));
    }
    if !window_start.is_finite() {
        return Err(PkError::parameter("window start", window_start));
    }
    let times = time_grid(history, window_start, window_start + 24.0, step);
    let values = concentrations(history, pk, &times);
    Ok(auc_trapezoid(&times, &values, rule))
}

/// AUC breakdown for a regimen at steady state
pub fn regimen_auc(
    regimen: &Regimen,
    pk: &PkParameters,
    method: AucMethod,
    step: f64,
    rule: IntegrationRule,
) -> Result<AucBreakdown, PkError> {
    let auc24 = match method {
        AucMethod::DoseCl => auc24_dose_cl(regimen, pk),
        AucMethod::Trapezoid => auc24_steady_state(regimen, pk, step, rule)?,
    };
    let doses_per_day = regimen.doses_per_day();
    Ok(AucBreakdown {
        auc24,
        auc_per_dose: Some(auc24 / doses_per_day),
        doses_per_day: Some(doses_per_day),
        daily_dose: regimen.daily_dose(),
        method,
    })
}

/// Start of the default exposure window of a history
///
/// The window is the 24 hours ending at the start of the most recent dose,
/// i.e. at the trough before it, so it covers the last full day of dosing.
/// Histories shorter than a day start the window at their first dose.
pub fn default_window_start(history: &DoseHistory) -> f64 {
    match (history.first(), history.last()) {
        (Some(first), Some(last)) => (last.start() - 24.0).max(first.start()),
        _ => 0.0,
    }
}

/// The regimen of a uniform history that has been given long enough to be at steady state
pub fn steady_state_regimen(history: &DoseHistory, pk: &PkParameters) -> Option<Regimen> {
    let regimen = history.uniform_regimen()?;
    let needed = doses_to_steady_state(&regimen, pk, HISTORY_STEADY_STATE_TOLERANCE);
    (history.len() >= needed).then_some(regimen)
}

/// AUC breakdown for an arbitrary history
///
/// A uniform history at steady state ([steady_state_regimen]) is treated as
/// its regimen. Any other history is integrated over the 24 hours starting at
/// `window_start`; requesting [AucMethod::DoseCl] there falls back to the
/// trapezoid and adds [Warning::AucMethodFallback].
pub fn history_auc(
    history: &DoseHistory,
    pk: &PkParameters,
    method: AucMethod,
    window_start: f64,
    step: f64,
    rule: IntegrationRule,
) -> Result<(AucBreakdown, Vec<Warning>), PkError> {
    if history.is_empty() {
        return Err(PkError::InvalidRegimenInput(
            "dose history is empty".to_string(),
        ));
    }
    if let Some(regimen) = steady_state_regimen(history, pk) {
        return Ok((regimen_auc(&regimen, pk, method, step, rule)?, Vec::new()));
    }

    let mut warnings = Vec::new();
    if method == AucMethod::DoseCl {
        tracing::warn!("Dose/CL AUC requested for a history not at steady state, integrating instead");
        warnings.push(Warning::AucMethodFallback);
    }
    let auc24 = auc24_window(history, pk, window_start, step, rule)?;
    let window_end = window_start + 24.0;
    let daily_dose = history
        .events()
        .iter()
        .filter(|event| event.start() >= window_start && event.start() < window_end)
        .map(|event| event.dose())
        .sum();

    Ok((
        AucBreakdown {
            auc24,
            auc_per_dose: None,
            doses_per_day: None,
            daily_dose,
            method: AucMethod::Trapezoid,
        },
        warnings,
    ))
}
