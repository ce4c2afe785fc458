//! One-compartment concentration-time simulation
//!
//! Each [DoseEvent] is a zero-order infusion into a single compartment with
//! first-order elimination. With `R = dose / d`, `u` the time since the start
//! of the infusion and `d` its duration:
//!
//! ```text
//! 0 ≤ u ≤ d:   C(u) = R / CL × (1 − e^(−k·u))
//! u > d:       C(u) = C(d) × e^(−k·(u − d))
//! ```
//!
//! Linear kinetics allow the contributions of all events to be summed
//! (superposition), so overlapping infusions need no special handling.
//! For `k·d → 0` the infusion phase reduces to the linear ramp `dose / V × u / d`.

mod band;
mod curve;
pub mod steady_state;

pub use band::{prediction_band, PredictionBand};
pub use curve::{CurvePoint, PkCurve};

use crate::data::event::TIME_TOLERANCE;
use crate::data::{DoseEvent, DoseHistory, PkParameters};
use crate::error::{is_positive, PkError};

/// Concentration contributed by a single event at time `t`
#[inline]
pub fn event_concentration(event: &DoseEvent, pk: &PkParameters, t: f64) -> f64 {
    let u = t - event.start();
    if u <= 0.0 {
        return 0.0;
    }
    infusion_profile(event.rate(), event.infusion(), pk, u)
}

/// Concentration `u` hours after the start of an infusion at `rate` mg/h lasting `d` hours
#[inline]
pub(crate) fn infusion_profile(rate: f64, d: f64, pk: &PkParameters, u: f64) -> f64 {
    let k = pk.k();
    let plateau = rate / pk.cl();
    if u <= d {
        // 1 − e^(−k·u), accurate for small k·u
        -plateau * (-k * u).exp_m1()
    } else {
        -plateau * (-k * d).exp_m1() * (-k * (u - d)).exp()
    }
}

/// Superposed concentration of a dose history at time `t`
///
/// A dose starting exactly at `t` contributes nothing yet, so querying at the
/// start of the next dose returns the trough of the previous interval.
pub fn concentration_at(history: &DoseHistory, pk: &PkParameters, t: f64) -> f64 {
    history
        .events()
        .iter()
        .take_while(|event| event.start() < t)
        .map(|event| event_concentration(event, pk, t))
        .sum::<f64>()
        .max(0.0)
}

/// Concentrations at each of `times`
pub fn concentrations(history: &DoseHistory, pk: &PkParameters, times: &[f64]) -> Vec<f64> {
    times
        .iter()
        .map(|&t| concentration_at(history, pk, t))
        .collect()
}

/// Time grid from `start` to `end` every `step` hours, merged with every
/// infusion start and end inside the window
pub fn time_grid(history: &DoseHistory, start: f64, end: f64, step: f64) -> Vec<f64> {
    let n = ((end - start) / step + TIME_TOLERANCE).floor() as usize;
    // the grid always ends exactly at `end`
    let mut times: Vec<f64> = (0..=n)
        .map(|i| start + i as f64 * step)
        .filter(|&t| t < end - TIME_TOLERANCE)
        .collect();
    times.push(end);
    for event in history.events() {
        for t in [event.start(), event.end()] {
            if t > start && t < end - TIME_TOLERANCE {
                times.push(t);
            }
        }
    }
    times.sort_by(|a, b| a.total_cmp(b));
    times.dedup_by(|a, b| (*a - *b).abs() <= TIME_TOLERANCE);
    times
}

/// Simulate a dense concentration-time curve over `[start, end]`
///
/// # Errors
///
/// Returns [PkError::InvalidParameter] if the window or the step are invalid.
pub fn simulate(
    history: &DoseHistory,
    pk: &PkParameters,
    start: f64,
    end: f64,
    step: f64,
) -> Result<PkCurve, PkError> {
    if !is_positive(step) {
        return Err(PkError::parameter("step", step));
    }
    if !start.is_finite() || !end.is_finite() || end <= start {
        return Err(PkError::parameter("window", format!("[{}, {}]", start, end)));
    }
    let times = time_grid(history, start, end, step);
    let concentrations = concentrations(history, pk, &times);
    Ok(PkCurve::new(times, concentrations))
}

/// Peak (end of infusion) and trough (start of the next dose) around the event at `index`
///
/// The trough is `None` for the last event, which has no next dose.
pub fn peak_trough_at(
    history: &DoseHistory,
    pk: &PkParameters,
    index: usize,
) -> Option<(f64, Option<f64>)> {
    let event = history.events().get(index)?;
    let peak = concentration_at(history, pk, event.end());
    let trough = history
        .events()
        .get(index + 1)
        .map(|next| concentration_at(history, pk, next.start()));
    Some((peak, trough))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Regimen;
    use approx::assert_relative_eq;

    fn pk() -> PkParameters {
        PkParameters::from_k_v(0.1, 50.0).unwrap()
    }

    #[test]
    fn test_single_infusion() {
        let event = DoseEvent::new(0.0, 1000.0, 1.0).unwrap();
        let pk = pk();
        let cmax = 1000.0 / 5.0 * (1.0 - (-0.1_f64).exp());
        assert_relative_eq!(event_concentration(&event, &pk, 1.0), cmax, epsilon = 1e-10);
        assert_relative_eq!(
            event_concentration(&event, &pk, 5.0),
            cmax * (-0.4_f64).exp(),
            epsilon = 1e-10
        );
        assert_eq!(event_concentration(&event, &pk, 0.0), 0.0);
    }

    #[test]
    fn test_short_infusion_approaches_ramp() {
        // k·d small: C(d) ≈ dose / V
        let pk = PkParameters::from_k_v(1e-6, 50.0).unwrap();
        let event = DoseEvent::new(0.0, 1000.0, 1.0).unwrap();
        assert_relative_eq!(
            event_concentration(&event, &pk, 0.5),
            1000.0 / 50.0 * 0.5,
            max_relative = 1e-5
        );
    }

    #[test]
    fn test_superposition_of_overlapping_infusions() {
        let pk = pk();
        let a = DoseEvent::new(0.0, 1000.0, 2.0).unwrap();
        let b = DoseEvent::new(1.0, 500.0, 2.0).unwrap();
        let history = DoseHistory::new(vec![a, b]).unwrap();
        for t in [0.5, 1.5, 2.5, 10.0] {
            assert_relative_eq!(
                concentration_at(&history, &pk, t),
                event_concentration(&a, &pk, t) + event_concentration(&b, &pk, t),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_grid_contains_infusion_ends() {
        let regimen = Regimen::new(1000.0, 12.0, 1.25).unwrap();
        let history = DoseHistory::repeated(&regimen, 48.0);
        let times = time_grid(&history, 0.0, 48.0, 1.0 / 6.0);
        for event in history.events().iter().filter(|e| e.end() < 48.0) {
            assert!(times.iter().any(|t| (t - event.end()).abs() < 1e-9));
        }
        assert!(times.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(*times.last().unwrap(), 48.0);
    }

    #[test]
    fn test_peak_trough_at() {
        let regimen = Regimen::new(1000.0, 12.0, 1.0).unwrap();
        let history = DoseHistory::repeated_n(&regimen, 3);
        let pk = pk();
        let (peak, trough) = peak_trough_at(&history, &pk, 0).unwrap();
        let cmax = 200.0 * (1.0 - (-0.1_f64).exp());
        assert_relative_eq!(peak, cmax, epsilon = 1e-10);
        assert_relative_eq!(trough.unwrap(), cmax * (-1.1_f64).exp(), epsilon = 1e-10);

        let (_, last_trough) = peak_trough_at(&history, &pk, 2).unwrap();
        assert!(last_trough.is_none());
        assert!(peak_trough_at(&history, &pk, 3).is_none());
    }

    #[test]
    fn test_invalid_window() {
        let history = DoseHistory::repeated_n(&Regimen::new(1000.0, 12.0, 1.0).unwrap(), 2);
        assert!(simulate(&history, &pk(), 0.0, 48.0, 0.0).is_err());
        assert!(simulate(&history, &pk(), 10.0, 5.0, 0.1).is_err());
    }
}
