//! Guardrail-constrained regimen search
//!
//! For each allowed interval `τ` the dose that hits the middle of the target
//! band at steady state is
//!
//! ```text
//! dose = AUC_mid × CL × τ / 24
//! ```
//!
//! rounded to the dose increment and clamped to the single and daily limits.
//! The candidate whose AUC24 is closest to the midpoint wins; ties go to the
//! interval closest to 1.25 half-lives.

mod guardrails;

pub use guardrails::{Guardrails, TargetRange};

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::auc::auc24_dose_cl;
use crate::data::{PkParameters, Regimen};
use crate::error::{is_positive, PkError, Warning};
use crate::simulator::steady_state::steady_state;

/// Preferred interval in half-lives, used to break ties
const PREFERRED_HALF_LIVES: f64 = 1.25;

/// One admissible regimen with its predicted exposure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub regimen: Regimen,
    pub auc24: f64,
    pub in_range: bool,
}

/// A regimen suggestion with the exposure it is expected to produce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Maintenance dose in mg
    pub dose: f64,
    /// Hours between doses
    pub interval: f64,
    /// Infusion duration in hours
    pub infusion: f64,
    pub loading_dose: Option<f64>,
    pub daily_dose: f64,
    /// Predicted steady-state AUC24 in mg·h/L
    pub auc24: f64,
    pub peak: f64,
    pub trough: f64,
    pub in_range: bool,
    pub warnings: Vec<Warning>,
}

impl Recommendation {
    pub fn regimen(&self) -> Result<Regimen, PkError> {
        Regimen::new(self.dose, self.interval, self.infusion)
    }
}

/// Infusion duration for a dose: 2 h from 2000 mg, 1.5 h from 1500 mg, otherwise 1 h
///
/// The result is clamped to the guardrails and never exceeds the interval.
pub fn infusion_duration(dose: f64, interval: f64, guardrails: &Guardrails) -> f64 {
    let duration: f64 = if dose >= 2000.0 {
        2.0
    } else if dose >= 1500.0 {
        1.5
    } else {
        1.0
    };
    duration
        .clamp(guardrails.min_infusion, guardrails.max_infusion)
        .min(interval)
}

/// Loading dose for a patient, if one is indicated
///
/// Indicated when the half-life exceeds `loading_half_life_ratio × interval`,
/// or always with `force_loading`.
pub fn loading_dose(
    pk: &PkParameters,
    interval: f64,
    weight: f64,
    guardrails: &Guardrails,
) -> Option<f64> {
    let indicated =
        guardrails.force_loading || pk.half_life() > guardrails.loading_half_life_ratio * interval;
    if !indicated {
        return None;
    }
    let dose = guardrails
        .round_dose(weight * guardrails.loading_mg_per_kg)
        .min(guardrails.max_loading_dose)
        .max(guardrails.min_dose);
    Some(dose)
}

/// Maintenance dose at `interval` after rounding and clamping, `None` if the
/// daily cap leaves no room for the minimum dose
fn candidate_dose(pk: &PkParameters, target: &TargetRange, interval: f64, guardrails: &Guardrails) -> Option<f64> {
    let raw = target.midpoint() * pk.cl() * interval / 24.0;
    let dose = guardrails
        .round_dose(raw)
        .clamp(guardrails.min_dose, guardrails.max_single_dose)
        .min(guardrails.daily_cap_per_dose(interval));
    (dose >= guardrails.min_dose).then_some(dose)
}

/// Every admissible regimen, best first
///
/// # Errors
///
/// Returns [PkError::InvalidParameter] for invalid guardrails or target.
pub fn rank_candidates(
    pk: &PkParameters,
    target: &TargetRange,
    guardrails: &Guardrails,
) -> Result<Vec<Candidate>, PkError> {
    guardrails.validate()?;
    target.validate()?;

    let mut candidates = Vec::with_capacity(guardrails.allowed_intervals.len());
    for &interval in &guardrails.allowed_intervals {
        let Some(dose) = candidate_dose(pk, target, interval, guardrails) else {
            tracing::debug!("Interval {} h skipped: daily cap below the minimum dose", interval);
            continue;
        };
        let regimen = Regimen::new(dose, interval, infusion_duration(dose, interval, guardrails))?;
        let auc24 = auc24_dose_cl(&regimen, pk);
        candidates.push(Candidate {
            regimen,
            auc24,
            in_range: target.contains(auc24),
        });
    }

    let midpoint = target.midpoint();
    let preferred = PREFERRED_HALF_LIVES * pk.half_life();
    candidates.sort_by(|a, b| {
        let distance = |c: &Candidate| ((c.auc24 - midpoint).abs() * 1e6).round();
        let spacing = |c: &Candidate| (c.regimen.interval() - preferred).abs();
        match distance(a).total_cmp(&distance(b)) {
            Ordering::Equal => spacing(a).total_cmp(&spacing(b)),
            ordering => ordering,
        }
    });
    Ok(candidates)
}

/// Best regimen for `pk` within the guardrails
///
/// Never fails on an unreachable target: the closest regimen is returned with
/// [Warning::TargetUnreachable].
///
/// # Arguments
///
/// * `pk` - Patient parameters, population or individual
/// * `target` - AUC24 band
/// * `guardrails` - Dosing limits
/// * `weight` - Effective body weight in kg, for the loading dose and the per-kg daily cap
pub fn recommend(
    pk: &PkParameters,
    target: &TargetRange,
    guardrails: &Guardrails,
    weight: f64,
) -> Result<Recommendation, PkError> {
    if !is_positive(weight) {
        return Err(PkError::InvalidPatientInput(format!(
            "effective weight must be positive, got {}",
            weight
        )));
    }
    guardrails.validate()?;
    let limits = guardrails.for_weight(weight);
    let candidates = rank_candidates(pk, target, &limits)?;
    // valid guardrails always leave the minimum dose at the longest interval
    let best = candidates
        .first()
        .ok_or_else(|| PkError::parameter("guardrails", "no admissible regimen"))?;

    let mut warnings = Vec::new();
    if !best.in_range {
        tracing::warn!(
            "Target {}-{} unreachable within guardrails, closest AUC24 is {:.0}",
            target.low,
            target.high,
            best.auc24
        );
        warnings.push(Warning::TargetUnreachable {
            closest_auc: best.auc24,
            low: target.low,
            high: target.high,
        });
    }

    let regimen = best.regimen;
    let levels = steady_state(&regimen, pk);
    tracing::debug!(
        "Recommended {} mg q{} h over {} h (AUC24 {:.0})",
        regimen.dose(),
        regimen.interval(),
        regimen.infusion(),
        best.auc24
    );

    Ok(Recommendation {
        dose: regimen.dose(),
        interval: regimen.interval(),
        infusion: regimen.infusion(),
        loading_dose: loading_dose(pk, regimen.interval(), weight, &limits),
        daily_dose: regimen.daily_dose(),
        auc24: best.auc24,
        peak: levels.peak,
        trough: levels.trough,
        in_range: best.in_range,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_recommendation_hits_target() {
        let pk = PkParameters::from_cl_v(4.0, 50.0).unwrap();
        let rec = recommend(&pk, &TargetRange::default(), &Guardrails::default(), 70.0).unwrap();
        assert!(rec.in_range);
        assert!(rec.warnings.is_empty());
        // 500 × 4 × 12 / 24 = 1000 mg q12h hits the midpoint exactly
        assert_eq!(rec.dose, 1000.0);
        assert_eq!(rec.interval, 12.0);
        assert_eq!(rec.infusion, 1.0);
        assert_relative_eq!(rec.auc24, 500.0);
        assert!(rec.peak > rec.trough);
    }

    #[test]
    fn test_tie_break_prefers_interval_near_half_life() {
        // 1000 q12 and 2000 q24 both give AUC 500; t½ = 17.3 h prefers 24 h
        let pk = PkParameters::from_cl_v(4.0, 100.0).unwrap();
        let candidates =
            rank_candidates(&pk, &TargetRange::default(), &Guardrails::default()).unwrap();
        assert_eq!(candidates[0].regimen.interval(), 24.0);
        assert_eq!(candidates[1].regimen.interval(), 12.0);
    }

    #[test]
    fn test_limits_are_respected() {
        let guardrails = Guardrails::default();
        for cl in [0.5, 2.0, 6.0, 12.0, 25.0] {
            let pk = PkParameters::from_cl_v(cl, 50.0).unwrap();
            for candidate in rank_candidates(&pk, &TargetRange::default(), &guardrails).unwrap() {
                assert!(candidate.regimen.dose() <= guardrails.max_single_dose);
                assert!(candidate.regimen.dose() >= guardrails.min_dose);
                assert!(candidate.regimen.daily_dose() <= guardrails.max_daily_dose + 1e-9);
            }
        }
    }

    #[test]
    fn test_unreachable_target_warns() {
        let pk = PkParameters::from_cl_v(25.0, 50.0).unwrap();
        let rec = recommend(&pk, &TargetRange::default(), &Guardrails::default(), 80.0).unwrap();
        assert!(!rec.in_range);
        assert!(matches!(rec.warnings[0], Warning::TargetUnreachable { .. }));
        assert!(rec.daily_dose <= 4500.0);
    }

    #[test]
    fn test_daily_dose_is_capped_by_weight() {
        // 1000 mg/day for 10 kg keeps every candidate at AUC24 ≈ 333
        let pk = PkParameters::from_cl_v(3.0, 20.0).unwrap();
        let rec = recommend(&pk, &TargetRange::default(), &Guardrails::default(), 10.0).unwrap();
        assert!(rec.daily_dose <= 1000.0 + 1e-9);
        assert!(!rec.in_range);
        assert!(matches!(rec.warnings[0], Warning::TargetUnreachable { .. }));

        let adult = recommend(&pk, &TargetRange::default(), &Guardrails::default(), 70.0).unwrap();
        assert!(adult.in_range);
    }

    #[test]
    fn test_guardrails_without_candidates_are_rejected() {
        let guardrails = Guardrails {
            dose_increment: 1000.0,
            max_daily_dose: 400.0,
            ..Default::default()
        };
        let pk = PkParameters::from_cl_v(4.0, 50.0).unwrap();
        assert!(matches!(
            recommend(&pk, &TargetRange::default(), &guardrails, 70.0),
            Err(PkError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_infusion_duration() {
        let guardrails = Guardrails::default();
        assert_eq!(infusion_duration(750.0, 12.0, &guardrails), 1.0);
        assert_eq!(infusion_duration(1500.0, 12.0, &guardrails), 1.5);
        assert_eq!(infusion_duration(2000.0, 24.0, &guardrails), 2.0);
        let tight = Guardrails {
            max_infusion: 1.25,
            ..Default::default()
        };
        assert_eq!(infusion_duration(2000.0, 24.0, &tight), 1.25);
    }

    #[test]
    fn test_loading_dose() {
        let guardrails = Guardrails::default();
        let long = PkParameters::from_cl_v(2.0, 60.0).unwrap();
        assert_eq!(loading_dose(&long, 12.0, 80.0, &guardrails), Some(2000.0));
        assert_eq!(loading_dose(&long, 12.0, 200.0, &guardrails), Some(3000.0));

        let short = PkParameters::from_cl_v(10.0, 40.0).unwrap();
        assert_eq!(loading_dose(&short, 12.0, 80.0, &guardrails), None);
        let forced = Guardrails {
            force_loading: true,
            ..Default::default()
        };
        assert_eq!(loading_dose(&short, 12.0, 80.0, &forced), Some(2000.0));
    }
}
