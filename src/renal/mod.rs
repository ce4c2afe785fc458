//! Body weight and renal function estimation
//!
//! Derives the dosing weight and a creatinine clearance estimate from raw
//! patient covariates.
//!
//! # Body weights
//!
//! ```text
//! IBW   = 50 kg (male) | 45.5 kg (female) + 2.3 kg per inch above 60 in   (Devine)
//! AdjBW = IBW + 0.4 × (TBW − IBW)                                          (only if TBW > IBW)
//! ```
//!
//! [WeightStrategy::Auto] selects TBW for underweight patients, AdjBW when the
//! BMI is 30 or higher, and IBW otherwise.
//!
//! # Creatinine clearance
//!
//! Cockcroft-Gault is the default:
//!
//! ```text
//! CrCl = ((140 − age) × weight) / (72 × Scr)   × 0.85 if female
//! ```
//!
//! MDRD and CKD-EPI (2009) are available through [CrClMethod]. Both return a
//! GFR normalized to 1.73 m² and are used as-is.

use serde::{Deserialize, Serialize};

use crate::data::{Patient, Sex};
use crate::error::{is_positive, PkError, Warning};

const CM_PER_INCH: f64 = 2.54;
/// Conversion from mL/min to L/h
pub const ML_MIN_TO_L_H: f64 = 0.06;

/// Which body weight drives CrCl and the population model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WeightStrategy {
    #[default]
    Auto,
    /// Total (actual) body weight
    Tbw,
    /// Ideal body weight
    Ibw,
    /// Adjusted body weight
    AdjBw,
}

/// Renal function equation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CrClMethod {
    #[default]
    CockcroftGault,
    Mdrd,
    CkdEpi,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenalSettings {
    pub weight_strategy: WeightStrategy,
    pub crcl_method: CrClMethod,
    /// Serum creatinine floor in mg/dL, applied before the equation
    pub scr_floor: Option<f64>,
    /// Lowest CrCl reported, in mL/min
    pub min_crcl: f64,
    /// Measured or clinician-supplied CrCl that bypasses the equations
    pub forced_crcl: Option<f64>,
}

impl Default for RenalSettings {
    fn default() -> Self {
        RenalSettings {
            weight_strategy: WeightStrategy::Auto,
            crcl_method: CrClMethod::CockcroftGault,
            scr_floor: None,
            min_crcl: 10.0,
            forced_crcl: None,
        }
    }
}

impl RenalSettings {
    pub fn validate(&self) -> Result<(), PkError> {
        if !is_positive(self.min_crcl) {
            return Err(PkError::parameter("min_crcl", self.min_crcl));
        }
        if let Some(floor) = self.scr_floor.filter(|floor| !is_positive(*floor)) {
            return Err(PkError::parameter("scr_floor", floor));
        }
        if let Some(crcl) = self.forced_crcl.filter(|crcl| !is_positive(*crcl)) {
            return Err(PkError::parameter("forced_crcl", crcl));
        }
        Ok(())
    }
}

/// The candidate body weights for a patient and the one selected for dosing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyWeights {
    pub total: f64,
    pub ideal: f64,
    pub adjusted: f64,
    pub bmi: f64,
    pub effective: f64,
    /// The concrete strategy used, never [WeightStrategy::Auto]
    pub selected: WeightStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenalEstimate {
    pub weights: BodyWeights,
    /// Creatinine clearance in mL/min
    pub crcl: f64,
    pub method: CrClMethod,
    /// Serum creatinine actually used, after the floor
    pub scr_used: f64,
    pub warnings: Vec<Warning>,
}

impl RenalEstimate {
    /// Creatinine clearance in L/h
    pub fn crcl_l_h(&self) -> f64 {
        self.crcl * ML_MIN_TO_L_H
    }
}

/// Devine ideal body weight in kg
///
/// Heights below 60 in use the base weight rather than extrapolating downwards.
pub fn ideal_body_weight(sex: Sex, height_cm: f64) -> f64 {
    let base = match sex {
        Sex::Male => 50.0,
        Sex::Female => 45.5,
    };
    let inches_over_five_feet = (height_cm / CM_PER_INCH - 60.0).max(0.0);
    base + 2.3 * inches_over_five_feet
}

pub fn body_weights(patient: &Patient, strategy: WeightStrategy) -> BodyWeights {
    let total = patient.weight();
    let ideal = ideal_body_weight(patient.sex(), patient.height());
    let adjusted = if total > ideal {
        ideal + 0.4 * (total - ideal)
    } else {
        total
    };
    let bmi = patient.bmi();

    let selected = match strategy {
        WeightStrategy::Auto if total < ideal => WeightStrategy::Tbw,
        WeightStrategy::Auto if bmi >= 30.0 => WeightStrategy::AdjBw,
        WeightStrategy::Auto => WeightStrategy::Ibw,
        other => other,
    };
    let effective = match selected {
        WeightStrategy::Tbw => total,
        WeightStrategy::AdjBw => adjusted,
        WeightStrategy::Ibw | WeightStrategy::Auto => ideal,
    };

    BodyWeights {
        total,
        ideal,
        adjusted,
        bmi,
        effective,
        selected,
    }
}

pub fn cockcroft_gault(age: f64, weight: f64, scr: f64, sex: Sex) -> f64 {
    let crcl = ((140.0 - age) * weight) / (72.0 * scr);
    if sex.is_female() {
        crcl * 0.85
    } else {
        crcl
    }
}

pub fn mdrd(age: f64, scr: f64, sex: Sex) -> f64 {
    let gfr = 186.0 * scr.powf(-1.154) * age.powf(-0.203);
    if sex.is_female() {
        gfr * 0.742
    } else {
        gfr
    }
}

pub fn ckd_epi(age: f64, scr: f64, sex: Sex) -> f64 {
    let (kappa, alpha) = match sex {
        Sex::Female => (0.7, -0.329),
        Sex::Male => (0.9, -0.411),
    };
    let ratio = scr / kappa;
    let gfr = 141.0 * ratio.min(1.0).powf(alpha) * ratio.max(1.0).powf(-1.209) * 0.993_f64.powf(age);
    if sex.is_female() {
        gfr * 1.018
    } else {
        gfr
    }
}

/// Estimate body weights and creatinine clearance for a patient
///
/// # Errors
///
/// Returns [PkError::InvalidPatientInput] for invalid covariates and
/// [PkError::InvalidParameter] for an invalid forced CrCl or floor.
pub fn estimate(patient: &Patient, settings: &RenalSettings) -> Result<RenalEstimate, PkError> {
    patient.validate()?;
    let weights = body_weights(patient, settings.weight_strategy);

    let scr_used = match settings.scr_floor {
        Some(floor) if floor.is_finite() && floor > 0.0 => patient.scr().max(floor),
        Some(floor) => return Err(PkError::parameter("scr_floor", floor)),
        None => patient.scr(),
    };

    let computed = match settings.forced_crcl {
        Some(crcl) if crcl.is_finite() && crcl > 0.0 => crcl,
        Some(crcl) => return Err(PkError::parameter("forced_crcl", crcl)),
        None => match settings.crcl_method {
            CrClMethod::CockcroftGault => cockcroft_gault(
                patient.age(),
                weights.effective,
                scr_used,
                patient.sex(),
            ),
            CrClMethod::Mdrd => mdrd(patient.age(), scr_used, patient.sex()),
            CrClMethod::CkdEpi => ckd_epi(patient.age(), scr_used, patient.sex()),
        },
    };

    let mut warnings = Vec::new();
    let crcl = if computed < settings.min_crcl {
        tracing::debug!(
            "CrCl {:.1} mL/min below floor, using {:.1}",
            computed,
            settings.min_crcl
        );
        warnings.push(Warning::CrClFloored {
            computed,
            floor: settings.min_crcl,
        });
        settings.min_crcl
    } else {
        computed
    };

    Ok(RenalEstimate {
        weights,
        crcl,
        method: settings.crcl_method,
        scr_used,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn reference_patient() -> Patient {
        Patient::new(65.0, Sex::Male, 80.0, 175.0, 1.2).unwrap()
    }

    #[test]
    fn test_ideal_body_weight() {
        // 175 cm = 68.9 in
        assert_relative_eq!(
            ideal_body_weight(Sex::Male, 175.0),
            50.0 + 2.3 * (175.0 / 2.54 - 60.0),
            epsilon = 1e-10
        );
        assert_relative_eq!(ideal_body_weight(Sex::Female, 152.4), 45.5, epsilon = 1e-10);
        // below five feet uses the base weight
        assert_relative_eq!(ideal_body_weight(Sex::Female, 140.0), 45.5, epsilon = 1e-10);
    }

    #[test]
    fn test_auto_strategy() {
        // BMI 26: IBW
        let normal = body_weights(&reference_patient(), WeightStrategy::Auto);
        assert_eq!(normal.selected, WeightStrategy::Ibw);
        assert_relative_eq!(normal.effective, normal.ideal);

        // BMI 39: AdjBW
        let obese = Patient::new(50.0, Sex::Male, 120.0, 175.0, 1.0).unwrap();
        let obese = body_weights(&obese, WeightStrategy::Auto);
        assert_eq!(obese.selected, WeightStrategy::AdjBw);
        assert_relative_eq!(
            obese.effective,
            obese.ideal + 0.4 * (120.0 - obese.ideal),
            epsilon = 1e-10
        );

        // below ideal: TBW
        let thin = Patient::new(30.0, Sex::Female, 45.0, 170.0, 0.6).unwrap();
        let thin = body_weights(&thin, WeightStrategy::Auto);
        assert_eq!(thin.selected, WeightStrategy::Tbw);
        assert_relative_eq!(thin.effective, 45.0);
        assert_relative_eq!(thin.adjusted, 45.0);
    }

    #[test]
    fn test_explicit_strategy() {
        let weights = body_weights(&reference_patient(), WeightStrategy::Tbw);
        assert_eq!(weights.effective, 80.0);
    }

    #[test]
    fn test_cockcroft_gault_reference() {
        let estimate = estimate(&reference_patient(), &RenalSettings::default()).unwrap();
        // (75 × 70.46) / (72 × 1.2)
        assert!((estimate.crcl - 61.17).abs() < 0.05, "{}", estimate.crcl);
        assert!(estimate.warnings.is_empty());
        assert_relative_eq!(estimate.crcl_l_h(), estimate.crcl * 0.06);
    }

    #[test]
    fn test_female_adjustment() {
        let male = cockcroft_gault(40.0, 60.0, 1.0, Sex::Male);
        let female = cockcroft_gault(40.0, 60.0, 1.0, Sex::Female);
        assert_relative_eq!(female, male * 0.85);
    }

    #[test]
    fn test_scr_floor() {
        let patient = Patient::new(80.0, Sex::Female, 50.0, 160.0, 0.4).unwrap();
        let settings = RenalSettings {
            scr_floor: Some(0.7),
            weight_strategy: WeightStrategy::Tbw,
            ..Default::default()
        };
        let floored = estimate(&patient, &settings).unwrap();
        assert_eq!(floored.scr_used, 0.7);
        assert_relative_eq!(
            floored.crcl,
            cockcroft_gault(80.0, 50.0, 0.7, Sex::Female),
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_min_crcl() {
        let patient = Patient::new(95.0, Sex::Female, 45.0, 150.0, 6.0).unwrap();
        let estimate = estimate(&patient, &RenalSettings::default()).unwrap();
        assert_eq!(estimate.crcl, 10.0);
        assert!(matches!(estimate.warnings[0], Warning::CrClFloored { .. }));
    }

    #[test]
    fn test_alternative_equations() {
        let patient = reference_patient();
        for method in [CrClMethod::Mdrd, CrClMethod::CkdEpi] {
            let settings = RenalSettings {
                crcl_method: method,
                ..Default::default()
            };
            let estimate = estimate(&patient, &settings).unwrap();
            assert!(estimate.crcl.is_finite() && estimate.crcl > 0.0);
            assert_eq!(estimate.method, method);
        }
        // CKD-EPI: male, Scr 1.2 > κ
        let expected = 141.0 * (1.2_f64 / 0.9).powf(-1.209) * 0.993_f64.powf(65.0);
        assert_relative_eq!(ckd_epi(65.0, 1.2, Sex::Male), expected, epsilon = 1e-10);
    }

    #[test]
    fn test_forced_crcl() {
        let settings = RenalSettings {
            forced_crcl: Some(95.0),
            ..Default::default()
        };
        let estimate = estimate(&reference_patient(), &settings).unwrap();
        assert_eq!(estimate.crcl, 95.0);

        let invalid = RenalSettings {
            forced_crcl: Some(-1.0),
            ..Default::default()
        };
        assert!(super::estimate(&reference_patient(), &invalid).is_err());
    }
}
