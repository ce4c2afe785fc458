//! Exposure-based safety flags

use serde::{Deserialize, Serialize};

use crate::data::Patient;
use crate::error::{is_positive, PkError, Warning};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyThresholds {
    /// AUC24 in mg·h/L above which nephrotoxicity risk rises
    pub max_auc: f64,
    pub max_trough: f64,
    pub max_peak: f64,
    pub elderly_age: f64,
    pub elderly_auc: f64,
    /// Serum creatinine in mg/dL
    pub elevated_scr: f64,
    pub elevated_scr_auc: f64,
}

impl Default for SafetyThresholds {
    fn default() -> Self {
        SafetyThresholds {
            max_auc: 600.0,
            max_trough: 20.0,
            max_peak: 40.0,
            elderly_age: 65.0,
            elderly_auc: 550.0,
            elevated_scr: 1.5,
            elevated_scr_auc: 500.0,
        }
    }
}

impl SafetyThresholds {
    pub fn validate(&self) -> Result<(), PkError> {
        for (name, value) in [
            ("max_auc", self.max_auc),
            ("max_trough", self.max_trough),
            ("max_peak", self.max_peak),
            ("elderly_age", self.elderly_age),
            ("elderly_auc", self.elderly_auc),
            ("elevated_scr", self.elevated_scr),
            ("elevated_scr_auc", self.elevated_scr_auc),
        ] {
            if !is_positive(value) {
                return Err(PkError::parameter(name, value));
            }
        }
        Ok(())
    }
}

/// Safety warnings for a predicted exposure
///
/// Patient-specific flags (age, creatinine) are only raised when `patient` is given.
pub fn assess(
    auc24: f64,
    peak: f64,
    trough: f64,
    patient: Option<&Patient>,
    thresholds: &SafetyThresholds,
) -> Vec<Warning> {
    let mut warnings = Vec::new();
    if auc24 > thresholds.max_auc {
        warnings.push(Warning::HighAuc {
            auc: auc24,
            threshold: thresholds.max_auc,
        });
    }
    if trough > thresholds.max_trough {
        warnings.push(Warning::HighTrough {
            trough,
            threshold: thresholds.max_trough,
        });
    }
    if peak > thresholds.max_peak {
        warnings.push(Warning::HighPeak {
            peak,
            threshold: thresholds.max_peak,
        });
    }
    if let Some(patient) = patient {
        if patient.age() > thresholds.elderly_age && auc24 > thresholds.elderly_auc {
            warnings.push(Warning::ElderlyHighAuc {
                age: patient.age(),
                auc: auc24,
            });
        }
        if patient.scr() > thresholds.elevated_scr && auc24 > thresholds.elevated_scr_auc {
            warnings.push(Warning::ElevatedCreatinine {
                scr: patient.scr(),
                auc: auc24,
            });
        }
    }
    if !warnings.is_empty() {
        tracing::debug!("{} safety warning(s) raised", warnings.len());
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Sex;

    #[test]
    fn test_no_flags_in_range() {
        let patient = Patient::new(50.0, Sex::Female, 70.0, 165.0, 0.9).unwrap();
        let thresholds = SafetyThresholds::default();
        assert!(assess(480.0, 30.0, 12.0, Some(&patient), &thresholds).is_empty());
    }

    #[test]
    fn test_all_flags() {
        let patient = Patient::new(80.0, Sex::Male, 70.0, 175.0, 2.0).unwrap();
        let warnings = assess(700.0, 45.0, 25.0, Some(&patient), &SafetyThresholds::default());
        assert_eq!(warnings.len(), 5);
        assert!(warnings.iter().all(|w| w.is_safety()));
    }

    #[test]
    fn test_patient_flags_need_patient() {
        let warnings = assess(580.0, 30.0, 15.0, None, &SafetyThresholds::default());
        assert!(warnings.is_empty());
    }
}
