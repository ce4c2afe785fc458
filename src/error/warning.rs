use std::fmt;

use serde::{Deserialize, Serialize};

/// Non-fatal conditions attached to a result
///
/// Clinicians always receive an actionable number; anything that makes that
/// number less trustworthy is surfaced here instead of as an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// The MAP fit stopped on the iteration cap or the timeout
    ConvergenceFailure { iterations: u64, reason: String },
    /// No regimen within the guardrails lands inside the target band
    TargetUnreachable { closest_auc: f64, low: f64, high: f64 },
    /// A single level constrains only one direction of (CL, V)
    SingleLevel,
    /// The closed-form AUC was requested for a history it does not apply to
    AucMethodFallback,
    /// Curvature was unusable and uncertainty came from sampling
    UncertaintyFromSampling,
    /// The computed creatinine clearance was raised to the configured minimum
    CrClFloored { computed: f64, floor: f64 },
    HighAuc { auc: f64, threshold: f64 },
    HighTrough { trough: f64, threshold: f64 },
    HighPeak { peak: f64, threshold: f64 },
    ElderlyHighAuc { age: f64, auc: f64 },
    ElevatedCreatinine { scr: f64, auc: f64 },
}

impl Warning {
    /// Warnings derived from predicted exposure rather than from the numerics
    pub fn is_safety(&self) -> bool {
        matches!(
            self,
            Warning::HighAuc { .. }
                | Warning::HighTrough { .. }
                | Warning::HighPeak { .. }
                | Warning::ElderlyHighAuc { .. }
                | Warning::ElevatedCreatinine { .. }
        )
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::ConvergenceFailure { iterations, reason } => write!(
                f,
                "MAP fit did not converge after {} iterations ({}); best estimate returned",
                iterations, reason
            ),
            Warning::TargetUnreachable {
                closest_auc,
                low,
                high,
            } => write!(
                f,
                "Unable to reach {:.0}-{:.0} mg·h/L within guardrails; closest is {:.0}",
                low, high, closest_auc
            ),
            Warning::SingleLevel => write!(
                f,
                "Only one level supplied; CL and V are not separately identifiable"
            ),
            Warning::AucMethodFallback => write!(
                f,
                "Dose/CL AUC is only valid at steady state; trapezoidal AUC used instead"
            ),
            Warning::UncertaintyFromSampling => write!(
                f,
                "Posterior curvature was ill-conditioned; uncertainty estimated by sampling"
            ),
            Warning::CrClFloored { computed, floor } => write!(
                f,
                "Creatinine clearance {:.1} mL/min raised to the minimum of {:.1} mL/min",
                computed, floor
            ),
            Warning::HighAuc { auc, threshold } => write!(
                f,
                "AUC {:.0} > {:.0} mg·h/L increases nephrotoxicity risk",
                auc, threshold
            ),
            Warning::HighTrough { trough, threshold } => write!(
                f,
                "Predicted trough {:.1} > {:.0} mg/L - consider dose reduction",
                trough, threshold
            ),
            Warning::HighPeak { peak, threshold } => write!(
                f,
                "Predicted peak {:.1} > {:.0} mg/L - consider longer infusion",
                peak, threshold
            ),
            Warning::ElderlyHighAuc { age, auc } => write!(
                f,
                "Patient aged {:.0} with AUC {:.0} mg·h/L - enhanced monitoring recommended",
                age, auc
            ),
            Warning::ElevatedCreatinine { scr, auc } => write!(
                f,
                "Serum creatinine {:.2} mg/dL with AUC {:.0} mg·h/L - monitor renal function closely",
                scr, auc
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safety_classification() {
        assert!(Warning::HighAuc {
            auc: 700.0,
            threshold: 600.0
        }
        .is_safety());
        assert!(!Warning::SingleLevel.is_safety());
        assert!(!Warning::TargetUnreachable {
            closest_auc: 250.0,
            low: 400.0,
            high: 600.0
        }
        .is_safety());
    }

    #[test]
    fn test_serialized_tag() {
        let json = serde_json::to_string(&Warning::SingleLevel).unwrap();
        assert_eq!(json, r#"{"kind":"single_level"}"#);
    }
}
