//! Residual error models for measured levels
//!
//! The standard deviation of a level is computed from the **prediction**:
//!
//! - **Constant**: σ = a
//! - **Proportional**: σ = b × |f|
//! - **Combined**: σ = sqrt(a² + b² × f²)
//! - **Exponential**: σ on the log scale, `ln(y) = ln(f) + ε`

use serde::{Deserialize, Serialize};

use crate::bayes::prior::{PriorKind, PriorParam};

/// `0.5 × ln(2π)`
const HALF_LN_TAU: f64 = 0.918_938_533_204_672_8;

/// Residual error model relating predictions to measured levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum ResidualErrorModel {
    /// σ = a
    Constant { a: f64 },
    /// σ = b × |f|
    Proportional { b: f64 },
    /// σ = sqrt(a² + b² × f²)
    ///
    /// The additive term dominates at low concentrations, the proportional
    /// term at high ones.
    Combined { a: f64, b: f64 },
    /// σ of `ln(y) − ln(f)`
    Exponential { sigma: f64 },
}

impl Default for ResidualErrorModel {
    fn default() -> Self {
        ResidualErrorModel::Combined { a: 1.5, b: 0.15 }
    }
}

impl ResidualErrorModel {
    pub fn constant(a: f64) -> Self {
        ResidualErrorModel::Constant { a }
    }

    pub fn proportional(b: f64) -> Self {
        ResidualErrorModel::Proportional { b }
    }

    pub fn combined(a: f64, b: f64) -> Self {
        ResidualErrorModel::Combined { a, b }
    }

    pub fn exponential(sigma: f64) -> Self {
        ResidualErrorModel::Exponential { sigma }
    }

    /// Error model implied by a sigma prior
    ///
    /// A lognormal sigma means multiplicative error on the log scale. A normal
    /// sigma is the additive part of a combined model with the given
    /// `proportional` coefficient, or a constant model when it is zero.
    pub fn from_prior(sigma: &PriorParam, proportional: f64) -> Self {
        match sigma.kind {
            PriorKind::LogNormal => ResidualErrorModel::Exponential { sigma: sigma.mean },
            PriorKind::Normal if proportional > 0.0 => ResidualErrorModel::Combined {
                a: sigma.mean,
                b: proportional,
            },
            PriorKind::Normal => ResidualErrorModel::Constant { a: sigma.mean },
        }
    }

    /// Standard deviation at `prediction`, floored to avoid division by zero
    pub fn sigma(&self, prediction: f64) -> f64 {
        let raw_sigma = match self {
            ResidualErrorModel::Constant { a } => *a,
            ResidualErrorModel::Proportional { b } => b * prediction.abs(),
            ResidualErrorModel::Combined { a, b } => {
                (a.powi(2) + b.powi(2) * prediction.powi(2)).sqrt()
            }
            ResidualErrorModel::Exponential { sigma } => *sigma,
        };
        raw_sigma.max(f64::EPSILON.sqrt())
    }

    pub fn variance(&self, prediction: f64) -> f64 {
        self.sigma(prediction).powi(2)
    }

    /// Residuals live on the log scale
    pub fn is_log_scale(&self) -> bool {
        matches!(self, ResidualErrorModel::Exponential { .. })
    }

    /// A concentration expressed on the residual scale
    pub fn transform(&self, concentration: f64) -> f64 {
        if self.is_log_scale() {
            concentration.max(f64::MIN_POSITIVE).ln()
        } else {
            concentration
        }
    }

    /// Normalized residual `(y − f) / σ` on the model's scale
    pub fn normalized_residual(&self, observation: f64, prediction: f64) -> f64 {
        (self.transform(observation) - self.transform(prediction)) / self.sigma(prediction)
    }

    /// Negative log-likelihood of a single level
    ///
    /// ```text
    /// −log L(y|f,σ) = 0.5 × z² + ln σ + 0.5 × ln(2π)
    /// ```
    pub fn neg_log_likelihood(&self, observation: f64, prediction: f64) -> f64 {
        let z = self.normalized_residual(observation, prediction);
        0.5 * z * z + self.sigma(prediction).ln() + HALF_LN_TAU
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sigma() {
        assert_relative_eq!(ResidualErrorModel::constant(0.5).sigma(100.0), 0.5);
        assert_relative_eq!(ResidualErrorModel::proportional(0.1).sigma(100.0), 10.0);
        assert_relative_eq!(
            ResidualErrorModel::combined(0.5, 0.1).sigma(100.0),
            100.25_f64.sqrt()
        );
        assert_relative_eq!(ResidualErrorModel::exponential(0.2).sigma(5.0), 0.2);
        assert!(ResidualErrorModel::proportional(0.1).sigma(0.0) > 0.0);
    }

    #[test]
    fn test_neg_log_likelihood_matches_normal_density() {
        let model = ResidualErrorModel::constant(2.0);
        let nll = model.neg_log_likelihood(12.0, 10.0);
        let density = (-0.5_f64).exp() / (2.0 * (2.0 * std::f64::consts::PI).sqrt());
        assert_relative_eq!(nll, -density.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_exponential_is_symmetric_in_ratio() {
        let model = ResidualErrorModel::exponential(0.2);
        assert_relative_eq!(
            model.normalized_residual(20.0, 10.0),
            -model.normalized_residual(10.0, 20.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_from_prior() {
        let normal = PriorParam::normal(1.5, 0.25).unwrap();
        assert_eq!(
            ResidualErrorModel::from_prior(&normal, 0.15),
            ResidualErrorModel::Combined { a: 1.5, b: 0.15 }
        );
        assert_eq!(
            ResidualErrorModel::from_prior(&normal, 0.0),
            ResidualErrorModel::Constant { a: 1.5 }
        );
        let lognormal = PriorParam::lognormal(0.2, 0.01).unwrap();
        assert!(ResidualErrorModel::from_prior(&lognormal, 0.15).is_log_scale());
    }
}
