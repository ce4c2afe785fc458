//! Bayesian MAP estimation of clearance and volume from measured levels
//!
//! The posterior mode of `θ = (ln CL, ln V)` is found with a Nelder-Mead
//! simplex started at the prior means. Lognormal priors are Gaussian in `θ`;
//! normal priors are Gaussian on the natural scale. Uncertainty comes from the
//! Laplace approximation at the mode, or from importance sampling when the
//! curvature cannot be inverted reliably.

mod map;
pub mod prior;
pub mod residual;
mod uncertainty;

pub use prior::{PriorKind, PriorParam, Priors};
pub use residual::ResidualErrorModel;
pub use uncertainty::UncertaintyMethod;

use std::time::Duration;

use nalgebra::Matrix2;
use serde::{Deserialize, Serialize};

use crate::data::{DoseHistory, Level, PkParameters};
use crate::error::{is_positive, PkError, Warning};
use crate::simulator::concentration_at;
use map::MapProblem;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BayesSettings {
    /// Iteration cap of the simplex search
    pub max_iters: u64,
    /// Standard deviation of the simplex costs at which the search stops
    pub tolerance: f64,
    /// Wall-clock limit of the search in seconds
    pub timeout_secs: f64,
    /// Offset in log space of the initial simplex vertices
    pub simplex_step: f64,
    /// Between-subject variability of CL (log-scale SD) for population priors
    pub cl_omega: f64,
    pub v_omega: f64,
    /// Additive residual error in mg/L for population priors
    pub sigma: f64,
    pub sigma_variance: f64,
    /// Proportional residual error used with a normal sigma prior
    pub proportional: f64,
    /// Draws used when uncertainty falls back to importance sampling
    pub mc_samples: usize,
    /// Draws used for the prediction band, 0 to skip it
    pub band_samples: usize,
    pub seed: u64,
    /// Lower limit of quantification in mg/L
    pub lloq: f64,
}

impl Default for BayesSettings {
    fn default() -> Self {
        BayesSettings {
            max_iters: 500,
            tolerance: 1e-6,
            timeout_secs: 5.0,
            simplex_step: 0.1,
            cl_omega: 0.25,
            v_omega: 0.25,
            sigma: 1.5,
            sigma_variance: 0.25,
            proportional: 0.15,
            mc_samples: 2000,
            band_samples: 500,
            seed: 42,
            lloq: 1.0,
        }
    }
}

impl BayesSettings {
    pub fn validate(&self) -> Result<(), PkError> {
        if self.max_iters == 0 {
            return Err(PkError::parameter("max_iters", self.max_iters));
        }
        for (name, value) in [
            ("tolerance", self.tolerance),
            ("timeout_secs", self.timeout_secs),
            ("simplex_step", self.simplex_step),
            ("cl_omega", self.cl_omega),
            ("v_omega", self.v_omega),
            ("sigma", self.sigma),
            ("sigma_variance", self.sigma_variance),
        ] {
            if !is_positive(value) {
                return Err(PkError::parameter(name, value));
            }
        }
        if Duration::try_from_secs_f64(self.timeout_secs).is_err() {
            return Err(PkError::parameter("timeout_secs", self.timeout_secs));
        }
        if !self.proportional.is_finite() || self.proportional < 0.0 {
            return Err(PkError::parameter("proportional", self.proportional));
        }
        if !self.lloq.is_finite() || self.lloq < 0.0 {
            return Err(PkError::parameter("lloq", self.lloq));
        }
        if self.mc_samples < 10 {
            return Err(PkError::parameter("mc_samples", self.mc_samples));
        }
        Ok(())
    }
}

/// Posterior summary of one parameter
///
/// `mean` is on the natural scale. `variance` is on the scale of the prior:
/// natural for a normal prior, log for a lognormal one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterEstimate {
    pub mean: f64,
    pub variance: f64,
    pub sd: f64,
    pub kind: PriorKind,
}

impl ParameterEstimate {
    fn new(mean: f64, variance: f64, kind: PriorKind) -> Self {
        ParameterEstimate {
            mean,
            variance,
            sd: variance.sqrt(),
            kind,
        }
    }

    /// Approximate 95% interval on the natural scale
    pub fn interval95(&self) -> (f64, f64) {
        const Z: f64 = 1.959_963_984_540_054;
        match self.kind {
            PriorKind::LogNormal => (self.mean * (-Z * self.sd).exp(), self.mean * (Z * self.sd).exp()),
            PriorKind::Normal => ((self.mean - Z * self.sd).max(0.0), self.mean + Z * self.sd),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelFit {
    pub time: f64,
    pub observed: f64,
    pub predicted: f64,
    /// observed − predicted, in mg/L
    pub residual: f64,
}

/// Goodness of fit of the posterior parameters to the levels
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitDiagnostics {
    pub levels: Vec<LevelFit>,
    pub rmse: Option<f64>,
    /// Needs at least two levels that are not all equal
    pub r_squared: Option<f64>,
}

impl FitDiagnostics {
    pub fn new(history: &DoseHistory, pk: &PkParameters, levels: &[Level]) -> Self {
        let fits: Vec<LevelFit> = levels
            .iter()
            .map(|level| {
                let predicted = concentration_at(history, pk, level.time());
                LevelFit {
                    time: level.time(),
                    observed: level.concentration(),
                    predicted,
                    residual: level.concentration() - predicted,
                }
            })
            .collect();
        if fits.is_empty() {
            return FitDiagnostics::default();
        }

        let n = fits.len() as f64;
        let ss_res: f64 = fits.iter().map(|f| f.residual.powi(2)).sum();
        let mean_observed = fits.iter().map(|f| f.observed).sum::<f64>() / n;
        let ss_tot: f64 = fits
            .iter()
            .map(|f| (f.observed - mean_observed).powi(2))
            .sum();
        let r_squared = (fits.len() >= 2 && ss_tot > 0.0).then(|| 1.0 - ss_res / ss_tot);

        FitDiagnostics {
            levels: fits,
            rmse: Some((ss_res / n).sqrt()),
            r_squared,
        }
    }
}

/// Result of [estimate]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorEstimate {
    pub cl: ParameterEstimate,
    pub v: ParameterEstimate,
    /// Parameters at the posterior mode
    pub pk: PkParameters,
    pub convergence_achieved: bool,
    pub iterations: u64,
    /// Negative log posterior at the mode, up to a constant
    pub objective: f64,
    pub method: UncertaintyMethod,
    /// Covariance of `(ln CL, ln V)`, row-major
    pub log_covariance: [[f64; 2]; 2],
    pub diagnostics: FitDiagnostics,
    pub warnings: Vec<Warning>,
}

impl PosteriorEstimate {
    /// The prior itself, as returned when no levels are available
    pub fn from_prior(priors: &Priors) -> Result<Self, PkError> {
        let pk = priors.typical()?;
        let theta = [priors.cl.theta(), priors.v.theta()];
        Ok(PosteriorEstimate {
            cl: ParameterEstimate::new(priors.cl.mean, priors.cl.variance, priors.cl.kind),
            v: ParameterEstimate::new(priors.v.mean, priors.v.variance, priors.v.kind),
            pk,
            convergence_achieved: true,
            iterations: 0,
            objective: 0.0,
            method: UncertaintyMethod::Prior,
            log_covariance: [
                [priors.cl.theta_variance(theta[0]), 0.0],
                [0.0, priors.v.theta_variance(theta[1])],
            ],
            diagnostics: FitDiagnostics::default(),
            warnings: Vec::new(),
        })
    }

    pub fn covariance_matrix(&self) -> Matrix2<f64> {
        let c = self.log_covariance;
        Matrix2::new(c[0][0], c[0][1], c[1][0], c[1][1])
    }
}

/// Check that every level can inform the fit
///
/// # Errors
///
/// Returns [PkError::InvalidLevelInput] for a non-physical level, a level
/// without any dose before it, or one below `lloq`.
pub fn validate_levels(history: &DoseHistory, levels: &[Level], lloq: f64) -> Result<(), PkError> {
    if levels.is_empty() {
        return Ok(());
    }
    let first_dose = history.first().map(|event| event.start()).ok_or_else(|| {
        PkError::InvalidLevelInput("levels require at least one prior dose".to_string())
    })?;
    for level in levels {
        level.validate()?;
        if level.time() <= first_dose {
            return Err(PkError::InvalidLevelInput(format!(
                "level at {} h is not after the first dose at {} h",
                level.time(),
                first_dose
            )));
        }
        if level.concentration() < lloq {
            return Err(PkError::InvalidLevelInput(format!(
                "level of {} mg/L is below the quantification limit of {} mg/L",
                level.concentration(),
                lloq
            )));
        }
    }
    Ok(())
}

/// Maximum a posteriori estimate of CL and V
///
/// With no levels the prior is returned unchanged. Fit difficulties never
/// produce an error: they are reported as warnings on the estimate.
///
/// # Errors
///
/// Returns [PkError::InvalidLevelInput] for unusable levels and
/// [PkError::InvalidParameter] for invalid priors or settings.
pub fn estimate(
    history: &DoseHistory,
    levels: &[Level],
    priors: &Priors,
    settings: &BayesSettings,
) -> Result<PosteriorEstimate, PkError> {
    settings.validate()?;
    priors.validate()?;
    validate_levels(history, levels, settings.lloq)?;

    if levels.is_empty() {
        tracing::debug!("No levels supplied, posterior equals prior");
        return PosteriorEstimate::from_prior(priors);
    }

    let mut warnings = Vec::new();
    if levels.len() == 1 {
        warnings.push(Warning::SingleLevel);
    }

    let problem = MapProblem {
        history,
        levels,
        priors,
        error: ResidualErrorModel::from_prior(&priors.sigma, settings.proportional),
    };
    tracing::debug!(
        "MAP fit of {} level(s) with {:?} residual error",
        levels.len(),
        problem.error
    );

    let fit = match map::fit(&problem, settings) {
        Ok(fit) => fit,
        Err(err) => {
            tracing::warn!("MAP fit failed, falling back to the prior: {}", err);
            let mut estimate = PosteriorEstimate::from_prior(priors)?;
            estimate.convergence_achieved = false;
            estimate.diagnostics = FitDiagnostics::new(history, &estimate.pk, levels);
            warnings.push(Warning::ConvergenceFailure {
                iterations: 0,
                reason: err.to_string(),
            });
            estimate.warnings = warnings;
            return Ok(estimate);
        }
    };

    if !fit.converged {
        let reason = fit.reason.clone().unwrap_or_default();
        tracing::warn!(
            "MAP fit stopped after {} iterations without converging: {}",
            fit.iterations,
            reason
        );
        warnings.push(Warning::ConvergenceFailure {
            iterations: fit.iterations,
            reason,
        });
    }

    let theta = fit.theta;
    let caps = [
        priors.cl.theta_variance(theta[0]),
        priors.v.theta_variance(theta[1]),
    ];
    let (covariance, method) = match uncertainty::laplace(&problem, theta) {
        Some(covariance) => (covariance, UncertaintyMethod::Laplace),
        None => {
            tracing::warn!("Posterior curvature unusable, sampling from the prior");
            warnings.push(Warning::UncertaintyFromSampling);
            let covariance =
                uncertainty::importance_sampling(&problem, settings.mc_samples, settings.seed)
                    .unwrap_or_else(|| Matrix2::new(caps[0], 0.0, 0.0, caps[1]));
            (covariance, UncertaintyMethod::MonteCarlo)
        }
    };
    let covariance = uncertainty::clamp_covariance(&covariance, caps);

    let pk = PkParameters::from_cl_v(theta[0].exp(), theta[1].exp())?;
    let cl = ParameterEstimate::new(
        pk.cl(),
        priors.cl.variance_from_theta(theta[0], covariance[(0, 0)]),
        priors.cl.kind,
    );
    let v = ParameterEstimate::new(
        pk.v(),
        priors.v.variance_from_theta(theta[1], covariance[(1, 1)]),
        priors.v.kind,
    );
    tracing::info!(
        "MAP estimate: CL = {:.3} L/h (SD {:.3}), V = {:.2} L (SD {:.3}) after {} iterations",
        cl.mean,
        cl.sd,
        v.mean,
        v.sd,
        fit.iterations
    );

    Ok(PosteriorEstimate {
        cl,
        v,
        pk,
        convergence_achieved: fit.converged,
        iterations: fit.iterations,
        objective: fit.objective,
        method,
        log_covariance: [
            [covariance[(0, 0)], covariance[(0, 1)]],
            [covariance[(1, 0)], covariance[(1, 1)]],
        ],
        diagnostics: FitDiagnostics::new(history, &pk, levels),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Regimen;
    use approx::assert_relative_eq;

    fn priors() -> Priors {
        let pk = PkParameters::from_cl_v(4.0, 50.0).unwrap();
        Priors::population(&pk, &BayesSettings::default()).unwrap()
    }

    fn history() -> DoseHistory {
        DoseHistory::repeated_n(&Regimen::new(1000.0, 12.0, 1.0).unwrap(), 4)
    }

    #[test]
    fn test_no_levels_returns_prior() {
        let priors = priors();
        let posterior = estimate(&history(), &[], &priors, &BayesSettings::default()).unwrap();
        assert_eq!(posterior.cl.mean, priors.cl.mean);
        assert_eq!(posterior.cl.variance, priors.cl.variance);
        assert_eq!(posterior.v.mean, priors.v.mean);
        assert_eq!(posterior.v.variance, priors.v.variance);
        assert_eq!(posterior.iterations, 0);
        assert!(posterior.convergence_achieved);
        assert_eq!(posterior.method, UncertaintyMethod::Prior);
    }

    #[test]
    fn test_single_level_is_flagged() {
        let levels = vec![Level::new(47.5, 14.0).unwrap()];
        let priors = priors();
        let posterior = estimate(&history(), &levels, &priors, &BayesSettings::default()).unwrap();
        assert!(posterior.warnings.contains(&Warning::SingleLevel));
        assert!(posterior.cl.variance <= priors.cl.variance);
        assert!(posterior.v.variance <= priors.v.variance);
    }

    #[test]
    fn test_recovers_clearance() {
        let truth = PkParameters::from_cl_v(2.8, 55.0).unwrap();
        let history = history();
        let levels: Vec<Level> = [36.5, 40.0, 47.9]
            .iter()
            .map(|&t| Level::new(t, concentration_at(&history, &truth, t)).unwrap())
            .collect();
        let posterior = estimate(&history, &levels, &priors(), &BayesSettings::default()).unwrap();
        assert!(posterior.convergence_achieved);
        assert!((posterior.cl.mean - 2.8).abs() < 0.6, "CL = {}", posterior.cl.mean);
        assert_eq!(posterior.diagnostics.levels.len(), 3);
        assert!(posterior.diagnostics.rmse.unwrap() < 2.0);
        assert!(posterior.diagnostics.r_squared.unwrap() > 0.8);
    }

    #[test]
    fn test_level_validation() {
        let priors = priors();
        let settings = BayesSettings::default();
        let before_dose = vec![Level::new(0.0, 5.0).unwrap()];
        assert!(matches!(
            estimate(&history(), &before_dose, &priors, &settings),
            Err(PkError::InvalidLevelInput(_))
        ));
        let below_lloq = vec![Level::new(10.0, 0.5).unwrap()];
        assert!(matches!(
            estimate(&history(), &below_lloq, &priors, &settings),
            Err(PkError::InvalidLevelInput(_))
        ));
        let no_doses = vec![Level::new(10.0, 5.0).unwrap()];
        assert!(matches!(
            estimate(&DoseHistory::default(), &no_doses, &priors, &settings),
            Err(PkError::InvalidLevelInput(_))
        ));
    }

    #[test]
    fn test_interval95() {
        let lognormal = ParameterEstimate::new(4.0, 0.0625, PriorKind::LogNormal);
        let (low, high) = lognormal.interval95();
        assert_relative_eq!(low * high, 16.0, epsilon = 1e-10);
        let normal = ParameterEstimate::new(4.0, 4.0, PriorKind::Normal);
        let (low, high) = normal.interval95();
        assert_relative_eq!(low, 4.0 - 1.959_963_984_540_054 * 2.0, epsilon = 1e-12);
        assert_relative_eq!(high, 4.0 + 1.959_963_984_540_054 * 2.0, epsilon = 1e-12);
        // sd 3 reaches below zero
        let wide = ParameterEstimate::new(4.0, 9.0, PriorKind::Normal);
        assert_eq!(wide.interval95().0, 0.0);
    }

    #[test]
    fn test_unrepresentable_timeout_is_rejected() {
        let settings = BayesSettings {
            timeout_secs: 1e30,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
        let levels = vec![Level::new(47.5, 14.0).unwrap()];
        assert!(matches!(
            estimate(&history(), &levels, &priors(), &settings),
            Err(PkError::InvalidParameter { .. })
        ));
    }
}
