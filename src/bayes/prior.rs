use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::bayes::BayesSettings;
use crate::data::PkParameters;
use crate::error::{is_positive, PkError};

/// Shape of a prior distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorKind {
    Normal,
    #[default]
    LogNormal,
}

/// Prior belief about one positive parameter
///
/// For [PriorKind::Normal], `mean` and `variance` are on the natural scale.
/// For [PriorKind::LogNormal], `mean` is the typical (median) value and
/// `variance` is the variance of its logarithm, `ω²`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorParam {
    pub mean: f64,
    pub variance: f64,
    pub kind: PriorKind,
}

impl PriorParam {
    pub fn new(mean: f64, variance: f64, kind: PriorKind) -> Result<Self, PkError> {
        let prior = PriorParam {
            mean,
            variance,
            kind,
        };
        prior.validate()?;
        Ok(prior)
    }

    pub fn normal(mean: f64, variance: f64) -> Result<Self, PkError> {
        Self::new(mean, variance, PriorKind::Normal)
    }

    pub fn lognormal(median: f64, log_variance: f64) -> Result<Self, PkError> {
        Self::new(median, log_variance, PriorKind::LogNormal)
    }

    pub fn validate(&self) -> Result<(), PkError> {
        if !is_positive(self.mean) {
            return Err(PkError::parameter("prior mean", self.mean));
        }
        if !is_positive(self.variance) {
            return Err(PkError::parameter("prior variance", self.variance));
        }
        Ok(())
    }

    pub fn sd(&self) -> f64 {
        self.variance.sqrt()
    }

    /// Where the search starts in log space
    pub(crate) fn theta(&self) -> f64 {
        self.mean.ln()
    }

    /// Negative log prior density at `θ = ln x`, up to a constant
    pub(crate) fn penalty(&self, theta: f64) -> f64 {
        match self.kind {
            PriorKind::LogNormal => (theta - self.mean.ln()).powi(2) / (2.0 * self.variance),
            PriorKind::Normal => (theta.exp() - self.mean).powi(2) / (2.0 * self.variance),
        }
    }

    /// Second derivative of [Self::penalty] with respect to `θ`
    pub(crate) fn curvature(&self, theta: f64) -> f64 {
        match self.kind {
            PriorKind::LogNormal => 1.0 / self.variance,
            PriorKind::Normal => {
                let x = theta.exp();
                (2.0 * x * x - self.mean * x) / self.variance
            }
        }
    }

    /// Draw `θ = ln x` from the prior, `None` for a non-positive natural-scale draw
    pub(crate) fn sample_theta<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<f64> {
        match self.kind {
            PriorKind::LogNormal => {
                let normal = Normal::new(self.mean.ln(), self.sd()).ok()?;
                Some(normal.sample(rng))
            }
            PriorKind::Normal => {
                let normal = Normal::new(self.mean, self.sd()).ok()?;
                let x: f64 = normal.sample(rng);
                (x > 0.0).then(|| x.ln())
            }
        }
    }

    /// Variance on this prior's own scale given a variance of `θ` at `theta`
    pub(crate) fn variance_from_theta(&self, theta: f64, theta_variance: f64) -> f64 {
        match self.kind {
            PriorKind::LogNormal => theta_variance,
            // delta method
            PriorKind::Normal => (2.0 * theta).exp() * theta_variance,
        }
    }

    /// Variance of `θ` at `theta` equivalent to this prior's variance
    pub(crate) fn theta_variance(&self, theta: f64) -> f64 {
        match self.kind {
            PriorKind::LogNormal => self.variance,
            PriorKind::Normal => self.variance * (-2.0 * theta).exp(),
        }
    }
}

/// Priors on clearance, volume and the residual error
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Priors {
    pub cl: PriorParam,
    pub v: PriorParam,
    /// Residual error magnitude; its kind selects the error model
    pub sigma: PriorParam,
}

impl Priors {
    /// Lognormal priors centered on population parameters
    pub fn population(pk: &PkParameters, settings: &BayesSettings) -> Result<Self, PkError> {
        Ok(Priors {
            cl: PriorParam::lognormal(pk.cl(), settings.cl_omega.powi(2))?,
            v: PriorParam::lognormal(pk.v(), settings.v_omega.powi(2))?,
            sigma: PriorParam::normal(settings.sigma, settings.sigma_variance)?,
        })
    }

    pub fn validate(&self) -> Result<(), PkError> {
        self.cl.validate()?;
        self.v.validate()?;
        self.sigma.validate()
    }

    /// Parameters at the prior means
    pub fn typical(&self) -> Result<PkParameters, PkError> {
        PkParameters::from_cl_v(self.cl.mean, self.v.mean)
    }
}
