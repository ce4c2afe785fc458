//! Posterior uncertainty in `θ = (ln CL, ln V)`
//!
//! The Laplace approximation inverts the curvature of the negative log
//! posterior at the MAP estimate. The data part of the curvature uses the
//! Gauss-Newton form `JᵀWJ`, where `J` holds the derivatives of the predicted
//! levels (on the residual scale) with respect to `θ` and `W = diag(1/σ²)`.
//! When that matrix is not positive definite or badly conditioned, the
//! posterior moments are estimated by importance sampling from the prior.

use nalgebra::{Matrix2, Vector2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bayes::map::MapProblem;
use crate::simulator::concentration_at;

/// Step in `θ` for the central-difference Jacobian
const JACOBIAN_STEP: f64 = 1e-4;
/// Largest accepted condition number of the curvature matrix
const MAX_CONDITION: f64 = 1e12;

/// How the reported uncertainty was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UncertaintyMethod {
    /// No levels were given: the prior itself
    Prior,
    Laplace,
    MonteCarlo,
}

/// Curvature of the negative log posterior at `theta`
pub(crate) fn curvature(problem: &MapProblem, theta: [f64; 2]) -> Option<Matrix2<f64>> {
    let prior = Matrix2::new(
        problem.priors.cl.curvature(theta[0]),
        0.0,
        0.0,
        problem.priors.v.curvature(theta[1]),
    );

    let pk = MapProblem::parameters(theta[0], theta[1])?;
    let predictions = problem.predictions(&pk);
    let mut information = Matrix2::<f64>::zeros();
    for (i, &prediction) in predictions.iter().enumerate() {
        let mut gradient = Vector2::<f64>::zeros();
        for p in 0..2 {
            let mut up = theta;
            let mut down = theta;
            up[p] += JACOBIAN_STEP;
            down[p] -= JACOBIAN_STEP;
            let f_up = predict_one(problem, up, i)?;
            let f_down = predict_one(problem, down, i)?;
            gradient[p] = (problem.error.transform(f_up) - problem.error.transform(f_down))
                / (2.0 * JACOBIAN_STEP);
        }
        information += gradient * gradient.transpose() / problem.error.variance(prediction);
    }

    let total = prior + information;
    total.iter().all(|x| x.is_finite()).then_some(total)
}

fn predict_one(problem: &MapProblem, theta: [f64; 2], index: usize) -> Option<f64> {
    let pk = MapProblem::parameters(theta[0], theta[1])?;
    let level = problem.levels.get(index)?;
    Some(concentration_at(problem.history, &pk, level.time()))
}

/// Laplace covariance of `θ`, `None` if the curvature is unusable
pub(crate) fn laplace(problem: &MapProblem, theta: [f64; 2]) -> Option<Matrix2<f64>> {
    let hessian = curvature(problem, theta)?;
    let eigenvalues = hessian.symmetric_eigenvalues();
    let (min, max) = (eigenvalues.min(), eigenvalues.max());
    if min <= 0.0 || max / min > MAX_CONDITION {
        tracing::debug!(
            "Curvature eigenvalues {:.3e} and {:.3e} rejected for the Laplace approximation",
            min,
            max
        );
        return None;
    }
    hessian.cholesky()?;
    hessian.try_inverse()
}

/// Posterior covariance of `θ` by self-normalized importance sampling from the prior
///
/// Sample `i` uses the seed `seed + i`. Returns `None` if too few draws carry weight.
pub(crate) fn importance_sampling(
    problem: &MapProblem,
    samples: usize,
    seed: u64,
) -> Option<Matrix2<f64>> {
    let draws: Vec<(Vector2<f64>, f64)> = (0..samples)
        .into_par_iter()
        .filter_map(|i| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
            let theta_cl = problem.priors.cl.sample_theta(&mut rng)?;
            let theta_v = problem.priors.v.sample_theta(&mut rng)?;
            let log_weight = -problem.neg_log_likelihood(theta_cl, theta_v);
            log_weight
                .is_finite()
                .then(|| (Vector2::new(theta_cl, theta_v), log_weight))
        })
        .collect();

    let max_log_weight = draws
        .iter()
        .map(|(_, w)| *w)
        .fold(f64::NEG_INFINITY, f64::max);
    if draws.len() < 3 || !max_log_weight.is_finite() {
        return None;
    }

    let weights: Vec<f64> = draws
        .iter()
        .map(|(_, w)| (w - max_log_weight).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    let effective = total.powi(2) / weights.iter().map(|w| w * w).sum::<f64>();
    if effective < 2.0 {
        return None;
    }

    let mean = draws
        .iter()
        .zip(&weights)
        .fold(Vector2::<f64>::zeros(), |acc, ((theta, _), w)| acc + theta * *w)
        / total;
    let covariance = draws
        .iter()
        .zip(&weights)
        .fold(Matrix2::<f64>::zeros(), |acc, ((theta, _), w)| {
            let d = theta - mean;
            acc + d * d.transpose() * *w
        })
        / total;

    (covariance[(0, 0)] > 0.0 && covariance[(1, 1)] > 0.0).then_some(covariance)
}

/// Shrink `covariance` so neither marginal exceeds its cap, keeping the correlation
pub(crate) fn clamp_covariance(covariance: &Matrix2<f64>, caps: [f64; 2]) -> Matrix2<f64> {
    let scale = Vector2::new(
        (caps[0] / covariance[(0, 0)]).min(1.0).sqrt(),
        (caps[1] / covariance[(1, 1)]).min(1.0).sqrt(),
    );
    Matrix2::from_fn(|i, j| covariance[(i, j)] * scale[i] * scale[j])
}
