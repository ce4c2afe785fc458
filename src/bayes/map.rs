use std::time::Duration;

use argmin::{
    core::{CostFunction, Error, Executor, State, TerminationReason, TerminationStatus},
    solver::neldermead::NelderMead,
};

use crate::bayes::prior::Priors;
use crate::bayes::residual::ResidualErrorModel;
use crate::bayes::BayesSettings;
use crate::data::{DoseHistory, Level, PkParameters};
use crate::simulator::concentration_at;

/// Cost returned where parameters leave the representable range
const INVALID_COST: f64 = 1e300;

/// Negative log posterior of `θ = (ln CL, ln V)`
#[derive(Debug, Clone)]
pub(crate) struct MapProblem<'a> {
    pub history: &'a DoseHistory,
    pub levels: &'a [Level],
    pub priors: &'a Priors,
    pub error: ResidualErrorModel,
}

impl CostFunction for MapProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;
    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.objective(theta[0], theta[1]))
    }
}

impl MapProblem<'_> {
    pub fn parameters(theta_cl: f64, theta_v: f64) -> Option<PkParameters> {
        PkParameters::from_cl_v(theta_cl.exp(), theta_v.exp()).ok()
    }

    /// Predicted concentration at each level
    pub fn predictions(&self, pk: &PkParameters) -> Vec<f64> {
        self.levels
            .iter()
            .map(|level| concentration_at(self.history, pk, level.time()))
            .collect()
    }

    /// Negative log-likelihood of the levels alone
    pub fn neg_log_likelihood(&self, theta_cl: f64, theta_v: f64) -> f64 {
        let Some(pk) = Self::parameters(theta_cl, theta_v) else {
            return INVALID_COST;
        };
        let nll: f64 = self
            .levels
            .iter()
            .zip(self.predictions(&pk))
            .map(|(level, prediction)| self.error.neg_log_likelihood(level.concentration(), prediction))
            .sum();
        if nll.is_finite() {
            nll
        } else {
            INVALID_COST
        }
    }

    pub fn objective(&self, theta_cl: f64, theta_v: f64) -> f64 {
        let penalty = self.priors.cl.penalty(theta_cl) + self.priors.v.penalty(theta_v);
        if !penalty.is_finite() {
            return INVALID_COST;
        }
        (penalty + self.neg_log_likelihood(theta_cl, theta_v)).min(INVALID_COST)
    }
}

/// Outcome of the simplex search
#[derive(Debug, Clone)]
pub(crate) struct MapFit {
    pub theta: [f64; 2],
    pub objective: f64,
    pub iterations: u64,
    pub converged: bool,
    /// Why the search stopped when it did not converge
    pub reason: Option<String>,
}

/// Minimize the negative log posterior with Nelder-Mead, starting at the prior means
///
/// Hitting the iteration cap or the timeout is not an error: the best vertex
/// found so far is returned with `converged = false`.
pub(crate) fn fit(problem: &MapProblem, settings: &BayesSettings) -> Result<MapFit, Error> {
    let start = vec![problem.priors.cl.theta(), problem.priors.v.theta()];
    let start_cost = problem.objective(start[0], start[1]);
    let simplex = create_initial_simplex(&start, settings.simplex_step);
    let solver: NelderMead<Vec<f64>, f64> =
        NelderMead::new(simplex).with_sd_tolerance(settings.tolerance)?;

    let timeout = Duration::try_from_secs_f64(settings.timeout_secs)?;
    let res = Executor::new(problem.clone(), solver)
        .configure(|state| state.max_iters(settings.max_iters))
        .timeout(timeout)
        .run()?;

    let state = res.state();
    let iterations = state.get_iter();
    let (converged, reason) = match state.get_termination_status() {
        TerminationStatus::Terminated(TerminationReason::SolverConverged) => (true, None),
        status => (false, Some(status.to_string())),
    };

    let best_cost = state.get_best_cost();
    let (theta, objective) = match state.get_best_param() {
        Some(best) if best_cost <= start_cost => ([best[0], best[1]], best_cost),
        _ => ([start[0], start[1]], start_cost),
    };

    Ok(MapFit {
        theta,
        objective,
        iterations,
        converged,
        reason,
    })
}

/// Initial simplex: the start point plus one vertex per dimension offset by `step`
fn create_initial_simplex(initial_point: &[f64], step: f64) -> Vec<Vec<f64>> {
    let mut vertices = Vec::with_capacity(initial_point.len() + 1);
    vertices.push(initial_point.to_vec());
    for i in 0..initial_point.len() {
        let mut perturbed_point = initial_point.to_owned();
        perturbed_point[i] += step;
        vertices.push(perturbed_point);
    }
    vertices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bayes::prior::PriorParam;
    use crate::data::Regimen;

    fn priors() -> Priors {
        Priors {
            cl: PriorParam::lognormal(4.0, 0.0625).unwrap(),
            v: PriorParam::lognormal(50.0, 0.0625).unwrap(),
            sigma: PriorParam::normal(1.5, 0.25).unwrap(),
        }
    }

    #[test]
    fn test_simplex() {
        let simplex = create_initial_simplex(&[1.0, 2.0], 0.1);
        assert_eq!(simplex, vec![vec![1.0, 2.0], vec![1.1, 2.0], vec![1.0, 2.1]]);
    }

    #[test]
    fn test_no_levels_stays_at_prior() {
        let priors = priors();
        let history = DoseHistory::repeated_n(&Regimen::new(1000.0, 12.0, 1.0).unwrap(), 4);
        let problem = MapProblem {
            history: &history,
            levels: &[],
            priors: &priors,
            error: ResidualErrorModel::default(),
        };
        let fit = fit(&problem, &BayesSettings::default()).unwrap();
        assert!((fit.theta[0] - 4.0_f64.ln()).abs() < 1e-3);
        assert!((fit.theta[1] - 50.0_f64.ln()).abs() < 1e-3);
    }

    #[test]
    fn test_fit_moves_towards_data() {
        let priors = priors();
        let regimen = Regimen::new(1000.0, 12.0, 1.0).unwrap();
        let history = DoseHistory::repeated_n(&regimen, 4);
        let truth = PkParameters::from_cl_v(2.5, 50.0).unwrap();
        let levels: Vec<Level> = [35.0, 37.0, 47.5]
            .iter()
            .map(|&t| Level::new(t, concentration_at(&history, &truth, t)).unwrap())
            .collect();
        let problem = MapProblem {
            history: &history,
            levels: &levels,
            priors: &priors,
            error: ResidualErrorModel::default(),
        };
        let fit = fit(&problem, &BayesSettings::default()).unwrap();
        assert!(fit.converged);
        let cl = fit.theta[0].exp();
        assert!(cl < 3.5 && cl > 2.0, "CL = {}", cl);
        assert!(fit.objective <= problem.objective(4.0_f64.ln(), 50.0_f64.ln()));
    }

    #[test]
    fn test_iteration_cap_is_not_an_error() {
        let priors = priors();
        let regimen = Regimen::new(1000.0, 12.0, 1.0).unwrap();
        let history = DoseHistory::repeated_n(&regimen, 4);
        let levels = vec![Level::new(47.5, 8.0).unwrap(), Level::new(37.0, 30.0).unwrap()];
        let problem = MapProblem {
            history: &history,
            levels: &levels,
            priors: &priors,
            error: ResidualErrorModel::default(),
        };
        let settings = BayesSettings {
            max_iters: 2,
            ..Default::default()
        };
        let fit = fit(&problem, &settings).unwrap();
        assert!(!fit.converged);
        assert!(fit.reason.is_some());
        assert!(fit.iterations <= 2);
    }
}
