//! The three external operations of the dosing engine
//!
//! Each call is a pure function of its inputs and the [Settings]; nothing is
//! cached between calls.

use serde::{Deserialize, Serialize};

use crate::auc::{default_window_start, history_auc, regimen_auc, AucBreakdown};
use crate::bayes::{self, PosteriorEstimate, Priors};
use crate::data::{DoseHistory, Level, Patient, PkParameters, Regimen};
use crate::error::{PkError, Warning};
use crate::optimize::{self, Guardrails, Recommendation, TargetRange};
use crate::population::{typical_parameters, PopulationEstimate, SegmentKind};
use crate::renal::{self, BodyWeights, RenalEstimate};
use crate::safety::{self, SafetyThresholds};
use crate::settings::Settings;
use crate::simulator::steady_state::steady_state;
use crate::simulator::{prediction_band, simulate, PkCurve, PredictionBand};

/// Summary exposure numbers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// mg·h/L
    pub auc24: f64,
    /// mg/L
    pub peak: f64,
    /// mg/L
    pub trough: f64,
    /// mL/min
    pub crcl: f64,
    /// h
    pub half_life: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeterministicResult {
    pub metrics: Metrics,
    /// Concentrations from the first dose to the simulation horizon
    pub curve: PkCurve,
    pub pk: PkParameters,
    pub weights: BodyWeights,
    pub segment: SegmentKind,
    pub renal: RenalEstimate,
    pub auc: AucBreakdown,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayesianResult {
    pub posterior: PosteriorEstimate,
    /// Steady-state exposure of the recommended regimen
    pub metrics: Metrics,
    /// Individual prediction over the dose history
    pub curve: PkCurve,
    pub population_curve: PkCurve,
    /// 95% band around `curve`
    pub band: Option<PredictionBand>,
    /// Exposure of the given history under the posterior parameters
    ///
    /// A uniform history at steady state reports its regimen's AUC24. Any other
    /// history is integrated over the 24 hours ending at the start of its last
    /// dose (from the first dose if the history is shorter than a day).
    pub history_auc: AucBreakdown,
    pub recommendation: Recommendation,
    pub priors: Priors,
    pub population: PopulationEstimate,
    pub renal: RenalEstimate,
    pub warnings: Vec<Warning>,
}

/// Population-based prediction for a patient on a regimen
///
/// # Errors
///
/// Returns [PkError::InvalidPatientInput] or [PkError::InvalidRegimenInput]
/// for invalid inputs and [PkError::Settings] for inconsistent settings.
pub fn compute_deterministic(
    patient: &Patient,
    regimen: &Regimen,
    settings: &Settings,
) -> Result<DeterministicResult, PkError> {
    settings.validate()?;
    regimen.validate()?;
    settings.guardrails.check_regimen(regimen)?;

    let renal = renal::estimate(patient, &settings.renal)?;
    let population = typical_parameters(
        renal.weights.effective,
        renal.crcl,
        patient.age(),
        &settings.population,
    )?;
    let pk = population.pk;

    let simulation = &settings.simulation;
    let auc = regimen_auc(
        regimen,
        &pk,
        simulation.auc_method,
        simulation.step,
        simulation.integration_rule,
    )?;
    let levels = steady_state(regimen, &pk);
    let history = DoseHistory::repeated(regimen, simulation.horizon);
    let curve = simulate(&history, &pk, 0.0, simulation.horizon, simulation.step)?;

    let metrics = Metrics {
        auc24: auc.auc24,
        peak: levels.peak,
        trough: levels.trough,
        crcl: renal.crcl,
        half_life: pk.half_life(),
    };

    let mut warnings = renal.warnings.clone();
    warnings.extend(safety::assess(
        metrics.auc24,
        metrics.peak,
        metrics.trough,
        Some(patient),
        &settings.safety,
    ));
    tracing::info!(
        "Deterministic: CrCl {:.1} mL/min, CL {:.3} L/h, V {:.2} L, AUC24 {:.0} mg·h/L",
        renal.crcl,
        pk.cl(),
        pk.v(),
        metrics.auc24
    );

    Ok(DeterministicResult {
        metrics,
        curve,
        pk,
        weights: renal.weights,
        segment: population.segment,
        renal,
        auc,
        warnings,
    })
}

/// Individualized prediction and recommendation from measured levels
///
/// Without `priors` the population parameters of the patient are used with
/// the between-subject variability from the settings.
///
/// # Errors
///
/// Returns [PkError::InvalidLevelInput] for unusable levels,
/// [PkError::InvalidPatientInput] or [PkError::InvalidRegimenInput] for
/// invalid inputs and [PkError::InvalidParameter] for invalid priors or target.
pub fn compute_bayesian(
    patient: &Patient,
    history: &DoseHistory,
    levels: &[Level],
    priors: Option<Priors>,
    target: &TargetRange,
    settings: &Settings,
) -> Result<BayesianResult, PkError> {
    settings.validate()?;
    target.validate()?;

    let renal = renal::estimate(patient, &settings.renal)?;
    let population = typical_parameters(
        renal.weights.effective,
        renal.crcl,
        patient.age(),
        &settings.population,
    )?;
    let priors = match priors {
        Some(priors) => priors,
        None => Priors::population(&population.pk, &settings.bayes)?,
    };

    let posterior = bayes::estimate(history, levels, &priors, &settings.bayes)?;
    let first_dose = history
        .first()
        .map(|event| event.start())
        .ok_or_else(|| PkError::InvalidRegimenInput("dose history is empty".to_string()))?;
    let pk = posterior.pk;

    let simulation = &settings.simulation;
    let (history_auc, auc_warnings) = history_auc(
        history,
        &pk,
        simulation.auc_method,
        default_window_start(history),
        simulation.step,
        simulation.integration_rule,
    )?;

    let mut recommendation =
        optimize::recommend(&pk, target, &settings.guardrails, renal.weights.effective)?;
    recommendation.warnings.extend(safety::assess(
        recommendation.auc24,
        recommendation.peak,
        recommendation.trough,
        Some(patient),
        &settings.safety,
    ));

    let last_level = levels.iter().map(|level| level.time()).fold(f64::MIN, f64::max);
    let last_dose = history.last().map_or(first_dose, |event| event.start());
    let end = (first_dose + simulation.horizon)
        .max(last_dose + 24.0)
        .max(last_level);
    let curve = simulate(history, &pk, first_dose, end, simulation.step)?;
    let population_curve = simulate(history, &population.pk, first_dose, end, simulation.step)?;

    let band = if settings.bayes.band_samples >= 2 {
        match prediction_band(
            history,
            &pk,
            &posterior.covariance_matrix(),
            &curve.times(),
            settings.bayes.band_samples,
            settings.bayes.seed,
        ) {
            Ok(band) => Some(band),
            Err(err) => {
                tracing::warn!("Prediction band skipped: {}", err);
                None
            }
        }
    } else {
        None
    };

    let metrics = Metrics {
        auc24: recommendation.auc24,
        peak: recommendation.peak,
        trough: recommendation.trough,
        crcl: renal.crcl,
        half_life: pk.half_life(),
    };

    let mut warnings = renal.warnings.clone();
    warnings.extend(posterior.warnings.iter().cloned());
    warnings.extend(auc_warnings);
    warnings.extend(recommendation.warnings.iter().cloned());
    tracing::info!(
        "Bayesian: CL {:.3} L/h, V {:.2} L from {} level(s); recommend {} mg q{} h",
        pk.cl(),
        pk.v(),
        levels.len(),
        recommendation.dose,
        recommendation.interval
    );

    Ok(BayesianResult {
        posterior,
        metrics,
        curve,
        population_curve,
        band,
        history_auc,
        recommendation,
        priors,
        population,
        renal,
        warnings,
    })
}

/// Guardrail-constrained regimen for known parameters
///
/// Exposure-based safety warnings use the default thresholds; patient-specific
/// flags need [compute_bayesian].
///
/// # Arguments
///
/// * `weight` - Effective body weight in kg, used for the loading dose
pub fn optimize_regimen(
    pk: &PkParameters,
    target: &TargetRange,
    guardrails: &Guardrails,
    weight: f64,
) -> Result<Recommendation, PkError> {
    let mut recommendation = optimize::recommend(pk, target, guardrails, weight)?;
    recommendation.warnings.extend(safety::assess(
        recommendation.auc24,
        recommendation.peak,
        recommendation.trough,
        None,
        &SafetyThresholds::default(),
    ));
    Ok(recommendation)
}
