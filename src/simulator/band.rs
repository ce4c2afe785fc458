use nalgebra::{Matrix2, Vector2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::{DoseHistory, PkParameters};
use crate::error::PkError;
use crate::simulator::concentrations;

/// Percentile envelope around a predicted curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionBand {
    pub times: Vec<f64>,
    pub lower: Vec<f64>,
    pub median: Vec<f64>,
    pub upper: Vec<f64>,
    pub samples: usize,
}

/// Monte Carlo prediction band for `history` around `pk`
///
/// `(ln CL, ln V)` is drawn from a bivariate normal centered on `pk` with
/// covariance `log_covariance`; each draw is simulated at `times` and the
/// 2.5th, 50th and 97.5th percentiles are reported. Sample `i` uses the seed
/// `seed + i`, so the band is reproducible regardless of thread scheduling.
pub fn prediction_band(
    history: &DoseHistory,
    pk: &PkParameters,
    log_covariance: &Matrix2<f64>,
    times: &[f64],
    samples: usize,
    seed: u64,
) -> Result<PredictionBand, PkError> {
    if samples < 2 {
        return Err(PkError::parameter("band samples", samples));
    }
    let cholesky = (*log_covariance)
        .cholesky()
        .ok_or_else(|| PkError::parameter("log covariance", "not positive definite"))?;
    let l = cholesky.l();
    let center = Vector2::new(pk.cl().ln(), pk.v().ln());

    let draws: Vec<Vec<f64>> = (0..samples)
        .into_par_iter()
        .filter_map(|i| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
            let z: Vector2<f64> =
                Vector2::new(rng.sample(StandardNormal), rng.sample(StandardNormal));
            let theta = center + l * z;
            let draw = PkParameters::from_cl_v(theta[0].exp(), theta[1].exp()).ok()?;
            Some(concentrations(history, &draw, times))
        })
        .collect();

    if draws.len() < 2 {
        return Err(PkError::parameter("band samples", "no valid draws"));
    }

    let mut lower = Vec::with_capacity(times.len());
    let mut median = Vec::with_capacity(times.len());
    let mut upper = Vec::with_capacity(times.len());
    let mut column = Vec::with_capacity(draws.len());
    for j in 0..times.len() {
        column.clear();
        column.extend(draws.iter().map(|draw| draw[j]));
        column.sort_by(|a, b| a.total_cmp(b));
        lower.push(percentile(&column, 2.5));
        median.push(percentile(&column, 50.0));
        upper.push(percentile(&column, 97.5));
    }

    Ok(PredictionBand {
        times: times.to_vec(),
        lower,
        median,
        upper,
        samples: draws.len(),
    })
}

/// Linear-interpolated percentile of sorted data
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Regimen;
    use crate::simulator::concentration_at;

    #[test]
    fn test_percentile() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&data, 50.0), 3.0);
        assert_eq!(percentile(&data, 0.0), 1.0);
        assert_eq!(percentile(&data, 100.0), 5.0);
        assert_eq!(percentile(&data, 25.0), 2.0);
    }

    #[test]
    fn test_band_brackets_prediction() {
        let regimen = Regimen::new(1000.0, 12.0, 1.0).unwrap();
        let history = DoseHistory::repeated(&regimen, 48.0);
        let pk = PkParameters::from_cl_v(4.0, 50.0).unwrap();
        let covariance = Matrix2::new(0.0625, 0.0, 0.0, 0.0625);
        let times = vec![1.0, 6.0, 12.0, 36.0];

        let band = prediction_band(&history, &pk, &covariance, &times, 400, 42).unwrap();
        for (j, &t) in times.iter().enumerate() {
            let typical = concentration_at(&history, &pk, t);
            assert!(band.lower[j] < typical && typical < band.upper[j]);
            assert!(band.lower[j] <= band.median[j] && band.median[j] <= band.upper[j]);
        }

        let again = prediction_band(&history, &pk, &covariance, &times, 400, 42).unwrap();
        assert_eq!(band, again);
    }

    #[test]
    fn test_rejects_invalid_covariance() {
        let history = DoseHistory::repeated_n(&Regimen::new(1000.0, 12.0, 1.0).unwrap(), 2);
        let pk = PkParameters::from_cl_v(4.0, 50.0).unwrap();
        let singular = Matrix2::new(-1.0, 0.0, 0.0, 1.0);
        assert!(prediction_band(&history, &pk, &singular, &[1.0], 10, 1).is_err());
    }
}
