use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PkError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Time in hours
    pub time: f64,
    /// Concentration in mg/L
    pub concentration: f64,
}

/// An ordered concentration-time sequence
///
/// Curves are regenerated on demand from a dose history and parameters and
/// are never persisted by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PkCurve {
    points: Vec<CurvePoint>,
}

impl PkCurve {
    /// Build a curve from matching time and concentration vectors
    ///
    /// # Panics
    ///
    /// Panics if `times` and `concentrations` have different lengths.
    pub fn new(times: Vec<f64>, concentrations: Vec<f64>) -> Self {
        assert_eq!(
            times.len(),
            concentrations.len(),
            "times and concentrations must have the same length"
        );
        let points = times
            .into_iter()
            .zip(concentrations)
            .map(|(time, concentration)| CurvePoint {
                time,
                concentration: concentration.max(0.0),
            })
            .collect();
        PkCurve { points }
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }
    pub fn len(&self) -> usize {
        self.points.len()
    }
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
    pub fn times(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.time).collect()
    }
    pub fn concentrations(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.concentration).collect()
    }

    /// The highest point of the curve
    pub fn max(&self) -> Option<CurvePoint> {
        self.points
            .iter()
            .copied()
            .max_by(|a, b| a.concentration.total_cmp(&b.concentration))
    }

    /// Linear interpolation of the concentration at `time`, clamped to the curve ends
    pub fn interpolate(&self, time: f64) -> Option<f64> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        if time <= first.time {
            return Some(first.concentration);
        }
        if time >= last.time {
            return Some(last.concentration);
        }
        let upper = self.points.partition_point(|p| p.time < time);
        let (a, b) = (self.points[upper - 1], self.points[upper]);
        if (b.time - a.time).abs() < 1e-12 {
            return Some(a.concentration);
        }
        Some(a.concentration + (b.concentration - a.concentration) * (time - a.time) / (b.time - a.time))
    }

    /// Write the curve as `time,concentration` CSV
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), PkError> {
        let mut writer = csv::Writer::from_writer(writer);
        for point in &self.points {
            writer.serialize(point)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_file(&self, path: impl AsRef<Path>) -> Result<(), PkError> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_values_are_clamped() {
        let curve = PkCurve::new(vec![0.0, 1.0], vec![-1e-15, 2.0]);
        assert_eq!(curve.concentrations(), vec![0.0, 2.0]);
    }

    #[test]
    fn test_interpolation() {
        let curve = PkCurve::new(vec![0.0, 1.0, 3.0], vec![0.0, 10.0, 6.0]);
        assert_eq!(curve.interpolate(0.5), Some(5.0));
        assert_eq!(curve.interpolate(2.0), Some(8.0));
        assert_eq!(curve.interpolate(-1.0), Some(0.0));
        assert_eq!(curve.interpolate(10.0), Some(6.0));
        assert_eq!(PkCurve::default().interpolate(1.0), None);
        assert_eq!(curve.max().unwrap().time, 1.0);
    }

    #[test]
    fn test_csv_output() {
        let curve = PkCurve::new(vec![0.0, 0.5], vec![0.0, 12.5]);
        let mut buffer = Vec::new();
        curve.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "time,concentration\n0.0,0.0\n0.5,12.5\n");
    }
}
