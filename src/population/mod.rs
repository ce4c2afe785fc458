//! Population-typical PK parameters
//!
//! ```text
//! V  = vd_per_kg × weight
//! CL = cl_scale × (coefficient × CrCl / 120) × (weight / reference_weight)^weight_exponent × age_factor + cl_offset
//! ```
//!
//! The coefficient, weight scaling and age adjustment come from a
//! [PopulationSegment] picked by age, so the shape of the relation stays the
//! same for every segment while the numbers are pure configuration.

use serde::{Deserialize, Serialize};

use crate::data::PkParameters;
use crate::error::{is_positive, PkError};

/// CrCl at which `coefficient` applies, in mL/min
pub const REFERENCE_CRCL: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentKind {
    Adult,
    Pediatric,
}

/// Age-dependent multiplier on clearance
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum AgeAdjustment {
    #[default]
    None,
    /// `base^(age − pivot_age)`
    Exponential { base: f64, pivot_age: f64 },
    /// `factor` for patients younger than `below_age`
    Multiplier { below_age: f64, factor: f64 },
}

impl AgeAdjustment {
    pub fn factor(&self, age: f64) -> f64 {
        match *self {
            AgeAdjustment::None => 1.0,
            AgeAdjustment::Exponential { base, pivot_age } => base.powf(age - pivot_age),
            AgeAdjustment::Multiplier { below_age, factor } if age < below_age => factor,
            AgeAdjustment::Multiplier { .. } => 1.0,
        }
    }
}

/// Clearance coefficients for one age band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSegment {
    pub kind: SegmentKind,
    /// Youngest age (inclusive) covered by this segment
    pub min_age: f64,
    /// Typical CL in L/h at [REFERENCE_CRCL] and `reference_weight`
    pub coefficient: f64,
    pub reference_weight: f64,
    pub weight_exponent: f64,
    pub age_adjustment: AgeAdjustment,
}

impl PopulationSegment {
    pub fn adult() -> Self {
        PopulationSegment {
            kind: SegmentKind::Adult,
            min_age: 18.0,
            coefficient: 7.0,
            reference_weight: 70.0,
            weight_exponent: 1.0,
            age_adjustment: AgeAdjustment::None,
        }
    }

    pub fn pediatric() -> Self {
        PopulationSegment {
            kind: SegmentKind::Pediatric,
            min_age: 0.0,
            coefficient: 0.1,
            reference_weight: 1.0,
            weight_exponent: 1.0,
            age_adjustment: AgeAdjustment::Multiplier {
                below_age: 12.0,
                factor: 1.2,
            },
        }
    }

    pub fn weight_term(&self, weight: f64) -> f64 {
        (weight / self.reference_weight).powf(self.weight_exponent)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationSettings {
    /// Volume of distribution per kg of effective weight, typically 0.6-0.9
    pub vd_per_kg: f64,
    pub cl_scale: f64,
    /// Additive clearance offset in L/h
    pub cl_offset: f64,
    pub min_cl: f64,
    pub min_v: f64,
    pub segments: Vec<PopulationSegment>,
}

impl Default for PopulationSettings {
    fn default() -> Self {
        PopulationSettings {
            vd_per_kg: 0.7,
            cl_scale: 1.0,
            cl_offset: 0.0,
            min_cl: 0.5,
            min_v: 10.0,
            segments: vec![PopulationSegment::adult(), PopulationSegment::pediatric()],
        }
    }
}

impl PopulationSettings {
    /// The segment with the highest `min_age` not above `age`
    pub fn segment_for(&self, age: f64) -> Option<&PopulationSegment> {
        self.segments
            .iter()
            .filter(|segment| segment.min_age <= age)
            .max_by(|a, b| a.min_age.total_cmp(&b.min_age))
    }

    pub fn validate(&self) -> Result<(), PkError> {
        for (name, value) in [
            ("vd_per_kg", self.vd_per_kg),
            ("cl_scale", self.cl_scale),
            ("min_cl", self.min_cl),
            ("min_v", self.min_v),
        ] {
            if !is_positive(value) {
                return Err(PkError::parameter(name, value));
            }
        }
        if !self.cl_offset.is_finite() {
            return Err(PkError::parameter("cl_offset", self.cl_offset));
        }
        if self.segments.is_empty() {
            return Err(PkError::parameter("segments", "empty"));
        }
        for segment in &self.segments {
            if !is_positive(segment.coefficient) || !is_positive(segment.reference_weight) {
                return Err(PkError::parameter(
                    format!("{:?} segment", segment.kind),
                    format!(
                        "coefficient {} / reference weight {}",
                        segment.coefficient, segment.reference_weight
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Population parameters together with the segment that produced them
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopulationEstimate {
    pub segment: SegmentKind,
    pub pk: PkParameters,
}

/// Compute the population-typical parameters
///
/// # Arguments
///
/// * `weight` - Effective body weight in kg
/// * `crcl` - Creatinine clearance in mL/min
/// * `age` - Age in years, used to pick the segment
pub fn typical_parameters(
    weight: f64,
    crcl: f64,
    age: f64,
    settings: &PopulationSettings,
) -> Result<PopulationEstimate, PkError> {
    settings.validate()?;
    if !is_positive(weight) {
        return Err(PkError::InvalidPatientInput(format!(
            "effective weight must be positive, got {}",
            weight
        )));
    }
    if !is_positive(crcl) {
        return Err(PkError::parameter("CrCl", crcl));
    }
    let segment = settings
        .segment_for(age)
        .ok_or_else(|| PkError::parameter("segments", format!("no segment covers age {}", age)))?;

    let v = settings.vd_per_kg * weight;
    let cl = settings.cl_scale
        * (segment.coefficient * (crcl / REFERENCE_CRCL))
        * segment.weight_term(weight)
        * segment.age_adjustment.factor(age)
        + settings.cl_offset;

    let pk = PkParameters::from_cl_v(cl.max(settings.min_cl), v.max(settings.min_v))?;
    tracing::debug!(
        "{:?} population parameters: CL = {:.3} L/h, V = {:.2} L, t½ = {:.2} h",
        segment.kind,
        pk.cl(),
        pk.v(),
        pk.half_life()
    );

    Ok(PopulationEstimate {
        segment: segment.kind,
        pk,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_adult_reference() {
        let settings = PopulationSettings::default();
        let estimate = typical_parameters(70.0, 120.0, 40.0, &settings).unwrap();
        assert_eq!(estimate.segment, SegmentKind::Adult);
        assert_relative_eq!(estimate.pk.cl(), 7.0, epsilon = 1e-12);
        assert_relative_eq!(estimate.pk.v(), 49.0, epsilon = 1e-12);
        assert_relative_eq!(estimate.pk.k(), 7.0 / 49.0, epsilon = 1e-12);
    }

    #[test]
    fn test_linear_in_crcl_with_offset() {
        let settings = PopulationSettings {
            cl_offset: 0.5,
            cl_scale: 2.0,
            ..Default::default()
        };
        let low = typical_parameters(70.0, 30.0, 50.0, &settings).unwrap().pk.cl();
        let high = typical_parameters(70.0, 60.0, 50.0, &settings).unwrap().pk.cl();
        // (high - offset) is twice (low - offset)
        assert_relative_eq!(high - 0.5, 2.0 * (low - 0.5), epsilon = 1e-12);
        assert_relative_eq!(low, 2.0 * 7.0 * 0.25 + 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_pediatric_segment() {
        let settings = PopulationSettings::default();
        let child = typical_parameters(20.0, 120.0, 8.0, &settings).unwrap();
        assert_eq!(child.segment, SegmentKind::Pediatric);
        assert_relative_eq!(child.pk.cl(), 0.1 * 20.0 * 1.2, epsilon = 1e-12);

        let teen = typical_parameters(50.0, 120.0, 15.0, &settings).unwrap();
        assert_relative_eq!(teen.pk.cl(), 0.1 * 50.0, epsilon = 1e-12);
    }

    #[test]
    fn test_floors() {
        let settings = PopulationSettings::default();
        let estimate = typical_parameters(10.0, 10.0, 40.0, &settings).unwrap();
        assert_eq!(estimate.pk.cl(), 0.5);
        assert_eq!(estimate.pk.v(), 10.0);
    }

    #[test]
    fn test_age_adjustment() {
        let exponential = AgeAdjustment::Exponential {
            base: 0.985,
            pivot_age: 40.0,
        };
        assert_relative_eq!(exponential.factor(40.0), 1.0);
        assert!(exponential.factor(80.0) < 1.0);
        assert_eq!(AgeAdjustment::None.factor(90.0), 1.0);
    }

    #[test]
    fn test_missing_segment() {
        let settings = PopulationSettings {
            segments: vec![PopulationSegment::adult()],
            ..Default::default()
        };
        assert!(typical_parameters(30.0, 100.0, 10.0, &settings).is_err());
    }
}
