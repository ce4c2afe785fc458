use std::f64::consts::LN_2;

use serde::{Deserialize, Serialize};

use crate::error::{is_positive, PkError};

/// One-compartment PK parameters
///
/// `k` and the half-life are always derived from CL and V, so the four values
/// can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PkParameters {
    /// Clearance in L/h
    cl: f64,
    /// Volume of distribution in L
    v: f64,
    /// Elimination rate constant in 1/h
    k: f64,
    /// Half-life in h
    half_life: f64,
}

impl PkParameters {
    pub fn from_cl_v(cl: f64, v: f64) -> Result<Self, PkError> {
        if !is_positive(cl) {
            return Err(PkError::parameter("CL", cl));
        }
        if !is_positive(v) {
            return Err(PkError::parameter("V", v));
        }
        let k = cl / v;
        Ok(PkParameters {
            cl,
            v,
            k,
            half_life: LN_2 / k,
        })
    }

    pub fn from_k_v(k: f64, v: f64) -> Result<Self, PkError> {
        if !is_positive(k) {
            return Err(PkError::parameter("k", k));
        }
        Self::from_cl_v(k * v, v)
    }

    pub fn cl(&self) -> f64 {
        self.cl
    }
    pub fn v(&self) -> f64 {
        self.v
    }
    pub fn k(&self) -> f64 {
        self.k
    }
    pub fn half_life(&self) -> f64 {
        self.half_life
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_derived_values() {
        let pk = PkParameters::from_cl_v(5.0, 50.0).unwrap();
        assert_relative_eq!(pk.k(), 0.1);
        assert_relative_eq!(pk.half_life(), LN_2 / 0.1);

        let same = PkParameters::from_k_v(0.1, 50.0).unwrap();
        assert_relative_eq!(same.cl(), 5.0);
    }

    #[test]
    fn test_rejects_non_positive() {
        assert!(PkParameters::from_cl_v(0.0, 50.0).is_err());
        assert!(PkParameters::from_cl_v(5.0, f64::INFINITY).is_err());
        assert!(PkParameters::from_k_v(-0.1, 50.0).is_err());
    }
}
