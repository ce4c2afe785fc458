use serde::{Deserialize, Serialize};

use crate::error::{is_positive, PkError};

/// Oldest age accepted by the renal equations
pub const MAX_AGE_YEARS: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn is_female(&self) -> bool {
        matches!(self, Sex::Female)
    }
}

/// Patient covariates for a single calculation
///
/// A [Patient] is immutable and supplied fresh on each invocation.
/// Deserialized values bypass [Patient::new], so every entry point calls
/// [Patient::validate] before using them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    /// Age in years
    age: f64,
    sex: Sex,
    /// Total body weight in kg
    weight: f64,
    /// Height in cm
    height: f64,
    /// Serum creatinine in mg/dL
    scr: f64,
}

impl Patient {
    /// Create a new patient, validating every covariate
    ///
    /// # Errors
    ///
    /// Returns [PkError::InvalidPatientInput] if any covariate is non-positive,
    /// non-finite, or if the age exceeds [MAX_AGE_YEARS].
    pub fn new(age: f64, sex: Sex, weight: f64, height: f64, scr: f64) -> Result<Self, PkError> {
        let patient = Patient {
            age,
            sex,
            weight,
            height,
            scr,
        };
        patient.validate()?;
        Ok(patient)
    }

    pub fn validate(&self) -> Result<(), PkError> {
        let checks = [
            ("age", self.age),
            ("weight", self.weight),
            ("height", self.height),
            ("serum creatinine", self.scr),
        ];
        for (name, value) in checks {
            if !is_positive(value) {
                return Err(PkError::InvalidPatientInput(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        if self.age > MAX_AGE_YEARS {
            return Err(PkError::InvalidPatientInput(format!(
                "age must not exceed {} years, got {}",
                MAX_AGE_YEARS, self.age
            )));
        }
        Ok(())
    }

    pub fn age(&self) -> f64 {
        self.age
    }
    pub fn sex(&self) -> Sex {
        self.sex
    }
    pub fn weight(&self) -> f64 {
        self.weight
    }
    pub fn height(&self) -> f64 {
        self.height
    }
    pub fn scr(&self) -> f64 {
        self.scr
    }

    /// Body mass index in kg/m²
    pub fn bmi(&self) -> f64 {
        let meters = self.height / 100.0;
        self.weight / (meters * meters)
    }
}
