use serde::{Deserialize, Serialize};

use crate::error::{is_positive, PkError};

/// A repeated dosing plan: `dose` mg infused over `infusion` hours every `interval` hours
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Regimen {
    dose: f64,
    interval: f64,
    infusion: f64,
}

impl Regimen {
    /// Create a new regimen
    ///
    /// # Errors
    ///
    /// Returns [PkError::InvalidRegimenInput] if a value is non-positive or the
    /// infusion is longer than the interval. Configured interval and infusion
    /// bounds are checked separately by [crate::Guardrails::check_regimen].
    pub fn new(dose: f64, interval: f64, infusion: f64) -> Result<Self, PkError> {
        let regimen = Regimen {
            dose,
            interval,
            infusion,
        };
        regimen.validate()?;
        Ok(regimen)
    }

    pub fn validate(&self) -> Result<(), PkError> {
        for (name, value) in [
            ("dose", self.dose),
            ("interval", self.interval),
            ("infusion", self.infusion),
        ] {
            if !is_positive(value) {
                return Err(PkError::InvalidRegimenInput(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        if self.infusion > self.interval {
            return Err(PkError::InvalidRegimenInput(format!(
                "infusion of {} h is longer than the {} h interval",
                self.infusion, self.interval
            )));
        }
        Ok(())
    }

    pub fn dose(&self) -> f64 {
        self.dose
    }
    pub fn interval(&self) -> f64 {
        self.interval
    }
    pub fn infusion(&self) -> f64 {
        self.infusion
    }

    /// Infusion rate in mg/h
    pub fn rate(&self) -> f64 {
        self.dose / self.infusion
    }

    pub fn doses_per_day(&self) -> f64 {
        24.0 / self.interval
    }

    pub fn daily_dose(&self) -> f64 {
        self.dose * self.doses_per_day()
    }

    /// The same schedule with a different dose
    pub fn with_dose(&self, dose: f64) -> Result<Self, PkError> {
        Regimen::new(dose, self.interval, self.infusion)
    }
}
