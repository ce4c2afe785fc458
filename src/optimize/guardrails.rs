use serde::{Deserialize, Serialize};

use crate::data::Regimen;
use crate::error::{is_positive, PkError};

/// Target AUC24 band in mg·h/L
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetRange {
    pub low: f64,
    pub high: f64,
}

impl Default for TargetRange {
    fn default() -> Self {
        TargetRange {
            low: 400.0,
            high: 600.0,
        }
    }
}

impl TargetRange {
    pub fn new(low: f64, high: f64) -> Result<Self, PkError> {
        let target = TargetRange { low, high };
        target.validate()?;
        Ok(target)
    }

    pub fn validate(&self) -> Result<(), PkError> {
        if !is_positive(self.low) || !is_positive(self.high) || self.low > self.high {
            return Err(PkError::parameter(
                "target range",
                format!("[{}, {}]", self.low, self.high),
            ));
        }
        Ok(())
    }

    pub fn midpoint(&self) -> f64 {
        (self.low + self.high) / 2.0
    }

    pub fn contains(&self, auc: f64) -> bool {
        auc >= self.low && auc <= self.high
    }
}

/// Dosing limits every recommendation has to respect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Guardrails {
    /// Smallest single dose in mg
    pub min_dose: f64,
    pub max_single_dose: f64,
    /// Largest total dose per 24 hours in mg
    pub max_daily_dose: f64,
    /// Intervals the optimizer may choose from, in hours
    pub allowed_intervals: Vec<f64>,
    /// Bounds on any interval, including user-supplied regimens
    pub min_interval: f64,
    pub max_interval: f64,
    pub min_infusion: f64,
    pub max_infusion: f64,
    /// Doses are rounded to multiples of this, in mg
    pub dose_increment: f64,
    pub loading_mg_per_kg: f64,
    pub max_loading_dose: f64,
    /// A loading dose is suggested when the half-life exceeds this fraction of the interval
    pub loading_half_life_ratio: f64,
    /// Always suggest a loading dose
    pub force_loading: bool,
    /// Weight-based cap on the daily dose in mg/kg, applied on top of `max_daily_dose`
    pub max_daily_mg_per_kg: Option<f64>,
}

impl Default for Guardrails {
    fn default() -> Self {
        Guardrails {
            min_dose: 250.0,
            max_single_dose: 2000.0,
            max_daily_dose: 4500.0,
            allowed_intervals: vec![6.0, 8.0, 12.0, 24.0, 48.0],
            min_interval: 6.0,
            max_interval: 48.0,
            min_infusion: 0.5,
            max_infusion: 4.0,
            dose_increment: 250.0,
            loading_mg_per_kg: 25.0,
            max_loading_dose: 3000.0,
            loading_half_life_ratio: 0.5,
            force_loading: false,
            max_daily_mg_per_kg: Some(100.0),
        }
    }
}

impl Guardrails {
    pub fn validate(&self) -> Result<(), PkError> {
        for (name, value) in [
            ("min_dose", self.min_dose),
            ("max_single_dose", self.max_single_dose),
            ("max_daily_dose", self.max_daily_dose),
            ("min_interval", self.min_interval),
            ("max_interval", self.max_interval),
            ("min_infusion", self.min_infusion),
            ("max_infusion", self.max_infusion),
            ("dose_increment", self.dose_increment),
            ("loading_mg_per_kg", self.loading_mg_per_kg),
            ("max_loading_dose", self.max_loading_dose),
            ("loading_half_life_ratio", self.loading_half_life_ratio),
        ] {
            if !is_positive(value) {
                return Err(PkError::parameter(name, value));
            }
        }
        for (name, min, max) in [
            ("dose", self.min_dose, self.max_single_dose),
            ("interval", self.min_interval, self.max_interval),
            ("infusion", self.min_infusion, self.max_infusion),
        ] {
            if min > max {
                return Err(PkError::parameter(
                    format!("{} bounds", name),
                    format!("min {} > max {}", min, max),
                ));
            }
        }
        if self.allowed_intervals.is_empty() {
            return Err(PkError::parameter("allowed_intervals", "empty"));
        }
        for &interval in &self.allowed_intervals {
            if !is_positive(interval) || interval < self.min_interval || interval > self.max_interval
            {
                return Err(PkError::parameter("allowed interval", interval));
            }
        }
        if let Some(per_kg) = self.max_daily_mg_per_kg {
            if !is_positive(per_kg) {
                return Err(PkError::parameter("max_daily_mg_per_kg", per_kg));
            }
        }
        let longest = self.longest_interval();
        if self.daily_cap_per_dose(longest) < self.min_dose {
            return Err(PkError::parameter(
                "max_daily_dose",
                format!(
                    "{} mg/day in {} mg steps admits no regimen with a {} mg minimum dose",
                    self.max_daily_dose, self.dose_increment, self.min_dose
                ),
            ));
        }
        Ok(())
    }

    /// Check a user-supplied regimen against the dose, interval and infusion bounds
    pub fn check_regimen(&self, regimen: &Regimen) -> Result<(), PkError> {
        for (name, unit, value, min, max) in [
            ("dose", "mg", regimen.dose(), self.min_dose, self.max_single_dose),
            ("interval", "h", regimen.interval(), self.min_interval, self.max_interval),
            ("infusion", "h", regimen.infusion(), self.min_infusion, self.max_infusion),
        ] {
            if value < min || value > max {
                return Err(PkError::InvalidRegimenInput(format!(
                    "{} of {} {} is outside [{}, {}] {}",
                    name, value, unit, min, max, unit
                )));
            }
        }
        Ok(())
    }

    /// Guardrails with the daily cap lowered to the weight-based limit
    ///
    /// The cap never drops below the smallest admissible regimen, the minimum
    /// dose (rounded up to the increment) at the longest allowed interval.
    pub fn for_weight(&self, weight: f64) -> Guardrails {
        let Some(per_kg) = self.max_daily_mg_per_kg else {
            return self.clone();
        };
        let smallest = (self.min_dose / self.dose_increment).ceil() * self.dose_increment * 24.0
            / self.longest_interval();
        Guardrails {
            max_daily_dose: (per_kg * weight).max(smallest).min(self.max_daily_dose),
            ..self.clone()
        }
    }

    fn longest_interval(&self) -> f64 {
        self.allowed_intervals.iter().copied().fold(0.0, f64::max)
    }

    /// Round `dose` to the nearest increment
    pub fn round_dose(&self, dose: f64) -> f64 {
        (dose / self.dose_increment).round() * self.dose_increment
    }

    /// Largest dose per administration at `interval` that stays under the daily cap
    pub fn daily_cap_per_dose(&self, interval: f64) -> f64 {
        let cap = self.max_daily_dose * interval / 24.0;
        (cap / self.dose_increment + 1e-9).floor() * self.dose_increment
    }
}
