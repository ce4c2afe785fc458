//! Engine configuration
//!
//! Every section has defaults, so a JSON file only needs the values it changes:
//!
//! ```json
//! {
//!   "renal": { "scr_floor": 0.7 },
//!   "target": { "low": 400, "high": 550 },
//!   "simulation": { "auc_method": "Trapezoid" }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auc::{AucMethod, IntegrationRule};
use crate::bayes::BayesSettings;
use crate::error::{is_positive, PkError};
use crate::optimize::{Guardrails, TargetRange};
use crate::population::PopulationSettings;
use crate::renal::RenalSettings;
use crate::safety::SafetyThresholds;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// End of the simulated curve in hours
    pub horizon: f64,
    /// Grid step in hours
    pub step: f64,
    pub auc_method: AucMethod,
    pub integration_rule: IntegrationRule,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        SimulationSettings {
            horizon: 48.0,
            step: 1.0 / 6.0,
            auc_method: AucMethod::DoseCl,
            integration_rule: IntegrationRule::Linear,
        }
    }
}

impl SimulationSettings {
    pub fn validate(&self) -> Result<(), PkError> {
        if !is_positive(self.horizon) {
            return Err(PkError::parameter("horizon", self.horizon));
        }
        if !is_positive(self.step) || self.step > self.horizon {
            return Err(PkError::parameter("step", self.step));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub renal: RenalSettings,
    pub population: PopulationSettings,
    pub simulation: SimulationSettings,
    pub bayes: BayesSettings,
    pub guardrails: Guardrails,
    pub target: TargetRange,
    pub safety: SafetyThresholds,
    pub log: LogSettings,
}

impl Settings {
    /// Parse and validate settings from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate settings from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject inconsistent values, naming the offending section
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.renal.validate().map_err(invalid("renal"))?;
        self.population.validate().map_err(invalid("population"))?;
        self.simulation.validate().map_err(invalid("simulation"))?;
        self.bayes.validate().map_err(invalid("bayes"))?;
        self.guardrails.validate().map_err(invalid("guardrails"))?;
        self.target.validate().map_err(invalid("target"))?;
        self.safety.validate().map_err(invalid("safety"))?;
        Ok(())
    }
}

fn invalid(field: &'static str) -> impl Fn(PkError) -> SettingsError {
    move |err| SettingsError::Invalid {
        field: field.to_string(),
        reason: err.to_string(),
    }
}
