//! Vancomycin exposure estimation and dose optimization
//!
//! A one-compartment intravenous infusion model with three entry points:
//!
//! * [compute_deterministic] predicts exposure from population parameters
//! * [compute_bayesian] individualizes the parameters from measured levels
//!   and recommends a regimen
//! * [optimize_regimen] recommends a regimen for known parameters
//!
//! ```
//! use vancosol::prelude::*;
//!
//! let patient = Patient::new(65.0, Sex::Male, 80.0, 175.0, 1.2).unwrap();
//! let regimen = Regimen::new(1000.0, 12.0, 1.0).unwrap();
//! let result = compute_deterministic(&patient, &regimen, &Settings::default()).unwrap();
//! assert!(result.metrics.auc24 > 0.0);
//! ```

pub mod auc;
pub mod bayes;
pub mod data;
pub mod engine;
pub mod error;
pub mod logger;
pub mod optimize;
pub mod population;
pub mod renal;
pub mod safety;
pub mod settings;
pub mod simulator;

pub use crate::auc::{AucBreakdown, AucMethod, IntegrationRule};
pub use crate::bayes::{PosteriorEstimate, PriorKind, PriorParam, Priors, ResidualErrorModel};
pub use crate::data::*;
pub use crate::engine::{
    compute_bayesian, compute_deterministic, optimize_regimen, BayesianResult,
    DeterministicResult, Metrics,
};
pub use crate::optimize::{Guardrails, Recommendation, TargetRange};
pub use crate::settings::{Settings, SettingsError};
pub use crate::simulator::{PkCurve, PredictionBand};
pub use error::{PkError, Warning};

pub mod prelude {
    pub mod data {
        pub use crate::data::{
            DoseEvent, DoseHistory, DoseHistoryBuilder, Level, Patient, PkParameters, Regimen,
            Sex,
        };
    }
    pub mod simulator {
        pub use crate::simulator::{
            concentration_at, concentrations, prediction_band, simulate,
            steady_state::{steady_state, PeakTrough},
            CurvePoint, PkCurve, PredictionBand,
        };
    }
    pub mod bayes {
        pub use crate::bayes::{
            estimate, BayesSettings, PosteriorEstimate, PriorKind, PriorParam, Priors,
            ResidualErrorModel, UncertaintyMethod,
        };
    }

    pub use crate::data::*;
    pub use crate::engine::{
        compute_bayesian, compute_deterministic, optimize_regimen, BayesianResult,
        DeterministicResult, Metrics,
    };
    pub use crate::error::{PkError, Warning};
    pub use crate::logger::setup_log;
    pub use crate::optimize::{Guardrails, Recommendation, TargetRange};
    pub use crate::renal::{CrClMethod, WeightStrategy};
    pub use crate::settings::Settings;
}
