pub mod builder;
pub mod event;
pub mod parameters;
pub mod patient;
pub mod regimen;

pub use builder::DoseHistoryBuilder;
pub use event::{DoseEvent, DoseHistory, Level};
pub use parameters::PkParameters;
pub use patient::{Patient, Sex};
pub use regimen::Regimen;
