use serde::{Deserialize, Serialize};

use crate::data::builder::DoseHistoryBuilder;
use crate::data::regimen::Regimen;
use crate::error::{is_positive, PkError};

/// Tolerance used when comparing event times
pub(crate) const TIME_TOLERANCE: f64 = 1e-9;

/// A single administered dose
///
/// A [DoseEvent] infuses `dose` mg at a constant rate from `start` for
/// `infusion` hours. Times are hours from an arbitrary reference origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DoseEvent {
    dose: f64,
    start: f64,
    infusion: f64,
}

impl DoseEvent {
    /// Create a new dose event
    ///
    /// # Arguments
    ///
    /// * `start` - Start of the infusion in hours (≥ 0)
    /// * `dose` - Amount of drug in mg
    /// * `infusion` - Duration of the infusion in hours
    pub fn new(start: f64, dose: f64, infusion: f64) -> Result<Self, PkError> {
        let event = DoseEvent {
            dose,
            start,
            infusion,
        };
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> Result<(), PkError> {
        if !self.start.is_finite() || self.start < 0.0 {
            return Err(PkError::InvalidRegimenInput(format!(
                "dose start time must be a non-negative number, got {}",
                self.start
            )));
        }
        if !is_positive(self.dose) {
            return Err(PkError::InvalidRegimenInput(format!(
                "dose must be a positive number, got {}",
                self.dose
            )));
        }
        if !is_positive(self.infusion) {
            return Err(PkError::InvalidRegimenInput(format!(
                "infusion duration must be a positive number, got {}",
                self.infusion
            )));
        }
        Ok(())
    }

    pub fn dose(&self) -> f64 {
        self.dose
    }
    pub fn start(&self) -> f64 {
        self.start
    }
    pub fn infusion(&self) -> f64 {
        self.infusion
    }
    /// Time at which the infusion ends
    pub fn end(&self) -> f64 {
        self.start + self.infusion
    }
    /// Infusion rate in mg/h
    pub fn rate(&self) -> f64 {
        self.dose / self.infusion
    }
}

/// An ordered sequence of [DoseEvent]s
///
/// Events are kept sorted by start time. Overlapping infusions are allowed and
/// superpose additively in the simulator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<DoseEvent>", into = "Vec<DoseEvent>")]
pub struct DoseHistory {
    events: Vec<DoseEvent>,
}

impl DoseHistory {
    pub fn new(mut events: Vec<DoseEvent>) -> Result<Self, PkError> {
        for event in &events {
            event.validate()?;
        }
        events.sort_by(|a, b| a.start.total_cmp(&b.start));
        Ok(DoseHistory { events })
    }

    pub fn builder() -> DoseHistoryBuilder {
        DoseHistoryBuilder::new()
    }

    /// Expand a regimen into events from `t = 0` up to and including `horizon`
    pub fn repeated(regimen: &Regimen, horizon: f64) -> Self {
        let n = (horizon.max(0.0) / regimen.interval() + TIME_TOLERANCE).floor() as usize + 1;
        Self::repeated_n(regimen, n)
    }

    /// Expand a regimen into exactly `n` events starting at `t = 0`
    pub fn repeated_n(regimen: &Regimen, n: usize) -> Self {
        let events = (0..n)
            .map(|i| DoseEvent {
                dose: regimen.dose(),
                start: i as f64 * regimen.interval(),
                infusion: regimen.infusion(),
            })
            .collect();
        DoseHistory { events }
    }

    pub fn events(&self) -> &[DoseEvent] {
        &self.events
    }
    pub fn len(&self) -> usize {
        self.events.len()
    }
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
    pub fn first(&self) -> Option<&DoseEvent> {
        self.events.first()
    }
    pub fn last(&self) -> Option<&DoseEvent> {
        self.events.last()
    }
    pub fn total_dose(&self) -> f64 {
        self.events.iter().map(|e| e.dose).sum()
    }
    /// Latest time at which any infusion is still running
    pub fn last_end(&self) -> Option<f64> {
        self.events.iter().map(|e| e.end()).reduce(f64::max)
    }

    /// The regimen this history follows, if it is a uniform schedule
    ///
    /// A history is uniform when it has at least two events with identical
    /// dose and infusion duration, evenly spaced. Only uniform histories may use
    /// closed-form steady-state formulas.
    pub fn uniform_regimen(&self) -> Option<Regimen> {
        let first = self.events.first()?;
        let second = self.events.get(1)?;
        let interval = second.start - first.start;
        if interval <= TIME_TOLERANCE {
            return None;
        }
        let uniform = self.events.windows(2).all(|pair| {
            let (a, b) = (&pair[0], &pair[1]);
            ((b.start - a.start) - interval).abs() <= 1e-6
                && (b.dose - first.dose).abs() <= 1e-9 * first.dose.max(1.0)
                && (b.infusion - first.infusion).abs() <= TIME_TOLERANCE
        });
        if !uniform {
            return None;
        }
        Regimen::new(first.dose, interval, first.infusion).ok()
    }

    pub fn is_uniform(&self) -> bool {
        self.uniform_regimen().is_some()
    }
}

impl TryFrom<Vec<DoseEvent>> for DoseHistory {
    type Error = PkError;

    fn try_from(events: Vec<DoseEvent>) -> Result<Self, Self::Error> {
        DoseHistory::new(events)
    }
}

impl From<DoseHistory> for Vec<DoseEvent> {
    fn from(history: DoseHistory) -> Self {
        history.events
    }
}

/// A measured drug level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    /// Sampling time in hours from the dosing origin
    time: f64,
    /// Measured concentration in mg/L
    concentration: f64,
}

impl Level {
    pub fn new(time: f64, concentration: f64) -> Result<Self, PkError> {
        let level = Level {
            time,
            concentration,
        };
        level.validate()?;
        Ok(level)
    }

    pub fn validate(&self) -> Result<(), PkError> {
        if !self.time.is_finite() || self.time < 0.0 {
            return Err(PkError::InvalidLevelInput(format!(
                "sample time must be a non-negative number, got {}",
                self.time
            )));
        }
        if !is_positive(self.concentration) {
            return Err(PkError::InvalidLevelInput(format!(
                "concentration must be a positive number, got {}",
                self.concentration
            )));
        }
        Ok(())
    }

    pub fn time(&self) -> f64 {
        self.time
    }
    pub fn concentration(&self) -> f64 {
        self.concentration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_is_sorted() {
        let history = DoseHistory::new(vec![
            DoseEvent::new(24.0, 1000.0, 1.0).unwrap(),
            DoseEvent::new(0.0, 1500.0, 1.5).unwrap(),
            DoseEvent::new(12.0, 1000.0, 1.0).unwrap(),
        ])
        .unwrap();
        let starts: Vec<f64> = history.events().iter().map(|e| e.start()).collect();
        assert_eq!(starts, vec![0.0, 12.0, 24.0]);
        assert_eq!(history.total_dose(), 3500.0);
        assert_eq!(history.last_end(), Some(25.0));
    }

    #[test]
    fn test_repeated_includes_horizon() {
        let regimen = Regimen::new(1000.0, 12.0, 1.0).unwrap();
        let history = DoseHistory::repeated(&regimen, 48.0);
        assert_eq!(history.len(), 5);
        assert_eq!(history.last().unwrap().start(), 48.0);
    }

    #[test]
    fn test_uniform_detection() {
        let regimen = Regimen::new(1000.0, 12.0, 1.0).unwrap();
        let history = DoseHistory::repeated_n(&regimen, 4);
        assert_eq!(history.uniform_regimen(), Some(regimen));

        let irregular = DoseHistory::new(vec![
            DoseEvent::new(0.0, 1000.0, 1.0).unwrap(),
            DoseEvent::new(12.0, 1000.0, 1.0).unwrap(),
            DoseEvent::new(20.0, 1000.0, 1.0).unwrap(),
        ])
        .unwrap();
        assert!(irregular.uniform_regimen().is_none());

        let single = DoseHistory::repeated_n(&regimen, 1);
        assert!(single.uniform_regimen().is_none());
    }

    #[test]
    fn test_invalid_events() {
        assert!(matches!(
            DoseEvent::new(-1.0, 1000.0, 1.0),
            Err(PkError::InvalidRegimenInput(_))
        ));
        assert!(DoseEvent::new(0.0, 0.0, 1.0).is_err());
        assert!(DoseEvent::new(0.0, 1000.0, 0.0).is_err());
    }

    #[test]
    fn test_invalid_levels() {
        assert!(matches!(
            Level::new(-2.0, 10.0),
            Err(PkError::InvalidLevelInput(_))
        ));
        assert!(matches!(
            Level::new(2.0, 0.0),
            Err(PkError::InvalidLevelInput(_))
        ));
    }

    #[test]
    fn test_history_deserialization_sorts_and_validates() {
        let json = r#"[{"dose":1000,"start":12,"infusion":1},{"dose":1000,"start":0,"infusion":1}]"#;
        let history: DoseHistory = serde_json::from_str(json).unwrap();
        assert_eq!(history.first().unwrap().start(), 0.0);

        let bad = r#"[{"dose":-5,"start":0,"infusion":1}]"#;
        assert!(serde_json::from_str::<DoseHistory>(bad).is_err());
    }
}
