use crate::data::event::{DoseEvent, DoseHistory};
use crate::error::PkError;

/// Fluent construction of a [DoseHistory]
///
/// Validation is deferred to [DoseHistoryBuilder::build], so the chain itself
/// never fails.
#[derive(Debug, Clone, Default)]
pub struct DoseHistoryBuilder {
    events: Vec<(f64, f64, f64)>,
}

impl DoseHistoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn infusion(mut self, start: f64, dose: f64, duration: f64) -> Self {
        self.events.push((start, dose, duration));
        self
    }

    /// Repeat the last added infusion `n` more times, `delta` hours apart
    pub fn repeat(mut self, n: usize, delta: f64) -> Self {
        let Some(&(start, dose, duration)) = self.events.last() else {
            tracing::warn!("repeat called on an empty dose history builder; ignored");
            return self;
        };
        for i in 1..=n {
            self.events.push((start + delta * i as f64, dose, duration));
        }
        self
    }

    pub fn build(self) -> Result<DoseHistory, PkError> {
        let events = self
            .events
            .into_iter()
            .map(|(start, dose, duration)| DoseEvent::new(start, dose, duration))
            .collect::<Result<Vec<_>, _>>()?;
        DoseHistory::new(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_builder() {
        let history = DoseHistory::builder()
            .infusion(0.0, 1500.0, 1.5)
            .infusion(12.0, 1000.0, 1.0)
            .repeat(3, 12.0)
            .build()
            .unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history.last().unwrap().start(), 48.0);
        assert_eq!(history.first().unwrap().dose(), 1500.0);
    }

    #[test]
    fn test_builder_propagates_invalid_events() {
        let result = DoseHistory::builder()
            .infusion(0.0, 1000.0, 1.0)
            .infusion(12.0, -1000.0, 1.0)
            .build();
        assert!(matches!(result, Err(PkError::InvalidRegimenInput(_))));
    }

    #[test]
    fn test_repeat_on_empty_builder() {
        let history = DoseHistory::builder().repeat(3, 12.0).build().unwrap();
        assert!(history.is_empty());
    }
}
