//! Streaming forward fill of omitted metrics
//!
//! The trace writer omits a metric when its value did not change since the
//! previous event. Each record therefore inherits, per metric, the most
//! recent value seen in any earlier materialized record.

use super::record::{MetricKey, MetricValues};

/// Last known value per metric, carried across records in file order
#[derive(Debug, Clone, Default)]
pub struct ForwardFill {
    last: MetricValues,
}

impl ForwardFill {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill absent slots of `metrics` and remember its present values
    pub fn apply(&mut self, metrics: &mut MetricValues) {
        for key in MetricKey::ALL {
            match metrics.get(key) {
                Some(value) => self.last.set(key, Some(value)),
                None => metrics.set(key, self.last.get(key)),
            }
        }
    }
}
