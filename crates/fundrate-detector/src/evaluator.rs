//! Pure alert evaluation.

use crate::alert::{AlertEvent, ChangeBasis};
use crate::config::AlertConfig;
use chrono::Utc;
use fundrate_core::RateObservation;
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

/// Compares an observation with its predecessor.
///
/// Holds only its configuration: `evaluate` depends on nothing but its
/// arguments, so historical data can be replayed through it.
#[derive(Debug, Clone, Default)]
pub struct AlertEvaluator {
    config: AlertConfig,
}

impl AlertEvaluator {
    pub fn new(config: AlertConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// Alert if `current` moved past the threshold relative to `previous`.
    ///
    /// The first observation of a key (no previous) never alerts. Inputs of
    /// different keys are not comparable and never alert.
    pub fn evaluate(
        &self,
        previous: Option<&RateObservation>,
        current: &RateObservation,
    ) -> Option<AlertEvent> {
        let previous = previous?;
        if previous.exchange != current.exchange || previous.instrument != current.instrument {
            debug!(
                previous = %previous.key(),
                current = %current.key(),
                "Skipping alert evaluation across keys"
            );
            return None;
        }

        let delta = current.rate.inner().saturating_sub(previous.rate.inner());
        let (basis, magnitude, percent_change) = if previous.rate.is_zero() {
            (ChangeBasis::Absolute, delta.abs(), None)
        } else {
            match current.rate.relative_change_from(previous.rate) {
                Some(relative) => (
                    ChangeBasis::Relative,
                    relative.abs(),
                    relative.checked_mul(Decimal::ONE_HUNDRED),
                ),
                // Change too large to represent: beyond any threshold
                None => (ChangeBasis::Relative, Decimal::MAX, None),
            }
        };

        if !self.config.crosses(magnitude) {
            return None;
        }

        Some(AlertEvent {
            alert_id: Uuid::new_v4(),
            key: current.key(),
            previous_rate: previous.rate,
            current_rate: current.rate,
            percent_change,
            absolute_change: delta,
            basis,
            sequence: current.sequence,
            triggered_at: Utc::now(),
        })
    }

    /// Evaluate every consecutive pair of a recorded, ordered history.
    pub fn replay(&self, history: &[RateObservation]) -> Vec<AlertEvent> {
        history
            .windows(2)
            .filter_map(|pair| self.evaluate(Some(&pair[0]), &pair[1]))
            .collect()
    }
}
