//! Alert configuration.

use crate::error::{DetectorError, DetectorResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Configuration for rate change alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Minimum change that raises an alert.
    ///
    /// Relative (`|Δ| / |previous|`) when the previous rate is non-zero,
    /// absolute rate delta when it is zero. 0.0001 = 0.01%.
    #[serde(default = "default_threshold")]
    pub threshold: Decimal,
    /// Alert when the change equals the threshold exactly.
    #[serde(default)]
    pub trigger_on_boundary: bool,
}

fn default_threshold() -> Decimal {
    Decimal::new(1, 4) // 0.0001
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            trigger_on_boundary: false,
        }
    }
}

impl AlertConfig {
    pub fn new(threshold: Decimal) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    /// Threshold must be strictly positive.
    pub fn validate(&self) -> DetectorResult<()> {
        if self.threshold.is_sign_negative() || self.threshold.is_zero() {
            return Err(DetectorError::InvalidConfig(format!(
                "alert threshold ({}) must be positive",
                self.threshold
            )));
        }
        Ok(())
    }

    /// Whether a change of `magnitude` crosses the threshold.
    pub fn crosses(&self, magnitude: Decimal) -> bool {
        if self.trigger_on_boundary {
            magnitude >= self.threshold
        } else {
            magnitude > self.threshold
        }
    }
}
