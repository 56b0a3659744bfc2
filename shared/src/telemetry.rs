/*!
Latency-compensating telemetry filter.

The mechanism reports where it was when it sampled; by the time the offset
reaches the screen it has moved on by roughly one sample interval of travel.
Leading the position by `velocity * lead` removes that one-frame lag.
*/

use crate::error::{Result, SharedError};
use crate::frame::TelemetryFrame;
use crate::protocol::DEFAULT_LEAD_SECONDS;
use crate::units::UnitConverter;

/// Stateless predictor turning telemetry into a visual offset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryFilter {
    lead: f64,
}

impl TelemetryFilter {
    /// Create a filter with the given lead constant
    pub fn new(lead: f64) -> Result<Self> {
        if !lead.is_finite() {
            return Err(SharedError::invalid_calibration(format!(
                "lead constant must be finite, got {}",
                lead
            )));
        }
        Ok(Self { lead })
    }

    pub fn lead(&self) -> f64 {
        self.lead
    }

    /// Predicted compensation in step units: `-(position + lead * velocity)`.
    ///
    /// Negated because the rendered content moves opposite to the mechanism.
    pub fn predict(&self, position: i16, velocity: i16) -> f64 {
        -(position as f64 + self.lead * velocity as f64)
    }

    /// Predicted compensation for a frame, in pixels
    pub fn offset_px(&self, frame: TelemetryFrame, converter: &UnitConverter) -> f64 {
        converter.steps_to_pixels(self.predict(frame.position, frame.velocity))
    }
}

impl Default for TelemetryFilter {
    fn default() -> Self {
        Self {
            lead: DEFAULT_LEAD_SECONDS,
        }
    }
}
