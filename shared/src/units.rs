/*!
Conversion between pixel space and mechanism step space.

Pixel space is the floating-point horizontal distance on screen; step space is
the integer unit of the mechanism's position encoder. The ratio between the two
is fixed at startup from the screen width and the travel the mechanism needs
to cover it.
*/

use crate::error::{Result, SharedError};
use crate::protocol::{DEFAULT_SCREEN_WIDTH_PX, DEFAULT_TRAVEL_RANGE_STEPS};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Whether commanded targets may exceed the mechanism's travel range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelClamp {
    /// Targets are only floored at zero
    #[default]
    Disabled,
    /// Targets are also capped at `travel_range_steps`
    Enabled,
}

/// Geometry constants, immutable for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationConstants {
    pixels_per_step: f64,
    travel_range_steps: f64,
}

impl CalibrationConstants {
    /// Derive the constants from the screen width and the matching travel
    pub fn new(screen_width_px: f64, travel_range_steps: f64) -> Result<Self> {
        if !(screen_width_px.is_finite() && screen_width_px > 0.0) {
            return Err(SharedError::invalid_calibration(format!(
                "screen width must be positive, got {}",
                screen_width_px
            )));
        }
        if !(travel_range_steps.is_finite() && travel_range_steps > 0.0) {
            return Err(SharedError::invalid_calibration(format!(
                "travel range must be positive, got {}",
                travel_range_steps
            )));
        }

        let pixels_per_step = screen_width_px / travel_range_steps;
        debug!(
            "Calibration: {} px over {} steps ({:.5} px/step)",
            screen_width_px, travel_range_steps, pixels_per_step
        );

        Ok(Self {
            pixels_per_step,
            travel_range_steps,
        })
    }

    pub fn pixels_per_step(&self) -> f64 {
        self.pixels_per_step
    }

    pub fn travel_range_steps(&self) -> f64 {
        self.travel_range_steps
    }
}

impl Default for CalibrationConstants {
    fn default() -> Self {
        Self {
            pixels_per_step: DEFAULT_SCREEN_WIDTH_PX / DEFAULT_TRAVEL_RANGE_STEPS,
            travel_range_steps: DEFAULT_TRAVEL_RANGE_STEPS,
        }
    }
}

/// Maps pointer offsets to step targets and telemetry back to pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConverter {
    calibration: CalibrationConstants,
    clamp: TravelClamp,
}

impl UnitConverter {
    pub fn new(calibration: CalibrationConstants, clamp: TravelClamp) -> Self {
        Self { calibration, clamp }
    }

    pub fn calibration(&self) -> &CalibrationConstants {
        &self.calibration
    }

    pub fn clamp(&self) -> TravelClamp {
        self.clamp
    }

    /// Convert a pointer offset from the display midpoint into a step target.
    ///
    /// The mechanism has no travel below its zero position, so negative
    /// results are floored to zero. The fractional part is truncated.
    pub fn pixels_to_steps(&self, pixel_offset_from_center: f64) -> i32 {
        let mut steps = pixel_offset_from_center / self.calibration.pixels_per_step;

        // NaN compares false everywhere; send the mechanism home rather than garbage
        if steps.is_nan() || steps < 0.0 {
            steps = 0.0;
        }

        if self.clamp == TravelClamp::Enabled {
            steps = steps.min(self.calibration.travel_range_steps);
        }

        // `as` saturates at i32::MAX; wrapping to 16 bits happens at encode time
        steps as i32
    }

    /// Scale a step quantity to pixels. Sign is preserved.
    pub fn steps_to_pixels(&self, steps: f64) -> f64 {
        steps * self.calibration.pixels_per_step
    }
}

impl Default for UnitConverter {
    fn default() -> Self {
        Self::new(CalibrationConstants::default(), TravelClamp::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_calibration_matches_hardware() {
        let calibration = CalibrationConstants::default();
        assert_relative_eq!(calibration.pixels_per_step(), 1920.0 / 5300.0);
        assert_relative_eq!(calibration.travel_range_steps(), 5300.0);
        assert_eq!(calibration, CalibrationConstants::new(1920.0, 5300.0).unwrap());
    }

    #[test]
    fn test_invalid_calibration_rejected() {
        assert!(CalibrationConstants::new(0.0, 5300.0).is_err());
        assert!(CalibrationConstants::new(1920.0, -1.0).is_err());
        assert!(CalibrationConstants::new(f64::NAN, 5300.0).is_err());
        assert!(CalibrationConstants::new(1920.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_pixels_to_steps_scaling() {
        let converter = UnitConverter::default();
        assert_eq!(converter.pixels_to_steps(0.0), 0);
        // Right edge of a 1920 px screen is 960 px from center: half the travel
        assert_eq!(converter.pixels_to_steps(960.0), 2650);
        // Truncates toward zero
        assert_eq!(converter.pixels_to_steps(1.0), 2);
    }

    #[test]
    fn test_pixels_to_steps_never_negative() {
        let converter = UnitConverter::default();
        for input in [-0.5, -1.0, -960.0, -1.0e9, f64::MIN, f64::NEG_INFINITY, f64::NAN] {
            assert_eq!(converter.pixels_to_steps(input), 0, "input {}", input);
        }
    }

    #[test]
    fn test_pixels_to_steps_monotonic() {
        let converter = UnitConverter::default();
        let mut previous = i32::MIN;
        let mut px = -5000.0;
        while px <= 50_000.0 {
            let steps = converter.pixels_to_steps(px);
            assert!(steps >= previous, "not monotonic at {} px", px);
            assert!(steps >= 0);
            previous = steps;
            px += 7.3;
        }
    }

    #[test]
    fn test_travel_clamp_policy() {
        let calibration = CalibrationConstants::default();
        let open = UnitConverter::new(calibration, TravelClamp::Disabled);
        let clamped = UnitConverter::new(calibration, TravelClamp::Enabled);

        // 3000 px from center is well past the end of travel
        assert_eq!(open.pixels_to_steps(3000.0), 8281);
        assert_eq!(clamped.pixels_to_steps(3000.0), 5300);
        // Inside the range both policies agree
        assert_eq!(open.pixels_to_steps(500.0), clamped.pixels_to_steps(500.0));
        assert_eq!(clamped.pixels_to_steps(-100.0), 0);
    }

    #[test]
    fn test_steps_to_pixels_is_scale_only() {
        let converter = UnitConverter::default();
        assert_relative_eq!(converter.steps_to_pixels(5300.0), 1920.0);
        assert_relative_eq!(converter.steps_to_pixels(-5300.0), -1920.0);
        assert_relative_eq!(converter.steps_to_pixels(0.0), 0.0);
    }
}
