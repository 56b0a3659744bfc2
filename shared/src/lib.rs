/*!
# Shared Types and Utilities

This crate contains the wire protocol and the pure math shared by the
Screenshift controller: everything that can be tested without a serial port,
a window or a runtime.

## Core Types

- [`TelemetryFrame`] - Inbound position/velocity record
- [`CommandFrame`] - Outbound target position record
- [`UnitConverter`] - Pixel space <-> step space mapping
- [`TelemetryFilter`] - Predictive offset from telemetry
- [`DisplayRegion`] - Display bounds used for pointer sampling

## Modules

- [`frame`] - Frame encoding and decoding
- [`units`] - Calibration constants and unit conversion
- [`telemetry`] - Latency-compensating telemetry filter
- [`display`] - Display geometry and pointer offset sampling
- [`error`] - Common error types
*/

pub mod display;
pub mod error;
pub mod frame;
pub mod telemetry;
pub mod units;

// Re-export commonly used types
pub use display::{sample_pointer_offset, DisplayRegion, Point};
pub use error::{LinkError, Result, SharedError};
pub use frame::{CommandFrame, TelemetryFrame};
pub use telemetry::TelemetryFilter;
pub use units::{CalibrationConstants, TravelClamp, UnitConverter};

/// Version information for the shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol constants
pub mod protocol {
    /// Size of an inbound telemetry frame in bytes
    pub const TELEMETRY_FRAME_BYTES: usize = 4;

    /// Size of an outbound command frame in bytes
    pub const COMMAND_FRAME_BYTES: usize = 2;

    /// Default serial baud rate of the mechanism controller
    pub const DEFAULT_BAUD_RATE: u32 = 115_200;

    /// Physical screen width the mechanism was calibrated against
    pub const DEFAULT_SCREEN_WIDTH_PX: f64 = 1920.0;

    /// Mechanism travel covering one screen width, in encoder steps
    pub const DEFAULT_TRAVEL_RANGE_STEPS: f64 = 5300.0;

    /// Seconds between two telemetry samples, used as the velocity lead
    pub const DEFAULT_LEAD_SECONDS: f64 = 0.02;
}
