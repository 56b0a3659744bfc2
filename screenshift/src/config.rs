/*!
Configuration management for the screenshift application.
*/

use crate::link::SerialSettings;
use crate::simulator::SimulatorSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shared::protocol::{
    DEFAULT_BAUD_RATE, DEFAULT_LEAD_SECONDS, DEFAULT_SCREEN_WIDTH_PX, DEFAULT_TRAVEL_RANGE_STEPS,
    TELEMETRY_FRAME_BYTES,
};
use shared::{CalibrationConstants, DisplayRegion, TelemetryFilter, TravelClamp, UnitConverter};
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub link: LinkConfig,
    pub calibration: CalibrationConfig,
    pub pointer: PointerConfig,
    pub render: RenderConfig,
    pub simulator: SimulatorConfig,
    pub gui: GuiConfig,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Reject values the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        self.calibration.converter().context("Invalid [calibration] section")?;
        self.calibration.filter().context("Invalid [calibration] section")?;

        if self.pointer.displays.is_empty() {
            anyhow::bail!("[pointer] needs at least one display region");
        }
        for region in &self.pointer.displays {
            region.validate().context("Invalid [pointer] display region")?;
        }

        if self.link.baud_rate == 0 {
            anyhow::bail!("[link] baud_rate must be non-zero");
        }

        let simulator = &self.simulator;
        if !simulator.gain.is_finite() {
            anyhow::bail!("[simulator] gain must be finite, got {}", simulator.gain);
        }
        if !(simulator.max_velocity.is_finite() && simulator.max_velocity >= 0.0) {
            anyhow::bail!(
                "[simulator] max_velocity must be finite and non-negative, got {}",
                simulator.max_velocity
            );
        }
        Ok(())
    }
}

/// Serial link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Explicit serial device; discovered by prefix when absent
    pub port_path: Option<String>,

    /// Device name prefix used for discovery
    pub port_prefix: String,

    /// Serial baud rate
    pub baud_rate: u32,

    /// Bytes to accumulate before handing a chunk to the control loop
    pub min_read_bytes: usize,

    /// Serial read timeout in milliseconds
    pub read_timeout_ms: u64,

    /// How often a blocked receive re-checks for shutdown, in milliseconds
    pub shutdown_poll_ms: u64,
}

impl LinkConfig {
    /// Serial settings for a resolved port path
    pub fn serial_settings(&self, path: String) -> SerialSettings {
        SerialSettings {
            path,
            baud_rate: self.baud_rate,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            min_read_bytes: self.min_read_bytes,
        }
    }

    pub fn shutdown_poll(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_ms.max(1))
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port_path: None,
            port_prefix: "/dev/cu.usbmodemC".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            min_read_bytes: TELEMETRY_FRAME_BYTES,
            read_timeout_ms: 100,
            shutdown_poll_ms: 100,
        }
    }
}

/// Screen and mechanism geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Width of the physical screen in pixels
    pub screen_width_px: f64,

    /// Mechanism travel covering that width, in steps
    pub travel_range_steps: f64,

    /// Velocity lead applied to telemetry, in sample intervals
    pub lead_seconds: f64,

    /// Cap targets at the end of travel
    pub travel_clamp: TravelClamp,
}

impl CalibrationConfig {
    pub fn converter(&self) -> shared::Result<UnitConverter> {
        let calibration = CalibrationConstants::new(self.screen_width_px, self.travel_range_steps)?;
        Ok(UnitConverter::new(calibration, self.travel_clamp))
    }

    pub fn filter(&self) -> shared::Result<TelemetryFilter> {
        TelemetryFilter::new(self.lead_seconds)
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            screen_width_px: DEFAULT_SCREEN_WIDTH_PX,
            travel_range_steps: DEFAULT_TRAVEL_RANGE_STEPS,
            lead_seconds: DEFAULT_LEAD_SECONDS,
            travel_clamp: TravelClamp::Disabled,
        }
    }
}

/// Pointer sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointerConfig {
    /// Period of the synthetic sweep used in debug mode, in seconds
    pub sweep_period_secs: f64,

    /// Known displays in global coordinates
    pub displays: Vec<DisplayRegion>,
}

impl PointerConfig {
    pub fn sweep_period(&self) -> Duration {
        Duration::try_from_secs_f64(self.sweep_period_secs).unwrap_or(Duration::ZERO)
    }
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            sweep_period_secs: 6.0,
            displays: vec![DisplayRegion {
                x: 0.0,
                y: 0.0,
                width: DEFAULT_SCREEN_WIDTH_PX,
                height: 1080.0,
            }],
        }
    }
}

/// Preview placement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Width of the captured content the preview shows
    pub virtual_display_width: f64,

    /// Width of the physical screen the preview sits on
    pub screen_width: f64,

    /// Preview refresh rate in Hz
    pub refresh_rate: u32,
}

impl RenderConfig {
    /// Column of the virtual display that lands on the screen's left edge.
    ///
    /// At zero offset the virtual display is centered on the screen.
    pub fn preview_origin(&self, offset_px: f64) -> f64 {
        offset_px + (self.virtual_display_width - self.screen_width) / 2.0
    }

    pub fn repaint_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.refresh_rate.max(1) as f64)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            virtual_display_width: DEFAULT_SCREEN_WIDTH_PX * 7.0 / 2.0,
            screen_width: DEFAULT_SCREEN_WIDTH_PX,
            refresh_rate: 144,
        }
    }
}

/// Simulated mechanism parameters (debug mode)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Milliseconds between telemetry frames
    pub sample_interval_ms: u64,

    /// Fraction of the remaining distance covered per sample
    pub gain: f64,

    /// Speed limit in steps per sample
    pub max_velocity: f64,
}

impl SimulatorConfig {
    pub fn settings(&self) -> SimulatorSettings {
        SimulatorSettings {
            sample_interval: Duration::from_millis(self.sample_interval_ms.max(1)),
            gain: self.gain,
            max_velocity: self.max_velocity,
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        let defaults = SimulatorSettings::default();
        Self {
            sample_interval_ms: defaults.sample_interval.as_millis() as u64,
            gain: defaults.gain,
            max_velocity: defaults.max_velocity,
        }
    }
}

/// GUI specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuiConfig {
    /// Window width
    pub window_width: f32,

    /// Window height
    pub window_height: f32,

    /// Enable dark mode
    pub dark_mode: bool,

    /// Auto-save configuration on exit
    pub auto_save_config: bool,
}

impl Default for GuiConfig {
    fn default() -> Self {
        Self {
            window_width: 1200.0,
            window_height: 800.0,
            dark_mode: true,
            auto_save_config: true,
        }
    }
}
