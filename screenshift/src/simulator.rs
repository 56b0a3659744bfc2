/*!
Simulated mechanism for running the controller without hardware.

Plays the microcontroller's side of the link: emits a telemetry frame every
sample interval and chases the most recent command target with a
velocity-limited proportional move.
*/

use shared::protocol::COMMAND_FRAME_BYTES;
use shared::{CommandFrame, TelemetryFrame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Motion parameters of the simulated mechanism
#[derive(Debug, Clone, Copy)]
pub struct SimulatorSettings {
    /// Time between telemetry frames
    pub sample_interval: Duration,
    /// Fraction of the remaining distance covered per sample
    pub gain: f64,
    /// Speed limit in steps per sample
    pub max_velocity: f64,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(20),
            gain: 0.25,
            max_velocity: 120.0,
        }
    }
}

/// State of the simulated carriage
#[derive(Debug, Clone)]
pub struct MechanismSimulator {
    settings: SimulatorSettings,
    position: f64,
    target: f64,
}

impl MechanismSimulator {
    pub fn new(settings: SimulatorSettings) -> Self {
        Self {
            settings,
            position: 0.0,
            target: 0.0,
        }
    }

    /// Latch a new target; the mechanism only sees the 16-bit wire value
    pub fn apply_command(&mut self, command: CommandFrame) {
        self.target = command.wire_position() as f64;
    }

    /// Advance one sample interval and report the new state
    pub fn step(&mut self) -> TelemetryFrame {
        let limit = self.settings.max_velocity.abs();
        let velocity = ((self.target - self.position) * self.settings.gain).clamp(-limit, limit);
        self.position += velocity;

        TelemetryFrame::new(
            self.position.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16,
            velocity.round() as i16,
        )
    }

    /// Serve the link until the controller hangs up or `running` is cleared.
    ///
    /// Returns the number of telemetry frames sent.
    pub async fn run<S>(mut self, stream: S, running: Arc<AtomicBool>) -> std::io::Result<u64>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut ticker = tokio::time::interval(self.settings.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut inbound = [0u8; 64];
        let mut pending: Vec<u8> = Vec::new();
        let mut frames_sent = 0u64;

        info!("🧪 Simulated mechanism started ({:?} per sample)", self.settings.sample_interval);

        while running.load(Ordering::SeqCst) {
            tokio::select! {
                _ = ticker.tick() => {
                    let frame = self.step();
                    match writer.write_all(&frame.encode()).await {
                        Ok(()) => frames_sent += 1,
                        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                            debug!("Controller closed the link");
                            break;
                        }
                        Err(e) => return Err(e),
                    }
                }
                read = reader.read(&mut inbound) => {
                    let n = read?;
                    if n == 0 {
                        debug!("Controller closed the link");
                        break;
                    }
                    // The firmware side does frame its input
                    pending.extend_from_slice(&inbound[..n]);
                    let whole = pending.len() - pending.len() % COMMAND_FRAME_BYTES;
                    for chunk in pending[..whole].chunks_exact(COMMAND_FRAME_BYTES) {
                        if let Some(command) = CommandFrame::decode(chunk) {
                            self.apply_command(command);
                        }
                    }
                    pending.drain(..whole);
                }
            }
        }

        info!("🧪 Simulated mechanism stopped after {} frames", frames_sent);
        Ok(frames_sent)
    }
}
