/*!
One controller session: open the link, run the loop, tear everything down.

A session owns the writer halves of the offset and status cells until it is
started. Readers and the running flag can be taken beforehand by whoever
needs to observe or stop it (the GUI, the Ctrl+C handler, the live printer).
*/

use crate::config::AppConfig;
use crate::control::{ControlLoop, LoopOutputs};
use crate::link::{discover_port, Link, SerialLink, StreamLink};
use crate::offset::{
    offset_cell, status_cell, LinkStatus, LoopCounters, LoopStats, OffsetReader, OffsetWriter,
    StatusReader, StatusWriter,
};
use crate::pointer::{PointerSampler, PointerSource, SharedPointer, SweepPointer, SystemPointer};
use crate::simulator::MechanismSimulator;
use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::Local;
use shared::{DisplayRegion, LinkError, Point};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::DuplexStream;
use tracing::{error, info, warn};

/// Bytes buffered in each direction of the simulated link
const SIMULATED_LINK_BUFFER: usize = 256;

/// How a session runs
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    /// Print every offset update to stdout as a JSON line
    pub live_output: bool,
    /// Replace the serial port with a simulated mechanism
    pub debug_mode: bool,
}

/// Pointer driving the session's commands
pub enum SessionPointer {
    /// The operating system's pointer
    System(SystemPointer),
    /// Fed from another thread
    Shared(SharedPointer),
    /// Synthetic sweep across the first display
    Sweep(SweepPointer),
}

impl PointerSource for SessionPointer {
    fn pointer_position(&self) -> Option<Point> {
        match self {
            Self::System(p) => p.pointer_position(),
            Self::Shared(p) => p.pointer_position(),
            Self::Sweep(p) => p.pointer_position(),
        }
    }

    fn display_regions(&self) -> &[DisplayRegion] {
        match self {
            Self::System(p) => p.display_regions(),
            Self::Shared(p) => p.display_regions(),
            Self::Sweep(p) => p.display_regions(),
        }
    }
}

/// Link the session ended up opening
enum SessionLink {
    Serial(SerialLink),
    Simulated(StreamLink<DuplexStream>),
}

impl Link for SessionLink {
    async fn recv(&mut self) -> Result<Option<Bytes>, LinkError> {
        match self {
            Self::Serial(link) => link.recv().await,
            Self::Simulated(link) => link.recv().await,
        }
    }

    async fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        match self {
            Self::Serial(link) => link.send(frame).await,
            Self::Simulated(link) => link.send(frame).await,
        }
    }
}

/// A single run of the controller
pub struct ShiftSession {
    config: AppConfig,
    options: SessionOptions,
    running: Arc<AtomicBool>,
    counters: Arc<LoopCounters>,
    writers: Option<(OffsetWriter, StatusWriter)>,
    offset: OffsetReader,
    status: StatusReader,
}

impl ShiftSession {
    pub fn new(config: AppConfig, options: SessionOptions) -> Self {
        let (offset_writer, offset) = offset_cell();
        let (status_writer, status) = status_cell();

        Self {
            config,
            options,
            running: Arc::new(AtomicBool::new(true)),
            counters: LoopCounters::new(),
            writers: Some((offset_writer, status_writer)),
            offset,
            status,
        }
    }

    /// Get a reference to the running flag for external control
    pub fn get_running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn offset_reader(&self) -> OffsetReader {
        self.offset.clone()
    }

    pub fn status_reader(&self) -> StatusReader {
        self.status.clone()
    }

    pub fn counters(&self) -> Arc<LoopCounters> {
        Arc::clone(&self.counters)
    }

    /// Pointer used when the caller does not provide one.
    ///
    /// Debug runs sweep; hardware runs follow the system pointer.
    pub fn default_pointer(&self) -> SessionPointer {
        let displays = self.config.pointer.displays.clone();
        if self.options.debug_mode {
            SessionPointer::Sweep(SweepPointer::new(displays, self.config.pointer.sweep_period()))
        } else {
            SessionPointer::System(SystemPointer::new(displays))
        }
    }

    /// Run the session to completion on a fresh runtime. Blocks the calling thread.
    pub fn start(&mut self, pointer: SessionPointer) -> Result<LoopStats> {
        let (offset_writer, status_writer) = self
            .writers
            .take()
            .context("Session has already been started")?;

        let converter = self
            .config
            .calibration
            .converter()
            .context("Invalid calibration")?;
        let filter = self.config.calibration.filter().context("Invalid calibration")?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to build async runtime")?;

        runtime.block_on(async move {
            let live_handle = self
                .options
                .live_output
                .then(|| tokio::spawn(print_live(offset_writer.subscribe(), Arc::clone(&self.counters))));

            let simulator_running = Arc::new(AtomicBool::new(true));
            let (link, simulator_handle) = match self.open_link(&simulator_running) {
                Ok(opened) => opened,
                Err(e) => {
                    error!("❌ Failed to open link: {:#}", e);
                    status_writer.set(LinkStatus::Failed(format!("{:#}", e)));
                    return Err(e);
                }
            };

            let outputs = LoopOutputs {
                offset: offset_writer,
                status: status_writer,
                counters: Arc::clone(&self.counters),
                running: Arc::clone(&self.running),
            };
            let control = ControlLoop::new(link, PointerSampler::new(pointer), converter, filter, outputs)
                .with_shutdown_poll(self.config.link.shutdown_poll());

            let result = control.run().await;

            // The loop has dropped its link and cells; let the helpers wind down
            simulator_running.store(false, Ordering::SeqCst);
            if let Some(handle) = simulator_handle {
                match handle.await {
                    Ok(Ok(frames)) => info!("🧪 Simulator served {} frames", frames),
                    Ok(Err(e)) => warn!("Simulator stopped with error: {}", e),
                    Err(e) => warn!("Simulator task panicked: {}", e),
                }
            }
            if let Some(handle) = live_handle {
                let _ = handle.await;
            }

            result.context("Control loop failed")
        })
    }

    /// Open the serial port, or spawn the simulated mechanism in debug mode
    fn open_link(&self, simulator_running: &Arc<AtomicBool>) -> Result<(SessionLink, Option<SimulatorHandle>)> {
        if self.options.debug_mode {
            let (near, far) = tokio::io::duplex(SIMULATED_LINK_BUFFER);
            let simulator = MechanismSimulator::new(self.config.simulator.settings());
            let handle = tokio::spawn(simulator.run(far, Arc::clone(simulator_running)));
            info!("🧪 Debug mode: driving a simulated mechanism");
            return Ok((SessionLink::Simulated(StreamLink::new(near)), Some(handle)));
        }

        let link_config = &self.config.link;
        let path = match &link_config.port_path {
            Some(path) => path.clone(),
            None => {
                let path = discover_port(&link_config.port_prefix)
                    .with_context(|| format!("No port configured and discovery for '{}' failed", link_config.port_prefix))?;
                info!("🔍 Discovered serial port {}", path);
                path
            }
        };

        let link = SerialLink::open(&link_config.serial_settings(path))?;
        Ok((SessionLink::Serial(link), None))
    }
}

type SimulatorHandle = tokio::task::JoinHandle<std::io::Result<u64>>;

/// Offsets as JSON lines on stdout
async fn print_live(offsets: OffsetReader, counters: Arc<LoopCounters>) {
    write_live(offsets, counters, std::io::stdout()).await;
}

/// Write one JSON line per offset update until the loop drops its writer
async fn write_live<W: Write>(mut offsets: OffsetReader, counters: Arc<LoopCounters>, mut out: W) -> W {
    while let Some(offset_px) = offsets.changed().await {
        let stats = counters.snapshot();
        let line = serde_json::json!({
            "timestamp": Local::now().to_rfc3339(),
            "offset_px": offset_px,
            "frames_received": stats.frames_received,
            "commands_sent": stats.commands_sent,
        });

        if writeln!(out, "{}", line).and_then(|_| out.flush()).is_err() {
            // Reader of our stdout went away
            break;
        }
    }
    out
}
