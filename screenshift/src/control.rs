/*!
Receive-driven position control loop.

One task owns the link. Each inbound telemetry frame updates the visual offset
and immediately triggers the next command, so the mechanism's own sample rate
paces the traffic in both directions:

1. await the next chunk from the link
2. decode it; drop anything that is not exactly one telemetry frame
3. publish the predicted visual offset
4. sample the pointer, convert to steps and write the command

Steps 2-4 run to completion on every wake-up, which serializes writes without
a lock. Any link error ends the loop for good.
*/

use crate::link::Link;
use crate::offset::{LinkStatus, LoopCounters, LoopStats, OffsetWriter, StatusWriter};
use crate::pointer::{PointerSampler, PointerSource};
use shared::{CommandFrame, LinkError, TelemetryFilter, TelemetryFrame, UnitConverter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Default interval at which a blocked receive re-checks the running flag
pub const DEFAULT_SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Everything the loop publishes to the rest of the process
pub struct LoopOutputs {
    pub offset: OffsetWriter,
    pub status: StatusWriter,
    pub counters: Arc<LoopCounters>,
    pub running: Arc<AtomicBool>,
}

/// Closed-loop controller between the pointer and the mechanism
pub struct ControlLoop<L, P> {
    link: L,
    sampler: PointerSampler<P>,
    converter: UnitConverter,
    filter: TelemetryFilter,
    outputs: LoopOutputs,
    shutdown_poll: Duration,
}

impl<L: Link, P: PointerSource> ControlLoop<L, P> {
    /// Take ownership of an already-open link
    pub fn new(
        link: L,
        sampler: PointerSampler<P>,
        converter: UnitConverter,
        filter: TelemetryFilter,
        outputs: LoopOutputs,
    ) -> Self {
        Self {
            link,
            sampler,
            converter,
            filter,
            outputs,
            shutdown_poll: DEFAULT_SHUTDOWN_POLL,
        }
    }

    pub fn with_shutdown_poll(mut self, shutdown_poll: Duration) -> Self {
        self.shutdown_poll = shutdown_poll;
        self
    }

    /// Run until the running flag is cleared or the link fails.
    ///
    /// Returns the final counters on a requested stop.
    pub async fn run(mut self) -> Result<LoopStats, LinkError> {
        self.outputs.status.set(LinkStatus::Running);
        info!("🔁 Control loop running");

        let result = self.drive().await;
        let stats = self.outputs.counters.snapshot();

        match &result {
            Ok(()) => {
                self.outputs.status.set(LinkStatus::Stopped);
                info!("🛑 Control loop stopped");
            }
            Err(e) => {
                self.outputs.status.set(LinkStatus::Failed(e.to_string()));
                error!("❌ Control loop failed: {}", e);
            }
        }

        info!("📈 Control loop final stats:");
        info!("   Frames received: {}", stats.frames_received);
        info!("   Frames discarded: {}", stats.frames_discarded);
        info!("   Commands sent: {}", stats.commands_sent);

        result.map(|_| stats)
    }

    async fn drive(&mut self) -> Result<(), LinkError> {
        while self.outputs.running.load(Ordering::SeqCst) {
            match tokio::time::timeout(self.shutdown_poll, self.link.recv()).await {
                Ok(Ok(Some(chunk))) => {
                    self.handle_chunk(&chunk).await?;
                }
                Ok(Ok(None)) => return Err(LinkError::Disconnected),
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    // Timeout - continue to check running flag
                    continue;
                }
            }
        }
        Ok(())
    }

    /// Process one delivery from the link.
    ///
    /// Returns the published offset, or `None` if the chunk was discarded.
    pub async fn handle_chunk(&mut self, chunk: &[u8]) -> Result<Option<f64>, LinkError> {
        let Some(frame) = TelemetryFrame::decode(chunk) else {
            self.outputs.counters.record_discard();
            debug!("Discarding {}-byte chunk: {}", chunk.len(), hex::encode(chunk));
            return Ok(None);
        };
        self.outputs.counters.record_frame();

        let offset = self.filter.offset_px(frame, &self.converter);
        self.outputs.offset.publish(offset);

        let target = self.converter.pixels_to_steps(self.sampler.sample());
        let command = CommandFrame::new(target);
        self.link.send(&command.encode()).await?;
        self.outputs.counters.record_command();

        debug!(
            "pos={} vel={} -> offset {:.2} px, sent {}",
            frame.position,
            frame.velocity,
            offset,
            command.wire_position()
        );

        Ok(Some(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::StreamLink;
    use crate::offset::{offset_cell, status_cell, OffsetReader, StatusReader};
    use approx::assert_relative_eq;
    use bytes::Bytes;
    use shared::{DisplayRegion, Point};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Pointer parked at a fixed spot on a single 1920x1080 display
    struct FixedPointer {
        at: Point,
        regions: Vec<DisplayRegion>,
    }

    impl FixedPointer {
        fn at_x(x: f64) -> PointerSampler<Self> {
            PointerSampler::new(Self {
                at: Point::new(x, 540.0),
                regions: vec![DisplayRegion::new(0.0, 0.0, 1920.0, 1080.0).unwrap()],
            })
        }
    }

    impl PointerSource for FixedPointer {
        fn pointer_position(&self) -> Option<Point> {
            Some(self.at)
        }

        fn display_regions(&self) -> &[DisplayRegion] {
            &self.regions
        }
    }

    /// Link replaying canned chunks and failing writes on demand
    struct ScriptedLink {
        inbound: VecDeque<Vec<u8>>,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        fail_writes: bool,
    }

    impl Link for ScriptedLink {
        async fn recv(&mut self) -> Result<Option<Bytes>, LinkError> {
            Ok(self.inbound.pop_front().map(Bytes::from))
        }

        async fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
            if self.fail_writes {
                return Err(LinkError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "device unplugged",
                )));
            }
            self.sent.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
    }

    fn outputs() -> (LoopOutputs, OffsetReader, StatusReader) {
        let (offset, offset_reader) = offset_cell();
        let (status, status_reader) = status_cell();
        let outputs = LoopOutputs {
            offset,
            status,
            counters: LoopCounters::new(),
            running: Arc::new(AtomicBool::new(true)),
        };
        (outputs, offset_reader, status_reader)
    }

    fn telemetry(position: i16, velocity: i16) -> [u8; 4] {
        TelemetryFrame::new(position, velocity).encode()
    }

    async fn offsets_for(frames: &[(i16, i16)]) -> Vec<f64> {
        // Chunks are fed straight to handle_chunk; the mock only sees the commands
        let mut builder = tokio_test::io::Builder::new();
        for _ in frames {
            builder.write(&[0x00, 0x00]);
        }
        let (outputs, reader, _status) = outputs();
        let mut control = ControlLoop::new(
            StreamLink::new(builder.build()),
            FixedPointer::at_x(960.0),
            UnitConverter::default(),
            TelemetryFilter::default(),
            outputs,
        );

        let mut published = Vec::new();
        for &(position, velocity) in frames {
            control.handle_chunk(&telemetry(position, velocity)).await.unwrap();
            published.push(reader.observe());
        }
        published
    }

    #[tokio::test]
    async fn test_offset_sequence_is_deterministic() {
        let frames = [(100, 0), (100, 50), (50, -20)];
        let first = offsets_for(&frames).await;
        let second = offsets_for(&frames).await;
        assert_eq!(first, second);

        let ratio = 1920.0 / 5300.0;
        assert_relative_eq!(first[0], -100.0 * ratio, epsilon = 1e-9);
        assert_relative_eq!(first[1], -101.0 * ratio, epsilon = 1e-9);
        assert_relative_eq!(first[2], -49.6 * ratio, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_pointer_at_midpoint_sends_zero() {
        let mock = tokio_test::io::Builder::new().write(&[0x00, 0x00]).build();
        let (outputs, _reader, _status) = outputs();
        let counters = Arc::clone(&outputs.counters);
        let mut control = ControlLoop::new(
            StreamLink::new(mock),
            FixedPointer::at_x(960.0),
            UnitConverter::default(),
            TelemetryFilter::default(),
            outputs,
        );

        assert!(control.handle_chunk(&telemetry(10, 0)).await.unwrap().is_some());
        assert_eq!(counters.snapshot().commands_sent, 1);
    }

    #[tokio::test]
    async fn test_run_closes_the_loop_until_disconnect() {
        // Pointer 959 px right of center -> 2647 steps -> 0x0A57
        let mock = tokio_test::io::Builder::new()
            .read(&telemetry(0, 0))
            .write(&[0x57, 0x0A])
            .read(&[0x01, 0x02, 0x03])
            .read(&telemetry(2000, 120))
            .write(&[0x57, 0x0A])
            .build();
        let (outputs, reader, status) = outputs();
        let counters = Arc::clone(&outputs.counters);
        let control = ControlLoop::new(
            StreamLink::new(mock),
            FixedPointer::at_x(1919.0),
            UnitConverter::default(),
            TelemetryFilter::default(),
            outputs,
        );

        let err = control.run().await.unwrap_err();
        assert!(matches!(err, LinkError::Disconnected));
        assert_eq!(status.observe(), LinkStatus::Failed("Link disconnected".to_string()));
        assert_eq!(
            counters.snapshot(),
            LoopStats {
                frames_received: 2,
                frames_discarded: 1,
                commands_sent: 2,
            }
        );
        assert_relative_eq!(reader.observe(), -(2000.0 + 2.4) * 1920.0 / 5300.0, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_write_failure_stops_everything() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let link = ScriptedLink {
            inbound: VecDeque::from(vec![
                telemetry(100, 0).to_vec(),
                telemetry(300, 0).to_vec(),
                telemetry(500, 0).to_vec(),
            ]),
            sent: Arc::clone(&sent),
            fail_writes: true,
        };
        let (outputs, reader, status) = outputs();
        let counters = Arc::clone(&outputs.counters);
        let control = ControlLoop::new(
            link,
            FixedPointer::at_x(1200.0),
            UnitConverter::default(),
            TelemetryFilter::default(),
            outputs,
        );

        let err = control.run().await.unwrap_err();
        assert!(matches!(err, LinkError::Io(_)));
        assert!(matches!(status.observe(), LinkStatus::Failed(_)));

        // The first frame's offset stays frozen; later frames were never read
        assert_relative_eq!(reader.observe(), -100.0 * 1920.0 / 5300.0, epsilon = 1e-9);
        assert!(sent.lock().unwrap().is_empty());
        let stats = counters.snapshot();
        assert_eq!(stats.frames_received, 1);
        assert_eq!(stats.commands_sent, 0);
    }

    #[tokio::test]
    async fn test_malformed_chunks_publish_nothing() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let link = ScriptedLink {
            inbound: VecDeque::new(),
            sent: Arc::clone(&sent),
            fail_writes: false,
        };
        let (outputs, reader, _status) = outputs();
        let counters = Arc::clone(&outputs.counters);
        let mut control = ControlLoop::new(
            link,
            FixedPointer::at_x(960.0),
            UnitConverter::default(),
            TelemetryFilter::default(),
            outputs,
        );

        for chunk in [&[][..], &[0x01][..], &[0x01, 0x02, 0x03][..], &[0u8; 8][..]] {
            assert_eq!(control.handle_chunk(chunk).await.unwrap(), None);
        }
        assert_eq!(reader.observe(), 0.0);
        assert!(sent.lock().unwrap().is_empty());
        assert_eq!(counters.snapshot().frames_discarded, 4);
    }

    #[tokio::test]
    async fn test_cleared_running_flag_stops_idle_loop() {
        let (near, _far) = tokio::io::duplex(64);
        let (outputs, _reader, status) = outputs();
        let running = Arc::clone(&outputs.running);
        let control = ControlLoop::new(
            StreamLink::new(near),
            FixedPointer::at_x(960.0),
            UnitConverter::default(),
            TelemetryFilter::default(),
            outputs,
        )
        .with_shutdown_poll(Duration::from_millis(10));

        let handle = tokio::spawn(control.run());
        tokio::time::sleep(Duration::from_millis(30)).await;
        running.store(false, Ordering::SeqCst);

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats, LoopStats::default());
        assert_eq!(status.observe(), LinkStatus::Stopped);
    }
}
