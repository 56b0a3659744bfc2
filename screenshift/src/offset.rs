/*!
Single-slot cells shared between the control task and its observers.

The visual offset and the link status are both "latest value wins": readers
never see a queue, only the most recent value, and the writer never waits.
The writer halves are not `Clone`, so there is exactly one publisher.
*/

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Create the visual offset cell, starting at zero
pub fn offset_cell() -> (OffsetWriter, OffsetReader) {
    let (tx, rx) = watch::channel(0.0);
    (OffsetWriter { tx }, OffsetReader { rx })
}

/// Publishing half of the visual offset, owned by the control loop
#[derive(Debug)]
pub struct OffsetWriter {
    tx: watch::Sender<f64>,
}

impl OffsetWriter {
    /// Overwrite the current offset. Succeeds even with no readers left.
    pub fn publish(&self, offset_px: f64) {
        self.tx.send_replace(offset_px);
    }

    /// A new reader observing this cell
    pub fn subscribe(&self) -> OffsetReader {
        OffsetReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observing half of the visual offset, used by renderers
#[derive(Debug, Clone)]
pub struct OffsetReader {
    rx: watch::Receiver<f64>,
}

impl OffsetReader {
    /// Most recently published offset in pixels
    pub fn observe(&self) -> f64 {
        *self.rx.borrow()
    }

    /// Wait for the next publish and return the value.
    ///
    /// Returns `None` once the writer has been dropped.
    pub async fn changed(&mut self) -> Option<f64> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

/// Lifecycle of the control loop as seen by the operator
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkStatus {
    /// Waiting for the channel to be opened
    #[default]
    Idle,
    /// Channel open, loop active
    Running,
    /// Loop ended on request
    Stopped,
    /// Loop ended on a link error; offsets are frozen at their last value
    Failed(String),
}

impl LinkStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether the loop can no longer change state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed(_))
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Failed(reason) => write!(f, "Failed: {}", reason),
        }
    }
}

/// Create the status cell, starting at [`LinkStatus::Idle`]
pub fn status_cell() -> (StatusWriter, StatusReader) {
    let (tx, rx) = watch::channel(LinkStatus::Idle);
    (StatusWriter { tx }, StatusReader { rx })
}

#[derive(Debug)]
pub struct StatusWriter {
    tx: watch::Sender<LinkStatus>,
}

impl StatusWriter {
    pub fn set(&self, status: LinkStatus) {
        self.tx.send_replace(status);
    }
}

#[derive(Debug, Clone)]
pub struct StatusReader {
    rx: watch::Receiver<LinkStatus>,
}

impl StatusReader {
    pub fn observe(&self) -> LinkStatus {
        self.rx.borrow().clone()
    }
}

/// Running totals for the control loop, readable from any thread
#[derive(Debug, Default)]
pub struct LoopCounters {
    frames_received: AtomicU64,
    frames_discarded: AtomicU64,
    commands_sent: AtomicU64,
}

/// Point-in-time copy of [`LoopCounters`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopStats {
    pub frames_received: u64,
    pub frames_discarded: u64,
    pub commands_sent: u64,
}

impl LoopCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discard(&self) {
        self.frames_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LoopStats {
        LoopStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
        }
    }
}
