/*!
Duplex byte channel to the mechanism.

The control loop only needs two operations: wait for the next inbound chunk
and write an outbound frame. [`Link`] captures exactly that, so the loop runs
the same over a real serial port, an in-memory pipe to the simulator, or a
scripted mock in tests.
*/

use bytes::Bytes;
use serialport::{SerialPort, SerialPortType};
use shared::LinkError;
use std::future::Future;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Largest chunk handed to the loop in one delivery
const READ_BUFFER_BYTES: usize = 64;

/// Chunks buffered between the serial reader thread and the loop
const SERIAL_CHANNEL_DEPTH: usize = 64;

/// An open duplex channel to the mechanism
pub trait Link: Send {
    /// Wait for the next chunk. `Ok(None)` means the far end closed the stream.
    fn recv(&mut self) -> impl Future<Output = Result<Option<Bytes>, LinkError>> + Send;

    /// Write one frame in full
    fn send(&mut self, frame: &[u8]) -> impl Future<Output = Result<(), LinkError>> + Send;
}

/// Link over any async byte stream: in-memory pipes and test mocks
pub struct StreamLink<S> {
    stream: S,
    buffer: Box<[u8; READ_BUFFER_BYTES]>,
}

impl<S> StreamLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Box::new([0u8; READ_BUFFER_BYTES]),
        }
    }
}

impl<S> Link for StreamLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self) -> Result<Option<Bytes>, LinkError> {
        let n = self.stream.read(&mut self.buffer[..]).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(Bytes::copy_from_slice(&self.buffer[..n])))
    }

    async fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        self.stream.write_all(frame).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

/// Serial port settings needed to open the mechanism's port
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub path: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
    /// Deliver a chunk only once at least this many bytes have arrived
    pub min_read_bytes: usize,
}

/// Link over a blocking serial port.
///
/// A reader thread blocks on the port and forwards chunks to the loop. Writes
/// run on the blocking pool so the loop task never parks a runtime worker.
pub struct SerialLink {
    writer: Option<Box<dyn SerialPort>>,
    inbound: mpsc::Receiver<Result<Bytes, LinkError>>,
    reader_running: Arc<AtomicBool>,
    reader_handle: Option<thread::JoinHandle<()>>,
}

impl SerialLink {
    /// Open and configure the port, then start the reader thread
    pub fn open(settings: &SerialSettings) -> Result<Self, LinkError> {
        info!("🔌 Opening serial port {} at {} baud", settings.path, settings.baud_rate);

        let writer = serialport::new(&settings.path, settings.baud_rate)
            .timeout(settings.read_timeout)
            .open()
            .map_err(|e| LinkError::port(format!("{}: {}", settings.path, e)))?;
        let mut reader = writer
            .try_clone()
            .map_err(|e| LinkError::port(format!("{}: {}", settings.path, e)))?;

        let (tx, inbound) = mpsc::channel(SERIAL_CHANNEL_DEPTH);
        let reader_running = Arc::new(AtomicBool::new(true));
        let running = Arc::clone(&reader_running);
        let min_read_bytes = settings.min_read_bytes.max(1);

        let reader_handle = thread::Builder::new()
            .name("serial-reader".to_string())
            .spawn(move || {
                pump_reads(&mut reader, &tx, &running, min_read_bytes);
                debug!("Serial reader thread exiting");
            })?;

        info!("✅ Connected to {}", settings.path);

        Ok(Self {
            writer: Some(writer),
            inbound,
            reader_running,
            reader_handle: Some(reader_handle),
        })
    }
}

/// Blocking read loop feeding `tx`.
///
/// Reads accumulate until at least `min_read_bytes` are pending (or the
/// buffer is full), then everything pending goes out as one chunk. Returns
/// when `running` is cleared, the port reports end of stream or an error, or
/// the receiving side has gone away.
fn pump_reads<R: Read>(
    port: &mut R,
    tx: &mpsc::Sender<Result<Bytes, LinkError>>,
    running: &AtomicBool,
    min_read_bytes: usize,
) {
    let mut buffer = [0u8; READ_BUFFER_BYTES];
    let mut pending: Vec<u8> = Vec::with_capacity(READ_BUFFER_BYTES);

    while running.load(Ordering::SeqCst) {
        let room = READ_BUFFER_BYTES - pending.len();
        match port.read(&mut buffer[..room]) {
            Ok(0) => {
                let _ = tx.blocking_send(Err(LinkError::Disconnected));
                return;
            }
            Ok(n) => {
                pending.extend_from_slice(&buffer[..n]);
                if pending.len() >= min_read_bytes || pending.len() == READ_BUFFER_BYTES {
                    let chunk = Bytes::from(std::mem::take(&mut pending));
                    if tx.blocking_send(Ok(chunk)).is_err() {
                        // Loop is gone
                        return;
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("Serial read error: {}", e);
                let _ = tx.blocking_send(Err(LinkError::Io(e)));
                return;
            }
        }
    }
}

/// Write and flush on the blocking pool, handing the writer back afterwards.
///
/// The writer is lost only if the pool drops the task, which happens during
/// runtime shutdown.
async fn write_blocking<W>(mut writer: W, frame: &[u8]) -> Result<(W, std::io::Result<()>), LinkError>
where
    W: Write + Send + 'static,
{
    let frame = frame.to_vec();
    tokio::task::spawn_blocking(move || {
        let result = writer.write_all(&frame).and_then(|_| writer.flush());
        (writer, result)
    })
    .await
    .map_err(|e| LinkError::port(format!("serial writer task failed: {}", e)))
}

/// Wait for the reader thread without blocking a runtime worker
fn join_reader(handle: thread::JoinHandle<()>) {
    let join = move || {
        if handle.join().is_err() {
            warn!("Serial reader thread panicked");
        }
    };

    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn_blocking(join);
        }
        Err(_) => join(),
    }
}

impl Link for SerialLink {
    async fn recv(&mut self) -> Result<Option<Bytes>, LinkError> {
        match self.inbound.recv().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        // Only missing if an earlier write task was lost
        let writer = self.writer.take().ok_or(LinkError::Disconnected)?;
        let (writer, result) = write_blocking(writer, frame).await?;
        self.writer = Some(writer);
        result?;
        Ok(())
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.reader_running.store(false, Ordering::SeqCst);
        // Unblock a reader parked on a full channel
        self.inbound.close();
        if let Some(handle) = self.reader_handle.take() {
            join_reader(handle);
        }
    }
}

/// First serial port whose name starts with `prefix`
pub fn discover_port(prefix: &str) -> Result<String, LinkError> {
    let ports = serialport::available_ports()
        .map_err(|e| LinkError::port(format!("could not enumerate ports: {}", e)))?;

    ports
        .into_iter()
        .map(|p| p.port_name)
        .find(|name| name.starts_with(prefix))
        .ok_or_else(|| LinkError::port(format!("no port found matching {}*", prefix)))
}

/// Human-readable listing of every serial port on the system
pub fn describe_ports() -> Result<Vec<String>, LinkError> {
    let ports = serialport::available_ports()
        .map_err(|e| LinkError::port(format!("could not enumerate ports: {}", e)))?;

    Ok(ports
        .iter()
        .map(|p| match &p.port_type {
            SerialPortType::UsbPort(info) => format!(
                "{} (usb vid={:04x} pid={:04x} {})",
                p.port_name,
                info.vid,
                info.pid,
                info.product.as_deref().unwrap_or("")
            ),
            SerialPortType::BluetoothPort => format!("{} (bluetooth)", p.port_name),
            SerialPortType::PciPort => format!("{} (pci)", p.port_name),
            SerialPortType::Unknown => p.port_name.clone(),
        })
        .collect())
}
