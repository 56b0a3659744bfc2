/*!
Common error types for the Screenshift components.
*/

use thiserror::Error;

/// Common result type used throughout the shared library
pub type Result<T> = std::result::Result<T, SharedError>;

/// Errors raised while setting up or running the controller
#[derive(Error, Debug)]
pub enum SharedError {
    /// Serial link failures
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// Calibration constants that cannot describe real hardware
    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),

    /// Display geometry that cannot contain a pointer
    #[error("Invalid display region: {0}")]
    InvalidDisplay(String),
}

impl SharedError {
    /// Create a new invalid calibration error
    pub fn invalid_calibration(msg: impl Into<String>) -> Self {
        Self::InvalidCalibration(msg.into())
    }

    /// Create a new invalid display error
    pub fn invalid_display(msg: impl Into<String>) -> Self {
        Self::InvalidDisplay(msg.into())
    }
}

/// Failure of the duplex channel to the mechanism.
///
/// Any of these ends the control loop; reopening the port is up to the caller.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Read or write failed at the OS level
    #[error("I/O error on link: {0}")]
    Io(#[from] std::io::Error),

    /// The far end closed the stream
    #[error("Link disconnected")]
    Disconnected,

    /// The port could not be opened or configured
    #[error("Serial port error: {0}")]
    Port(String),
}

impl LinkError {
    /// Create a new port error
    pub fn port(msg: impl Into<String>) -> Self {
        Self::Port(msg.into())
    }
}
