//! Port-specific error types.
//!
//! These are the primitive failures a raw port reports. They are classified
//! into the transport taxonomy by [`crate::transport::mapper`] exactly once,
//! at the boundary where they are first observed.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a [`RawPort`](super::RawPort) implementation.
#[derive(Debug, Error)]
pub enum PortError {
    /// The specified serial port was not found on the system.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// The device is claimed by another process or access was denied.
    #[error("Serial port is busy: {0}")]
    Busy(String),

    /// An I/O error occurred during port operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Port configuration failed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The platform call did not finish within its own timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Attempted to use a port that's not open.
    #[error("Port is not open")]
    NotOpen,

    /// The port stopped accepting bytes part way through a write.
    #[error("Short write: {written} of {attempted} bytes accepted")]
    ShortWrite { attempted: usize, written: usize },

    /// The device disappeared while the port was in use.
    #[error("Device disconnected: {0}")]
    DeviceLost(String),

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a Busy error from a port name.
    pub fn busy(port_name: impl Into<String>) -> Self {
        Self::Busy(port_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a Timeout error from a duration.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// Whether this failure is a platform timeout signal.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Io(e) => e.kind() == io::ErrorKind::TimedOut,
            Self::Serial(e) => matches!(e.kind(), serialport::ErrorKind::Io(io::ErrorKind::TimedOut)),
            _ => false,
        }
    }

    /// Whether this failure means the device is claimed or access was refused.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Busy(_) => true,
            Self::Io(e) => e.kind() == io::ErrorKind::PermissionDenied,
            Self::Serial(e) => matches!(
                e.kind(),
                serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied)
            ),
            _ => false,
        }
    }

    /// Whether this failure is the platform reporting a cancelled operation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::Interrupted)
    }
}
