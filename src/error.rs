//! Transport fault taxonomy.
//!
//! Every failure a caller of [`TransportConnection`](crate::TransportConnection)
//! can observe is one [`TransportError`] value. Faults are classified once,
//! where they are first observed, and then propagated unchanged. The same
//! value is stored as the connection's last error, so it is `Clone` and its
//! primitive cause is shared behind an `Arc`.

use crate::port::PortError;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Operation phase a fault was observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Open,
    Write,
    Read,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Write => write!(f, "Write"),
            Self::Read => write!(f, "Read"),
        }
    }
}

/// Shared primitive cause of a transport fault.
///
/// Two causes compare equal only when they are the same underlying error.
#[derive(Debug, Clone)]
pub struct FaultCause(Arc<PortError>);

impl FaultCause {
    pub fn new(error: PortError) -> Self {
        Self(Arc::new(error))
    }

    pub fn port_error(&self) -> &PortError {
        &self.0
    }
}

impl fmt::Display for FaultCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for FaultCause {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

impl PartialEq for FaultCause {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<PortError> for FaultCause {
    fn from(error: PortError) -> Self {
        Self::new(error)
    }
}

/// Errors surfaced by transport operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// Open failed because the device is already claimed.
    #[error("Port '{port}' is busy")]
    PortBusy {
        port: String,
        #[source]
        cause: Option<FaultCause>,
    },

    /// Open failed for any other reason.
    #[error("Unable to connect to the device at '{port}'")]
    Connect {
        port: String,
        #[source]
        cause: Option<FaultCause>,
    },

    /// The read budget elapsed before the response was complete.
    #[error("Read operation for port '{port}' timed out after {timeout:?}")]
    ReadTimeout {
        port: String,
        timeout: Duration,
        #[source]
        cause: Option<FaultCause>,
    },

    /// A platform write call did not finish within the write timeout.
    #[error("Write operation for port '{port}' timed out after {timeout:?}")]
    WriteTimeout {
        port: String,
        timeout: Duration,
        #[source]
        cause: Option<FaultCause>,
    },

    #[error("An error has occurred while reading from serial port '{port}'")]
    ReadTransportFault {
        port: String,
        #[source]
        cause: Option<FaultCause>,
    },

    #[error("An error has occurred while writing to serial port '{port}'")]
    WriteTransportFault {
        port: String,
        #[source]
        cause: Option<FaultCause>,
    },

    /// The caller's cancellation token fired.
    #[error("{phase} operation on port '{port}' was cancelled")]
    OperationCancelled {
        phase: Phase,
        port: String,
        #[source]
        cause: Option<FaultCause>,
    },

    /// The source signalled end of stream before the response was complete.
    #[error("Incomplete message received from '{port}'. Expected bytes: {expected}, received bytes: {received}")]
    IncompleteTransfer {
        port: String,
        expected: usize,
        received: usize,
    },

    /// More bytes arrived than the response length allows.
    #[error("Transfer overrun on '{port}'. Expected bytes: {expected}, received bytes: {received}")]
    TransferOverrun {
        port: String,
        expected: usize,
        received: usize,
    },

    /// The request was rejected before touching the port.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Every kind except `InvalidRequest` is a transport fault.
    pub fn is_transport_fault(&self) -> bool {
        !matches!(self, Self::InvalidRequest(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ReadTimeout { .. } | Self::WriteTimeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::OperationCancelled { .. })
    }

    /// Identifier of the port the fault was observed on.
    pub fn port_name(&self) -> Option<&str> {
        match self {
            Self::PortBusy { port, .. }
            | Self::Connect { port, .. }
            | Self::ReadTimeout { port, .. }
            | Self::WriteTimeout { port, .. }
            | Self::ReadTransportFault { port, .. }
            | Self::WriteTransportFault { port, .. }
            | Self::OperationCancelled { port, .. }
            | Self::IncompleteTransfer { port, .. }
            | Self::TransferOverrun { port, .. } => Some(port),
            Self::InvalidRequest(_) => None,
        }
    }

    /// Configured timeout that was in effect, for timeout kinds.
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            Self::ReadTimeout { timeout, .. } | Self::WriteTimeout { timeout, .. } => {
                Some(*timeout)
            }
            _ => None,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::PortBusy { .. } | Self::Connect { .. } => Some(Phase::Open),
            Self::WriteTimeout { .. } | Self::WriteTransportFault { .. } => Some(Phase::Write),
            Self::ReadTimeout { .. }
            | Self::ReadTransportFault { .. }
            | Self::IncompleteTransfer { .. }
            | Self::TransferOverrun { .. } => Some(Phase::Read),
            Self::OperationCancelled { phase, .. } => Some(*phase),
            Self::InvalidRequest(_) => None,
        }
    }

    /// The primitive port failure behind this fault, if any.
    pub fn cause(&self) -> Option<&PortError> {
        match self {
            Self::PortBusy { cause, .. }
            | Self::Connect { cause, .. }
            | Self::ReadTimeout { cause, .. }
            | Self::WriteTimeout { cause, .. }
            | Self::ReadTransportFault { cause, .. }
            | Self::WriteTransportFault { cause, .. }
            | Self::OperationCancelled { cause, .. } => cause.as_ref().map(FaultCause::port_error),
            _ => None,
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
