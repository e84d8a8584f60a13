//! Classification of primitive failures into [`TransportError`].
//!
//! Rules are applied in order and the first match wins:
//! cancellation, then timeouts, then busy (open phase only), then transfer
//! length violations, then the generic fault for the phase.

use super::engine::IoFault;
use crate::error::{FaultCause, Phase, TransportError};
use crate::port::PortError;
use std::time::Duration;

/// What was executing when a fault was observed.
#[derive(Debug, Clone, Copy)]
pub struct FaultContext<'a> {
    pub phase: Phase,
    pub port: &'a str,
    /// Configured timeout for the phase.
    pub timeout: Duration,
    /// Whether the caller's token had fired by the time the fault surfaced.
    pub cancelled: bool,
}

impl<'a> FaultContext<'a> {
    pub fn new(phase: Phase, port: &'a str, timeout: Duration, cancelled: bool) -> Self {
        Self {
            phase,
            port,
            timeout,
            cancelled,
        }
    }

    /// Classify a failure raised by the raw port outside the engine (open).
    pub fn map_port(&self, error: PortError) -> TransportError {
        self.map(IoFault::Port(error))
    }

    /// Classify an engine failure.
    pub fn map(&self, fault: IoFault) -> TransportError {
        let error = match fault {
            IoFault::Port(error) => error,
            IoFault::Cancelled => return self.cancelled_fault(None),
            _ if self.cancelled => return self.cancelled_fault(None),
            IoFault::DeadlineElapsed { .. } => return self.timeout_fault(None),
            IoFault::EndOfStream { expected, received } => {
                return TransportError::IncompleteTransfer {
                    port: self.port.to_string(),
                    expected,
                    received,
                }
            }
            IoFault::Overrun { expected, received } => {
                return TransportError::TransferOverrun {
                    port: self.port.to_string(),
                    expected,
                    received,
                }
            }
        };

        let port = self.port.to_string();
        if self.cancelled || error.is_cancelled() {
            return self.cancelled_fault(Some(error.into()));
        }
        if error.is_timeout() {
            return self.timeout_fault(Some(error.into()));
        }
        if self.phase == Phase::Open && error.is_busy() {
            return TransportError::PortBusy {
                port,
                cause: Some(error.into()),
            };
        }

        let cause = Some(FaultCause::from(error));
        match self.phase {
            Phase::Open => TransportError::Connect { port, cause },
            Phase::Write => TransportError::WriteTransportFault { port, cause },
            Phase::Read => TransportError::ReadTransportFault { port, cause },
        }
    }

    fn cancelled_fault(&self, cause: Option<FaultCause>) -> TransportError {
        TransportError::OperationCancelled {
            phase: self.phase,
            port: self.port.to_string(),
            cause,
        }
    }

    fn timeout_fault(&self, cause: Option<FaultCause>) -> TransportError {
        let port = self.port.to_string();
        match self.phase {
            Phase::Write => TransportError::WriteTimeout {
                port,
                timeout: self.timeout,
                cause,
            },
            Phase::Read => TransportError::ReadTimeout {
                port,
                timeout: self.timeout,
                cause,
            },
            // A timed out open is a connection failure with the timeout as cause.
            Phase::Open => TransportError::Connect { port, cause },
        }
    }
}
