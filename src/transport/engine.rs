//! Exact-length I/O over a partial-transfer port.
//!
//! Turns the raw port's "move some bytes" primitives into all-or-nothing
//! transfers. Reads share one overall budget: before each partial read the
//! remaining budget decides whether the call is issued at all. A call that is
//! already in flight is never aborted.

use crate::port::{PortError, RawPort};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Unclassified failure of an engine transfer.
///
/// Classification into [`TransportError`](crate::TransportError) happens in
/// the mapper, which knows the phase and port.
#[derive(Debug)]
pub enum IoFault {
    /// The port call itself failed.
    Port(PortError),
    /// The cancellation token fired before the next call was issued.
    Cancelled,
    /// The read budget ran out with `received` bytes buffered.
    DeadlineElapsed { received: usize },
    /// The port returned 0 bytes while budget remained.
    EndOfStream { expected: usize, received: usize },
    /// The port reported more bytes than the response has room for.
    Overrun { expected: usize, received: usize },
}

impl From<PortError> for IoFault {
    fn from(error: PortError) -> Self {
        Self::Port(error)
    }
}

/// Write every byte of `data`, or fail.
///
/// A call that accepts zero bytes is terminal and reported as
/// [`PortError::ShortWrite`].
pub async fn write_all<P>(
    port: &mut P,
    data: &[u8],
    cancel: &CancellationToken,
) -> Result<(), IoFault>
where
    P: RawPort + ?Sized,
{
    let mut written = 0;
    while written < data.len() {
        if cancel.is_cancelled() {
            return Err(IoFault::Cancelled);
        }

        let n = port.write(&data[written..]).await?;
        if n == 0 {
            return Err(IoFault::Port(PortError::ShortWrite {
                attempted: data.len(),
                written,
            }));
        }
        written += n.min(data.len() - written);
        trace!(port = %port.name(), written, total = data.len(), "partial write");
    }
    Ok(())
}

/// Read exactly `expected` bytes within `budget`.
///
/// Zero-length reads succeed without calling the port.
pub async fn read_exact<P>(
    port: &mut P,
    expected: usize,
    budget: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, IoFault>
where
    P: RawPort + ?Sized,
{
    if expected == 0 {
        return Ok(Vec::new());
    }

    let start = Instant::now();
    let mut buffer = vec![0u8; expected];
    let mut received = 0;

    while received < expected {
        if cancel.is_cancelled() {
            return Err(IoFault::Cancelled);
        }

        let remaining = budget.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return Err(IoFault::DeadlineElapsed { received });
        }

        let n = port.read_some(&mut buffer[received..], remaining).await?;
        if n > expected - received {
            return Err(IoFault::Overrun {
                expected,
                received: received + n,
            });
        }
        if n == 0 {
            if budget.saturating_sub(start.elapsed()).is_zero() {
                return Err(IoFault::DeadlineElapsed { received });
            }
            return Err(IoFault::EndOfStream { expected, received });
        }

        received += n;
        trace!(port = %port.name(), received, expected, "partial read");
    }

    Ok(buffer)
}
