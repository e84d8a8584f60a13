//! Transport connection.
//!
//! Sequences the state machine around the exact-length engine: every
//! operation opens the port if needed, marks the connection `Connected`,
//! transfers, and on any fault records the classified error and marks it
//! `Disconnected` before returning that same error to the caller.
//!
//! Device loss raised by the driver between calls is picked up by a watcher
//! task, which moves the connection to `Disconnected` right away. The stale
//! handle is closed by [`TransportConnection::poll_port_fault`], which every
//! operation runs first.

use super::engine::{self, IoFault};
use super::mapper::FaultContext;
use super::state::{ConnectionState, ConnectionStateMachine, StateChange};
use crate::error::{Phase, TransportError, TransportResult};
use crate::port::{FaultSignal, PortError, RawPort};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Largest response length a single read may request.
pub const MAX_TRANSFER_LEN: usize = i32::MAX as usize;

/// Request/response transport over an exclusively owned raw port.
///
/// Operations take `&mut self`; one transfer is in flight at a time.
///
/// # Example
/// ```no_run
/// use serial_transport::{create_serial_transport, SerialPortOptions};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut transport = create_serial_transport("/dev/ttyACM0", &SerialPortOptions::default())?;
/// let status = transport
///     .write_and_read(&[0x02, 0x01, 0x00, 0x5A, 0x04], 29, &CancellationToken::new())
///     .await?;
/// assert_eq!(status.len(), 29);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TransportConnection<P: RawPort> {
    port: P,
    machine: Arc<Mutex<ConnectionStateMachine>>,
    fault: FaultSignal,
    watcher: Option<JoinHandle<()>>,
    disposed: bool,
}

impl<P: RawPort> TransportConnection<P> {
    pub fn new(port: P) -> Self {
        let fault = port.fault_signal();
        Self {
            port,
            machine: Arc::new(Mutex::new(ConnectionStateMachine::new())),
            fault,
            watcher: None,
            disposed: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.lock().state()
    }

    pub fn last_error(&self) -> Option<TransportError> {
        self.machine.lock().last_error().cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.machine.lock().subscribe()
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<TransportError> {
        self.machine.lock().subscribe_errors()
    }

    pub fn port_name(&self) -> &str {
        self.port.name()
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    /// Write all of `data`.
    pub async fn write(&mut self, data: &[u8], cancel: &CancellationToken) -> TransportResult<()> {
        self.exchange(Some(data), None, cancel).await.map(|_| ())
    }

    /// Read exactly `expected_length` bytes.
    pub async fn read(
        &mut self,
        expected_length: usize,
        cancel: &CancellationToken,
    ) -> TransportResult<Vec<u8>> {
        self.exchange(None, Some(expected_length), cancel)
            .await
            .map(Option::unwrap_or_default)
    }

    /// Write `data`, then read exactly `expected_length` bytes.
    ///
    /// The write completes before any byte is requested.
    pub async fn write_and_read(
        &mut self,
        data: &[u8],
        expected_length: usize,
        cancel: &CancellationToken,
    ) -> TransportResult<Vec<u8>> {
        self.exchange(Some(data), Some(expected_length), cancel)
            .await
            .map(Option::unwrap_or_default)
    }

    pub async fn write_one(&mut self, byte: u8, cancel: &CancellationToken) -> TransportResult<()> {
        self.write(&[byte], cancel).await
    }

    pub async fn read_one(&mut self, cancel: &CancellationToken) -> TransportResult<u8> {
        let bytes = self.read(1, cancel).await?;
        Ok(bytes[0])
    }

    /// Read exactly `count` bytes into `buffer[offset..offset + count]`.
    pub async fn read_into(
        &mut self,
        buffer: &mut [u8],
        offset: usize,
        count: usize,
        cancel: &CancellationToken,
    ) -> TransportResult<usize> {
        let end = offset
            .checked_add(count)
            .filter(|end| *end <= buffer.len())
            .ok_or_else(|| {
                TransportError::invalid_request(format!(
                    "range {offset}+{count} exceeds buffer of {} bytes",
                    buffer.len()
                ))
            })?;

        let bytes = self.read(count, cancel).await?;
        buffer[offset..end].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    /// Discard pending input and output. Does nothing unless connected.
    pub fn discard_buffers(&mut self) {
        if self.state() != ConnectionState::Connected {
            return;
        }
        if let Err(e) = self.port.discard_buffers() {
            warn!(port = %self.port.name(), error = %e, "failed to discard buffers");
        }
    }

    /// Close the port and mark the connection disconnected.
    ///
    /// With a cause the error is recorded as the last error, even when the
    /// connection is already down.
    pub fn disconnect(&mut self, cause: Option<TransportError>) {
        match cause {
            Some(error) => {
                debug!(port = %self.port.name(), error = %error, "disconnecting with error");
                self.close_port();
                self.machine.lock().mark_disconnected_with(error);
            }
            None => {
                debug!(port = %self.port.name(), "disconnecting");
                self.close_port();
                self.machine.lock().mark_disconnected();
            }
        }
    }

    /// React to an asynchronous port fault, if one was signalled.
    ///
    /// Closes the port and, if still connected, moves to `Disconnected`
    /// without recording an error. Returns whether a fault was handled.
    pub fn poll_port_fault(&mut self) -> bool {
        if !self.fault.take() {
            return false;
        }
        self.close_port();
        if self.machine.lock().mark_disconnected_if_connected().is_some() {
            error!(port = %self.port.name(), "received serial port error event");
        }
        true
    }

    async fn exchange(
        &mut self,
        data: Option<&[u8]>,
        expected_length: Option<usize>,
        cancel: &CancellationToken,
    ) -> TransportResult<Option<Vec<u8>>> {
        if data.is_some_and(<[u8]>::is_empty) {
            return Err(TransportError::invalid_request("data contains no bytes"));
        }
        if let Some(len) = expected_length.filter(|len| *len > MAX_TRANSFER_LEN) {
            return Err(TransportError::invalid_request(format!(
                "response length {len} exceeds {MAX_TRANSFER_LEN}"
            )));
        }

        self.poll_port_fault();

        if cancel.is_cancelled() {
            if self.state() == ConnectionState::Disconnected {
                debug!(port = %self.port.name(), "cancelled before open");
                return Err(self.classify(Phase::Open, IoFault::Cancelled, cancel));
            }
            let phase = if data.is_some() { Phase::Write } else { Phase::Read };
            return Err(self.fault(phase, IoFault::Cancelled, cancel));
        }

        if self.port.is_open() && self.lost_device() {
            debug!(port = %self.port.name(), "closing handle of lost device");
            self.close_port();
        }

        self.ensure_open(cancel).await?;

        if let Some(data) = data {
            if let Err(fault) = engine::write_all(&mut self.port, data, cancel).await {
                return Err(self.fault(Phase::Write, fault, cancel));
            }
            debug!(port = %self.port.name(), bytes = data.len(), "write complete");
        }

        match expected_length {
            Some(len) => {
                let budget = self.port.read_timeout();
                match engine::read_exact(&mut self.port, len, budget, cancel).await {
                    Ok(bytes) => {
                        debug!(port = %self.port.name(), bytes = bytes.len(), "read complete");
                        Ok(Some(bytes))
                    }
                    Err(fault) => Err(self.fault(Phase::Read, fault, cancel)),
                }
            }
            None => Ok(None),
        }
    }

    async fn ensure_open(&mut self, cancel: &CancellationToken) -> TransportResult<()> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(IoFault::Cancelled),
            opened = self.port.open(cancel) => opened.map_err(IoFault::Port),
        };

        match result {
            Ok(()) => {
                if self.machine.lock().mark_connected().is_some() {
                    info!(port = %self.port.name(), "transport connected");
                }
                self.watch_port_faults();
                Ok(())
            }
            Err(fault) => Err(self.fault(Phase::Open, fault, cancel)),
        }
    }

    /// Spawn the task that reacts to device loss between operations.
    fn watch_port_faults(&mut self) {
        if self.watcher.is_some() {
            return;
        }
        let fault = self.fault.clone();
        let machine = Arc::clone(&self.machine);
        let port = self.port.name().to_string();
        self.watcher = Some(tokio::spawn(async move {
            loop {
                fault.raised().await;
                if !fault.is_raised() {
                    continue;
                }
                let change = machine.lock().mark_disconnected_if_connected();
                if change.is_some() {
                    error!(port = %port, "received serial port error event");
                }
            }
        }));
    }

    /// Whether the last disconnect was caused by the device going away.
    fn lost_device(&self) -> bool {
        let machine = self.machine.lock();
        matches!(
            machine.last_error().and_then(TransportError::cause),
            Some(PortError::DeviceLost(_))
        )
    }

    fn classify(&self, phase: Phase, fault: IoFault, cancel: &CancellationToken) -> TransportError {
        let timeout = match phase {
            Phase::Read => self.port.read_timeout(),
            Phase::Open | Phase::Write => self.port.write_timeout(),
        };
        FaultContext::new(phase, self.port.name(), timeout, cancel.is_cancelled()).map(fault)
    }

    /// Classify `fault`, record it as the last error and return it.
    fn fault(&mut self, phase: Phase, fault: IoFault, cancel: &CancellationToken) -> TransportError {
        let err = self.classify(phase, fault, cancel);
        warn!(port = %self.port.name(), phase = %phase, error = %err, "transport fault");
        self.machine.lock().mark_disconnected_with(err.clone());
        err
    }

    fn close_port(&mut self) {
        if self.port.is_open() {
            self.port.close();
        }
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        self.close_port();
        self.machine.lock().mark_disconnected();
    }
}

impl<P: RawPort> Drop for TransportConnection<P> {
    fn drop(&mut self) {
        self.dispose();
    }
}
