//! Mock raw port implementation for testing.
//!
//! Provides a `MockRawPort` that simulates a half-duplex device without
//! requiring actual hardware. Reads, writes and opens are scripted step by
//! step, and every call is counted so tests can assert on port traffic.

use super::error::PortError;
use super::traits::{FaultSignal, RawPort};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Scripted outcome of one `read_some` call.
#[derive(Debug, Clone)]
pub enum ReadStep {
    /// Deliver bytes. Anything that does not fit stays queued for the next call.
    Data(Vec<u8>),
    /// Deliver bytes after a delay.
    Delayed(Duration, Vec<u8>),
    /// Report more bytes than the buffer could hold (a misbehaving driver).
    Oversized(Vec<u8>),
    /// Wait out the whole budget and return 0.
    Silence,
    /// Return 0 immediately.
    Eof,
    /// Fail with an I/O error of this kind.
    Fail(io::ErrorKind),
    /// Fail because the device went away mid-call.
    Lost,
}

/// Scripted outcome of one `write` call.
#[derive(Debug, Clone)]
pub enum WriteStep {
    /// Accept at most this many bytes.
    Accept(usize),
    /// Accept at most this many bytes after a delay.
    Delayed(Duration, usize),
    /// Fail with an I/O error of this kind.
    Fail(io::ErrorKind),
}

/// Scripted outcome of one `open` call.
#[derive(Debug, Clone)]
pub enum OpenStep {
    Busy,
    NotFound,
    Fail(io::ErrorKind),
    /// Never complete; only cancellation ends the call.
    Hang,
}

/// Call counters for a mock port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCalls {
    pub open: usize,
    pub write: usize,
    pub read_some: usize,
    pub discard: usize,
    pub close: usize,
}

#[derive(Debug)]
struct MockPortState {
    open: bool,
    read_script: VecDeque<ReadStep>,
    write_script: VecDeque<WriteStep>,
    open_script: VecDeque<OpenStep>,
    write_log: Vec<Vec<u8>>,
    calls: MockCalls,
    write_timeout: Duration,
    read_timeout: Duration,
}

/// Mock raw port implementation for testing.
///
/// # Example
/// ```
/// use serial_transport::port::{MockRawPort, RawPort};
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # tokio_test_block_on(async {
/// let mut port = MockRawPort::new("MOCK0");
/// port.enqueue_read(b"Hello");
///
/// port.open(&CancellationToken::new()).await.unwrap();
/// let mut buffer = [0u8; 5];
/// let n = port.read_some(&mut buffer, Duration::from_millis(10)).await.unwrap();
/// assert_eq!(&buffer[..n], b"Hello");
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct MockRawPort {
    name: String,
    state: Arc<Mutex<MockPortState>>,
    fault: FaultSignal,
}

impl MockRawPort {
    /// Create a new mock port with the given name and 500ms timeouts.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState {
                open: false,
                read_script: VecDeque::new(),
                write_script: VecDeque::new(),
                open_script: VecDeque::new(),
                write_log: Vec::new(),
                calls: MockCalls::default(),
                write_timeout: Duration::from_millis(500),
                read_timeout: Duration::from_millis(500),
            })),
            fault: FaultSignal::new(),
        }
    }

    pub fn with_timeouts(self, write_timeout: Duration, read_timeout: Duration) -> Self {
        {
            let mut state = self.state.lock();
            state.write_timeout = write_timeout;
            state.read_timeout = read_timeout;
        }
        self
    }

    /// Queue bytes to be delivered by the next read.
    pub fn enqueue_read(&mut self, data: &[u8]) {
        self.push_read(ReadStep::Data(data.to_vec()));
    }

    pub fn push_read(&mut self, step: ReadStep) {
        self.state.lock().read_script.push_back(step);
    }

    pub fn push_write(&mut self, step: WriteStep) {
        self.state.lock().write_script.push_back(step);
    }

    pub fn push_open(&mut self, step: OpenStep) {
        self.state.lock().open_script.push_back(step);
    }

    /// Every buffer passed to `write`, truncated to what was accepted.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// All accepted bytes, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().write_log.concat()
    }

    pub fn calls(&self) -> MockCalls {
        self.state.lock().calls
    }

    /// Simulate the device vanishing outside of an active call.
    pub fn raise_fault(&self) {
        self.fault.raise();
    }

    fn io_error(kind: io::ErrorKind) -> PortError {
        PortError::Io(io::Error::new(kind, "mock port failure"))
    }
}

#[async_trait]
impl RawPort for MockRawPort {
    async fn open(&mut self, _cancel: &CancellationToken) -> Result<(), PortError> {
        let step = {
            let mut state = self.state.lock();
            state.calls.open += 1;
            if state.open {
                return Ok(());
            }
            state.open_script.pop_front()
        };

        match step {
            None => {
                self.state.lock().open = true;
                Ok(())
            }
            Some(OpenStep::Busy) => Err(PortError::busy(&self.name)),
            Some(OpenStep::NotFound) => Err(PortError::not_found(&self.name)),
            Some(OpenStep::Fail(kind)) => Err(Self::io_error(kind)),
            Some(OpenStep::Hang) => std::future::pending().await,
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let step = {
            let mut state = self.state.lock();
            state.calls.write += 1;
            if !state.open {
                return Err(PortError::NotOpen);
            }
            state.write_script.pop_front()
        };

        let accepted = match step {
            None => data.len(),
            Some(WriteStep::Accept(limit)) => limit.min(data.len()),
            Some(WriteStep::Delayed(delay, limit)) => {
                tokio::time::sleep(delay).await;
                limit.min(data.len())
            }
            Some(WriteStep::Fail(kind)) => return Err(Self::io_error(kind)),
        };
        self.state.lock().write_log.push(data[..accepted].to_vec());
        Ok(accepted)
    }

    async fn read_some(
        &mut self,
        buffer: &mut [u8],
        budget: Duration,
    ) -> Result<usize, PortError> {
        let step = {
            let mut state = self.state.lock();
            state.calls.read_some += 1;
            if !state.open {
                return Err(PortError::NotOpen);
            }
            state.read_script.pop_front()
        };

        let data = match step {
            None | Some(ReadStep::Eof) => return Ok(0),
            Some(ReadStep::Silence) => {
                tokio::time::sleep(budget).await;
                return Ok(0);
            }
            Some(ReadStep::Fail(kind)) => return Err(Self::io_error(kind)),
            Some(ReadStep::Lost) => return Err(PortError::DeviceLost(self.name.clone())),
            Some(ReadStep::Oversized(data)) => {
                let n = data.len().min(buffer.len());
                buffer[..n].copy_from_slice(&data[..n]);
                return Ok(data.len());
            }
            Some(ReadStep::Delayed(delay, data)) => {
                tokio::time::sleep(delay).await;
                data
            }
            Some(ReadStep::Data(data)) => data,
        };

        let n = data.len().min(buffer.len());
        buffer[..n].copy_from_slice(&data[..n]);
        if n < data.len() {
            self.state
                .lock()
                .read_script
                .push_front(ReadStep::Data(data[n..].to_vec()));
        }
        Ok(n)
    }

    fn discard_buffers(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.calls.discard += 1;
        if state.open {
            state
                .read_script
                .retain(|step| !matches!(step, ReadStep::Data(_) | ReadStep::Delayed(..)));
        }
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.calls.close += 1;
        state.open = false;
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn write_timeout(&self) -> Duration {
        self.state.lock().write_timeout
    }

    fn read_timeout(&self) -> Duration {
        self.state.lock().read_timeout
    }

    fn fault_signal(&self) -> FaultSignal {
        self.fault.clone()
    }
}

impl std::fmt::Debug for MockRawPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockRawPort")
            .field("name", &self.name)
            .field("open", &state.open)
            .field("queued_reads", &state.read_script.len())
            .finish()
    }
}
