//! Serial port driver using tokio-serial.
//!
//! Implements [`RawPort`] over `tokio_serial::SerialStream`. The port is
//! configured at construction and opened lazily; line settings the driver
//! cannot express are rejected before any device is touched.

use super::error::PortError;
use super::traits::{data_bits, FaultSignal, RawPort};
use crate::config::SerialPortOptions;
use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_serial::{SerialPort, SerialPortBuilder, SerialStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How often an open port is checked against the system port list.
const PRESENCE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Native async serial port.
pub struct SerialRawPort {
    inner: Option<SerialStream>,
    builder: SerialPortBuilder,
    name: String,
    write_timeout: Duration,
    read_timeout: Duration,
    fault: FaultSignal,
    monitor: Option<JoinHandle<()>>,
}

impl SerialRawPort {
    /// Prepare a serial port. Nothing is opened until [`RawPort::open`].
    ///
    /// # Example
    /// ```no_run
    /// use serial_transport::config::SerialPortOptions;
    /// use serial_transport::port::SerialRawPort;
    ///
    /// let port = SerialRawPort::new("/dev/ttyUSB0", &SerialPortOptions::default())?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(port_name: &str, options: &SerialPortOptions) -> Result<Self, PortError> {
        options
            .validate()
            .map_err(|e| PortError::config(e.to_string()))?;

        let builder = tokio_serial::new(port_name, options.baud_rate)
            .data_bits(data_bits(options.data_bits)?)
            .parity(options.parity.try_into()?)
            .stop_bits(options.stop_bits.try_into()?)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(options.write_timeout());

        Ok(Self {
            inner: None,
            builder,
            name: port_name.to_string(),
            write_timeout: options.write_timeout(),
            read_timeout: options.read_timeout(),
            fault: FaultSignal::new(),
            monitor: None,
        })
    }

    fn stream(&mut self) -> Result<&mut SerialStream, PortError> {
        self.inner.as_mut().ok_or(PortError::NotOpen)
    }

    fn map_open_error(&self, e: tokio_serial::Error) -> PortError {
        match e.kind {
            tokio_serial::ErrorKind::NoDevice => PortError::not_found(&self.name),
            tokio_serial::ErrorKind::InvalidInput => PortError::config(e.to_string()),
            tokio_serial::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
                PortError::busy(&self.name)
            }
            _ => PortError::Serial(e),
        }
    }

    /// Map an in-call I/O error. Device loss is returned to the caller, not
    /// signalled.
    fn map_io_error(&self, e: io::Error) -> PortError {
        if matches!(
            e.kind(),
            io::ErrorKind::BrokenPipe | io::ErrorKind::NotFound | io::ErrorKind::NotConnected
        ) {
            warn!(port = %self.name, error = %e, "serial device lost");
            return PortError::DeviceLost(self.name.clone());
        }
        PortError::Io(e)
    }

    /// Watch the system port list and raise the fault signal once this port
    /// disappears from it.
    ///
    /// Ports that are not enumerated at open time (pseudo terminals, for
    /// instance) are not watched.
    async fn start_presence_monitor(&mut self) {
        let name = self.name.clone();
        let listed = tokio::task::spawn_blocking(move || is_listed(&name))
            .await
            .unwrap_or(false);
        if !listed {
            debug!(port = %self.name, "port not enumerated, presence not monitored");
            return;
        }

        let name = self.name.clone();
        let fault = self.fault.clone();
        self.monitor = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(PRESENCE_POLL_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let probe = name.clone();
                let present = tokio::task::spawn_blocking(move || is_listed(&probe))
                    .await
                    .unwrap_or(true);
                if !present {
                    warn!(port = %name, "serial device removed");
                    fault.raise();
                    return;
                }
            }
        }));
    }

    fn stop_presence_monitor(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
    }
}

fn is_listed(name: &str) -> bool {
    serialport::available_ports()
        .map(|ports| ports.iter().any(|p| p.port_name == name))
        .unwrap_or(false)
}

#[async_trait]
impl RawPort for SerialRawPort {
    async fn open(&mut self, cancel: &CancellationToken) -> Result<(), PortError> {
        if self.inner.is_some() {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(PortError::Io(io::Error::from(io::ErrorKind::Interrupted)));
        }

        let mut stream = SerialStream::open(&self.builder).map_err(|e| self.map_open_error(e))?;
        #[cfg(unix)]
        stream
            .set_exclusive(true)
            .map_err(|e| self.map_open_error(e))?;
        stream
            .clear(tokio_serial::ClearBuffer::All)
            .map_err(PortError::Serial)?;

        debug!(port = %self.name, "serial port opened");
        self.inner = Some(stream);
        self.start_presence_monitor().await;
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let timeout = self.write_timeout;
        let result = tokio::time::timeout(timeout, self.stream()?.write(data)).await;
        match result {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(self.map_io_error(e)),
            Err(_) => Err(PortError::timeout(timeout)),
        }
    }

    async fn read_some(
        &mut self,
        buffer: &mut [u8],
        budget: Duration,
    ) -> Result<usize, PortError> {
        let result = tokio::time::timeout(budget, self.stream()?.read(buffer)).await;
        match result {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Ok(Err(e)) => Err(self.map_io_error(e)),
            Err(_) => Ok(0),
        }
    }

    fn discard_buffers(&mut self) -> Result<(), PortError> {
        match self.inner.as_mut() {
            Some(stream) => stream
                .clear(tokio_serial::ClearBuffer::All)
                .map_err(PortError::Serial),
            None => Ok(()),
        }
    }

    fn close(&mut self) {
        self.stop_presence_monitor();
        if self.inner.take().is_some() {
            debug!(port = %self.name, "serial port closed");
        }
    }

    fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    fn fault_signal(&self) -> FaultSignal {
        self.fault.clone()
    }
}

impl Drop for SerialRawPort {
    fn drop(&mut self) {
        self.stop_presence_monitor();
    }
}

impl std::fmt::Debug for SerialRawPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialRawPort")
            .field("name", &self.name)
            .field("open", &self.inner.is_some())
            .field("read_timeout", &self.read_timeout)
            .field("monitored", &self.monitor.is_some())
            .finish()
    }
}
