//! Helpers for building a transport over the platform serial driver.

use crate::config::SerialPortOptions;
use crate::error::{TransportError, TransportResult};
use crate::port::SerialRawPort;
use crate::transport::TransportConnection;
use tracing::debug;

/// Build a transport for `port_name` (e.g. `/dev/ttyUSB0` or `COM3`).
///
/// Options are validated here; the port itself is opened lazily by the
/// first operation.
pub fn create_serial_transport(
    port_name: &str,
    options: &SerialPortOptions,
) -> TransportResult<TransportConnection<SerialRawPort>> {
    if port_name.trim().is_empty() {
        return Err(TransportError::invalid_request("invalid serial port name"));
    }

    let port = SerialRawPort::new(port_name, options)
        .map_err(|e| TransportError::invalid_request(e.to_string()))?;
    debug!(port = %port_name, baud_rate = options.baud_rate, "created serial transport");

    Ok(TransportConnection::new(port))
}
