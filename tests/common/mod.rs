//! Shared test utilities for transport tests.

#![allow(dead_code)]

use serial_transport::port::{MockRawPort, ReadStep};
use serial_transport::TransportConnection;
use std::time::Duration;

/// Request that asks a fiscal printer for its status.
pub const STATUS_REQUEST: [u8; 5] = [0x02, 0x01, 0x00, 0x5A, 0x04];

/// Length of the status response.
pub const STATUS_RESPONSE_LEN: usize = 29;

/// Build a transport over a fresh mock port, returning a handle to inspect it.
pub fn mock_transport(port_name: &str) -> (TransportConnection<MockRawPort>, MockRawPort) {
    let port = MockRawPort::new(port_name)
        .with_timeouts(Duration::from_millis(500), Duration::from_millis(500));
    (TransportConnection::new(port.clone()), port)
}

/// Deterministic response bytes of the given length.
pub fn response_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

/// Queue `data` as a sequence of chunks of the given sizes.
pub fn enqueue_chunked(port: &mut MockRawPort, data: &[u8], sizes: &[usize]) {
    let mut offset = 0;
    for size in sizes {
        let end = (offset + size).min(data.len());
        port.push_read(ReadStep::Data(data[offset..end].to_vec()));
        offset = end;
    }
    if offset < data.len() {
        port.push_read(ReadStep::Data(data[offset..].to_vec()));
    }
}
