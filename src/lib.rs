//! Serial Transport Library
//!
//! Byte-oriented request/response transport over a half-duplex serial line:
//! write a message, then wait for exactly the expected number of response
//! bytes or a timeout/cancellation, with failures surfaced as a typed
//! taxonomy.
//!
//! # Modules
//!
//! - `port`: Raw port capability, mock port, and the `tokio-serial` driver
//! - `transport`: Exact-length engine, error mapper, state machine, connection
//! - `error`: Transport fault taxonomy
//! - `config`: Port options and TOML configuration
//! - `factory`: Serial transport construction (when `serial` feature is enabled)

pub mod config;
pub mod error;
pub mod port;
pub mod transport;

#[cfg(feature = "serial")]
pub mod factory;

// Re-export commonly used types for convenience
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult, SerialPortOptions};
pub use error::{FaultCause, Phase, TransportError, TransportResult};
pub use port::{FaultSignal, MockRawPort, Parity, PortError, RawPort, StopBits};
pub use transport::{
    ConnectionState, StateChange, TransportConnection, MAX_TRANSFER_LEN,
};

#[cfg(feature = "serial")]
pub use factory::create_serial_transport;

#[cfg(feature = "serial")]
pub use port::SerialRawPort;
