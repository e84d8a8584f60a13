//! Request/response transport over a raw port.
//!
//! ```text
//! caller ──> TransportConnection ──> engine ──> RawPort
//!                   │                  │
//!                   └── state <── mapper
//! ```

pub mod connection;
pub mod engine;
pub mod mapper;
pub mod state;

pub use connection::{TransportConnection, MAX_TRANSFER_LEN};
pub use engine::IoFault;
pub use mapper::FaultContext;
pub use state::{ConnectionState, ConnectionStateMachine, StateChange};
