//! Raw port capability.
//!
//! The narrow interface platform drivers implement, a scriptable mock for
//! tests, and the `tokio-serial` driver.

pub mod error;
pub mod mock;
pub mod traits;

#[cfg(feature = "serial")]
pub mod serial;

pub use error::PortError;
pub use mock::{MockCalls, MockRawPort, OpenStep, ReadStep, WriteStep};
pub use traits::*;

#[cfg(feature = "serial")]
pub use serial::SerialRawPort;
