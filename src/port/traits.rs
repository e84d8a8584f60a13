//! Core traits for the raw port capability.
//!
//! Defines the `RawPort` trait that platform drivers and mock implementations
//! provide, plus the line-setting enums shared by configuration and drivers.

use super::error::PortError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl TryFrom<Parity> for serialport::Parity {
    type Error = PortError;

    fn try_from(parity: Parity) -> Result<Self, Self::Error> {
        match parity {
            Parity::None => Ok(serialport::Parity::None),
            Parity::Odd => Ok(serialport::Parity::Odd),
            Parity::Even => Ok(serialport::Parity::Even),
            Parity::Mark | Parity::Space => Err(PortError::config(format!(
                "{parity:?} parity is not supported by the serial driver"
            ))),
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    #[default]
    One,
    OnePointFive,
    Two,
}

impl TryFrom<StopBits> for serialport::StopBits {
    type Error = PortError;

    fn try_from(bits: StopBits) -> Result<Self, Self::Error> {
        match bits {
            StopBits::One => Ok(serialport::StopBits::One),
            StopBits::Two => Ok(serialport::StopBits::Two),
            StopBits::OnePointFive => Err(PortError::config(
                "1.5 stop bits are not supported by the serial driver",
            )),
        }
    }
}

/// Convert a data bit count into the driver's representation.
pub fn data_bits(bits: u8) -> Result<serialport::DataBits, PortError> {
    match bits {
        5 => Ok(serialport::DataBits::Five),
        6 => Ok(serialport::DataBits::Six),
        7 => Ok(serialport::DataBits::Seven),
        8 => Ok(serialport::DataBits::Eight),
        other => Err(PortError::config(format!("{other} data bits not supported"))),
    }
}

/// Asynchronous loss-of-device signal shared between a driver and its owner.
///
/// A driver raises it when the device vanishes or the channel faults outside
/// of an active call. Errors seen during a call are returned from that call
/// instead. The flag stays set until taken; [`FaultSignal::raised`] wakes a
/// waiter on every raise.
#[derive(Debug, Clone, Default)]
pub struct FaultSignal {
    inner: Arc<FaultInner>,
}

#[derive(Debug, Default)]
struct FaultInner {
    raised: AtomicBool,
    notify: Notify,
}

impl FaultSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag the port as faulted and wake the waiter.
    pub fn raise(&self) {
        self.inner.raised.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    /// Consume a pending fault, returning whether one was raised.
    pub fn take(&self) -> bool {
        self.inner.raised.swap(false, Ordering::SeqCst)
    }

    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    /// Wait for the next raise. A raise with no waiter is kept for the next
    /// call, so the flag may already have been taken when this returns.
    pub async fn raised(&self) {
        self.inner.notify.notified().await;
    }
}

/// Minimal capability a platform serial driver must provide.
///
/// Writes and reads are partial: a single call may move fewer bytes than
/// requested. `close` and `discard_buffers` are synchronous so they can run
/// from `Drop`.
#[async_trait]
pub trait RawPort: Send + std::fmt::Debug {
    /// Open the channel. Succeeds immediately if already open.
    async fn open(&mut self, cancel: &CancellationToken) -> Result<(), PortError>;

    /// Write some of `data`, returning the number of bytes accepted.
    async fn write(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read up to `buffer.len()` bytes, waiting at most `budget`.
    ///
    /// Returns 0 when no data arrived within the budget.
    async fn read_some(&mut self, buffer: &mut [u8], budget: Duration)
        -> Result<usize, PortError>;

    /// Discard both input and output buffers. No-op when not open.
    fn discard_buffers(&mut self) -> Result<(), PortError>;

    /// Close the channel. Idempotent.
    fn close(&mut self);

    /// Whether the channel is currently open.
    fn is_open(&self) -> bool;

    /// Stable, human-readable identifier used in error reporting.
    fn name(&self) -> &str;

    /// Timeout applied to a single platform write call.
    fn write_timeout(&self) -> Duration;

    /// Overall budget for reading one response.
    fn read_timeout(&self) -> Duration;

    /// Signal raised when the device faults outside of an active call.
    fn fault_signal(&self) -> FaultSignal;
}
