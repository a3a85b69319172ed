//! Device access abstraction
//!
//! Everything the daemon reads or writes goes through [`DeviceAccess`],
//! addressed by logical [`Channel`]. Implementations decide how a channel
//! maps to hardware: sysfs attributes and i2c tools on a real chassis, or an
//! in-memory model in mock mode.

use async_trait::async_trait;
use swfan_core::{Channel, FanError, Result};
use tracing::{debug, warn};

/// Trait for device access
///
/// This trait enables running the control loop without real hardware
/// by allowing simulated implementations.
#[async_trait]
pub trait DeviceAccess: Send {
    /// Read an integer value from a channel
    async fn read_channel(&mut self, channel: &Channel) -> Result<i64>;

    /// Write a value to a channel
    async fn write_channel(&mut self, channel: &Channel, value: &str) -> Result<()>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Apply a batch of writes in order.
///
/// Every write is attempted; the first error is returned after the batch
/// completes so that one broken register does not leave the rest unwritten.
pub async fn write_all(
    device: &mut dyn DeviceAccess,
    writes: &[(Channel, String)],
) -> Result<()> {
    let mut first_error: Option<FanError> = None;
    for (channel, value) in writes {
        debug!("Writing {} to {}", value, channel.key());
        if let Err(e) = device.write_channel(channel, value).await {
            warn!("Failed to write {} to {}: {}", value, channel, e);
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
