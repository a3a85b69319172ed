//! Bounded retry with watchdog kicks
//!
//! Any read path that may wait on flaky or contended hardware uses
//! [`Backoff`], which kicks the watchdog on every wait so that a long retry
//! sequence can never starve it.

use std::time::Duration;
use swfan_core::{Channel, Result};
use tracing::{debug, warn};

use crate::device::DeviceAccess;
use crate::watchdog::Watchdog;

/// Attempts and delay between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(4, Duration::from_millis(10))
    }
}

/// Retry state for one operation
pub struct Backoff<'w> {
    policy: RetryPolicy,
    attempt: u32,
    watchdog: &'w mut dyn Watchdog,
}

impl<'w> Backoff<'w> {
    pub fn new(policy: RetryPolicy, watchdog: &'w mut dyn Watchdog) -> Self {
        Self {
            policy,
            attempt: 1,
            watchdog,
        }
    }

    /// Current 1-based attempt number
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Wait before the next attempt.
    ///
    /// Returns `false` without waiting once all attempts are used.
    pub async fn wait(&mut self) -> bool {
        if self.attempt >= self.policy.attempts {
            return false;
        }
        tokio::time::sleep(self.policy.delay).await;
        if let Err(e) = self.watchdog.kick().await {
            warn!("Watchdog kick during retry failed: {}", e);
        }
        self.attempt += 1;
        true
    }
}

/// Read a channel, retrying failed reads
pub async fn read_with_retry(
    device: &mut dyn DeviceAccess,
    watchdog: &mut dyn Watchdog,
    channel: &Channel,
    policy: RetryPolicy,
) -> Result<i64> {
    let mut backoff = Backoff::new(policy, watchdog);
    loop {
        match device.read_channel(channel).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(
                    "Read of {} failed (attempt {}): {}",
                    channel.key(),
                    backoff.attempt(),
                    e
                );
                if !backoff.wait().await {
                    return Err(e);
                }
            }
        }
    }
}
