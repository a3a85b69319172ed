//! Lock file guarding a shared i2c bus segment
//!
//! Other processes on the BMC use the same lock file before switching the
//! i2c mux, so the daemon polls for it rather than using an OS lock.

use std::path::{Path, PathBuf};
use std::time::Duration;
use swfan_core::{FanError, Result};
use tracing::{debug, error, warn};

use crate::retry::{Backoff, RetryPolicy};
use crate::watchdog::Watchdog;

/// Poll interval while another process holds the lock
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Lock file shared with other bus users
#[derive(Debug, Clone)]
pub struct BusLock {
    path: PathBuf,
    policy: RetryPolicy,
}

impl BusLock {
    /// Lock at `path`; a lock still present after `attempts` polls is stale
    pub fn new(path: impl AsRef<Path>, attempts: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            policy: RetryPolicy::new(attempts, LOCK_POLL_INTERVAL),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.policy.delay = interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the lock file to disappear, then create it.
    ///
    /// A lock that outlives the poll attempts is assumed abandoned and is
    /// removed. The watchdog is kicked on every poll and once more before
    /// the lock is taken.
    pub async fn acquire(&self, watchdog: &mut dyn Watchdog) -> Result<BusLockGuard> {
        {
            let mut backoff = Backoff::new(self.policy, &mut *watchdog);
            while tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
                if !backoff.wait().await {
                    error!(
                        "Some process didn't clean up the lock file {}; removing it",
                        self.path.display()
                    );
                    if let Err(e) = tokio::fs::remove_file(&self.path).await {
                        warn!("Failed to remove stale lock {}: {}", self.path.display(), e);
                    }
                    break;
                }
            }
        }

        if let Err(e) = watchdog.kick().await {
            warn!("Watchdog kick before bus access failed: {}", e);
        }

        tokio::fs::File::create(&self.path).await.map_err(|e| {
            FanError::Hardware(format!(
                "Failed to create lock file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        debug!("Acquired bus lock {}", self.path.display());

        Ok(BusLockGuard {
            path: self.path.clone(),
            released: false,
        })
    }
}

/// Held bus lock; removing the file releases it
#[derive(Debug)]
pub struct BusLockGuard {
    path: PathBuf,
    released: bool,
}

impl BusLockGuard {
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        tokio::fs::remove_file(&self.path).await?;
        debug!("Released bus lock {}", self.path.display());
        Ok(())
    }
}

impl Drop for BusLockGuard {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
