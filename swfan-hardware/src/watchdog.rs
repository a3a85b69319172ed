//! Hardware watchdog
//!
//! The control loop kicks the watchdog once per iteration; if it ever stops,
//! the board reboots. [`LinuxWatchdog`] drives `/dev/watchdog`,
//! [`NullWatchdog`] is used in mock mode and when the watchdog is disabled.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use swfan_core::{FanError, Result};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Character that disarms the kernel watchdog on close
const MAGIC_CLOSE: &[u8] = b"V";

/// Kick period of the automatic (non-manual) mode
const AUTO_KICK_INTERVAL: Duration = Duration::from_secs(5);

/// Watchdog control interface
#[async_trait]
pub trait Watchdog: Send {
    /// Arm the watchdog. In manual mode the caller must kick it; otherwise a
    /// background task does.
    async fn start(&mut self, manual: bool) -> Result<()>;

    /// Reset the watchdog timer
    async fn kick(&mut self) -> Result<()>;

    /// Disarm the watchdog
    async fn stop(&mut self) -> Result<()>;

    /// Keep the watchdog armed if the daemon exits without calling `stop`
    fn set_persistent(&mut self, persistent: bool);
}

/// `/dev/watchdog` backed watchdog
pub struct LinuxWatchdog {
    path: PathBuf,
    file: Option<File>,
    persistent: bool,
    auto_kick: Option<JoinHandle<()>>,
}

impl LinuxWatchdog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
            persistent: false,
            auto_kick: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.file.is_some()
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| FanError::Watchdog("Watchdog not started".to_string()))
    }

    fn stop_auto_kick(&mut self) {
        if let Some(task) = self.auto_kick.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl Watchdog for LinuxWatchdog {
    async fn start(&mut self, manual: bool) -> Result<()> {
        debug!("Opening watchdog device: {}", self.path.display());
        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                FanError::Watchdog(format!(
                    "Failed to open watchdog {}: {}",
                    self.path.display(),
                    e
                ))
            })?;

        if !manual {
            let mut kicker = file
                .try_clone()
                .await
                .map_err(|e| FanError::Watchdog(format!("Failed to clone watchdog handle: {}", e)))?;
            self.auto_kick = Some(tokio::spawn(async move {
                let mut interval = tokio::time::interval(AUTO_KICK_INTERVAL);
                loop {
                    interval.tick().await;
                    if let Err(e) = kicker.write_all(b"\0").await {
                        warn!("Automatic watchdog kick failed: {}", e);
                    }
                }
            }));
        }

        self.file = Some(file);
        info!(
            "Watchdog started ({} mode)",
            if manual { "manual" } else { "automatic" }
        );
        Ok(())
    }

    async fn kick(&mut self) -> Result<()> {
        let file = self.file_mut()?;
        file.write_all(b"\0")
            .await
            .map_err(|e| FanError::Watchdog(format!("Kick failed: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| FanError::Watchdog(format!("Kick failed: {}", e)))
    }

    async fn stop(&mut self) -> Result<()> {
        self.stop_auto_kick();
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        file.write_all(MAGIC_CLOSE)
            .await
            .map_err(|e| FanError::Watchdog(format!("Failed to disarm watchdog: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| FanError::Watchdog(format!("Failed to disarm watchdog: {}", e)))?;
        info!("Watchdog stopped");
        Ok(())
    }

    fn set_persistent(&mut self, persistent: bool) {
        debug!("Watchdog persistent: {}", persistent);
        self.persistent = persistent;
    }
}

impl Drop for LinuxWatchdog {
    fn drop(&mut self) {
        self.stop_auto_kick();
        if self.persistent {
            return;
        }
        if let Some(file) = self.file.take() {
            if let Ok(mut file) = file.try_into_std() {
                use std::io::Write;
                let _ = file.write_all(MAGIC_CLOSE);
            }
        }
    }
}

/// Counters shared with a [`NullWatchdog`]
#[derive(Debug, Default)]
pub struct WatchdogActivity {
    kicks: AtomicU64,
    running: AtomicBool,
}

impl WatchdogActivity {
    pub fn kicks(&self) -> u64 {
        self.kicks.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

/// Watchdog that only counts calls
#[derive(Debug, Default)]
pub struct NullWatchdog {
    activity: Arc<WatchdogActivity>,
}

impl NullWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for observing kicks after the watchdog has been moved
    pub fn activity(&self) -> Arc<WatchdogActivity> {
        self.activity.clone()
    }
}

#[async_trait]
impl Watchdog for NullWatchdog {
    async fn start(&mut self, _manual: bool) -> Result<()> {
        self.activity.running.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn kick(&mut self) -> Result<()> {
        self.activity.kicks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.activity.running.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn set_persistent(&mut self, _persistent: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_linux_watchdog_writes_kicks_and_magic_close() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("watchdog");
        tokio::fs::write(&path, b"").await.unwrap();

        let mut wd = LinuxWatchdog::new(&path);
        wd.set_persistent(true);
        wd.start(true).await.unwrap();
        assert!(wd.is_running());
        wd.kick().await.unwrap();
        wd.kick().await.unwrap();
        wd.stop().await.unwrap();
        assert!(!wd.is_running());

        let contents = tokio::fs::read(&path).await.unwrap();
        assert_eq!(contents, b"\0\0V");
    }

    #[tokio::test]
    async fn test_kick_before_start_fails() {
        let mut wd = LinuxWatchdog::new("/nonexistent/watchdog");
        assert!(matches!(wd.kick().await, Err(FanError::Watchdog(_))));
        // Stopping a watchdog that never started is a no-op
        assert!(wd.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_device() {
        let mut wd = LinuxWatchdog::new("/nonexistent/watchdog");
        assert!(matches!(wd.start(true).await, Err(FanError::Watchdog(_))));
    }

    #[tokio::test]
    async fn test_null_watchdog_counts_kicks() {
        let mut wd = NullWatchdog::new();
        let activity = wd.activity();
        wd.start(true).await.unwrap();
        assert!(activity.is_running());
        for _ in 0..3 {
            wd.kick().await.unwrap();
        }
        wd.stop().await.unwrap();
        assert_eq!(activity.kicks(), 3);
        assert!(!activity.is_running());
    }
}
