//! Runtime configuration
//!
//! The static configuration is read once at startup and never reloaded;
//! the daemon only reacts to command-line options and the file contents it
//! found when it started.

use std::path::{Path, PathBuf};
use swfan_core::{FanError, Result, StaticConfig};
use tokio::fs;
use tracing::{debug, info};

/// Configuration the daemon was started with
#[derive(Debug, Clone)]
pub(crate) struct RuntimeConfig {
    static_config: StaticConfig,
    path: PathBuf,
    /// False when the file was missing and defaults are in use
    from_file: bool,
}

impl RuntimeConfig {
    /// Load configuration from disk.
    ///
    /// A missing file is not an error: every setting has a default.
    pub async fn load(config_path: &Path) -> Result<Self> {
        info!("Loading configuration from: {}", config_path.display());

        let (static_config, from_file) = match Self::load_static_config(config_path).await? {
            Some(config) => (config, true),
            None => {
                info!(
                    "Static config not found at {}. Using defaults.",
                    config_path.display()
                );
                (StaticConfig::default(), false)
            }
        };

        debug!(
            "Control interval {}s, report every {} iterations, {} channel override(s)",
            static_config.control.interval_secs,
            static_config.control.report_interval,
            static_config.channels.len()
        );

        Ok(Self {
            static_config,
            path: config_path.to_path_buf(),
            from_file,
        })
    }

    async fn load_static_config(path: &Path) -> Result<Option<StaticConfig>> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| FanError::Config(format!("Failed to read config file: {}", e)))?;

        StaticConfig::from_toml(&content)
            .map(Some)
            .map_err(|e| FanError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn static_config(&self) -> &StaticConfig {
        &self.static_config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn from_file(&self) -> bool {
        self.from_file
    }

    pub fn into_static_config(self) -> StaticConfig {
        self.static_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swfan_core::BoardKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let config = RuntimeConfig::load(&path).await.unwrap();
        assert!(!config.from_file());
        assert_eq!(config.static_config(), &StaticConfig::default());
        // Nothing is written back
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "[control]\ninterval_secs = 3\n\n[board]\nkind = \"wedge100\"\n\n[channels]\n\"temp.intake\" = \"/tmp/intake\"\n",
        )
        .await
        .unwrap();

        let config = RuntimeConfig::load(&path).await.unwrap();
        assert!(config.from_file());
        assert_eq!(config.path(), path.as_path());

        let static_config = config.into_static_config();
        assert_eq!(static_config.control.interval_secs, 3);
        assert_eq!(static_config.control.report_interval, 720);
        assert_eq!(static_config.board.kind, Some(BoardKind::Wedge100));
        assert_eq!(
            static_config.channels.get("temp.intake").map(String::as_str),
            Some("/tmp/intake")
        );
    }

    #[tokio::test]
    async fn test_invalid_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[control\ninterval_secs = ").await.unwrap();

        let result = RuntimeConfig::load(&path).await;
        assert!(matches!(result, Err(FanError::Config(_))));
    }
}
