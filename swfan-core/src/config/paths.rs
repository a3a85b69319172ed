//! Default path resolution for configuration files
//!
//! Uses XDG Base Directory specification when available, with sensible fallbacks.

use std::path::PathBuf;

/// Environment variable overriding the configuration file location
pub const CONFIG_ENV_VAR: &str = "SWFAN_CONFIG";

/// Returns the default path for the static configuration file.
///
/// Uses XDG config directory if available:
/// - Linux/macOS: `~/.config/swfan/config.toml`
/// - Fallback: `/etc/swfan/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join("swfan")
        .join("config.toml")
}

/// Resolve the configuration path: explicit path, then `SWFAN_CONFIG`,
/// then the default location.
pub fn resolve_config_path(explicit: Option<PathBuf>, env: Option<String>) -> PathBuf {
    explicit
        .or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
        .unwrap_or_else(default_config_path)
}
