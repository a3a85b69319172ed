//! Static configuration loaded once at startup
//!
//! This configuration is read-only after the daemon starts. Every section
//! and field is optional; a missing file means all defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::board::BoardKind;
use crate::health::HealthThresholds;

/// Control loop timing and level overrides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Seconds between writing fan speeds and checking them
    pub interval_secs: u64,
    /// Seconds to let fans spin up after the boot speed is written
    pub boot_settle_secs: u64,
    /// Iterations between periodic temperature reports
    pub report_interval: u32,
    /// Level overrides, in percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medium: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<u32>,
    /// Hysteresis threshold overrides, in degrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_bottom: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_top: Option<i32>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            boot_settle_secs: 5,
            report_interval: 720,
            low: None,
            medium: None,
            high: None,
            temp_bottom: None,
            temp_top: None,
        }
    }
}

impl ControlConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn boot_settle(&self) -> Duration {
        Duration::from_secs(self.boot_settle_secs)
    }
}

/// Sensor read behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Consecutive bad iterations before shutdown
    pub bad_read_threshold: u32,
    /// Attempts per sensor read
    pub read_attempts: u32,
    /// Delay between read attempts, in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            bad_read_threshold: 4,
            read_attempts: 4,
            retry_delay_ms: 10,
        }
    }
}

impl SensorConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Power-down behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Seconds between server power-off and main power-off
    pub grace_secs: u64,
    /// Seconds to wait after stopping the watchdog, before exiting
    pub exit_delay_secs: u64,
    /// Upper bound for a single device write during shutdown, in milliseconds
    pub write_timeout_ms: u64,
    /// When this file exists, triggered shutdowns are logged and skipped
    pub inhibit_file: PathBuf,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_secs: 5,
            exit_delay_secs: 2,
            write_timeout_ms: 2000,
            inhibit_file: PathBuf::from("/mnt/data/etc/not_shutdown_come"),
        }
    }
}

impl ShutdownConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn exit_delay(&self) -> Duration {
        Duration::from_secs(self.exit_delay_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Hardware watchdog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub enabled: bool,
    pub device: PathBuf,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: PathBuf::from("/dev/watchdog"),
        }
    }
}

/// Board identification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Explicit board kind, skipping identification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<BoardKind>,
    /// File holding the EEPROM location string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_file: Option<PathBuf>,
    /// Board assumed when identification fails
    pub fallback: BoardKind,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            kind: None,
            location_file: None,
            fallback: BoardKind::Montara,
        }
    }
}

/// Static configuration for the swfan daemon.
///
/// Located at `~/.config/swfan/config.toml` by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticConfig {
    pub control: ControlConfig,
    pub health: HealthThresholds,
    pub sensors: SensorConfig,
    pub shutdown: ShutdownConfig,
    pub watchdog: WatchdogConfig,
    pub board: BoardConfig,
    /// Device path overrides, keyed by channel key (e.g. `temp.intake`)
    pub channels: BTreeMap<String, String>,
}

impl StaticConfig {
    /// Parse StaticConfig from TOML string.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize StaticConfig to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_static_config() {
        let config = StaticConfig::default();
        assert_eq!(config.control.interval_secs, 5);
        assert_eq!(config.control.report_interval, 720);
        assert_eq!(config.health.slop, 30);
        assert_eq!(config.sensors.bad_read_threshold, 4);
        assert_eq!(config.board.fallback, BoardKind::Montara);
        assert_eq!(config.shutdown.grace(), Duration::from_secs(5));
    }

    #[test]
    fn test_static_config_serialization() {
        let config = StaticConfig::default();
        let toml_str = config.to_toml().unwrap();

        assert!(toml_str.contains("[control]"));
        assert!(toml_str.contains("[shutdown]"));
        assert!(toml_str.contains("inhibit_file"));

        let back = StaticConfig::from_toml(&toml_str).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_static_config_deserialization() {
        let toml_str = r#"
            [control]
            interval_secs = 3
            medium = 55

            [health]
            slop = 25

            [board]
            kind = "wedge100"

            [channels]
            "temp.intake" = "/tmp/intake"
        "#;

        let config = StaticConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.control.interval_secs, 3);
        assert_eq!(config.control.medium, Some(55));
        assert_eq!(config.control.report_interval, 720);
        assert_eq!(config.health.slop, 25);
        assert_eq!(config.health.failure, 4);
        assert_eq!(config.board.kind, Some(BoardKind::Wedge100));
        assert_eq!(config.channels.get("temp.intake").map(String::as_str), Some("/tmp/intake"));
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = StaticConfig::from_toml("").unwrap();
        assert_eq!(config, StaticConfig::default());
    }

    #[test]
    fn test_unknown_board_kind_rejected() {
        let result = StaticConfig::from_toml("[board]\nkind = \"toaster\"\n");
        assert!(result.is_err());
    }
}
