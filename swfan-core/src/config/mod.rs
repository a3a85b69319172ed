//! Configuration types for swfan
//!
//! # Architecture
//!
//! Configuration is layered:
//! - Board defaults from [`crate::board::BoardVariant`]
//! - [`StaticConfig`] - TOML file, loaded once at startup
//! - [`TuningOverrides`] - command-line flags
//!
//! [`Tuning::resolve`] merges the layers into the values the control loop uses.

mod paths;
mod static_config;
mod tuning;

pub use paths::{default_config_path, resolve_config_path, CONFIG_ENV_VAR};
pub use static_config::{
    BoardConfig, ControlConfig, SensorConfig, ShutdownConfig, StaticConfig, WatchdogConfig,
};
pub use tuning::{
    Tuning, TuningOverrides, BASE_TEMPERATURE_RANGE, DEFAULT_BASE_TEMPERATURE, JUNCTION_MAX_CHANGE,
};
