//! swfan Core Library
//!
//! Board descriptions, calibration data, thermal control strategies, fan
//! health tracking and shutdown policy for the swfan daemon. Nothing in this
//! crate touches hardware; device access lives in `swfan-hardware`.

pub mod board;
pub mod calibration;
pub mod channel;
pub mod config;
pub mod error;
pub mod health;
pub mod pwm;
pub mod reading;
pub mod shutdown;
pub mod state;
pub mod thermal;

// Re-export commonly used types
pub use board::{BoardKind, BoardVariant};
pub use channel::{Channel, TempSensor, Tray};
pub use config::{StaticConfig, Tuning, TuningOverrides};
pub use error::{FanError, Result};
pub use reading::ThermalReading;
