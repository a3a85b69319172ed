//! Thermal controllers
//!
//! A controller turns a [`ThermalReading`] into a fan [`Decision`]. Three
//! strategies exist, selected by the board variant:
//!
//! - [`HysteresisController`]: four-level hysteresis on the hottest of the
//!   switch and (fudged) server temperatures, with optional junction floors.
//! - [`TableLookupController`]: max of two temperature-table lookups, no
//!   hysteresis.
//! - [`JunctionTrackingController`]: four-level hysteresis on the switch
//!   ASIC junction temperature, used for a secondary fan tray.
//!
//! Controllers hold no mutable state; the previous decision is threaded
//! through by the caller.

mod hysteresis;
mod junction;
mod table;

pub use hysteresis::{HysteresisConfig, HysteresisController, JunctionFloors};
pub use junction::{JunctionThresholds, JunctionTrackingController};
pub use table::TableLookupController;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::reading::ThermalReading;

/// Discrete cooling level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerLevel {
    Low,
    Medium,
    High,
    Max,
}

impl fmt::Display for ControllerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControllerLevel::Low => "LOW",
            ControllerLevel::Medium => "MEDIUM",
            ControllerLevel::High => "HIGH",
            ControllerLevel::Max => "MAX",
        };
        write!(f, "{}", s)
    }
}

/// Fan percentage for each level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanLevels {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
    pub max: u32,
}

impl FanLevels {
    pub const fn new(low: u32, medium: u32, high: u32, max: u32) -> Self {
        Self {
            low,
            medium,
            high,
            max,
        }
    }

    /// Percentage commanded at `level`
    pub fn percent(&self, level: ControllerLevel) -> u32 {
        match level {
            ControllerLevel::Low => self.low,
            ControllerLevel::Medium => self.medium,
            ControllerLevel::High => self.high,
            ControllerLevel::Max => self.max,
        }
    }

    /// True when low <= medium <= high <= max <= 100
    pub fn is_monotonic(&self) -> bool {
        self.low <= self.medium && self.medium <= self.high && self.high <= self.max && self.max <= 100
    }
}

/// Controller output for one iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Level, for level-based controllers
    pub level: Option<ControllerLevel>,
    /// Fan percentage to command
    pub percent: u32,
}

impl Decision {
    /// Decision at a discrete level
    pub fn at_level(levels: &FanLevels, level: ControllerLevel) -> Self {
        Self {
            level: Some(level),
            percent: levels.percent(level),
        }
    }

    /// Decision for a raw percentage
    pub fn at_percent(percent: u32) -> Self {
        Self {
            level: None,
            percent,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            Some(level) => write!(f, "{}% ({})", self.percent, level),
            None => write!(f, "{}%", self.percent),
        }
    }
}

/// Input to a controller evaluation
#[derive(Debug, Clone, Copy)]
pub struct ControlInput<'a> {
    /// This iteration's readings
    pub reading: &'a ThermalReading,
    /// Fans found failed by the last health check of the driven array
    pub failed_fans: usize,
}

/// A thermal control strategy
pub trait ThermalController: Send + Sync + fmt::Debug {
    /// Strategy name for logs
    fn name(&self) -> &'static str;

    /// Fan levels this controller commands
    fn levels(&self) -> &FanLevels;

    /// Decision in effect before the first evaluation
    fn initial(&self) -> Decision {
        Decision::at_level(self.levels(), ControllerLevel::High)
    }

    /// Decision forced while fans of the array are failed
    fn failure_override(&self) -> Decision {
        Decision::at_level(self.levels(), ControllerLevel::Max)
    }

    /// Compute the next decision from the previous one and fresh readings
    fn evaluate(&self, previous: Decision, input: &ControlInput<'_>) -> Decision;
}
