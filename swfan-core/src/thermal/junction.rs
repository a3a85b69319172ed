//! Junction-tracking controller for a secondary fan tray

use super::{ControlInput, ControllerLevel, Decision, FanLevels, ThermalController};

/// Junction thresholds, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JunctionThresholds {
    /// Above this any level jumps to MAX
    pub force_max: i32,
    /// MAX falls to HIGH below this (with no failed fans)
    pub high: i32,
    /// HIGH falls to MEDIUM below this; MEDIUM and LOW rise to HIGH above it
    pub medium: i32,
    /// MEDIUM falls to LOW below this
    pub low: i32,
}

impl Default for JunctionThresholds {
    fn default() -> Self {
        Self {
            force_max: 85,
            high: 80,
            medium: 70,
            low: 65,
        }
    }
}

/// Hysteresis on the hottest junction sensor
#[derive(Debug, Clone)]
pub struct JunctionTrackingController {
    levels: FanLevels,
    thresholds: JunctionThresholds,
}

impl JunctionTrackingController {
    pub fn new(levels: FanLevels, thresholds: JunctionThresholds) -> Self {
        Self { levels, thresholds }
    }

    pub fn thresholds(&self) -> &JunctionThresholds {
        &self.thresholds
    }

    /// One step from `current` given the hottest junction temperature
    pub fn step(&self, current: ControllerLevel, junction: i32, failed_fans: usize) -> ControllerLevel {
        let t = self.thresholds;
        if junction > t.force_max {
            return ControllerLevel::Max;
        }

        match current {
            ControllerLevel::Max if failed_fans == 0 && junction < t.high => ControllerLevel::High,
            ControllerLevel::High if junction < t.medium => ControllerLevel::Medium,
            ControllerLevel::Medium if junction < t.low => ControllerLevel::Low,
            ControllerLevel::Medium | ControllerLevel::Low if junction > t.medium => {
                ControllerLevel::High
            }
            level => level,
        }
    }
}

impl ThermalController for JunctionTrackingController {
    fn name(&self) -> &'static str {
        "junction-tracking"
    }

    fn levels(&self) -> &FanLevels {
        &self.levels
    }

    fn evaluate(&self, previous: Decision, input: &ControlInput<'_>) -> Decision {
        let current = previous.level.unwrap_or(ControllerLevel::High);
        let level = match input.reading.max_junction() {
            Some(junction) => self.step(current, junction, input.failed_fans),
            None => current,
        };
        Decision::at_level(&self.levels, level)
    }
}
