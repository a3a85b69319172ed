//! Four-level hysteresis controller for the main fan array

use super::{ControlInput, ControllerLevel, Decision, FanLevels, ThermalController};
use crate::reading::ThermalReading;

/// Thresholds of the hysteresis controller, in internal temperature units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HysteresisConfig {
    /// Above this MEDIUM rises to HIGH; HIGH falls to MEDIUM below `top - slop`
    pub temp_top: i32,
    /// Above this LOW rises to MEDIUM; MEDIUM falls to LOW below `bottom - slop`
    pub temp_bottom: i32,
    /// Margin a temperature must fall below a threshold before slowing down
    pub cooldown_slop: i32,
    /// Offset added to the server temperature before comparison
    pub server_fudge: i32,
}

/// Junction temperature floors applied after the hysteresis step.
///
/// Junction temperatures can only raise the level, never lower it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JunctionFloors {
    /// Above this the level is forced to MAX
    pub force_max: i32,
    /// Above this the level is at least HIGH
    pub at_least_high: i32,
    /// Above this the level is at least MEDIUM
    pub at_least_medium: i32,
}

impl JunctionFloors {
    /// Minimum level demanded by a junction temperature
    pub fn floor(&self, junction: i32) -> Option<ControllerLevel> {
        if junction > self.force_max {
            Some(ControllerLevel::Max)
        } else if junction > self.at_least_high {
            Some(ControllerLevel::High)
        } else if junction > self.at_least_medium {
            Some(ControllerLevel::Medium)
        } else {
            None
        }
    }
}

/// Hysteresis controller over switch and server temperatures
#[derive(Debug, Clone)]
pub struct HysteresisController {
    levels: FanLevels,
    config: HysteresisConfig,
    floors: Option<JunctionFloors>,
}

impl HysteresisController {
    pub fn new(levels: FanLevels, config: HysteresisConfig) -> Self {
        Self {
            levels,
            config,
            floors: None,
        }
    }

    /// Add junction temperature floors
    pub fn with_junction_floors(mut self, floors: JunctionFloors) -> Self {
        self.floors = Some(floors);
        self
    }

    pub fn config(&self) -> &HysteresisConfig {
        &self.config
    }

    /// Hottest relevant temperature: switch, or server plus fudge.
    ///
    /// Bad readings are skipped; `None` when neither is available.
    pub fn max_relevant_temp(&self, reading: &ThermalReading) -> Option<i32> {
        let server = reading
            .server
            .map(|t| t.saturating_add(self.config.server_fudge));
        match (reading.switch, server) {
            (Some(switch), Some(server)) => Some(switch.max(server)),
            (switch, server) => switch.or(server),
        }
    }

    /// One hysteresis step from `current`
    pub fn step(
        &self,
        current: ControllerLevel,
        max_temp: Option<i32>,
        failed_fans: usize,
    ) -> ControllerLevel {
        let HysteresisConfig {
            temp_top,
            temp_bottom,
            cooldown_slop,
            ..
        } = self.config;

        // Recovery from MAX does not depend on temperature, only on fans
        if current == ControllerLevel::Max {
            return if failed_fans == 0 {
                ControllerLevel::High
            } else {
                ControllerLevel::Max
            };
        }

        let Some(temp) = max_temp else {
            return current;
        };
        let cooled = |threshold: i32| temp.saturating_add(cooldown_slop) < threshold;

        match current {
            ControllerLevel::High if cooled(temp_top) => ControllerLevel::Medium,
            ControllerLevel::Medium if temp > temp_top => ControllerLevel::High,
            ControllerLevel::Medium if cooled(temp_bottom) => ControllerLevel::Low,
            ControllerLevel::Low if temp > temp_bottom => ControllerLevel::Medium,
            level => level,
        }
    }
}

impl ThermalController for HysteresisController {
    fn name(&self) -> &'static str {
        "hysteresis"
    }

    fn levels(&self) -> &FanLevels {
        &self.levels
    }

    fn evaluate(&self, previous: Decision, input: &ControlInput<'_>) -> Decision {
        let current = previous.level.unwrap_or(ControllerLevel::High);
        let max_temp = self.max_relevant_temp(input.reading);
        let mut level = self.step(current, max_temp, input.failed_fans);

        if let Some(floors) = &self.floors {
            // Every junction sensor contributes
            let floor = input
                .reading
                .junction
                .iter()
                .flatten()
                .filter_map(|&t| floors.floor(t))
                .max();
            if let Some(floor) = floor {
                level = level.max(floor);
            }
        }

        Decision::at_level(&self.levels, level)
    }
}
