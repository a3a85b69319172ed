//! Effective tuning
//!
//! Board defaults, overlaid by the `[control]` section of the configuration
//! file, overlaid by command-line flags. Out-of-range values never abort:
//! they are corrected and reported as warnings for the caller to log.

use std::ops::RangeInclusive;

use super::{SensorConfig, StaticConfig};
use crate::board::{BoardVariant, ControllerKind};
use crate::health::HealthThresholds;
use crate::shutdown::ShutdownPolicy;
use crate::thermal::{
    FanLevels, HysteresisConfig, HysteresisController, JunctionTrackingController,
    TableLookupController, ThermalController,
};

/// Base temperature used when the requested one is out of range
pub const DEFAULT_BASE_TEMPERATURE: i32 = 95;

/// Accepted base temperatures, in degrees
pub const BASE_TEMPERATURE_RANGE: RangeInclusive<i32> = 70..=105;

/// Junction readings moving more than this (degrees) are not trusted for limits
pub const JUNCTION_MAX_CHANGE: i32 = 50;

/// Values given on the command line; `None` keeps the lower layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TuningOverrides {
    pub low: Option<u32>,
    pub medium: Option<u32>,
    pub high: Option<u32>,
    /// Degrees
    pub temp_bottom: Option<i32>,
    /// Degrees
    pub temp_top: Option<i32>,
    pub report_interval: Option<u32>,
    /// High-temperature profile base, in degrees
    pub base_temperature: Option<i32>,
}

/// Resolved tuning used by the control loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuning {
    pub levels: FanLevels,
    /// Internal units
    pub temp_top: i32,
    /// Internal units
    pub temp_bottom: i32,
    pub report_interval: u32,
    /// Validated base temperature, when `-d` was given
    pub base_temperature: Option<i32>,
    pub health: HealthThresholds,
    pub bad_read_threshold: u32,
    /// Attempts per sensor read, at least 1
    pub read_attempts: u32,
}

impl Tuning {
    /// Merge the layers and validate the result.
    ///
    /// Returns the tuning and the warnings produced while validating.
    pub fn resolve(
        variant: &BoardVariant,
        config: &StaticConfig,
        overrides: &TuningOverrides,
    ) -> (Self, Vec<String>) {
        let mut warnings = Vec::new();
        let control = &config.control;
        let base = variant.levels;

        let levels = FanLevels::new(
            overrides.low.or(control.low).unwrap_or(base.low),
            overrides.medium.or(control.medium).unwrap_or(base.medium),
            overrides.high.or(control.high).unwrap_or(base.high),
            base.max,
        );
        if !levels.is_monotonic() {
            warnings.push(format!(
                "Fan levels are not increasing: low {}, medium {}, high {}, max {}",
                levels.low, levels.medium, levels.high, levels.max
            ));
        }

        let temp_bottom = overrides
            .temp_bottom
            .or(control.temp_bottom)
            .map(|t| variant.internal(t))
            .unwrap_or(variant.temp_bottom);
        let temp_top = overrides
            .temp_top
            .or(control.temp_top)
            .map(|t| variant.internal(t))
            .unwrap_or(variant.temp_top);
        if temp_bottom > temp_top {
            warnings.push(format!(
                "Bottom temperature ({}) is above top temperature ({})",
                variant.external(temp_bottom),
                variant.external(temp_top)
            ));
        }

        let mut report_interval = overrides.report_interval.unwrap_or(control.report_interval);
        if report_interval == 0 {
            warnings.push("Report interval 0 treated as 1".to_string());
            report_interval = 1;
        }

        let base_temperature = overrides.base_temperature.map(|t| {
            if BASE_TEMPERATURE_RANGE.contains(&t) {
                t
            } else {
                warnings.push(format!(
                    "Base temperature {} outside {}..={}, using {}",
                    t,
                    BASE_TEMPERATURE_RANGE.start(),
                    BASE_TEMPERATURE_RANGE.end(),
                    DEFAULT_BASE_TEMPERATURE
                ));
                DEFAULT_BASE_TEMPERATURE
            }
        });

        let defaults = SensorConfig::default();
        let mut bad_read_threshold = config.sensors.bad_read_threshold;
        if bad_read_threshold == 0 {
            warnings.push(format!(
                "Bad read threshold 0 treated as {}",
                defaults.bad_read_threshold
            ));
            bad_read_threshold = defaults.bad_read_threshold;
        }

        let mut read_attempts = config.sensors.read_attempts;
        if read_attempts == 0 {
            warnings.push("Sensor read attempts 0 treated as 1".to_string());
            read_attempts = 1;
        }

        let mut health = config.health;
        if health.slop == 0 || health.failure >= health.chronic {
            let fallback = HealthThresholds::default();
            warnings.push(format!(
                "Fan health thresholds slop {}, failure {}, chronic {} are unusable, using {}/{}/{}",
                health.slop,
                health.failure,
                health.chronic,
                fallback.slop,
                fallback.failure,
                fallback.chronic
            ));
            health = fallback;
        }

        let tuning = Self {
            levels,
            temp_top,
            temp_bottom,
            report_interval,
            base_temperature,
            health,
            bad_read_threshold,
            read_attempts,
        };
        (tuning, warnings)
    }

    /// Whether the secondary tray is monitored and driven after boot
    pub fn secondary_enabled(&self) -> bool {
        self.base_temperature.is_none()
    }

    /// Controller for the main fan array
    pub fn primary_controller(&self, variant: &BoardVariant) -> Box<dyn ThermalController> {
        match variant.controller {
            ControllerKind::Hysteresis { floors } => {
                let controller = HysteresisController::new(
                    self.levels,
                    HysteresisConfig {
                        temp_top: self.temp_top,
                        temp_bottom: self.temp_bottom,
                        cooldown_slop: variant.cooldown_slop,
                        server_fudge: variant.server_fudge,
                    },
                );
                match floors {
                    Some(floors) => Box::new(controller.with_junction_floors(floors)),
                    None => Box::new(controller),
                }
            }
            ControllerKind::TableLookup { intake, cpu } => {
                Box::new(TableLookupController::new(self.levels, intake, cpu))
            }
        }
    }

    /// Controller for the secondary tray, on boards with one
    pub fn secondary_controller(&self, variant: &BoardVariant) -> Option<Box<dyn ThermalController>> {
        let secondary = variant.secondary.as_ref()?;
        Some(Box::new(JunctionTrackingController::new(
            secondary.levels,
            secondary.thresholds,
        )))
    }

    /// Shutdown rules for this board
    pub fn shutdown_policy(&self, variant: &BoardVariant) -> ShutdownPolicy {
        ShutdownPolicy {
            bad_read_threshold: self.bad_read_threshold,
            limits: variant.limits,
            server_fudge: variant.server_fudge,
            junction_max_change: JUNCTION_MAX_CHANGE,
            required: variant.required_sensors.to_vec(),
            total_fan_failure: variant.shutdown_on_total_fan_failure,
        }
    }
}
