//! Shutdown policy
//!
//! Decides when the chassis must be powered down. Three independent causes
//! are checked every iteration:
//!
//! 1. Sustained bad sensor reads
//! 2. An absolute temperature limit breach
//! 3. A fan array that is chronically dead in its entirety
//!
//! The policy is pure; executing the power-down sequence is the daemon's job.

use std::fmt;

use crate::channel::{TempSensor, Tray};
use crate::health::HealthReport;
use crate::reading::ThermalReading;

/// Why the chassis is being shut down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Primary chassis sensors unreadable for too long
    SensorsUnreadable,
    /// Junction sensors unreadable for too long
    JunctionSensorsUnreadable,
    /// A sensor crossed its absolute limit
    LimitExceeded {
        sensor: TempSensor,
        value: i32,
        limit: i32,
    },
    /// Every fan in a tray is chronically dead
    TotalFanFailure(Tray),
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::SensorsUnreadable => write!(f, "sensors unreadable"),
            ShutdownReason::JunctionSensorsUnreadable => write!(f, "junction sensors unreadable"),
            ShutdownReason::LimitExceeded { sensor, .. } => {
                write!(f, "{} temp limit reached", sensor.label())
            }
            ShutdownReason::TotalFanFailure(Tray::Lower) => write!(f, "total fan failure"),
            ShutdownReason::TotalFanFailure(Tray::Upper) => {
                write!(f, "total upper tray fan failure")
            }
        }
    }
}

/// Absolute sensor limits, in internal units (junction in degrees)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorLimits {
    pub intake: i32,
    /// Switch limit, on boards with a switch sensor
    pub switch: Option<i32>,
    /// Compared against the server temperature plus the server fudge
    pub server: i32,
    /// Junction limit, on boards with junction sensors
    pub junction: Option<i32>,
}

/// Counters carried between iterations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorFaultState {
    /// Consecutive iterations with a bad primary sensor
    pub bad_reads: u32,
    /// Consecutive iterations with a bad junction sensor
    pub junction_bad_reads: u32,
    /// Last valid reading per junction sensor
    pub previous_junction: Vec<i32>,
}

/// Shutdown decision rules
#[derive(Debug, Clone)]
pub struct ShutdownPolicy {
    /// Shutdown once this many consecutive bad reads are seen
    pub bad_read_threshold: u32,
    pub limits: SensorLimits,
    /// Offset added to the server temperature before the limit check
    pub server_fudge: i32,
    /// Junction changes larger than this are not trusted for limit checks
    pub junction_max_change: i32,
    /// Sensors that must read for an iteration to count as good
    pub required: Vec<TempSensor>,
    /// Shut down when a whole tray is chronically dead
    pub total_fan_failure: bool,
}

impl ShutdownPolicy {
    /// Update the bad-read counters with this iteration's readings.
    ///
    /// The primary counter is checked before the junction counter.
    pub fn record_reads(
        &self,
        state: &mut SensorFaultState,
        reading: &ThermalReading,
    ) -> Option<ShutdownReason> {
        let primary_bad = self.required.iter().any(|s| reading.get(*s).is_none());
        state.bad_reads = if primary_bad {
            state.bad_reads.saturating_add(1)
        } else {
            0
        };

        if self.limits.junction.is_some() {
            state.junction_bad_reads = if reading.junction_bad() {
                state.junction_bad_reads.saturating_add(1)
            } else {
                0
            };
        }

        if state.bad_reads >= self.bad_read_threshold {
            Some(ShutdownReason::SensorsUnreadable)
        } else if state.junction_bad_reads >= self.bad_read_threshold {
            Some(ShutdownReason::JunctionSensorsUnreadable)
        } else {
            None
        }
    }

    /// True when any valid reading is over its limit (used to force a report)
    pub fn any_limit_exceeded(&self, reading: &ThermalReading) -> bool {
        let over = |value: Option<i32>, limit: Option<i32>| match (value, limit) {
            (Some(v), Some(l)) => v > l,
            _ => false,
        };
        over(reading.intake, Some(self.limits.intake))
            || over(reading.switch, self.limits.switch)
            || over(
                reading.server.map(|t| t.saturating_add(self.server_fudge)),
                Some(self.limits.server),
            )
            || over(reading.max_junction(), self.limits.junction)
    }

    /// Absolute limit checks, in order intake, switch, junction, server.
    ///
    /// A junction reading only counts when it moved by at most
    /// `junction_max_change` since that sensor's previous valid reading;
    /// the previous reading is updated either way.
    pub fn check_limits(
        &self,
        state: &mut SensorFaultState,
        reading: &ThermalReading,
    ) -> Option<ShutdownReason> {
        let exceeded = |sensor, value: i32, limit: i32| {
            (value > limit).then_some(ShutdownReason::LimitExceeded {
                sensor,
                value,
                limit,
            })
        };

        let mut reason = reading
            .intake
            .and_then(|t| exceeded(TempSensor::Intake, t, self.limits.intake));

        if reason.is_none() {
            if let (Some(t), Some(limit)) = (reading.switch, self.limits.switch) {
                reason = exceeded(TempSensor::Switch, t, limit);
            }
        }

        if let Some(limit) = self.limits.junction {
            if state.previous_junction.len() < reading.junction.len() {
                state.previous_junction.resize(reading.junction.len(), 0);
            }
            for (i, value) in reading.junction.iter().enumerate() {
                let Some(t) = *value else { continue };
                let previous = state.previous_junction[i];
                if reason.is_none() && t.abs_diff(previous) <= self.junction_max_change.unsigned_abs() {
                    reason = exceeded(TempSensor::Junction(i as u8 + 1), t, limit);
                }
                state.previous_junction[i] = t;
            }
        }

        if reason.is_none() {
            if let Some(t) = reading.server {
                reason = exceeded(
                    TempSensor::Server,
                    t.saturating_add(self.server_fudge),
                    self.limits.server,
                );
            }
        }

        reason
    }

    /// Whole-tray fan death check
    pub fn check_fans(&self, tray: Tray, report: &HealthReport) -> Option<ShutdownReason> {
        (self.total_fan_failure && report.all_chronic).then_some(ShutdownReason::TotalFanFailure(tray))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ShutdownPolicy {
        ShutdownPolicy {
            bad_read_threshold: 4,
            limits: SensorLimits {
                intake: 60_000,
                switch: Some(80_000),
                server: 90_000,
                junction: Some(105),
            },
            server_fudge: 10_000,
            junction_max_change: 50,
            required: vec![TempSensor::Intake, TempSensor::Exhaust, TempSensor::Switch],
            total_fan_failure: true,
        }
    }

    fn normal() -> ThermalReading {
        ThermalReading {
            intake: Some(25_000),
            exhaust: Some(35_000),
            switch: Some(50_000),
            server: Some(40_000),
            junction: vec![Some(60)],
        }
    }

    #[test]
    fn test_reason_strings() {
        assert_eq!(ShutdownReason::SensorsUnreadable.to_string(), "sensors unreadable");
        assert_eq!(
            ShutdownReason::LimitExceeded {
                sensor: TempSensor::Intake,
                value: 61_000,
                limit: 60_000
            }
            .to_string(),
            "intake temp limit reached"
        );
        assert_eq!(
            ShutdownReason::TotalFanFailure(Tray::Lower).to_string(),
            "total fan failure"
        );
    }

    #[test]
    fn test_fourth_bad_read_shuts_down() {
        let policy = policy();
        let mut state = SensorFaultState::default();
        let bad = ThermalReading {
            intake: None,
            ..normal()
        };
        for _ in 0..3 {
            assert_eq!(policy.record_reads(&mut state, &bad), None);
        }
        assert_eq!(
            policy.record_reads(&mut state, &bad),
            Some(ShutdownReason::SensorsUnreadable)
        );
    }

    #[test]
    fn test_good_read_resets_counter() {
        let policy = policy();
        let mut state = SensorFaultState::default();
        let bad = ThermalReading {
            switch: None,
            ..normal()
        };
        for _ in 0..3 {
            policy.record_reads(&mut state, &bad);
        }
        policy.record_reads(&mut state, &normal());
        assert_eq!(state.bad_reads, 0);
        for _ in 0..3 {
            assert_eq!(policy.record_reads(&mut state, &bad), None);
        }
    }

    #[test]
    fn test_server_is_not_required() {
        let policy = policy();
        let mut state = SensorFaultState::default();
        let no_server = ThermalReading {
            server: None,
            ..normal()
        };
        for _ in 0..10 {
            assert_eq!(policy.record_reads(&mut state, &no_server), None);
        }
    }

    #[test]
    fn test_junction_bad_reads() {
        let policy = policy();
        let mut state = SensorFaultState::default();
        let bad = ThermalReading {
            junction: vec![None],
            ..normal()
        };
        for _ in 0..3 {
            assert_eq!(policy.record_reads(&mut state, &bad), None);
        }
        assert_eq!(
            policy.record_reads(&mut state, &bad),
            Some(ShutdownReason::JunctionSensorsUnreadable)
        );
    }

    #[test]
    fn test_limits() {
        let policy = policy();
        let mut state = SensorFaultState::default();
        assert_eq!(policy.check_limits(&mut state, &normal()), None);

        let hot_intake = ThermalReading {
            intake: Some(60_001),
            switch: Some(90_000),
            ..normal()
        };
        let reason = policy.check_limits(&mut state, &hot_intake);
        assert!(matches!(
            reason,
            Some(ShutdownReason::LimitExceeded {
                sensor: TempSensor::Intake,
                ..
            })
        ));

        let hot_switch = ThermalReading {
            switch: Some(80_001),
            ..normal()
        };
        assert_eq!(
            policy.check_limits(&mut state, &hot_switch).map(|r| r.to_string()),
            Some("switch temp limit reached".to_string())
        );

        // Server limit includes the fudge
        let warm_server = ThermalReading {
            server: Some(80_000),
            ..normal()
        };
        assert_eq!(policy.check_limits(&mut state, &warm_server), None);
        let hot_server = ThermalReading {
            server: Some(80_001),
            ..normal()
        };
        assert!(policy.check_limits(&mut state, &hot_server).is_some());
    }

    #[test]
    fn test_bad_readings_never_hit_limits() {
        let policy = policy();
        let mut state = SensorFaultState::default();
        let unreadable = ThermalReading {
            intake: None,
            exhaust: None,
            switch: None,
            server: None,
            junction: vec![None],
        };
        assert_eq!(policy.check_limits(&mut state, &unreadable), None);
        assert!(!policy.any_limit_exceeded(&unreadable));
    }

    #[test]
    fn test_junction_jump_not_trusted() {
        let policy = policy();
        let mut state = SensorFaultState::default();

        // From nothing to 110 is a jump of more than 50
        let spike = ThermalReading {
            junction: vec![Some(110)],
            ..normal()
        };
        assert_eq!(policy.check_limits(&mut state, &spike), None);
        assert_eq!(state.previous_junction, vec![110]);

        // Still hot on the next read: trusted now
        let reason = policy.check_limits(&mut state, &spike);
        assert_eq!(
            reason.map(|r| r.to_string()),
            Some("junction 1 temp limit reached".to_string())
        );
    }

    #[test]
    fn test_total_fan_failure() {
        let policy = policy();
        let report = HealthReport {
            all_chronic: true,
            ..Default::default()
        };
        assert_eq!(
            policy.check_fans(Tray::Upper, &report),
            Some(ShutdownReason::TotalFanFailure(Tray::Upper))
        );

        let lenient = ShutdownPolicy {
            total_fan_failure: false,
            ..policy
        };
        assert_eq!(lenient.check_fans(Tray::Lower, &report), None);
    }
}
