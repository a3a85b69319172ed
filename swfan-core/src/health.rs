//! Fan health monitoring
//!
//! Each fan keeps a consecutive-mismatch counter. A fan whose measured speed
//! strays too far from the commanded one for long enough is failed; one
//! failing for much longer is chronically dead. The monitor only classifies;
//! the control loop decides what to write and log.

use serde::{Deserialize, Serialize};

/// Health thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    /// Maximum tolerated deviation from the commanded speed, in percent
    pub slop: u32,
    /// A fan is failed once its bad counter exceeds this
    pub failure: u32,
    /// A fan is chronically dead once its bad counter exceeds this
    pub chronic: u32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            slop: 30,
            failure: 4,
            chronic: 20,
        }
    }
}

/// Relative deviation check.
///
/// A commanded speed of zero skips the check (the fan counts as okay).
pub fn within_slop(measured_percent: u32, commanded_percent: u32, slop: u32) -> bool {
    if commanded_percent == 0 {
        return true;
    }
    let deviation = u64::from(measured_percent.abs_diff(commanded_percent)) * 100
        / u64::from(commanded_percent);
    deviation < u64::from(slop)
}

/// One fan's measurement for a health check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FanSample {
    /// Front fan RPM (0 when unreadable)
    pub front_rpm: u32,
    /// Front RPM converted to percent
    pub front_percent: u32,
    /// Rear fan RPM and percent, for coaxial fans
    pub rear: Option<(u32, u32)>,
}

/// Per-slot fan state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanState {
    /// 0-based position in the array
    pub slot: usize,
    /// Percent commanded at the last check
    pub commanded_percent: u32,
    /// Last measured front RPM
    pub front_rpm: u32,
    /// Last measured rear RPM
    pub rear_rpm: Option<u32>,
    /// Consecutive bad checks
    pub bad_count: u32,
}

impl FanState {
    pub fn new(slot: usize) -> Self {
        Self {
            slot,
            commanded_percent: 0,
            front_rpm: 0,
            rear_rpm: None,
            bad_count: 0,
        }
    }

    /// Counter is past the failure threshold
    pub fn is_failed(&self, thresholds: &HealthThresholds) -> bool {
        self.bad_count > thresholds.failure
    }

    /// Counter is past the chronic threshold
    pub fn is_chronic(&self, thresholds: &HealthThresholds) -> bool {
        self.bad_count > thresholds.chronic
    }
}

/// Outcome of checking one fan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanCheck {
    pub slot: usize,
    pub okay: bool,
    pub sample: FanSample,
}

/// Outcome of checking a whole array
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    /// Per-fan results, in slot order
    pub checks: Vec<FanCheck>,
    /// Slots that were failed and are now okay
    pub recovered: Vec<usize>,
    /// Slots currently failed
    pub failed: Vec<usize>,
    /// Failed count differs from the previous check
    pub failure_count_changed: bool,
    /// Every fan in the array is chronically dead
    pub all_chronic: bool,
    /// `(slot, bad_count)` for every fan with a non-zero counter
    pub degraded: Vec<(usize, u32)>,
}

impl HealthReport {
    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }
}

/// Consecutive-failure tracking for one fan array
#[derive(Debug, Clone)]
pub struct FanHealthMonitor {
    thresholds: HealthThresholds,
    fans: Vec<FanState>,
    previous_failed: usize,
}

impl FanHealthMonitor {
    pub fn new(fan_count: usize, thresholds: HealthThresholds) -> Self {
        Self {
            thresholds,
            fans: (0..fan_count).map(FanState::new).collect(),
            previous_failed: 0,
        }
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    pub fn fans(&self) -> &[FanState] {
        &self.fans
    }

    /// Number of fans failed at the last check
    pub fn failed_count(&self) -> usize {
        self.fans
            .iter()
            .filter(|f| f.is_failed(&self.thresholds))
            .count()
    }

    /// Is this sample within the tolerated deviation on every measured rotor?
    pub fn speed_okay(&self, commanded_percent: u32, sample: &FanSample) -> bool {
        let slop = self.thresholds.slop;
        within_slop(sample.front_percent, commanded_percent, slop)
            && sample
                .rear
                .map_or(true, |(_, rear)| within_slop(rear, commanded_percent, slop))
    }

    /// Check every fan against the commanded percent.
    ///
    /// `samples` must have one entry per fan; missing entries count as a
    /// stopped fan.
    pub fn check(&mut self, commanded_percent: u32, samples: &[FanSample]) -> HealthReport {
        let mut report = HealthReport::default();

        for i in 0..self.fans.len() {
            let sample = samples.get(i).copied().unwrap_or_default();
            let okay = self.speed_okay(commanded_percent, &sample);
            let thresholds = self.thresholds;
            let fan = &mut self.fans[i];

            fan.commanded_percent = commanded_percent;
            fan.front_rpm = sample.front_rpm;
            fan.rear_rpm = sample.rear.map(|(rpm, _)| rpm);

            if okay {
                if fan.is_failed(&thresholds) {
                    report.recovered.push(fan.slot);
                }
                fan.bad_count = 0;
            } else {
                fan.bad_count = fan.bad_count.saturating_add(1);
            }

            report.checks.push(FanCheck {
                slot: fan.slot,
                okay,
                sample,
            });
        }

        for fan in &self.fans {
            if fan.is_failed(&self.thresholds) {
                report.failed.push(fan.slot);
            }
            if fan.bad_count > 0 {
                report.degraded.push((fan.slot, fan.bad_count));
            }
        }

        report.failure_count_changed = report.failed.len() != self.previous_failed;
        report.all_chronic = !self.fans.is_empty()
            && self.fans.iter().all(|f| f.is_chronic(&self.thresholds));
        self.previous_failed = report.failed.len();

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good(percent: u32) -> FanSample {
        FanSample {
            front_rpm: 10_000,
            front_percent: percent,
            rear: Some((8_000, percent)),
        }
    }

    fn stalled() -> FanSample {
        FanSample {
            front_rpm: 0,
            front_percent: 0,
            rear: Some((0, 0)),
        }
    }

    #[test]
    fn test_within_slop() {
        assert!(within_slop(50, 50, 30));
        assert!(within_slop(36, 50, 30)); // 28 %
        assert!(!within_slop(35, 50, 30)); // exactly 30 %
        assert!(!within_slop(0, 50, 30));
        assert!(!within_slop(100, 50, 30));
    }

    #[test]
    fn test_zero_commanded_skips_check() {
        assert!(within_slop(0, 0, 30));
        assert!(within_slop(100, 0, 30));
    }

    #[test]
    fn test_rear_rotor_must_agree() {
        let monitor = FanHealthMonitor::new(1, HealthThresholds::default());
        let sample = FanSample {
            front_rpm: 10_000,
            front_percent: 50,
            rear: Some((100, 2)),
        };
        assert!(!monitor.speed_okay(50, &sample));

        let no_rear = FanSample {
            rear: None,
            ..sample
        };
        assert!(monitor.speed_okay(50, &no_rear));
    }

    #[test]
    fn test_failure_after_threshold_plus_one() {
        let mut monitor = FanHealthMonitor::new(2, HealthThresholds::default());
        for i in 1..=4 {
            let report = monitor.check(50, &[stalled(), good(50)]);
            assert!(report.failed.is_empty(), "failed after {} bad checks", i);
        }
        let report = monitor.check(50, &[stalled(), good(50)]);
        assert_eq!(report.failed, vec![0]);
        assert!(report.failure_count_changed);
        assert_eq!(report.degraded, vec![(0, 5)]);

        let report = monitor.check(50, &[stalled(), good(50)]);
        assert!(!report.failure_count_changed);
    }

    #[test]
    fn test_single_good_check_resets() {
        let mut monitor = FanHealthMonitor::new(1, HealthThresholds::default());
        for _ in 0..12 {
            monitor.check(50, &[stalled()]);
        }
        assert_eq!(monitor.fans()[0].bad_count, 12);

        let report = monitor.check(50, &[good(50)]);
        assert_eq!(report.recovered, vec![0]);
        assert!(report.failed.is_empty());
        assert!(report.failure_count_changed);
        assert_eq!(monitor.fans()[0].bad_count, 0);

        // Recovery is only reported once
        let report = monitor.check(50, &[good(50)]);
        assert!(report.recovered.is_empty());
    }

    #[test]
    fn test_recovery_not_reported_for_degraded_fan() {
        let mut monitor = FanHealthMonitor::new(1, HealthThresholds::default());
        for _ in 0..3 {
            monitor.check(50, &[stalled()]);
        }
        let report = monitor.check(50, &[good(50)]);
        assert!(report.recovered.is_empty());
    }

    #[test]
    fn test_all_chronic() {
        let mut monitor = FanHealthMonitor::new(2, HealthThresholds::default());
        let mut report = HealthReport::default();
        for _ in 0..20 {
            report = monitor.check(99, &[stalled(), stalled()]);
        }
        assert_eq!(report.failure_count(), 2);
        assert!(!report.all_chronic);

        let report = monitor.check(99, &[stalled(), stalled()]);
        assert!(report.all_chronic);
    }

    #[test]
    fn test_one_live_fan_prevents_chronic() {
        let mut monitor = FanHealthMonitor::new(2, HealthThresholds::default());
        let mut report = HealthReport::default();
        for _ in 0..30 {
            report = monitor.check(99, &[stalled(), good(99)]);
        }
        assert!(!report.all_chronic);
        assert_eq!(report.failed, vec![0]);
    }

    #[test]
    fn test_missing_samples_count_as_stopped() {
        let mut monitor = FanHealthMonitor::new(2, HealthThresholds::default());
        let report = monitor.check(50, &[good(50)]);
        assert!(report.checks[0].okay);
        assert!(!report.checks[1].okay);
    }
}
