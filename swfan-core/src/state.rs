//! Controller state carried between iterations

use crate::channel::Tray;
use crate::health::{FanHealthMonitor, HealthThresholds};
use crate::shutdown::SensorFaultState;
use crate::thermal::Decision;

/// State of one fan array
#[derive(Debug, Clone)]
pub struct ArrayState {
    pub tray: Tray,
    /// Last controller decision
    pub decision: Decision,
    /// Percent currently written to the fans
    pub commanded_percent: u32,
    pub health: FanHealthMonitor,
    /// Failed fans at the last health check
    pub failed_fans: usize,
    /// Number of controller-driven speed changes (observability only)
    pub speed_changes: u64,
    /// Health checks run for this array
    pub monitored: bool,
}

impl ArrayState {
    pub fn new(
        tray: Tray,
        fan_count: usize,
        thresholds: HealthThresholds,
        initial: Decision,
        boot_percent: u32,
    ) -> Self {
        Self {
            tray,
            decision: initial,
            commanded_percent: boot_percent,
            health: FanHealthMonitor::new(fan_count, thresholds),
            failed_fans: 0,
            speed_changes: 0,
            monitored: true,
        }
    }

    /// Record a controller decision.
    ///
    /// Returns `Some((from, to))` when the fans must be rewritten: the
    /// percent changed and no fan of the array is failed.
    pub fn apply(&mut self, decision: Decision) -> Option<(u32, u32)> {
        self.decision = decision;
        if self.failed_fans > 0 || decision.percent == self.commanded_percent {
            return None;
        }
        let from = self.commanded_percent;
        self.commanded_percent = decision.percent;
        self.speed_changes += 1;
        Some((from, decision.percent))
    }

    /// Force the failure decision; the fans must be rewritten
    pub fn force(&mut self, decision: Decision) {
        self.decision = decision;
        self.commanded_percent = decision.percent;
    }
}

/// Whole-daemon control state
#[derive(Debug, Clone)]
pub struct ControllerState {
    pub lower: ArrayState,
    pub upper: Option<ArrayState>,
    pub faults: SensorFaultState,
    /// Previous raw server reading, for the plausibility check
    pub previous_server: Option<i32>,
    /// Iterations run so far
    pub iterations: u64,
}

impl ControllerState {
    pub fn new(lower: ArrayState, upper: Option<ArrayState>) -> Self {
        Self {
            lower,
            upper,
            faults: SensorFaultState::default(),
            previous_server: None,
            iterations: 0,
        }
    }

    /// All arrays, lower first
    pub fn arrays(&self) -> impl Iterator<Item = &ArrayState> {
        std::iter::once(&self.lower).chain(self.upper.iter())
    }

    /// Array for a tray
    pub fn array_mut(&mut self, tray: Tray) -> Option<&mut ArrayState> {
        match tray {
            Tray::Lower => Some(&mut self.lower),
            Tray::Upper => self.upper.as_mut(),
        }
    }
}
