//! Control loop
//!
//! One iteration reads every sensor, applies the shutdown rules, lets the
//! thermal controllers pick a speed per fan array, writes changed speeds,
//! waits for the fans to settle, checks fan health and finally kicks the
//! watchdog. All mutable state lives in a [`ControllerState`] owned by the
//! loop.

pub mod fans;
pub mod sensors;

use swfan_core::board::{BoardVariant, FanArrayLayout, LedColor};
use swfan_core::shutdown::{ShutdownPolicy, ShutdownReason};
use swfan_core::state::{ArrayState, ControllerState};
use swfan_core::thermal::{ControlInput, ThermalController};
use swfan_core::{StaticConfig, ThermalReading, Tray, Tuning};
use swfan_hardware::{DeviceAccess, RetryPolicy, Watchdog};
use tracing::{debug, error, info, warn};

use crate::shutdown;
use crate::signals::StopSignal;
use sensors::SensorReader;

/// Outcome of one iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Shutdown(ShutdownReason),
}

/// Layout of a tray, if the board has it
fn layout_for(variant: &BoardVariant, tray: Tray) -> Option<&FanArrayLayout> {
    match tray {
        Tray::Lower => Some(&variant.primary),
        Tray::Upper => variant.secondary.as_ref().map(|s| &s.layout),
    }
}

fn format_temp(value: Option<i32>) -> String {
    match value {
        Some(t) => t.to_string(),
        None => "bad".to_string(),
    }
}

/// The fan control loop for one chassis
pub struct ControlLoop {
    variant: BoardVariant,
    tuning: Tuning,
    config: StaticConfig,
    device: Box<dyn DeviceAccess>,
    watchdog: Box<dyn Watchdog>,
    primary: Box<dyn ThermalController>,
    secondary: Option<Box<dyn ThermalController>>,
    policy: ShutdownPolicy,
    sensors: SensorReader,
    state: ControllerState,
}

impl ControlLoop {
    pub fn new(
        variant: BoardVariant,
        tuning: Tuning,
        config: StaticConfig,
        device: Box<dyn DeviceAccess>,
        watchdog: Box<dyn Watchdog>,
    ) -> Self {
        let primary = tuning.primary_controller(&variant);
        let secondary = tuning.secondary_controller(&variant);
        let policy = tuning.shutdown_policy(&variant);
        let sensors = SensorReader::new(
            &variant,
            RetryPolicy::new(tuning.read_attempts, config.sensors.retry_delay()),
        );

        let lower = ArrayState::new(
            Tray::Lower,
            variant.primary.fan_count(),
            tuning.health,
            primary.initial(),
            variant.boot_speed(&tuning.levels),
        );
        let upper = match (&variant.secondary, &secondary) {
            (Some(array), Some(controller)) => Some(ArrayState::new(
                Tray::Upper,
                array.layout.fan_count(),
                tuning.health,
                controller.initial(),
                array.levels.high,
            )),
            _ => None,
        };

        Self {
            variant,
            tuning,
            config,
            device,
            watchdog,
            primary,
            secondary,
            policy,
            sensors,
            state: ControllerState::new(lower, upper),
        }
    }

    /// Replace the sensor reader (used to point the junction bus lock
    /// elsewhere)
    pub fn with_sensors(mut self, sensors: SensorReader) -> Self {
        self.sensors = sensors;
        self
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Bring the fans to their boot speed and arm the watchdog
    pub async fn startup(&mut self) {
        info!(
            "Starting up {} ({} via {}): system should have {} fans",
            self.variant.kind,
            self.primary.name(),
            self.device.describe(),
            self.variant.primary.fan_count()
                + self.variant.secondary.as_ref().map_or(0, |s| s.layout.fan_count())
        );

        let arrays: Vec<(Tray, u32)> = self
            .state
            .arrays()
            .map(|a| (a.tray, a.commanded_percent))
            .collect();
        for (tray, percent) in arrays {
            let Some(layout) = layout_for(&self.variant, tray) else {
                continue;
            };
            if let Err(e) = fans::set_speed(self.device.as_mut(), layout, percent).await {
                error!("Failed to set {} tray boot speed: {}", tray.as_str(), e);
            }
            if let Err(e) = fans::set_all_leds(self.device.as_mut(), layout, LedColor::Nominal).await
            {
                warn!("Failed to set {} tray LEDs: {}", tray.as_str(), e);
            }
        }

        if !self.tuning.secondary_enabled() {
            if let Some(upper) = self.state.upper.as_mut() {
                upper.monitored = false;
                error!("*** Not accessing upper fan tray anymore ***");
            }
        }

        if self.variant.await_server_reading {
            info!("Waiting for a valid server reading");
            self.sensors
                .wait_for_server(self.device.as_mut(), self.config.control.interval())
                .await;
        }

        if let Err(e) = self.watchdog.start(true).await {
            error!("Failed to start watchdog: {}", e);
        }
        self.watchdog.set_persistent(true);

        tokio::time::sleep(self.config.control.boot_settle()).await;
    }

    /// Run one control iteration
    pub async fn iterate(&mut self) -> Step {
        self.state.iterations += 1;

        let reading = self
            .sensors
            .read(
                self.device.as_mut(),
                self.watchdog.as_mut(),
                &mut self.state.previous_server,
            )
            .await;

        if let Some(reason) = self.policy.record_reads(&mut self.state.faults, &reading) {
            if self.shutdown_confirmed(reason).await {
                return Step::Shutdown(reason);
            }
        }

        let report_due =
            (self.state.iterations - 1) % u64::from(self.tuning.report_interval) == 0;
        if report_due || self.policy.any_limit_exceeded(&reading) {
            self.report(&reading);
        }

        if let Some(reason) = self.policy.check_limits(&mut self.state.faults, &reading) {
            if let ShutdownReason::LimitExceeded {
                sensor,
                value,
                limit,
            } = reason
            {
                error!(
                    "{} temperature {} above limit {}",
                    sensor.label(),
                    value,
                    limit
                );
            }
            if self.shutdown_confirmed(reason).await {
                return Step::Shutdown(reason);
            }
        }

        self.update_speeds(&reading).await;

        // Fans need time to reach the new speed before they are measured
        tokio::time::sleep(self.config.control.interval()).await;

        let mut reason = self.check_array(Tray::Lower).await;
        if self.upper_monitored() {
            let upper = self.check_array(Tray::Upper).await;
            reason = reason.or(upper);
        }
        self.log_degraded();

        if let Some(reason) = reason {
            if self.shutdown_confirmed(reason).await {
                return Step::Shutdown(reason);
            }
        }

        if let Err(e) = self.watchdog.kick().await {
            warn!("Watchdog kick failed: {}", e);
        }
        Step::Continue
    }

    /// Iterate until a shutdown is required
    pub async fn run_until_shutdown(&mut self) -> ShutdownReason {
        loop {
            if let Step::Shutdown(reason) = self.iterate().await {
                return reason;
            }
        }
    }

    /// Fans to max, then the power-off sequence. Returns the exit code.
    pub async fn shutdown(&mut self, reason: ShutdownReason) -> i32 {
        self.all_fans_max().await;
        shutdown::power_down(
            self.device.as_mut(),
            self.watchdog.as_mut(),
            &self.variant.power,
            &self.config.shutdown,
            reason,
        )
        .await
    }

    /// Fans to max on an operator signal. Returns the exit code.
    pub async fn handle_signal(&mut self, signal: StopSignal) -> i32 {
        self.all_fans_max().await;
        warn!("Shutting down swfand on signal {}", signal.name());
        if signal.stops_watchdog() {
            if let Err(e) = self.watchdog.stop().await {
                error!("Failed to stop watchdog: {}", e);
            }
        }
        shutdown::EXIT_SIGNAL
    }

    /// Command every fan of every array to its maximum speed
    pub async fn all_fans_max(&mut self) {
        let arrays: Vec<Tray> = self.state.arrays().map(|a| a.tray).collect();
        for tray in arrays {
            let decision = match tray {
                Tray::Lower => self.primary.failure_override(),
                Tray::Upper => match &self.secondary {
                    Some(controller) => controller.failure_override(),
                    None => continue,
                },
            };
            if let Some(array) = self.state.array_mut(tray) {
                array.force(decision);
            }
            let Some(layout) = layout_for(&self.variant, tray) else {
                continue;
            };
            let limit = self.config.shutdown.write_timeout();
            if let Err(e) =
                fans::set_speed_within(self.device.as_mut(), layout, decision.percent, limit).await
            {
                error!("Failed to set {} tray to max: {}", tray.as_str(), e);
            }
        }
    }

    fn upper_monitored(&self) -> bool {
        self.state.upper.as_ref().map_or(false, |a| a.monitored)
    }

    /// Skip a triggered shutdown when the inhibit marker exists
    async fn shutdown_confirmed(&self, reason: ShutdownReason) -> bool {
        let marker = &self.config.shutdown.inhibit_file;
        if shutdown::inhibited(marker).await {
            warn!(
                "Shutdown ({}) inhibited by {}",
                reason,
                marker.display()
            );
            return false;
        }
        true
    }

    fn report(&self, reading: &ThermalReading) {
        let lower = &self.state.lower;
        if self.variant.server_nodes > 0 {
            info!(
                "Temp intake {}, max server {}, exhaust {}, fan speed {}, speed changes {}",
                format_temp(reading.intake),
                format_temp(reading.server),
                format_temp(reading.exhaust),
                lower.commanded_percent,
                lower.speed_changes
            );
        } else {
            info!(
                "Temp intake {}, switch {}, server {}, exhaust {}, fan speed {}, speed changes {}",
                format_temp(reading.intake),
                format_temp(reading.switch),
                format_temp(reading.server),
                format_temp(reading.exhaust),
                lower.commanded_percent,
                lower.speed_changes
            );
        }
        if !reading.junction.is_empty() {
            let junction: Vec<String> = reading.junction.iter().map(|t| format_temp(*t)).collect();
            info!("Temp junction {}", junction.join(", "));
        }
        if let Some(upper) = self.state.upper.as_ref().filter(|a| a.monitored) {
            info!(
                "Upper fan speed {}, speed changes {}",
                upper.commanded_percent, upper.speed_changes
            );
        }
    }

    /// Evaluate the controllers and write every changed speed
    async fn update_speeds(&mut self, reading: &ThermalReading) {
        let lower = self.primary.evaluate(
            self.state.lower.decision,
            &ControlInput {
                reading,
                failed_fans: self.state.lower.failed_fans,
            },
        );
        if let Some((from, to)) = self.state.lower.apply(lower) {
            info!("Fan speed changing from {} to {}", from, to);
            if let Err(e) = fans::set_speed(self.device.as_mut(), &self.variant.primary, to).await {
                error!("Failed to set fan speed: {}", e);
            }
        }

        if !self.upper_monitored() {
            return;
        }
        let (Some(controller), Some(upper), Some(layout)) = (
            &self.secondary,
            self.state.upper.as_mut(),
            self.variant.secondary.as_ref().map(|s| &s.layout),
        ) else {
            return;
        };
        let decision = controller.evaluate(
            upper.decision,
            &ControlInput {
                reading,
                failed_fans: upper.failed_fans,
            },
        );
        if let Some((from, to)) = upper.apply(decision) {
            info!("Upper fan speed changing from {} to {}", from, to);
            if let Err(e) = fans::set_speed(self.device.as_mut(), layout, to).await {
                error!("Failed to set upper fan speed: {}", e);
            }
        }
    }

    /// Check fan health of one array, forcing it to max while any fan is
    /// failed
    async fn check_array(&mut self, tray: Tray) -> Option<ShutdownReason> {
        let layout = layout_for(&self.variant, tray)?;
        let failure_override = match tray {
            Tray::Lower => self.primary.failure_override(),
            Tray::Upper => self.secondary.as_ref()?.failure_override(),
        };
        let samples = fans::read_samples(self.device.as_mut(), layout).await;
        let array = self.state.array_mut(tray)?;
        let report = array.health.check(array.commanded_percent, &samples);
        let prefix = match tray {
            Tray::Lower => "",
            Tray::Upper => "upper ",
        };

        for check in &report.checks {
            let sample = &check.sample;
            let rear = match sample.rear {
                Some((rpm, percent)) => format!("rear {} ({}%), ", rpm, percent),
                None => String::new(),
            };
            if check.okay {
                debug!(
                    "{}fan {} {}front {} ({}%), expected {}",
                    prefix,
                    check.slot,
                    rear,
                    sample.front_rpm,
                    sample.front_percent,
                    array.commanded_percent
                );
            } else {
                warn!(
                    "{}fan {} {}front {} ({}%), expected {}",
                    prefix,
                    check.slot,
                    rear,
                    sample.front_rpm,
                    sample.front_percent,
                    array.commanded_percent
                );
            }
        }

        for &slot in &report.recovered {
            error!("{}Fan {} has recovered", prefix, slot);
            if let Err(e) = fans::set_led(self.device.as_mut(), layout, slot, LedColor::Nominal).await
            {
                warn!("Failed to reset LED of fan {}: {}", slot, e);
            }
        }

        array.failed_fans = report.failure_count();
        if report.failed.is_empty() {
            if let Err(e) = fans::set_led_debug_mode(self.device.as_mut(), layout, false).await {
                warn!("Failed to clear LED debug mode: {}", e);
            }
            return None;
        }

        // Fault colours only show with debug mode on
        if let Err(e) = fans::set_led_debug_mode(self.device.as_mut(), layout, true).await {
            warn!("Failed to set LED debug mode: {}", e);
        }
        for &slot in &report.failed {
            if let Err(e) = fans::set_led(self.device.as_mut(), layout, slot, LedColor::Fault).await {
                warn!("Failed to set fault LED of fan {}: {}", slot, e);
            }
        }
        if report.failure_count_changed {
            error!("{} {}fans failed", report.failure_count(), prefix);
        }

        // Remaining fans run flat out; failed ones stay powered in case
        // they are all that is left
        array.force(failure_override);
        if let Err(e) =
            fans::set_speed(self.device.as_mut(), layout, failure_override.percent).await
        {
            error!("Failed to set {}fans to max: {}", prefix, e);
        }

        self.policy.check_fans(tray, &report)
    }

    fn log_degraded(&self) {
        for array in self.state.arrays().filter(|a| a.monitored) {
            let prefix = match array.tray {
                Tray::Lower => "",
                Tray::Upper => "upper ",
            };
            for fan in array.health.fans() {
                if fan.bad_count > 0 {
                    error!("{}fan {} bad {}", prefix, fan.slot, fan.bad_count);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use swfan_core::channel::{Channel, LedRegister, PowerRail, TempSensor};
    use swfan_core::thermal::ControllerLevel;
    use swfan_core::{BoardKind, Result, TuningOverrides};
    use swfan_hardware::{BusLock, NullWatchdog, SimHandle, SimulatedChassis, WatchdogActivity};
    use tempfile::TempDir;

    /// Simulated chassis whose PWM writes never complete
    struct StuckFans {
        inner: SimulatedChassis,
    }

    #[async_trait]
    impl DeviceAccess for StuckFans {
        async fn read_channel(&mut self, channel: &Channel) -> Result<i64> {
            self.inner.read_channel(channel).await
        }

        async fn write_channel(&mut self, channel: &Channel, value: &str) -> Result<()> {
            if matches!(channel, Channel::Pwm { .. }) {
                std::future::pending::<()>().await;
            }
            self.inner.write_channel(channel, value).await
        }

        fn describe(&self) -> String {
            "stuck fans".to_string()
        }
    }

    fn stuck_fan_loop(
        kind: BoardKind,
        dir: &TempDir,
    ) -> (ControlLoop, SimHandle, Arc<WatchdogActivity>) {
        let variant = kind.variant().unwrap();
        let chassis = SimulatedChassis::new(&variant);
        let sim = chassis.handle();
        let wd = NullWatchdog::new();
        let watchdog = wd.activity();

        let mut config = StaticConfig::default();
        config.shutdown.inhibit_file = dir.path().join("not_shutdown");
        let (tuning, _) = Tuning::resolve(&variant, &config, &TuningOverrides::default());
        let control = ControlLoop::new(
            variant,
            tuning,
            config,
            Box::new(StuckFans { inner: chassis }),
            Box::new(wd),
        );
        (control, sim, watchdog)
    }

    struct Harness {
        control: ControlLoop,
        sim: SimHandle,
        watchdog: Arc<WatchdogActivity>,
        variant: BoardVariant,
        dir: TempDir,
    }

    fn harness(kind: BoardKind, overrides: TuningOverrides) -> Harness {
        let dir = TempDir::new().unwrap();
        let variant = kind.variant().unwrap();
        let chassis = SimulatedChassis::new(&variant);
        let sim = chassis.handle();
        let wd = NullWatchdog::new();
        let watchdog = wd.activity();

        let mut config = StaticConfig::default();
        config.shutdown.inhibit_file = dir.path().join("not_shutdown");
        let (tuning, warnings) = Tuning::resolve(&variant, &config, &overrides);
        assert!(warnings.is_empty(), "{:?}", warnings);

        let sensors = SensorReader::new(
            &variant,
            RetryPolicy::new(config.sensors.read_attempts, config.sensors.retry_delay()),
        )
        .with_junction_lock(Some(BusLock::new(dir.path().join("bus_lock"), 5)));
        let control = ControlLoop::new(
            variant.clone(),
            tuning,
            config,
            Box::new(chassis),
            Box::new(wd),
        )
        .with_sensors(sensors);

        Harness {
            control,
            sim,
            watchdog,
            variant,
            dir,
        }
    }

    fn speed_writes(layout: &FanArrayLayout, percent: u32) -> Vec<(Channel, String)> {
        layout
            .slots
            .iter()
            .flat_map(|slot| layout.speed_writes(slot, percent))
            .collect()
    }

    async fn assert_written(sim: &SimHandle, layout: &FanArrayLayout, percent: u32) {
        let writes = sim.writes().await;
        for write in speed_writes(layout, percent) {
            assert!(writes.contains(&write), "missing {:?}", write);
        }
    }

    async fn assert_speed_written(h: &Harness, percent: u32) {
        assert_written(&h.sim, &h.variant.primary, percent).await;
    }

    fn upper_layout(h: &Harness) -> &FanArrayLayout {
        &h.variant.secondary.as_ref().unwrap().layout
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_sets_boot_speed_and_arms_watchdog() {
        let mut h = harness(BoardKind::Wedge, TuningOverrides::default());
        h.control.startup().await;

        assert_speed_written(&h, 70).await;
        let led = Channel::Led {
            tray: Tray::Lower,
            index: 1,
            register: LedRegister::Control,
        };
        assert_eq!(h.sim.last_write(&led).await.as_deref(), Some("1"));
        assert!(h.watchdog.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_newport_boots_at_fixed_speed() {
        let mut h = harness(BoardKind::Newport, TuningOverrides::default());
        h.control.startup().await;

        assert_eq!(h.control.state().lower.commanded_percent, 80);
        assert_speed_written(&h, 80).await;

        // Boot speed is no controller level: HIGH cools to MEDIUM
        assert_eq!(h.control.iterate().await, Step::Continue);
        assert_eq!(h.control.state().lower.commanded_percent, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_medium_high_then_sensor_loss() {
        let overrides = TuningOverrides {
            medium: Some(55),
            high: Some(70),
            ..TuningOverrides::default()
        };
        let mut h = harness(BoardKind::Wedge, overrides);
        h.control.startup().await;
        assert_eq!(h.control.state().lower.commanded_percent, 70);

        h.sim.set_temperature(TempSensor::Switch, 50_000).await;
        h.sim.set_temperature(TempSensor::Server, 30_000).await;
        h.sim.clear_writes().await;
        assert_eq!(h.control.iterate().await, Step::Continue);
        assert_eq!(
            h.control.state().lower.decision.level,
            Some(ControllerLevel::Medium)
        );
        assert_speed_written(&h, 55).await;
        assert_eq!(h.control.state().lower.speed_changes, 1);

        h.sim.set_temperature(TempSensor::Switch, 75_000).await;
        h.sim.clear_writes().await;
        assert_eq!(h.control.iterate().await, Step::Continue);
        assert_eq!(
            h.control.state().lower.decision.level,
            Some(ControllerLevel::High)
        );
        assert_speed_written(&h, 70).await;

        h.sim
            .fail_channel(Channel::Temperature(TempSensor::Intake))
            .await;
        for _ in 0..3 {
            assert_eq!(h.control.iterate().await, Step::Continue);
        }
        assert_eq!(
            h.control.iterate().await,
            Step::Shutdown(ShutdownReason::SensorsUnreadable)
        );
        assert_eq!(
            ShutdownReason::SensorsUnreadable.to_string(),
            "sensors unreadable"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_temperature_writes_nothing() {
        let mut h = harness(BoardKind::Wedge, TuningOverrides::default());
        h.control.startup().await;
        h.sim.set_temperature(TempSensor::Switch, 65_000).await;
        h.sim.set_temperature(TempSensor::Server, 30_000).await;

        // 65 + 6 is not below 70: stays HIGH
        h.sim.clear_writes().await;
        for _ in 0..3 {
            assert_eq!(h.control.iterate().await, Step::Continue);
        }
        assert!(h.sim.writes().await.is_empty());
        assert_eq!(h.control.state().lower.speed_changes, 0);
        assert_eq!(h.watchdog.kicks(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_intake_limit_shuts_down() {
        let mut h = harness(BoardKind::Wedge100, TuningOverrides::default());
        h.control.startup().await;
        h.sim.set_temperature(TempSensor::Intake, 61_000).await;

        let step = h.control.iterate().await;
        assert!(matches!(
            step,
            Step::Shutdown(ShutdownReason::LimitExceeded {
                sensor: TempSensor::Intake,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inhibit_marker_keeps_running() {
        let mut h = harness(BoardKind::Wedge100, TuningOverrides::default());
        std::fs::write(h.dir.path().join("not_shutdown"), b"").unwrap();
        h.control.startup().await;
        h.sim.set_temperature(TempSensor::Intake, 61_000).await;

        assert_eq!(h.control.iterate().await, Step::Continue);
        assert_eq!(h.watchdog.kicks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fan_forces_max_then_recovers() {
        let mut h = harness(BoardKind::Wedge, TuningOverrides::default());
        h.control.startup().await;
        h.sim.stall_fan(Tray::Lower, 1).await;

        for _ in 0..4 {
            assert_eq!(h.control.iterate().await, Step::Continue);
            assert_eq!(h.control.state().lower.failed_fans, 0);
        }
        assert_eq!(h.control.iterate().await, Step::Continue);
        assert_eq!(h.control.state().lower.failed_fans, 1);
        assert_eq!(h.control.state().lower.commanded_percent, 99);
        assert_speed_written(&h, 99).await;

        let led = Channel::Led {
            tray: Tray::Lower,
            index: h.variant.primary.slots[1].led,
            register: LedRegister::Control,
        };
        assert_eq!(h.sim.last_write(&led).await.as_deref(), Some("0"));

        // Still failed: speed is frozen at max
        assert_eq!(h.control.iterate().await, Step::Continue);
        assert_eq!(h.control.state().lower.commanded_percent, 99);

        h.sim.revive_fan(Tray::Lower, 1).await;
        assert_eq!(h.control.iterate().await, Step::Continue);
        assert_eq!(h.control.state().lower.failed_fans, 0);
        assert_eq!(h.sim.last_write(&led).await.as_deref(), Some("1"));

        // No failures left: MAX steps down to HIGH
        assert_eq!(h.control.iterate().await, Step::Continue);
        assert_eq!(
            h.control.state().lower.decision.level,
            Some(ControllerLevel::High)
        );
        assert_eq!(h.control.state().lower.commanded_percent, 70);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_fans_dead_shuts_down() {
        let mut h = harness(BoardKind::Wedge100, TuningOverrides::default());
        h.control.startup().await;
        for slot in 0..5 {
            h.sim.stall_fan(Tray::Lower, slot).await;
        }

        for _ in 0..20 {
            assert_eq!(h.control.iterate().await, Step::Continue);
        }
        assert_eq!(
            h.control.iterate().await,
            Step::Shutdown(ShutdownReason::TotalFanFailure(Tray::Lower))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_newport_fault_enables_led_debug_mode() {
        let mut h = harness(BoardKind::Newport, TuningOverrides::default());
        h.control.startup().await;
        h.sim.stall_fan(Tray::Lower, 0).await;

        for _ in 0..5 {
            h.control.iterate().await;
        }
        assert_eq!(h.control.state().lower.failed_fans, 1);
        assert_eq!(
            h.sim.last_write(&Channel::LedDebugMode).await.as_deref(),
            Some("1")
        );

        h.sim.revive_fan(Tray::Lower, 0).await;
        h.control.iterate().await;
        assert_eq!(
            h.sim.last_write(&Channel::LedDebugMode).await.as_deref(),
            Some("0")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_upper_tray_follows_junction() {
        let mut h = harness(BoardKind::Mavericks, TuningOverrides::default());
        h.control.startup().await;
        assert_written(&h.sim, upper_layout(&h), 70).await;

        h.sim.set_temperature(TempSensor::Junction(1), 90).await;
        assert_eq!(h.control.iterate().await, Step::Continue);
        let upper = h.control.state().upper.as_ref().unwrap();
        assert_eq!(upper.decision.level, Some(ControllerLevel::Max));
        assert_written(&h.sim, upper_layout(&h), 100).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_base_temperature_drops_upper_tray() {
        let overrides = TuningOverrides {
            base_temperature: Some(90),
            ..TuningOverrides::default()
        };
        let mut h = harness(BoardKind::Mavericks, overrides);
        h.control.startup().await;
        assert!(!h.control.state().upper.as_ref().unwrap().monitored);

        h.sim.set_temperature(TempSensor::Junction(1), 95).await;
        h.sim.stall_fan(Tray::Upper, 0).await;
        h.sim.clear_writes().await;
        for _ in 0..6 {
            assert_eq!(h.control.iterate().await, Step::Continue);
        }
        let upper_writes = h
            .sim
            .writes()
            .await
            .into_iter()
            .filter(|(c, _)| matches!(c, Channel::Pwm { tray: Tray::Upper, .. }))
            .count();
        assert_eq!(upper_writes, 0);
        assert_eq!(h.control.state().upper.as_ref().unwrap().failed_fans, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_yosemite_table_lookup() {
        let mut h = harness(BoardKind::Yosemite, TuningOverrides::default());
        h.control.startup().await;

        assert_eq!(h.control.iterate().await, Step::Continue);
        let decision = h.control.state().lower.decision;
        assert_eq!(decision.level, None);
        assert_eq!(h.control.state().lower.commanded_percent, decision.percent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_runs_power_sequence() {
        let mut h = harness(BoardKind::Wedge, TuningOverrides::default());
        h.control.startup().await;
        h.sim.clear_writes().await;

        let code = h.control.shutdown(ShutdownReason::SensorsUnreadable).await;
        assert_eq!(code, shutdown::EXIT_SHUTDOWN);
        assert_speed_written(&h, 99).await;
        assert_eq!(
            h.sim
                .last_write(&Channel::Power(PowerRail::Server))
                .await
                .as_deref(),
            Some("0")
        );
        assert_eq!(
            h.sim
                .last_write(&Channel::Power(PowerRail::Switch))
                .await
                .as_deref(),
            Some("1")
        );
        assert!(h
            .sim
            .last_write(&Channel::Power(PowerRail::HotSwap))
            .await
            .is_none());
        assert!(!h.watchdog.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_sets_max_and_stops_watchdog() {
        let mut h = harness(BoardKind::Mavericks, TuningOverrides::default());
        h.control.startup().await;
        h.sim.clear_writes().await;

        assert_eq!(
            h.control.handle_signal(StopSignal::Terminate).await,
            shutdown::EXIT_SIGNAL
        );
        assert!(h.watchdog.is_running());
        assert_speed_written(&h, 100).await;
        assert_written(&h.sim, upper_layout(&h), 100).await;

        h.control.handle_signal(StopSignal::User1).await;
        assert!(!h.watchdog.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_survives_hung_fan_writes() {
        let dir = TempDir::new().unwrap();
        let (mut control, sim, watchdog) = stuck_fan_loop(BoardKind::Wedge, &dir);
        control.watchdog.start(true).await.unwrap();

        let code = tokio::time::timeout(
            Duration::from_secs(600),
            control.shutdown(ShutdownReason::SensorsUnreadable),
        )
        .await
        .unwrap();

        assert_eq!(code, shutdown::EXIT_SHUTDOWN);
        assert_eq!(
            sim.last_write(&Channel::Power(PowerRail::Server))
                .await
                .as_deref(),
            Some("0")
        );
        assert_eq!(
            sim.last_write(&Channel::Power(PowerRail::Switch))
                .await
                .as_deref(),
            Some("1")
        );
        assert!(!watchdog.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_survives_hung_fan_writes() {
        let dir = TempDir::new().unwrap();
        let (mut control, _sim, watchdog) = stuck_fan_loop(BoardKind::Mavericks, &dir);
        control.watchdog.start(true).await.unwrap();

        let code = tokio::time::timeout(
            Duration::from_secs(600),
            control.handle_signal(StopSignal::User1),
        )
        .await
        .unwrap();

        assert_eq!(code, shutdown::EXIT_SIGNAL);
        assert!(!watchdog.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_bad_read_threshold_falls_back() {
        let dir = TempDir::new().unwrap();
        let variant = BoardKind::Wedge100.variant().unwrap();
        let chassis = SimulatedChassis::new(&variant);

        let mut config = StaticConfig::default();
        config.shutdown.inhibit_file = dir.path().join("not_shutdown");
        config.sensors.bad_read_threshold = 0;
        config.sensors.read_attempts = 0;
        let (tuning, warnings) = Tuning::resolve(&variant, &config, &TuningOverrides::default());
        assert_eq!(warnings.len(), 2, "{:?}", warnings);

        let mut control = ControlLoop::new(
            variant,
            tuning,
            config,
            Box::new(chassis),
            Box::new(NullWatchdog::new()),
        );
        control.startup().await;
        assert_eq!(control.iterate().await, Step::Continue);
        assert_eq!(control.iterate().await, Step::Continue);
    }
}
