//! Sensor reading for one control iteration
//!
//! Turns raw channel reads into a [`ThermalReading`], applying the
//! per-board plausibility rules: retried reads, server readings that are
//! too hot to be real, server readings that jump, and invalid junction
//! values.

use std::time::Duration;
use swfan_core::board::BoardVariant;
use swfan_core::{Channel, TempSensor, ThermalReading};
use swfan_hardware::{read_with_retry, BusLock, DeviceAccess, RetryPolicy, Watchdog};
use tracing::{debug, error, warn};

/// Junction diode value reported when the sensor is not ready
const JUNCTION_INVALID: i64 = 0xff;

/// Reads every temperature sensor of a board
#[derive(Debug)]
pub struct SensorReader {
    variant: BoardVariant,
    policy: RetryPolicy,
    junction_lock: Option<BusLock>,
    /// Last server temperature passed on to the controllers
    last_server: Option<i32>,
}

impl SensorReader {
    pub fn new(variant: &BoardVariant, policy: RetryPolicy) -> Self {
        let junction_lock = variant
            .junction_lock
            .map(|spec| BusLock::new(spec.path, spec.attempts));
        Self {
            variant: variant.clone(),
            policy,
            junction_lock,
            last_server: None,
        }
    }

    /// Use a different lock file for the junction bus
    pub fn with_junction_lock(mut self, lock: Option<BusLock>) -> Self {
        self.junction_lock = lock;
        self
    }

    /// Read all sensors.
    ///
    /// `previous_server` holds the previous raw server reading and is
    /// updated.
    pub async fn read(
        &mut self,
        device: &mut dyn DeviceAccess,
        watchdog: &mut dyn Watchdog,
        previous_server: &mut Option<i32>,
    ) -> ThermalReading {
        let intake = self.read_temp(device, watchdog, TempSensor::Intake).await;
        let exhaust = self.read_temp(device, watchdog, TempSensor::Exhaust).await;
        let switch = if self.variant.required_sensors.contains(&TempSensor::Switch) {
            self.read_temp(device, watchdog, TempSensor::Switch).await
        } else {
            None
        };

        let server = if self.variant.server_nodes > 0 {
            self.read_server_nodes(device, watchdog).await
        } else {
            let raw = self.read_server(device, watchdog).await;
            self.check_server_change(raw, previous_server)
        };

        let junction = self.read_junction(device, watchdog).await;

        ThermalReading {
            intake,
            exhaust,
            switch,
            server,
            junction,
        }
    }

    async fn read_temp(
        &self,
        device: &mut dyn DeviceAccess,
        watchdog: &mut dyn Watchdog,
        sensor: TempSensor,
    ) -> Option<i32> {
        let channel = Channel::Temperature(sensor);
        match read_with_retry(device, watchdog, &channel, self.policy).await {
            Ok(value) => to_temp(&channel, value),
            Err(e) => {
                warn!("Failed to read {}: {}", channel, e);
                None
            }
        }
    }

    /// Read the server temperature, discarding values too hot to be real
    async fn read_server(
        &self,
        device: &mut dyn DeviceAccess,
        watchdog: &mut dyn Watchdog,
    ) -> Option<i32> {
        let mut value = self.read_temp(device, watchdog, TempSensor::Server).await?;

        if let Some(threshold) = self.variant.server_error_threshold {
            let mut attempts = 0;
            while value > threshold && attempts < self.policy.attempts {
                attempts += 1;
                tokio::time::sleep(self.policy.delay).await;
                if let Some(reread) = self.read_temp(device, watchdog, TempSensor::Server).await {
                    value = reread;
                }
            }
            if value > threshold {
                error!(
                    "Server temperature read error, value: {}",
                    self.variant.external(value)
                );
                return None;
            }
        }

        if let Some(limit) = self.variant.server_bad_above {
            if value > limit {
                warn!(
                    "Ignoring implausible server temperature {}",
                    self.variant.external(value)
                );
                return None;
            }
        }

        Some(value)
    }

    /// Hold the previous value for one iteration when the server reading
    /// jumps
    fn check_server_change(
        &mut self,
        raw: Option<i32>,
        previous_server: &mut Option<i32>,
    ) -> Option<i32> {
        let accepted = match (raw, *previous_server, self.variant.server_max_change) {
            (Some(value), Some(previous), Some(max_change))
                if value.abs_diff(previous) > max_change.unsigned_abs() =>
            {
                error!(
                    "Server temperature changes unnaturally from {} to {}",
                    previous, value
                );
                self.last_server
            }
            _ => raw,
        };
        *previous_server = raw;
        self.last_server = accepted;
        accepted
    }

    /// Hottest thermal margin reported by the server nodes
    async fn read_server_nodes(
        &self,
        device: &mut dyn DeviceAccess,
        watchdog: &mut dyn Watchdog,
    ) -> Option<i32> {
        let mut hottest: Option<i32> = None;
        for node in 1..=self.variant.server_nodes {
            let channel = Channel::Temperature(TempSensor::ServerNode(node));
            match device.read_channel(&channel).await {
                Ok(value) => {
                    if let Some(t) = to_temp(&channel, value) {
                        hottest = Some(hottest.map_or(t, |h| h.max(t)));
                    }
                }
                // Powered-off nodes do not answer
                Err(e) => debug!("No reading from {}: {}", channel, e),
            }
            // Node reads can take seconds each
            if let Err(e) = watchdog.kick().await {
                warn!("Watchdog kick failed: {}", e);
            }
        }
        hottest
    }

    async fn read_junction(
        &self,
        device: &mut dyn DeviceAccess,
        watchdog: &mut dyn Watchdog,
    ) -> Vec<Option<i32>> {
        let sensors = self.variant.junction_channels();
        if sensors.is_empty() {
            return Vec::new();
        }

        let guard = match &self.junction_lock {
            Some(lock) => match lock.acquire(watchdog).await {
                Ok(guard) => Some(guard),
                Err(e) => {
                    error!("Junction sensors unavailable: {}", e);
                    return vec![None; sensors.len()];
                }
            },
            None => None,
        };

        let mut readings = Vec::with_capacity(sensors.len());
        for sensor in sensors {
            let channel = Channel::Temperature(sensor);
            let reading = match device.read_channel(&channel).await {
                Ok(JUNCTION_INVALID) => {
                    warn!("Invalid {} reading 0xff", channel);
                    None
                }
                Ok(value) => to_temp(&channel, value),
                Err(e) => {
                    error!("Failed to read {}: {}", channel, e);
                    None
                }
            };
            readings.push(reading);
        }

        if let Some(guard) = guard {
            if let Err(e) = guard.release().await {
                warn!("Failed to release bus lock: {}", e);
            }
        }
        readings
    }

    /// Wait until any server node reports a valid (negative) thermal margin
    pub async fn wait_for_server(&self, device: &mut dyn DeviceAccess, poll: Duration) {
        loop {
            for node in 1..=self.variant.server_nodes {
                let channel = Channel::Temperature(TempSensor::ServerNode(node));
                if let Ok(value) = device.read_channel(&channel).await {
                    if value < 0 {
                        debug!("{} first valid read of {}", channel, value);
                        return;
                    }
                }
                tokio::time::sleep(poll).await;
            }
        }
    }
}

fn to_temp(channel: &Channel, value: i64) -> Option<i32> {
    match i32::try_from(value) {
        Ok(t) => Some(t),
        Err(_) => {
            warn!("Out of range reading {} from {}", value, channel);
            None
        }
    }
}
