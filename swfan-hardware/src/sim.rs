//! Simulated chassis for mock mode and tests
//!
//! Fans follow PWM commands through the board's calibration tables, so a
//! healthy simulated fan always passes the health check. Temperatures are
//! fixed until changed through a [`SimHandle`]. Faults (unreadable
//! channels, stalled fans) can be injected the same way.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use swfan_core::board::{BoardVariant, FanArrayLayout};
use swfan_core::channel::{PwmRegister, TempSensor, Tray};
use swfan_core::pwm::{pwm_unit_to_percent, PwmEncoding, PwmLayout};
use swfan_core::{Channel, FanError, Result};
use tokio::sync::Mutex;
use tracing::debug;

use crate::device::DeviceAccess;

/// Which rotor of which fan a tachometer belongs to
#[derive(Debug, Clone, Copy)]
struct TachSource {
    slot: usize,
    rear: bool,
}

#[derive(Debug)]
struct SimArray {
    layout: FanArrayLayout,
    tachs: HashMap<u32, TachSource>,
    /// Commanded percent per slot
    percent: Vec<u32>,
    stalled: HashSet<usize>,
}

impl SimArray {
    fn new(layout: &FanArrayLayout, boot_percent: u32) -> Self {
        let mut tachs = HashMap::new();
        for (slot, fan) in layout.slots.iter().enumerate() {
            tachs.insert(fan.tach, TachSource { slot, rear: false });
            if let Some(offset) = layout.rear_tach_offset {
                tachs.insert(fan.tach + offset, TachSource { slot, rear: true });
            }
        }
        Self {
            layout: layout.clone(),
            tachs,
            percent: vec![boot_percent; layout.fan_count()],
            stalled: HashSet::new(),
        }
    }

    fn rpm(&self, tach: u32) -> Option<i64> {
        let source = self.tachs.get(&tach)?;
        if self.stalled.contains(&source.slot) {
            return Some(0);
        }
        let percent = self.percent[source.slot];
        let table = match (source.rear, self.layout.rear_table) {
            (true, Some(rear)) => rear,
            _ => self.layout.front_table,
        };
        Some(i64::from(table.rpm_for_percent(percent)))
    }

    /// Slots driven by PWM output `index`
    fn slots_for_pwm(&self, index: u32) -> Vec<usize> {
        match self.layout.pwm.layout {
            PwmLayout::Shared => (0..self.layout.fan_count()).collect(),
            _ => self
                .layout
                .slots
                .iter()
                .enumerate()
                .filter(|(_, s)| s.pwm == index)
                .map(|(i, _)| i)
                .collect(),
        }
    }

    fn write_pwm(&mut self, index: u32, register: PwmRegister, value: &str) -> Result<()> {
        let encoding: PwmEncoding = self.layout.pwm;
        let unit = parse_unit(value)?;
        let percent = match register {
            PwmRegister::Duty | PwmRegister::Falling => Some(pwm_unit_to_percent(&encoding, unit)),
            PwmRegister::Enable if unit == 0 => Some(0),
            _ => None,
        };
        if let Some(percent) = percent {
            for slot in self.slots_for_pwm(index) {
                self.percent[slot] = percent;
            }
        }
        Ok(())
    }
}

fn parse_unit(value: &str) -> Result<u32> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| FanError::Parse(format!("Invalid PWM value '{}': {}", value, e)))
}

#[derive(Debug)]
struct SimState {
    temperatures: HashMap<TempSensor, i64>,
    lower: SimArray,
    upper: Option<SimArray>,
    failing: HashSet<Channel>,
    writes: Vec<(Channel, String)>,
}

impl SimState {
    fn array(&self, tray: Tray) -> Option<&SimArray> {
        match tray {
            Tray::Lower => Some(&self.lower),
            Tray::Upper => self.upper.as_ref(),
        }
    }

    fn array_mut(&mut self, tray: Tray) -> Option<&mut SimArray> {
        match tray {
            Tray::Lower => Some(&mut self.lower),
            Tray::Upper => self.upper.as_mut(),
        }
    }
}

/// In-memory chassis implementing [`DeviceAccess`]
#[derive(Debug, Clone)]
pub struct SimulatedChassis {
    state: Arc<Mutex<SimState>>,
    name: String,
}

/// Control handle for a [`SimulatedChassis`]
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedChassis {
    /// Chassis at comfortable temperatures with every fan at the boot speed
    pub fn new(variant: &BoardVariant) -> Self {
        let scale = i64::from(variant.temp_scale);
        let mut temperatures = HashMap::new();
        temperatures.insert(TempSensor::Intake, 25 * scale);
        temperatures.insert(TempSensor::Exhaust, 35 * scale);
        temperatures.insert(TempSensor::Switch, 45 * scale);
        temperatures.insert(TempSensor::Server, 40 * scale);
        for node in 1..=variant.server_nodes {
            // Thermal margin: degrees below the CPU limit
            temperatures.insert(TempSensor::ServerNode(node), -30);
        }
        for sensor in variant.junction_channels() {
            temperatures.insert(sensor, 60);
        }

        let boot = variant.boot_speed(&variant.levels);
        let state = SimState {
            temperatures,
            lower: SimArray::new(&variant.primary, boot),
            upper: variant
                .secondary
                .as_ref()
                .map(|s| SimArray::new(&s.layout, s.levels.high)),
            failing: HashSet::new(),
            writes: Vec::new(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            name: variant.kind.name().to_string(),
        }
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: self.state.clone(),
        }
    }
}

impl SimHandle {
    /// Set a temperature in internal units (degrees for junction sensors)
    pub async fn set_temperature(&self, sensor: TempSensor, value: i64) {
        self.state.lock().await.temperatures.insert(sensor, value);
    }

    /// Make reads and writes of a channel fail
    pub async fn fail_channel(&self, channel: Channel) {
        self.state.lock().await.failing.insert(channel);
    }

    /// Undo [`SimHandle::fail_channel`]
    pub async fn restore_channel(&self, channel: Channel) {
        self.state.lock().await.failing.remove(&channel);
    }

    /// Stop a fan (0-based slot) regardless of its PWM command
    pub async fn stall_fan(&self, tray: Tray, slot: usize) {
        if let Some(array) = self.state.lock().await.array_mut(tray) {
            array.stalled.insert(slot);
        }
    }

    /// Let a stalled fan spin again
    pub async fn revive_fan(&self, tray: Tray, slot: usize) {
        if let Some(array) = self.state.lock().await.array_mut(tray) {
            array.stalled.remove(&slot);
        }
    }

    /// Percent a fan is currently commanded to
    pub async fn fan_percent(&self, tray: Tray, slot: usize) -> Option<u32> {
        let state = self.state.lock().await;
        state.array(tray)?.percent.get(slot).copied()
    }

    /// Every successful write so far
    pub async fn writes(&self) -> Vec<(Channel, String)> {
        self.state.lock().await.writes.clone()
    }

    /// Last value written to a channel
    pub async fn last_write(&self, channel: &Channel) -> Option<String> {
        let state = self.state.lock().await;
        state
            .writes
            .iter()
            .rev()
            .find(|(c, _)| c == channel)
            .map(|(_, v)| v.clone())
    }

    pub async fn clear_writes(&self) {
        self.state.lock().await.writes.clear();
    }
}

#[async_trait]
impl DeviceAccess for SimulatedChassis {
    async fn read_channel(&mut self, channel: &Channel) -> Result<i64> {
        let state = self.state.lock().await;
        if state.failing.contains(channel) {
            return Err(FanError::Hardware(format!("Simulated read failure: {}", channel)));
        }
        let value = match channel {
            Channel::Temperature(sensor) => state.temperatures.get(sensor).copied(),
            Channel::Tachometer { tray, index } => {
                state.array(*tray).and_then(|array| array.rpm(*index))
            }
            _ => None,
        };
        value.ok_or_else(|| FanError::UnknownChannel(channel.key()))
    }

    async fn write_channel(&mut self, channel: &Channel, value: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.failing.contains(channel) {
            return Err(FanError::Hardware(format!("Simulated write failure: {}", channel)));
        }
        if let Channel::Pwm {
            tray,
            index,
            register,
        } = *channel
        {
            let array = state
                .array_mut(tray)
                .ok_or_else(|| FanError::UnknownChannel(channel.key()))?;
            array.write_pwm(index, register, value)?;
        }
        debug!("Simulated write {} = {}", channel.key(), value);
        state.writes.push((*channel, value.to_string()));
        Ok(())
    }

    fn describe(&self) -> String {
        format!("simulated {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swfan_core::board::BoardKind;

    fn chassis(kind: BoardKind) -> (BoardVariant, SimulatedChassis) {
        let variant = kind.variant().unwrap();
        let sim = SimulatedChassis::new(&variant);
        (variant, sim)
    }

    async fn command(sim: &mut SimulatedChassis, variant: &BoardVariant, percent: u32) {
        for slot in variant.primary.slots {
            for (channel, value) in variant.primary.speed_writes(slot, percent) {
                sim.write_channel(&channel, &value).await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_fans_follow_pwm_commands() {
        let (variant, mut sim) = chassis(BoardKind::Wedge100);
        command(&mut sim, &variant, 50).await;

        let slot = variant.primary.slot(0).unwrap();
        let (front, rear) = variant.primary.tach_channels(slot);
        let front_rpm = sim.read_channel(&front).await.unwrap() as u32;
        let rear_rpm = sim.read_channel(&rear.unwrap()).await.unwrap() as u32;

        let sample = variant.primary.sample(front_rpm, Some(rear_rpm));
        assert!(sample.front_percent.abs_diff(50) <= 5);
        assert!(sample.rear.unwrap().1.abs_diff(50) <= 5);
    }

    #[tokio::test]
    async fn test_shared_pwm_drives_every_fan() {
        let (variant, mut sim) = chassis(BoardKind::Newport);
        let handle = sim.handle();
        command(&mut sim, &variant, 75).await;
        for slot in 0..variant.primary.fan_count() {
            let percent = handle.fan_percent(Tray::Lower, slot).await.unwrap();
            assert!(percent.abs_diff(75) <= 5, "slot {} at {}", slot, percent);
        }
    }

    #[tokio::test]
    async fn test_aspeed_disable_stops_fan() {
        let (variant, mut sim) = chassis(BoardKind::Wedge);
        let handle = sim.handle();
        command(&mut sim, &variant, 0).await;
        assert_eq!(handle.fan_percent(Tray::Lower, 0).await, Some(0));

        command(&mut sim, &variant, 100).await;
        assert_eq!(handle.fan_percent(Tray::Lower, 0).await, Some(100));
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let (variant, mut sim) = chassis(BoardKind::Montara);
        let handle = sim.handle();
        let intake = Channel::Temperature(TempSensor::Intake);

        assert_eq!(sim.read_channel(&intake).await.unwrap(), 25_000);
        handle.set_temperature(TempSensor::Intake, 61_000).await;
        assert_eq!(sim.read_channel(&intake).await.unwrap(), 61_000);

        handle.fail_channel(intake).await;
        assert!(sim.read_channel(&intake).await.is_err());
        handle.restore_channel(intake).await;
        assert!(sim.read_channel(&intake).await.is_ok());

        handle.stall_fan(Tray::Lower, 2).await;
        let slot = variant.primary.slot(2).unwrap();
        let (front, _) = variant.primary.tach_channels(slot);
        assert_eq!(sim.read_channel(&front).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_writes_are_recorded() {
        let (_, mut sim) = chassis(BoardKind::Yosemite);
        let handle = sim.handle();
        let channel: Channel = "power.main".parse().unwrap();
        sim.write_channel(&channel, "0").await.unwrap();
        assert_eq!(handle.last_write(&channel).await.as_deref(), Some("0"));
        assert!(sim
            .read_channel(&Channel::Temperature(TempSensor::ServerNode(4)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_upper_tray_only_on_mavericks() {
        let (_, mut montara) = chassis(BoardKind::Montara);
        let upper_tach: Channel = "upper.tach1".parse().unwrap();
        assert!(montara.read_channel(&upper_tach).await.is_err());

        let (_, mut mav) = chassis(BoardKind::Mavericks);
        assert!(mav.read_channel(&upper_tach).await.unwrap() > 0);
    }
}
