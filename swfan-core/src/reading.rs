//! Per-iteration sensor snapshot

use crate::channel::TempSensor;

/// Temperatures gathered in one control iteration.
///
/// `None` marks a bad reading. Chassis temperatures are in the board's
/// internal units (millidegrees on most boards); junction temperatures are
/// whole degrees as reported by the ASIC diode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThermalReading {
    pub intake: Option<i32>,
    pub exhaust: Option<i32>,
    pub switch: Option<i32>,
    pub server: Option<i32>,
    /// One entry per junction sensor on the board
    pub junction: Vec<Option<i32>>,
}

impl ThermalReading {
    /// Value of a named sensor, if it was read successfully
    pub fn get(&self, sensor: TempSensor) -> Option<i32> {
        match sensor {
            TempSensor::Intake => self.intake,
            TempSensor::Exhaust => self.exhaust,
            TempSensor::Switch => self.switch,
            TempSensor::Server | TempSensor::ServerNode(_) => self.server,
            TempSensor::Junction(n) => self
                .junction
                .get(usize::from(n).wrapping_sub(1))
                .copied()
                .flatten(),
        }
    }

    /// Hottest valid junction reading
    pub fn max_junction(&self) -> Option<i32> {
        self.junction.iter().flatten().copied().max()
    }

    /// True when any junction sensor failed to read
    pub fn junction_bad(&self) -> bool {
        self.junction.iter().any(Option::is_none)
    }
}
