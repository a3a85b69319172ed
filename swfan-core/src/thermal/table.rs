//! Table-lookup controller

use super::{ControlInput, Decision, FanLevels, ThermalController};
use crate::calibration::TemperatureTable;

/// Fan speed from the larger of an intake-table and a CPU-table lookup.
///
/// Ignores hysteresis; the only state honoured is that a failure-driven
/// MAX is held while any fan remains failed.
#[derive(Debug, Clone)]
pub struct TableLookupController {
    levels: FanLevels,
    intake: &'static TemperatureTable,
    cpu: &'static TemperatureTable,
}

impl TableLookupController {
    pub fn new(
        levels: FanLevels,
        intake: &'static TemperatureTable,
        cpu: &'static TemperatureTable,
    ) -> Self {
        Self { levels, intake, cpu }
    }
}

impl ThermalController for TableLookupController {
    fn name(&self) -> &'static str {
        "table-lookup"
    }

    fn levels(&self) -> &FanLevels {
        &self.levels
    }

    fn evaluate(&self, previous: Decision, input: &ControlInput<'_>) -> Decision {
        if previous.percent == self.levels.max && input.failed_fans > 0 {
            return previous;
        }

        let intake_speed = self.intake.lookup(input.reading.intake);
        let cpu_speed = self.cpu.lookup(input.reading.server);
        Decision::at_percent(intake_speed.max(cpu_speed))
    }
}
