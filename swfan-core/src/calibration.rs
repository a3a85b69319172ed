//! Calibration tables
//!
//! The measured RPM of a fan does not map linearly to the requested duty
//! cycle, and on coaxial (back-to-back) fan pairs the rear fan pulls still
//! air while the front fan gets a boost from it, so front and rear need their
//! own tables. The tables below come from hardware characterisation and are
//! used to turn a tachometer reading back into the percentage domain the
//! controller commands in.
//!
//! Temperature tables map a sensor reading to a fan percentage by step
//! lookup; they drive the table-lookup controller.

/// One `(percent, rpm)` calibration sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationPoint {
    /// Commanded duty (percent)
    pub percent: u32,
    /// Measured speed at that duty
    pub rpm: u32,
}

const fn cp(percent: u32, rpm: u32) -> CalibrationPoint {
    CalibrationPoint { percent, rpm }
}

/// RPM → percent calibration table, strictly increasing by rpm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationTable {
    /// Table name for logs
    pub name: &'static str,
    /// Samples sorted ascending by rpm
    pub points: &'static [CalibrationPoint],
}

impl CalibrationTable {
    /// Convert a measured RPM to a percentage of full speed.
    ///
    /// - Below the first sample the result is extrapolated linearly towards
    ///   zero (`rpm * first.percent / first.rpm`), so a stalling fan reads as
    ///   slow rather than exactly off.
    /// - At or above the last sample the result clamps to the last percent.
    /// - Otherwise the value is interpolated between the bracketing samples,
    ///   measured back from the upper one.
    pub fn rpm_to_percent(&self, rpm: u32) -> u32 {
        let Some(first) = self.points.first() else {
            return 0;
        };

        let i = self
            .points
            .iter()
            .position(|p| p.rpm > rpm)
            .unwrap_or(self.points.len());

        if i == 0 {
            if first.rpm == 0 {
                return first.percent;
            }
            return (u64::from(rpm) * u64::from(first.percent) / u64::from(first.rpm)) as u32;
        }
        if i == self.points.len() {
            return self.points[i - 1].percent;
        }

        let upper = self.points[i];
        let lower = self.points[i - 1];
        let percent_diff = i64::from(upper.percent) - i64::from(lower.percent);
        let rpm_diff = i64::from(upper.rpm) - i64::from(lower.rpm);
        let fan_diff = i64::from(upper.rpm) - i64::from(rpm);

        (i64::from(upper.percent) - fan_diff * percent_diff / rpm_diff).max(0) as u32
    }

    /// Expected RPM for a commanded percentage (inverse lookup).
    ///
    /// Used to model healthy fans; clamps to the table ends.
    pub fn rpm_for_percent(&self, percent: u32) -> u32 {
        let Some(first) = self.points.first() else {
            return 0;
        };
        if percent == 0 {
            return 0;
        }
        if percent <= first.percent {
            if first.percent == 0 {
                return first.rpm;
            }
            return (u64::from(first.rpm) * u64::from(percent) / u64::from(first.percent)) as u32;
        }

        for window in self.points.windows(2) {
            let (lo, hi) = (window[0], window[1]);
            if percent <= hi.percent {
                if hi.percent == lo.percent {
                    return hi.rpm;
                }
                let span = u64::from(hi.rpm - lo.rpm);
                let offset = u64::from(percent - lo.percent);
                return lo.rpm + (span * offset / u64::from(hi.percent - lo.percent)) as u32;
            }
        }

        self.points[self.points.len() - 1].rpm
    }

    /// Validate the table shape.
    pub fn validate(&self) -> Result<(), String> {
        if self.points.is_empty() {
            return Err(format!("Calibration table '{}' is empty", self.name));
        }
        if self.points[0].rpm == 0 {
            return Err(format!(
                "Calibration table '{}' starts at 0 RPM",
                self.name
            ));
        }
        for window in self.points.windows(2) {
            if window[0].rpm >= window[1].rpm {
                return Err(format!(
                    "Calibration table '{}' is not strictly increasing by rpm: {} >= {}",
                    self.name, window[0].rpm, window[1].rpm
                ));
            }
            if window[0].percent > window[1].percent {
                return Err(format!(
                    "Calibration table '{}' percent decreases: {} > {}",
                    self.name, window[0].percent, window[1].percent
                ));
            }
        }
        Ok(())
    }
}

/// One `(temperature, percent)` step of a temperature table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureStep {
    /// Lower bound of the step, in the sensor's own units
    pub temp: i32,
    /// Fan percentage for readings at or above `temp`
    pub percent: u32,
}

const fn ts(temp: i32, percent: u32) -> TemperatureStep {
    TemperatureStep { temp, percent }
}

/// Temperature → percent step table, sorted ascending by temperature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureTable {
    /// Table name for logs
    pub name: &'static str,
    /// Steps sorted ascending by temperature
    pub steps: &'static [TemperatureStep],
}

impl TemperatureTable {
    /// Percentage of the highest step whose bound the reading reaches.
    ///
    /// Readings below the first step (and missing readings) get the first
    /// step's percentage.
    pub fn lookup(&self, temp: Option<i32>) -> u32 {
        let Some(first) = self.steps.first() else {
            return 0;
        };
        let Some(temp) = temp else {
            return first.percent;
        };

        self.steps
            .iter()
            .rev()
            .find(|step| temp >= step.temp)
            .unwrap_or(first)
            .percent
    }
}

static WEDGE100_FRONT_POINTS: [CalibrationPoint; 17] = [
    cp(20, 4200),
    cp(25, 5550),
    cp(30, 6180),
    cp(35, 7440),
    cp(40, 8100),
    cp(45, 9300),
    cp(50, 10410),
    cp(55, 10920),
    cp(60, 11910),
    cp(65, 12360),
    cp(70, 13260),
    cp(75, 14010),
    cp(80, 14340),
    cp(85, 15090),
    cp(90, 15420),
    cp(95, 15960),
    cp(100, 16200),
];

static WEDGE100_REAR_POINTS: [CalibrationPoint; 17] = [
    cp(20, 2130),
    cp(25, 3180),
    cp(30, 3690),
    cp(35, 4620),
    cp(40, 5130),
    cp(45, 6120),
    cp(50, 7050),
    cp(55, 7560),
    cp(60, 8580),
    cp(65, 9180),
    cp(70, 10230),
    cp(75, 11280),
    cp(80, 11820),
    cp(85, 12870),
    cp(90, 13350),
    cp(95, 14370),
    cp(100, 14850),
];

// Stinson and Davenport rear fans were characterised down to 6 %.
static STINSON_REAR_POINTS: [CalibrationPoint; 18] = [
    cp(6, 1800),
    cp(20, 2130),
    cp(25, 3180),
    cp(30, 3690),
    cp(35, 4620),
    cp(40, 5130),
    cp(45, 6120),
    cp(50, 7050),
    cp(55, 7560),
    cp(60, 8580),
    cp(65, 9180),
    cp(70, 10230),
    cp(75, 11280),
    cp(80, 11820),
    cp(85, 12870),
    cp(90, 13350),
    cp(95, 14370),
    cp(100, 14850),
];

static NEWPORT_FRONT_POINTS: [CalibrationPoint; 16] = [
    cp(6, 2100),
    cp(13, 3600),
    cp(19, 5000),
    cp(25, 6400),
    cp(31, 7600),
    cp(38, 8800),
    cp(44, 10000),
    cp(50, 11200),
    cp(56, 12400),
    cp(63, 13700),
    cp(69, 14900),
    cp(75, 16200),
    cp(81, 17400),
    cp(88, 18600),
    cp(94, 20000),
    cp(100, 21500),
];

static NEWPORT_REAR_POINTS: [CalibrationPoint; 16] = [
    cp(6, 1800),
    cp(13, 3200),
    cp(19, 4300),
    cp(25, 5300),
    cp(31, 6500),
    cp(38, 7500),
    cp(44, 8600),
    cp(50, 9500),
    cp(56, 10500),
    cp(63, 11600),
    cp(69, 12500),
    cp(75, 13600),
    cp(81, 14500),
    cp(88, 15600),
    cp(94, 16500),
    cp(100, 18000),
];

static WEDGE_FRONT_POINTS: [CalibrationPoint; 15] = [
    cp(30, 6150),
    cp(35, 7208),
    cp(40, 8195),
    cp(45, 9133),
    cp(50, 10017),
    cp(55, 10847),
    cp(60, 11612),
    cp(65, 12342),
    cp(70, 13057),
    cp(75, 13717),
    cp(80, 14305),
    cp(85, 14869),
    cp(90, 15384),
    cp(95, 15871),
    cp(100, 16095),
];

static WEDGE_REAR_POINTS: [CalibrationPoint; 15] = [
    cp(30, 3911),
    cp(35, 4760),
    cp(40, 5587),
    cp(45, 6434),
    cp(50, 7295),
    cp(55, 8187),
    cp(60, 9093),
    cp(65, 10008),
    cp(70, 10949),
    cp(75, 11883),
    cp(80, 12822),
    cp(85, 13726),
    cp(90, 14690),
    cp(95, 15516),
    cp(100, 15897),
];

// Note that 0 % is far from 0 RPM on these fans.
static YOSEMITE_POINTS: [CalibrationPoint; 11] = [
    cp(0, 989),
    cp(10, 1654),
    cp(20, 2650),
    cp(30, 3434),
    cp(40, 4318),
    cp(50, 5202),
    cp(60, 5969),
    cp(70, 6869),
    cp(80, 7604),
    cp(90, 8525),
    cp(100, 9325),
];

pub static WEDGE100_FRONT: CalibrationTable = CalibrationTable {
    name: "wedge100-front",
    points: &WEDGE100_FRONT_POINTS,
};

pub static WEDGE100_REAR: CalibrationTable = CalibrationTable {
    name: "wedge100-rear",
    points: &WEDGE100_REAR_POINTS,
};

pub static STINSON_REAR: CalibrationTable = CalibrationTable {
    name: "stinson-rear",
    points: &STINSON_REAR_POINTS,
};

pub static NEWPORT_FRONT: CalibrationTable = CalibrationTable {
    name: "newport-front",
    points: &NEWPORT_FRONT_POINTS,
};

pub static NEWPORT_REAR: CalibrationTable = CalibrationTable {
    name: "newport-rear",
    points: &NEWPORT_REAR_POINTS,
};

pub static WEDGE_FRONT: CalibrationTable = CalibrationTable {
    name: "wedge-front",
    points: &WEDGE_FRONT_POINTS,
};

pub static WEDGE_REAR: CalibrationTable = CalibrationTable {
    name: "wedge-rear",
    points: &WEDGE_REAR_POINTS,
};

pub static YOSEMITE: CalibrationTable = CalibrationTable {
    name: "yosemite",
    points: &YOSEMITE_POINTS,
};

static YOSEMITE_INTAKE_STEPS: [TemperatureStep; 11] = [
    ts(25, 15),
    ts(27, 16),
    ts(29, 17),
    ts(31, 18),
    ts(33, 19),
    ts(35, 20),
    ts(37, 21),
    ts(39, 22),
    ts(41, 23),
    ts(43, 24),
    ts(45, 25),
];

// Server readings are thermal margins: negative, approaching 0 as the CPU
// nears its throttle point.
static YOSEMITE_CPU_STEPS: [TemperatureStep; 14] = [
    ts(-28, 10),
    ts(-26, 20),
    ts(-24, 25),
    ts(-22, 30),
    ts(-20, 35),
    ts(-18, 40),
    ts(-16, 45),
    ts(-14, 50),
    ts(-12, 55),
    ts(-10, 60),
    ts(-8, 65),
    ts(-6, 70),
    ts(-4, 80),
    ts(-2, 100),
];

pub static YOSEMITE_INTAKE: TemperatureTable = TemperatureTable {
    name: "yosemite-intake",
    steps: &YOSEMITE_INTAKE_STEPS,
};

pub static YOSEMITE_CPU: TemperatureTable = TemperatureTable {
    name: "yosemite-cpu-margin",
    steps: &YOSEMITE_CPU_STEPS,
};

/// All RPM calibration tables shipped with the daemon
pub fn all_tables() -> [&'static CalibrationTable; 8] {
    [
        &WEDGE100_FRONT,
        &WEDGE100_REAR,
        &STINSON_REAR,
        &NEWPORT_FRONT,
        &NEWPORT_REAR,
        &WEDGE_FRONT,
        &WEDGE_REAR,
        &YOSEMITE,
    ]
}
