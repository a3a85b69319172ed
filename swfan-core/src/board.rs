//! Board definitions
//!
//! Every supported chassis is described by a [`BoardVariant`]: fan count and
//! addressing, calibration tables, PWM encoding, LED scheme, thermal limits,
//! controller strategy and power-down sequence. The variant is resolved once
//! at startup (see [`BoardKind`]) and shared read-only by the rest of the
//! daemon, typically behind an `Arc<BoardVariant>`.
//!
//! Note: board-specific device paths live in the `swfan-hardware` crate. This
//! module only describes the logical layout.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::calibration::{
    CalibrationTable, TemperatureTable, NEWPORT_FRONT, NEWPORT_REAR, STINSON_REAR, WEDGE100_FRONT,
    WEDGE100_REAR, WEDGE_FRONT, WEDGE_REAR, YOSEMITE, YOSEMITE_CPU, YOSEMITE_INTAKE,
};
use crate::channel::{Channel, LedRegister, PowerRail, TempSensor, Tray};
use crate::health::FanSample;
use crate::pwm::{pwm_writes, PwmEncoding, ASPEED_96, CPLD_16_STEP, CPLD_32_STEP};
use crate::shutdown::SensorLimits;
use crate::thermal::{FanLevels, JunctionFloors, JunctionThresholds};
use crate::FanError;

/// Board families the daemon knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardKind {
    /// Wedge: 4 coaxial fans on the Aspeed PWM block
    Wedge,
    /// Six-Pack line card: the two-fan Wedge board
    #[serde(alias = "six-pack")]
    SixPack,
    /// Wedge100: 5 coaxial fans on the fan CPLD
    Wedge100,
    /// Mavericks: Wedge100BF with a second, upper fan tray
    Mavericks,
    /// Montara: Wedge100BF-32
    Montara,
    /// Newport: 6 fans, 1/16 PWM CPLD
    Newport,
    /// Stinson: 7 fans, two junction sensors
    Stinson,
    /// Davenport: 6 fans
    Davenport,
    /// Pescadero: 7 fans, two junction sensors
    Pescadero,
    /// Yosemite: 2 fans, table-driven from four server nodes
    Yosemite,
    /// Lightning: fans are managed elsewhere
    Lightning,
}

impl FromStr for BoardKind {
    type Err = FanError;

    /// Parse board kind from string (for the `--board` flag)
    ///
    /// # Examples
    ///
    /// ```
    /// use std::str::FromStr;
    /// use swfan_core::board::BoardKind;
    ///
    /// assert_eq!(BoardKind::from_str("wedge100").unwrap(), BoardKind::Wedge100);
    /// assert_eq!(BoardKind::from_str("Six-Pack").unwrap(), BoardKind::SixPack);
    /// assert!(BoardKind::from_str("unknown").is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wedge" => Ok(BoardKind::Wedge),
            "sixpack" | "six-pack" => Ok(BoardKind::SixPack),
            "wedge100" => Ok(BoardKind::Wedge100),
            "mavericks" => Ok(BoardKind::Mavericks),
            "montara" => Ok(BoardKind::Montara),
            "newport" => Ok(BoardKind::Newport),
            "stinson" => Ok(BoardKind::Stinson),
            "davenport" => Ok(BoardKind::Davenport),
            "pescadero" => Ok(BoardKind::Pescadero),
            "yosemite" => Ok(BoardKind::Yosemite),
            "lightning" => Ok(BoardKind::Lightning),
            _ => Err(FanError::InvalidInput(format!(
                "Unknown board type: '{}'. Valid options: wedge, sixpack, wedge100, mavericks, \
                 montara, newport, stinson, davenport, pescadero, yosemite, lightning",
                s
            ))),
        }
    }
}

impl fmt::Display for BoardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// EEPROM location prefixes, most specific first
const LOCATION_PREFIXES: [(&str, BoardKind); 11] = [
    ("maverick", BoardKind::Mavericks),
    ("montara", BoardKind::Montara),
    ("newport", BoardKind::Newport),
    ("stinson", BoardKind::Stinson),
    ("davenpor", BoardKind::Davenport),
    ("pescader", BoardKind::Pescadero),
    ("wedge100", BoardKind::Wedge100),
    ("wedge", BoardKind::Wedge),
    ("six-pack", BoardKind::SixPack),
    ("yosemite", BoardKind::Yosemite),
    ("lightning", BoardKind::Lightning),
];

impl BoardKind {
    /// Human-readable board name
    pub fn name(&self) -> &'static str {
        match self {
            BoardKind::Wedge => "Wedge",
            BoardKind::SixPack => "Six-Pack",
            BoardKind::Wedge100 => "Wedge100",
            BoardKind::Mavericks => "Mavericks",
            BoardKind::Montara => "Montara",
            BoardKind::Newport => "Newport",
            BoardKind::Stinson => "Stinson",
            BoardKind::Davenport => "Davenport",
            BoardKind::Pescadero => "Pescadero",
            BoardKind::Yosemite => "Yosemite",
            BoardKind::Lightning => "Lightning",
        }
    }

    /// Match the EEPROM location string by prefix (case-insensitive)
    pub fn from_location(location: &str) -> Option<BoardKind> {
        let location = location.trim().to_lowercase();
        LOCATION_PREFIXES
            .iter()
            .find(|(prefix, _)| location.starts_with(prefix))
            .map(|(_, kind)| *kind)
    }

    /// Whether the daemon controls fans on this board
    pub fn is_supported(&self) -> bool {
        !matches!(self, BoardKind::Lightning)
    }

    /// Build the runtime variant description
    pub fn variant(self) -> crate::Result<BoardVariant> {
        match self {
            BoardKind::Wedge => Ok(wedge(self, &WEDGE_SLOTS, WEDGE_LEVELS)),
            BoardKind::SixPack => Ok(wedge(self, &SIXPACK_SLOTS, SIXPACK_LEVELS)),
            BoardKind::Wedge100 => Ok(wedge100()),
            BoardKind::Mavericks
            | BoardKind::Montara
            | BoardKind::Newport
            | BoardKind::Stinson
            | BoardKind::Davenport
            | BoardKind::Pescadero => Ok(wedge100bf(self)),
            BoardKind::Yosemite => Ok(yosemite()),
            BoardKind::Lightning => Err(FanError::UnsupportedBoard(self.name().to_string())),
        }
    }
}

/// Hardware addressing of one fan position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanSlot {
    /// 1-based LED number
    pub led: u32,
    /// Front tachometer number
    pub tach: u32,
    /// PWM output number
    pub pwm: u32,
}

const fn slot(led: u32, tach: u32, pwm: u32) -> FanSlot {
    FanSlot { led, tach, pwm }
}

/// LED colours the daemon uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedColor {
    /// Fan healthy (blue / green)
    Nominal,
    /// Fan failed (red)
    Fault,
}

/// How fan status LEDs are driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedScheme {
    /// No fan LEDs
    None,
    /// One register per fan holding a colour value
    Single {
        nominal: &'static str,
        fault: &'static str,
    },
    /// Separate red and green elements, plus a debug-mode switch that must be
    /// on for the fault colour to show
    RedGreen {
        on: &'static str,
        off: &'static str,
    },
}

impl LedScheme {
    /// Register writes that show `color` on LED `led` of `tray`
    pub fn writes(&self, tray: Tray, led: u32, color: LedColor) -> Vec<(Channel, String)> {
        let reg = |register| Channel::Led {
            tray,
            index: led,
            register,
        };
        match *self {
            LedScheme::None => Vec::new(),
            LedScheme::Single { nominal, fault } => {
                let value = match color {
                    LedColor::Nominal => nominal,
                    LedColor::Fault => fault,
                };
                vec![(reg(LedRegister::Control), value.to_string())]
            }
            LedScheme::RedGreen { on, off } => {
                let (green, red) = match color {
                    LedColor::Nominal => (on, off),
                    LedColor::Fault => (off, on),
                };
                vec![
                    (reg(LedRegister::Green), green.to_string()),
                    (reg(LedRegister::Red), red.to_string()),
                ]
            }
        }
    }

    /// Whether the LED debug-mode switch must be toggled around faults
    pub fn has_debug_mode(&self) -> bool {
        matches!(self, LedScheme::RedGreen { .. })
    }
}

/// Layout of one fan array (tray)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanArrayLayout {
    pub tray: Tray,
    pub slots: &'static [FanSlot],
    /// Rear tachometer number is `front + offset` on coaxial fans
    pub rear_tach_offset: Option<u32>,
    pub front_table: &'static CalibrationTable,
    /// Rear calibration table, on coaxial fans
    pub rear_table: Option<&'static CalibrationTable>,
    pub pwm: PwmEncoding,
    pub leds: LedScheme,
}

impl FanArrayLayout {
    pub fn fan_count(&self) -> usize {
        self.slots.len()
    }

    /// The slot at 0-based position `index`
    pub fn slot(&self, index: usize) -> crate::Result<&FanSlot> {
        self.slots.get(index).ok_or(FanError::InvalidFanSlot {
            slot: index,
            fans: self.slots.len(),
        })
    }

    /// Front and (for coaxial fans) rear tachometer channels
    pub fn tach_channels(&self, slot: &FanSlot) -> (Channel, Option<Channel>) {
        let front = Channel::Tachometer {
            tray: self.tray,
            index: slot.tach,
        };
        let rear = self.rear_tach_offset.map(|offset| Channel::Tachometer {
            tray: self.tray,
            index: slot.tach + offset,
        });
        (front, rear)
    }

    /// Convert raw RPM readings to a health sample
    pub fn sample(&self, front_rpm: u32, rear_rpm: Option<u32>) -> FanSample {
        let rear = match (rear_rpm, self.rear_table) {
            (Some(rpm), Some(table)) => Some((rpm, table.rpm_to_percent(rpm))),
            (Some(rpm), None) => Some((rpm, self.front_table.rpm_to_percent(rpm))),
            (None, _) => None,
        };
        FanSample {
            front_rpm,
            front_percent: self.front_table.rpm_to_percent(front_rpm),
            rear,
        }
    }

    /// Register writes commanding `percent` on a slot
    pub fn speed_writes(&self, slot: &FanSlot, percent: u32) -> Vec<(Channel, String)> {
        pwm_writes(&self.pwm, self.tray, slot.pwm, percent)
    }

    /// Register writes showing `color` on a slot's LED
    pub fn led_writes(&self, slot: &FanSlot, color: LedColor) -> Vec<(Channel, String)> {
        self.leds.writes(self.tray, slot.led, color)
    }
}

/// Thermal strategy of the main array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    /// Hysteresis on switch/server temperature, with optional junction floors
    Hysteresis { floors: Option<JunctionFloors> },
    /// Max of intake and CPU table lookups
    TableLookup {
        intake: &'static TemperatureTable,
        cpu: &'static TemperatureTable,
    },
}

/// Secondary fan tray driven by junction temperature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryArray {
    pub layout: FanArrayLayout,
    pub levels: FanLevels,
    pub thresholds: JunctionThresholds,
}

/// A single write of the power-down sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerStep {
    pub channel: Channel,
    pub value: &'static str,
}

const fn power(rail: PowerRail, value: &'static str) -> PowerStep {
    PowerStep {
        channel: Channel::Power(rail),
        value,
    }
}

/// Ordered power-down sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PowerSequence {
    /// Steps run before powering anything down
    pub prepare: &'static [PowerStep],
    /// Compute node power-off, followed by the grace period
    pub server_off: &'static [PowerStep],
    /// Main (or switch chip) power-off
    pub main_off: &'static [PowerStep],
    /// Last resort when an earlier power-off step failed
    pub fallback: &'static [PowerStep],
}

impl PowerSequence {
    pub fn is_empty(&self) -> bool {
        self.prepare.is_empty()
            && self.server_off.is_empty()
            && self.main_off.is_empty()
            && self.fallback.is_empty()
    }
}

/// Shared-bus lock guarding junction reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusLockSpec {
    pub path: &'static str,
    /// Polls before a stale lock is removed
    pub attempts: u32,
}

/// Runtime board description
#[derive(Debug, Clone)]
pub struct BoardVariant {
    pub kind: BoardKind,
    /// Internal units per degree (1000 on millidegree sysfs boards)
    pub temp_scale: i32,
    pub levels: FanLevels,
    /// Speed written at boot, when it differs from the HIGH level
    pub boot_percent: Option<u32>,
    /// Default hysteresis thresholds, internal units
    pub temp_top: i32,
    pub temp_bottom: i32,
    pub cooldown_slop: i32,
    pub limits: SensorLimits,
    /// Added to the server temperature (its sensor reads low)
    pub server_fudge: i32,
    /// Server readings above this are re-read, then treated as bad
    pub server_error_threshold: Option<i32>,
    /// Server readings above this are bad without a re-read
    pub server_bad_above: Option<i32>,
    /// Larger server temperature jumps between iterations are ignored
    pub server_max_change: Option<i32>,
    /// Server temperature is the max of this many node margins (0: one sensor)
    pub server_nodes: u8,
    /// Wait for a first valid server reading before starting
    pub await_server_reading: bool,
    /// Sensors whose failure counts as a bad read
    pub required_sensors: &'static [TempSensor],
    pub junction_sensors: u8,
    pub junction_lock: Option<BusLockSpec>,
    pub controller: ControllerKind,
    pub primary: FanArrayLayout,
    pub secondary: Option<SecondaryArray>,
    pub power: PowerSequence,
    /// Shut down when every fan of an array is chronically dead
    pub shutdown_on_total_fan_failure: bool,
}

impl BoardVariant {
    /// Scale whole degrees to internal units
    pub fn internal(&self, degrees: i32) -> i32 {
        degrees.saturating_mul(self.temp_scale)
    }

    /// Scale internal units to whole degrees
    pub fn external(&self, internal: i32) -> i32 {
        internal / self.temp_scale.max(1)
    }

    /// Junction sensors present on the board
    pub fn junction_channels(&self) -> Vec<TempSensor> {
        (1..=self.junction_sensors).map(TempSensor::Junction).collect()
    }

    /// Speed written to the main array at boot
    pub fn boot_speed(&self, levels: &FanLevels) -> u32 {
        self.boot_percent.unwrap_or(levels.high)
    }
}

const WEDGE_LEVELS: FanLevels = FanLevels::new(35, 50, 70, 99);
const SIXPACK_LEVELS: FanLevels = FanLevels::new(35, 55, 75, 99);
const WEDGE100_LEVELS: FanLevels = FanLevels::new(35, 50, 70, 100);
const UPPER_TRAY_LEVELS: FanLevels = FanLevels::new(40, 60, 70, 100);

/// Newport-family fans are held here at boot
const NEWPORT_BOOT_PERCENT: u32 = 80;

static WEDGE_SLOTS: [FanSlot; 4] = [slot(1, 3, 7), slot(2, 2, 6), slot(3, 0, 0), slot(4, 1, 1)];
static SIXPACK_SLOTS: [FanSlot; 2] = [slot(3, 0, 0), slot(4, 1, 1)];
static WEDGE100_SLOTS: [FanSlot; 5] = [
    slot(1, 1, 1),
    slot(2, 3, 2),
    slot(3, 5, 3),
    slot(4, 7, 4),
    slot(5, 9, 5),
];
static NEWPORT_SLOTS: [FanSlot; 6] = [
    slot(1, 1, 1),
    slot(2, 3, 2),
    slot(3, 5, 3),
    slot(4, 7, 4),
    slot(5, 9, 5),
    slot(6, 11, 6),
];
static STINSON_SLOTS: [FanSlot; 7] = [
    slot(1, 1, 1),
    slot(2, 3, 2),
    slot(3, 5, 3),
    slot(4, 7, 4),
    slot(5, 9, 5),
    slot(6, 11, 6),
    slot(7, 13, 7),
];
static YOSEMITE_SLOTS: [FanSlot; 2] = [slot(1, 0, 0), slot(2, 1, 1)];

const CPLD_LEDS: LedScheme = LedScheme::Single {
    nominal: "0x1",
    fault: "0x2",
};
const GPIO_LEDS: LedScheme = LedScheme::Single {
    nominal: "1",
    fault: "0",
};
const NEWPORT_LEDS: LedScheme = LedScheme::RedGreen {
    on: "0x0",
    off: "0x1",
};

static CHASSIS_SENSORS: [TempSensor; 3] =
    [TempSensor::Intake, TempSensor::Exhaust, TempSensor::Switch];
static YOSEMITE_SENSORS: [TempSensor; 2] = [TempSensor::Intake, TempSensor::Exhaust];

static WEDGE_SERVER_OFF: [PowerStep; 2] = [
    power(PowerRail::ServerDirection, "out"),
    power(PowerRail::Server, "0"),
];
static WEDGE_SWITCH_OFF: [PowerStep; 2] = [
    power(PowerRail::SwitchDirection, "out"),
    power(PowerRail::Switch, "1"),
];
static HOTSWAP_OFF: [PowerStep; 1] = [power(PowerRail::HotSwap, "0x00")];
static CPLD_SERVER_OFF: [PowerStep; 1] = [power(PowerRail::Server, "0")];
static CPLD_MAIN_OFF: [PowerStep; 1] = [power(PowerRail::Main, "0")];
static SWITCH_ASIC_RESET: [PowerStep; 2] = [
    power(PowerRail::SwitchReset, "1"),
    power(PowerRail::SwitchHold, "0xf"),
];

const JUNCTION_LIMIT: i32 = 105;
const JUNCTION_FLOORS: JunctionFloors = JunctionFloors {
    force_max: 85,
    at_least_high: 70,
    at_least_medium: 65,
};

fn chassis_limits(scale: i32, junction: Option<i32>) -> SensorLimits {
    SensorLimits {
        intake: 60 * scale,
        switch: Some(80 * scale),
        server: 90 * scale,
        junction,
    }
}

fn wedge(kind: BoardKind, slots: &'static [FanSlot], levels: FanLevels) -> BoardVariant {
    let scale = 1000;
    BoardVariant {
        kind,
        temp_scale: scale,
        levels,
        boot_percent: None,
        temp_top: 70 * scale,
        temp_bottom: 40 * scale,
        cooldown_slop: 6 * scale,
        limits: chassis_limits(scale, None),
        server_fudge: 10 * scale,
        server_error_threshold: Some(120 * scale),
        server_bad_above: None,
        server_max_change: Some(50 * scale),
        server_nodes: 0,
        await_server_reading: false,
        required_sensors: &CHASSIS_SENSORS,
        junction_sensors: 0,
        junction_lock: None,
        controller: ControllerKind::Hysteresis { floors: None },
        primary: FanArrayLayout {
            tray: Tray::Lower,
            slots,
            rear_tach_offset: Some(4),
            front_table: &WEDGE_FRONT,
            rear_table: Some(&WEDGE_REAR),
            pwm: ASPEED_96,
            leds: GPIO_LEDS,
        },
        secondary: None,
        power: PowerSequence {
            prepare: &[],
            server_off: &WEDGE_SERVER_OFF,
            main_off: &WEDGE_SWITCH_OFF,
            fallback: &HOTSWAP_OFF,
        },
        shutdown_on_total_fan_failure: true,
    }
}

fn cpld_array(
    tray: Tray,
    slots: &'static [FanSlot],
    front_table: &'static CalibrationTable,
    rear_table: &'static CalibrationTable,
) -> FanArrayLayout {
    FanArrayLayout {
        tray,
        slots,
        rear_tach_offset: Some(1),
        front_table,
        rear_table: Some(rear_table),
        pwm: CPLD_32_STEP,
        leds: CPLD_LEDS,
    }
}

fn wedge100() -> BoardVariant {
    let scale = 1000;
    BoardVariant {
        kind: BoardKind::Wedge100,
        temp_scale: scale,
        levels: WEDGE100_LEVELS,
        boot_percent: None,
        temp_top: 70 * scale,
        temp_bottom: 40 * scale,
        cooldown_slop: 6 * scale,
        limits: chassis_limits(scale, None),
        server_fudge: 10 * scale,
        server_error_threshold: Some(120 * scale),
        // COM-e DIMM sensor readings above 100 C are garbage
        server_bad_above: Some(100 * scale),
        server_max_change: Some(50 * scale),
        server_nodes: 0,
        await_server_reading: false,
        required_sensors: &CHASSIS_SENSORS,
        junction_sensors: 0,
        junction_lock: None,
        controller: ControllerKind::Hysteresis { floors: None },
        primary: cpld_array(Tray::Lower, &WEDGE100_SLOTS, &WEDGE100_FRONT, &WEDGE100_REAR),
        secondary: None,
        power: PowerSequence {
            prepare: &[],
            server_off: &CPLD_SERVER_OFF,
            main_off: &CPLD_MAIN_OFF,
            fallback: &[],
        },
        shutdown_on_total_fan_failure: true,
    }
}

fn wedge100bf(kind: BoardKind) -> BoardVariant {
    let scale = 1000;
    let mut variant = wedge100();
    variant.kind = kind;
    variant.server_bad_above = None;
    variant.limits = chassis_limits(scale, Some(JUNCTION_LIMIT));
    variant.junction_sensors = 1;
    variant.controller = ControllerKind::Hysteresis {
        floors: Some(JUNCTION_FLOORS),
    };
    variant.power.prepare = &SWITCH_ASIC_RESET;

    let newport_array = |slots: &'static [FanSlot],
                         front: &'static CalibrationTable,
                         rear: &'static CalibrationTable| FanArrayLayout {
        pwm: CPLD_16_STEP,
        leds: NEWPORT_LEDS,
        ..cpld_array(Tray::Lower, slots, front, rear)
    };

    match kind {
        BoardKind::Mavericks => {
            variant.controller = ControllerKind::Hysteresis { floors: None };
            variant.junction_lock = Some(BusLockSpec {
                path: "/tmp/mav_9548_10_lock",
                attempts: 5,
            });
            variant.secondary = Some(SecondaryArray {
                layout: cpld_array(Tray::Upper, &WEDGE100_SLOTS, &WEDGE100_FRONT, &WEDGE100_REAR),
                levels: UPPER_TRAY_LEVELS,
                thresholds: JunctionThresholds::default(),
            });
        }
        BoardKind::Newport => {
            variant.boot_percent = Some(NEWPORT_BOOT_PERCENT);
            variant.primary = newport_array(&NEWPORT_SLOTS, &NEWPORT_FRONT, &NEWPORT_REAR);
        }
        BoardKind::Davenport => {
            variant.boot_percent = Some(NEWPORT_BOOT_PERCENT);
            variant.primary = newport_array(&NEWPORT_SLOTS, &WEDGE100_FRONT, &STINSON_REAR);
        }
        BoardKind::Stinson | BoardKind::Pescadero => {
            variant.boot_percent = Some(NEWPORT_BOOT_PERCENT);
            variant.junction_sensors = 2;
            variant.primary = newport_array(&STINSON_SLOTS, &WEDGE100_FRONT, &STINSON_REAR);
        }
        _ => {}
    }

    variant
}

fn yosemite() -> BoardVariant {
    BoardVariant {
        kind: BoardKind::Yosemite,
        temp_scale: 1,
        levels: WEDGE_LEVELS,
        boot_percent: None,
        temp_top: 70,
        temp_bottom: 40,
        cooldown_slop: 6,
        limits: SensorLimits {
            intake: 60,
            switch: None,
            server: 110,
            junction: None,
        },
        server_fudge: 0,
        server_error_threshold: None,
        server_bad_above: None,
        server_max_change: None,
        server_nodes: 4,
        await_server_reading: true,
        required_sensors: &YOSEMITE_SENSORS,
        junction_sensors: 0,
        junction_lock: None,
        controller: ControllerKind::TableLookup {
            intake: &YOSEMITE_INTAKE,
            cpu: &YOSEMITE_CPU,
        },
        primary: FanArrayLayout {
            tray: Tray::Lower,
            slots: &YOSEMITE_SLOTS,
            rear_tach_offset: None,
            front_table: &YOSEMITE,
            rear_table: None,
            pwm: ASPEED_96,
            leds: LedScheme::None,
        },
        secondary: None,
        power: PowerSequence::default(),
        shutdown_on_total_fan_failure: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [BoardKind; 10] = [
        BoardKind::Wedge,
        BoardKind::SixPack,
        BoardKind::Wedge100,
        BoardKind::Mavericks,
        BoardKind::Montara,
        BoardKind::Newport,
        BoardKind::Stinson,
        BoardKind::Davenport,
        BoardKind::Pescadero,
        BoardKind::Yosemite,
    ];

    #[test]
    fn test_board_kind_from_str() {
        assert_eq!("WEDGE".parse::<BoardKind>().unwrap(), BoardKind::Wedge);
        assert_eq!("sixpack".parse::<BoardKind>().unwrap(), BoardKind::SixPack);
        assert_eq!("pescadero".parse::<BoardKind>().unwrap(), BoardKind::Pescadero);
        let err = "nope".parse::<BoardKind>().unwrap_err();
        assert!(err.to_string().contains("Valid options"));
    }

    #[test]
    fn test_from_location_prefers_specific_prefix() {
        assert_eq!(BoardKind::from_location("Wedge100-32X"), Some(BoardKind::Wedge100));
        assert_eq!(BoardKind::from_location("Wedge-16X"), Some(BoardKind::Wedge));
        assert_eq!(BoardKind::from_location("Mavericks"), Some(BoardKind::Mavericks));
        assert_eq!(BoardKind::from_location("Davenport "), Some(BoardKind::Davenport));
        assert_eq!(BoardKind::from_location("Pescadero"), Some(BoardKind::Pescadero));
        assert_eq!(BoardKind::from_location("Six-Pack"), Some(BoardKind::SixPack));
        assert_eq!(BoardKind::from_location("Lightning"), Some(BoardKind::Lightning));
        assert_eq!(BoardKind::from_location("Tioga Pass"), None);
    }

    #[test]
    fn test_lightning_unsupported() {
        assert!(!BoardKind::Lightning.is_supported());
        assert!(matches!(
            BoardKind::Lightning.variant(),
            Err(FanError::UnsupportedBoard(_))
        ));
    }

    #[test]
    fn test_fan_counts() {
        let count = |kind: BoardKind| kind.variant().unwrap().primary.fan_count();
        assert_eq!(count(BoardKind::Wedge), 4);
        assert_eq!(count(BoardKind::SixPack), 2);
        assert_eq!(count(BoardKind::Wedge100), 5);
        assert_eq!(count(BoardKind::Mavericks), 5);
        assert_eq!(count(BoardKind::Newport), 6);
        assert_eq!(count(BoardKind::Davenport), 6);
        assert_eq!(count(BoardKind::Stinson), 7);
        assert_eq!(count(BoardKind::Yosemite), 2);

        let mav = BoardKind::Mavericks.variant().unwrap();
        let upper = mav.secondary.unwrap();
        assert_eq!(upper.layout.tray, Tray::Upper);
        assert_eq!(upper.layout.fan_count(), 5);
        assert_eq!(upper.levels, UPPER_TRAY_LEVELS);
    }

    #[test]
    fn test_variants_are_consistent() {
        for kind in ALL {
            let v = kind.variant().unwrap();
            assert!(v.levels.is_monotonic(), "{}", kind);
            assert!(v.temp_bottom < v.temp_top, "{}", kind);
            assert!(v.primary.front_table.validate().is_ok(), "{}", kind);
            assert_eq!(
                v.primary.rear_tach_offset.is_some(),
                v.primary.rear_table.is_some(),
                "{}",
                kind
            );
            assert_eq!(v.limits.junction.is_some(), v.junction_sensors > 0, "{}", kind);
        }
    }

    #[test]
    fn test_wedge_addressing() {
        let v = BoardKind::Wedge.variant().unwrap();
        let slot = v.primary.slot(0).unwrap();
        let (front, rear) = v.primary.tach_channels(slot);
        assert_eq!(front.key(), "lower.tach3");
        assert_eq!(rear.unwrap().key(), "lower.tach7");
        let writes = v.primary.speed_writes(slot, 70);
        assert_eq!(writes[2].0.key(), "lower.pwm7.falling");

        assert!(matches!(
            v.primary.slot(4),
            Err(FanError::InvalidFanSlot { slot: 4, fans: 4 })
        ));
    }

    #[test]
    fn test_sixpack_uses_fans_three_and_four() {
        let v = BoardKind::SixPack.variant().unwrap();
        let leds: Vec<u32> = v.primary.slots.iter().map(|s| s.led).collect();
        assert_eq!(leds, vec![3, 4]);
        assert_eq!(v.levels, SIXPACK_LEVELS);
    }

    #[test]
    fn test_yosemite_has_no_rear_fans() {
        let v = BoardKind::Yosemite.variant().unwrap();
        let slot = v.primary.slot(1).unwrap();
        let (_, rear) = v.primary.tach_channels(slot);
        assert!(rear.is_none());
        assert!(v.primary.led_writes(slot, LedColor::Fault).is_empty());
        assert!(v.power.is_empty());
        assert_eq!(v.temp_scale, 1);
    }

    #[test]
    fn test_led_schemes() {
        let w100 = BoardKind::Wedge100.variant().unwrap();
        let slot = w100.primary.slot(2).unwrap();
        let writes = w100.primary.led_writes(slot, LedColor::Fault);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0.key(), "lower.led3.ctrl");
        assert_eq!(writes[0].1, "0x2");

        let newport = BoardKind::Newport.variant().unwrap();
        assert!(newport.primary.leds.has_debug_mode());
        let slot = newport.primary.slot(0).unwrap();
        let writes = newport.primary.led_writes(slot, LedColor::Nominal);
        assert_eq!(
            writes,
            vec![
                (
                    Channel::Led {
                        tray: Tray::Lower,
                        index: 1,
                        register: LedRegister::Green
                    },
                    "0x0".to_string()
                ),
                (
                    Channel::Led {
                        tray: Tray::Lower,
                        index: 1,
                        register: LedRegister::Red
                    },
                    "0x1".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_newport_family() {
        for kind in [
            BoardKind::Newport,
            BoardKind::Stinson,
            BoardKind::Davenport,
            BoardKind::Pescadero,
        ] {
            let v = kind.variant().unwrap();
            assert_eq!(v.boot_percent, Some(80), "{}", kind);
            assert_eq!(v.primary.pwm, CPLD_16_STEP, "{}", kind);
            assert_eq!(v.boot_speed(&v.levels), 80);
        }
        assert_eq!(BoardKind::Stinson.variant().unwrap().junction_sensors, 2);
        assert_eq!(BoardKind::Davenport.variant().unwrap().junction_sensors, 1);
        assert_eq!(
            BoardKind::Davenport.variant().unwrap().primary.rear_table,
            Some(&STINSON_REAR)
        );
    }

    #[test]
    fn test_only_mavericks_locks_junction_bus() {
        let mavericks = BoardKind::Mavericks.variant().unwrap();
        let lock = mavericks.junction_lock.unwrap();
        assert_eq!(lock.path, "/tmp/mav_9548_10_lock");
        assert_eq!(lock.attempts, 5);

        for kind in [
            BoardKind::Montara,
            BoardKind::Newport,
            BoardKind::Stinson,
            BoardKind::Davenport,
        ] {
            assert!(kind.variant().unwrap().junction_lock.is_none(), "{}", kind);
        }
    }

    #[test]
    fn test_sample_converts_both_rotors() {
        let v = BoardKind::Wedge100.variant().unwrap();
        let sample = v.primary.sample(10_410, Some(7_050));
        assert_eq!(sample.front_percent, 50);
        assert_eq!(sample.rear, Some((7_050, 50)));
    }

    #[test]
    fn test_temperature_scaling() {
        let v = BoardKind::Wedge100.variant().unwrap();
        assert_eq!(v.internal(70), 70_000);
        assert_eq!(v.external(64_999), 64);
        assert_eq!(v.limits.intake, 60_000);
        assert_eq!(v.server_fudge, 10_000);
    }
}
