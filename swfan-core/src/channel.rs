//! Logical device channels
//!
//! Every sensor, PWM register, LED and power control the daemon touches is
//! addressed through a [`Channel`]. The mapping from a channel to an actual
//! device file (or tool invocation) is board specific and lives in the
//! hardware crate; the control logic only ever speaks in channels.

use std::fmt;
use std::str::FromStr;

use crate::FanError;

/// Physical fan tray a fan channel belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tray {
    /// Main (and usually only) fan tray
    Lower,
    /// Optional secondary tray (Mavericks upper fan board)
    Upper,
}

impl Tray {
    /// Short lowercase name used in channel keys and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Tray::Lower => "lower",
            Tray::Upper => "upper",
        }
    }
}

/// Temperature sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TempSensor {
    /// Chassis air intake
    Intake,
    /// Chassis air exhaust
    Exhaust,
    /// Switch chip (board sensor next to the ASIC)
    Switch,
    /// Microserver / COM-e CPU
    Server,
    /// Per-node server thermal margin (1-based node number)
    ServerNode(u8),
    /// Switch ASIC junction diode (1-based sensor number)
    Junction(u8),
}

impl TempSensor {
    /// Name used in logs and limit messages
    pub fn label(&self) -> String {
        match self {
            TempSensor::Intake => "intake".to_string(),
            TempSensor::Exhaust => "exhaust".to_string(),
            TempSensor::Switch => "switch".to_string(),
            TempSensor::Server => "server".to_string(),
            TempSensor::ServerNode(n) => format!("server node {}", n),
            TempSensor::Junction(n) => format!("junction {}", n),
        }
    }

    fn key(&self) -> String {
        match self {
            TempSensor::Intake => "intake".to_string(),
            TempSensor::Exhaust => "exhaust".to_string(),
            TempSensor::Switch => "switch".to_string(),
            TempSensor::Server => "server".to_string(),
            TempSensor::ServerNode(n) => format!("server_node{}", n),
            TempSensor::Junction(n) => format!("junction{}", n),
        }
    }
}

/// Individual register of a fan PWM output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PwmRegister {
    /// Single duty-cycle register (CPLD fan boards)
    Duty,
    /// Aspeed PWM type select
    Type,
    /// Aspeed rising edge position
    Rising,
    /// Aspeed falling edge position
    Falling,
    /// Aspeed output enable
    Enable,
}

impl PwmRegister {
    fn as_str(&self) -> &'static str {
        match self {
            PwmRegister::Duty => "duty",
            PwmRegister::Type => "type",
            PwmRegister::Rising => "rising",
            PwmRegister::Falling => "falling",
            PwmRegister::Enable => "en",
        }
    }
}

/// Individual register of a fan status LED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LedRegister {
    /// Single tri-state colour register
    Control,
    /// Separate red element
    Red,
    /// Separate green element
    Green,
}

impl LedRegister {
    fn as_str(&self) -> &'static str {
        match self {
            LedRegister::Control => "ctrl",
            LedRegister::Red => "red",
            LedRegister::Green => "green",
        }
    }
}

/// Power and reset controls used by the shutdown sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PowerRail {
    /// GPIO direction for the server power line
    ServerDirection,
    /// Server (compute node) power enable
    Server,
    /// GPIO direction for the switch chip power line
    SwitchDirection,
    /// Switch chip power / reset line
    Switch,
    /// Main board power
    Main,
    /// Switch ASIC reset helper
    SwitchReset,
    /// System CPLD register holding the switch ASIC in reset
    SwitchHold,
    /// Hot-swap controller OPERATION register (cuts the whole box)
    HotSwap,
}

impl PowerRail {
    fn as_str(&self) -> &'static str {
        match self {
            PowerRail::ServerDirection => "server_direction",
            PowerRail::Server => "server",
            PowerRail::SwitchDirection => "switch_direction",
            PowerRail::Switch => "switch",
            PowerRail::Main => "main",
            PowerRail::SwitchReset => "switch_reset",
            PowerRail::SwitchHold => "switch_hold",
            PowerRail::HotSwap => "hotswap",
        }
    }

    const ALL: [PowerRail; 8] = [
        PowerRail::ServerDirection,
        PowerRail::Server,
        PowerRail::SwitchDirection,
        PowerRail::Switch,
        PowerRail::Main,
        PowerRail::SwitchReset,
        PowerRail::SwitchHold,
        PowerRail::HotSwap,
    ];
}

/// A logical device channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    /// Temperature sensor reading
    Temperature(TempSensor),
    /// Fan tachometer, addressed by hardware tach number
    Tachometer { tray: Tray, index: u32 },
    /// Fan PWM register, addressed by hardware PWM number
    Pwm {
        tray: Tray,
        index: u32,
        register: PwmRegister,
    },
    /// Fan status LED, addressed by 1-based position in the tray
    Led {
        tray: Tray,
        index: u32,
        register: LedRegister,
    },
    /// LED debug mode switch (needed before fan LEDs can be overridden)
    LedDebugMode,
    /// Power or reset control
    Power(PowerRail),
}

impl Channel {
    /// Stable key used for configuration overrides, e.g. `lower.tach3`
    pub fn key(&self) -> String {
        match self {
            Channel::Temperature(sensor) => format!("temp.{}", sensor.key()),
            Channel::Tachometer { tray, index } => format!("{}.tach{}", tray.as_str(), index),
            Channel::Pwm {
                tray,
                index,
                register,
            } => format!("{}.pwm{}.{}", tray.as_str(), index, register.as_str()),
            Channel::Led {
                tray,
                index,
                register,
            } => format!("{}.led{}.{}", tray.as_str(), index, register.as_str()),
            Channel::LedDebugMode => "led.debug_mode".to_string(),
            Channel::Power(rail) => format!("power.{}", rail.as_str()),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Temperature(sensor) => write!(f, "{} temperature", sensor.label()),
            Channel::Tachometer { tray, index } => {
                write!(f, "{} tray tachometer {}", tray.as_str(), index)
            }
            Channel::Pwm {
                tray,
                index,
                register,
            } => write!(f, "{} tray PWM {} {}", tray.as_str(), index, register.as_str()),
            Channel::Led {
                tray,
                index,
                register,
            } => write!(
                f,
                "{} tray fan {} LED {}",
                tray.as_str(),
                index,
                register.as_str()
            ),
            Channel::LedDebugMode => write!(f, "LED debug mode"),
            Channel::Power(rail) => write!(f, "{} power control", rail.as_str()),
        }
    }
}

fn parse_tray(s: &str) -> Option<Tray> {
    match s {
        "lower" => Some(Tray::Lower),
        "upper" => Some(Tray::Upper),
        _ => None,
    }
}

fn parse_indexed(s: &str, prefix: &str) -> Option<u32> {
    s.strip_prefix(prefix)?.parse().ok()
}

impl FromStr for Channel {
    type Err = FanError;

    /// Parse a channel from its configuration key
    ///
    /// # Examples
    ///
    /// ```
    /// use swfan_core::channel::{Channel, TempSensor};
    ///
    /// let ch: Channel = "temp.junction2".parse().unwrap();
    /// assert_eq!(ch, Channel::Temperature(TempSensor::Junction(2)));
    /// assert!("lower.bogus".parse::<Channel>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || FanError::Parse(format!("Unknown channel key: '{}'", s));
        let parts: Vec<&str> = s.split('.').collect();

        let channel = match parts.as_slice() {
            ["temp", name] => {
                let sensor = match *name {
                    "intake" => TempSensor::Intake,
                    "exhaust" => TempSensor::Exhaust,
                    "switch" => TempSensor::Switch,
                    "server" => TempSensor::Server,
                    other => {
                        if let Some(n) = other.strip_prefix("server_node") {
                            TempSensor::ServerNode(n.parse().map_err(|_| unknown())?)
                        } else if let Some(n) = other.strip_prefix("junction") {
                            TempSensor::Junction(n.parse().map_err(|_| unknown())?)
                        } else {
                            return Err(unknown());
                        }
                    }
                };
                Channel::Temperature(sensor)
            }
            ["led", "debug_mode"] => Channel::LedDebugMode,
            ["power", rail] => PowerRail::ALL
                .iter()
                .find(|r| r.as_str() == *rail)
                .map(|r| Channel::Power(*r))
                .ok_or_else(unknown)?,
            [tray, item] => {
                let tray = parse_tray(tray).ok_or_else(unknown)?;
                let index = parse_indexed(item, "tach").ok_or_else(unknown)?;
                Channel::Tachometer { tray, index }
            }
            [tray, item, reg] => {
                let tray = parse_tray(tray).ok_or_else(unknown)?;
                if let Some(index) = parse_indexed(item, "pwm") {
                    let register = [
                        PwmRegister::Duty,
                        PwmRegister::Type,
                        PwmRegister::Rising,
                        PwmRegister::Falling,
                        PwmRegister::Enable,
                    ]
                    .into_iter()
                    .find(|r| r.as_str() == *reg)
                    .ok_or_else(unknown)?;
                    Channel::Pwm {
                        tray,
                        index,
                        register,
                    }
                } else if let Some(index) = parse_indexed(item, "led") {
                    let register = [LedRegister::Control, LedRegister::Red, LedRegister::Green]
                        .into_iter()
                        .find(|r| r.as_str() == *reg)
                        .ok_or_else(unknown)?;
                    Channel::Led {
                        tray,
                        index,
                        register,
                    }
                } else {
                    return Err(unknown());
                }
            }
            _ => return Err(unknown()),
        };

        Ok(channel)
    }
}
