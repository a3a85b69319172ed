//! Sysfs and i2c-tools backed device access
//!
//! Each logical channel resolves to a [`ChannelTarget`]: a sysfs attribute,
//! an `i2cget`/`i2cset` transaction, or a helper script. Defaults come from
//! the board kind; the `[channels]` configuration section can override any
//! channel (and must supply the ones a board has no default for).

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use swfan_core::board::BoardKind;
use swfan_core::channel::{LedRegister, PowerRail, PwmRegister, TempSensor, Tray};
use swfan_core::{Channel, FanError, Result};
use tokio::process::Command;
use tracing::{debug, trace};

use crate::device::DeviceAccess;

/// Target of a write to a shared-bus mux before a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxSelect {
    pub bus: u8,
    pub addr: u8,
    pub value: u8,
}

/// How one channel is accessed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelTarget {
    /// Sysfs attribute holding decimal or `0x` hex text
    File(PathBuf),
    /// `i2cget -f -y <bus> <addr> <reg>`, optionally after selecting a mux channel
    I2cGet {
        bus: u8,
        addr: u8,
        reg: u8,
        mux: Option<MuxSelect>,
    },
    /// `i2cset -f -y <bus> <addr> <reg> <value>`
    I2cSet { bus: u8, addr: u8, reg: u8 },
    /// Executable run on write; the written value is ignored
    Script(PathBuf),
}

impl fmt::Display for ChannelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelTarget::File(path) => write!(f, "{}", path.display()),
            ChannelTarget::I2cGet { bus, addr, reg, .. } => {
                write!(f, "i2cget:{}:{:#04x}:{:#04x}", bus, addr, reg)
            }
            ChannelTarget::I2cSet { bus, addr, reg } => {
                write!(f, "i2cset:{}:{:#04x}:{:#04x}", bus, addr, reg)
            }
            ChannelTarget::Script(path) => write!(f, "exec:{}", path.display()),
        }
    }
}

fn parse_byte(s: &str) -> Option<u8> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

impl FromStr for ChannelTarget {
    type Err = FanError;

    /// Parse a `[channels]` override value
    ///
    /// # Examples
    ///
    /// ```
    /// use swfan_hardware::sysfs::ChannelTarget;
    ///
    /// let t: ChannelTarget = "i2cget:3:0x4c:0x01".parse().unwrap();
    /// assert!(matches!(t, ChannelTarget::I2cGet { bus: 3, addr: 0x4c, reg: 1, mux: None }));
    /// let t: ChannelTarget = "/sys/bus/i2c/devices/3-0048/temp1_input".parse().unwrap();
    /// assert!(matches!(t, ChannelTarget::File(_)));
    /// assert!("i2cget:3:zz:1".parse::<ChannelTarget>().is_err());
    /// ```
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || FanError::Config(format!("Invalid channel target: '{}'", s));
        if let Some(rest) = s.strip_prefix("exec:") {
            return Ok(ChannelTarget::Script(PathBuf::from(rest)));
        }
        let i2c = |rest: &str| -> Result<(u8, u8, u8)> {
            let parts: Vec<&str> = rest.split(':').collect();
            match parts.as_slice() {
                [bus, addr, reg] => Ok((
                    parse_byte(bus).ok_or_else(invalid)?,
                    parse_byte(addr).ok_or_else(invalid)?,
                    parse_byte(reg).ok_or_else(invalid)?,
                )),
                _ => Err(invalid()),
            }
        };
        if let Some(rest) = s.strip_prefix("i2cget:") {
            let (bus, addr, reg) = i2c(rest)?;
            return Ok(ChannelTarget::I2cGet {
                bus,
                addr,
                reg,
                mux: None,
            });
        }
        if let Some(rest) = s.strip_prefix("i2cset:") {
            let (bus, addr, reg) = i2c(rest)?;
            return Ok(ChannelTarget::I2cSet { bus, addr, reg });
        }
        if s.is_empty() {
            return Err(invalid());
        }
        Ok(ChannelTarget::File(PathBuf::from(s)))
    }
}

/// Parse the integer a sysfs attribute or i2cget prints.
///
/// Only the first token counts; CPLD attributes append help text.
pub fn parse_value(text: &str) -> Result<i64> {
    let token = text
        .split_whitespace()
        .next()
        .ok_or_else(|| FanError::Parse("Empty device value".to_string()))?;
    let parsed = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => token.parse::<i64>(),
    };
    parsed.map_err(|e| FanError::Parse(format!("Invalid device value '{}': {}", token, e)))
}

const LM75: &str = "/sys/bus/i2c/drivers/lm75";
const COM_E: &str = "/sys/bus/i2c/drivers/com_e_driver/4-0033";
const FANCPLD_LOWER: &str = "/sys/bus/i2c/drivers/fancpld/8-0033";
const FANCPLD_UPPER: &str = "/sys/bus/i2c/drivers/fancpld/9-0033";
const FANCPLD_NEWPORT: &str = "/sys/bus/i2c/drivers/fancpld/8-0066";
const SYSCPLD: &str = "/sys/bus/i2c/drivers/syscpld/12-0031";
const ASPEED_PWM: &str = "/sys/devices/platform/ast_pwm_tacho.0";
const WEDGE_I2C: &str = "/sys/class/i2c-adapter";
const WEDGE_LED_GPIOS: [u32; 4] = [53, 54, 55, 72];
const SWITCH_RESET_SCRIPT: &str = "/usr/local/bin/reset_tofino.sh";

/// Junction sensor behind the board's external temperature chip
const JUNCTION_ADDR: u8 = 0x4c;

/// Longest an i2c tool or helper script may run
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

fn file(path: String) -> Option<ChannelTarget> {
    Some(ChannelTarget::File(PathBuf::from(path)))
}

/// Board-specific channel addressing
#[derive(Debug, Clone)]
pub struct SysfsLayout {
    kind: BoardKind,
    overrides: HashMap<Channel, ChannelTarget>,
}

impl SysfsLayout {
    pub fn for_board(kind: BoardKind) -> Self {
        Self {
            kind,
            overrides: HashMap::new(),
        }
    }

    /// Apply `[channels]` overrides (channel key → target)
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, String>) -> Result<Self> {
        for (key, target) in overrides {
            let channel: Channel = key.parse()?;
            self.overrides.insert(channel, target.parse()?);
        }
        Ok(self)
    }

    pub fn kind(&self) -> BoardKind {
        self.kind
    }

    /// Resolve a channel, overrides first
    pub fn resolve(&self, channel: &Channel) -> Result<ChannelTarget> {
        if let Some(target) = self.overrides.get(channel) {
            return Ok(target.clone());
        }
        self.default_target(channel)
            .ok_or_else(|| FanError::UnknownChannel(channel.key()))
    }

    fn is_bf(&self) -> bool {
        matches!(
            self.kind,
            BoardKind::Mavericks
                | BoardKind::Montara
                | BoardKind::Newport
                | BoardKind::Stinson
                | BoardKind::Davenport
                | BoardKind::Pescadero
        )
    }

    fn is_newport_family(&self) -> bool {
        matches!(
            self.kind,
            BoardKind::Newport | BoardKind::Stinson | BoardKind::Davenport | BoardKind::Pescadero
        )
    }

    fn default_target(&self, channel: &Channel) -> Option<ChannelTarget> {
        match self.kind {
            BoardKind::Wedge | BoardKind::SixPack => self.wedge_target(channel),
            BoardKind::Yosemite => self.aspeed_fan_target(channel),
            BoardKind::Wedge100 => self.cpld_target(channel),
            _ if self.is_bf() => self.cpld_target(channel),
            _ => None,
        }
    }

    /// Tachometers and PWM of the Aspeed PWM block
    fn aspeed_fan_target(&self, channel: &Channel) -> Option<ChannelTarget> {
        match *channel {
            Channel::Tachometer {
                tray: Tray::Lower,
                index,
            } => file(format!("{}/tacho{}_rpm", ASPEED_PWM, index)),
            Channel::Pwm {
                tray: Tray::Lower,
                index,
                register,
            } => {
                let attr = match register {
                    PwmRegister::Type => "type",
                    PwmRegister::Rising => "rising",
                    PwmRegister::Falling => "falling",
                    PwmRegister::Enable => "en",
                    PwmRegister::Duty => return None,
                };
                file(format!("{}/pwm{}_{}", ASPEED_PWM, index, attr))
            }
            _ => None,
        }
    }

    fn wedge_target(&self, channel: &Channel) -> Option<ChannelTarget> {
        let sensor = |bus: u8, dev: &str| file(format!("{}/i2c-{}/{}/temp1_input", WEDGE_I2C, bus, dev));
        match *channel {
            Channel::Temperature(TempSensor::Intake) => sensor(3, "3-0048"),
            Channel::Temperature(TempSensor::Switch) => sensor(3, "3-0049"),
            Channel::Temperature(TempSensor::Exhaust) => sensor(3, "3-004a"),
            Channel::Temperature(TempSensor::Server) => sensor(4, "4-0040"),
            Channel::Led {
                tray: Tray::Lower,
                index,
                register: LedRegister::Control,
            } => {
                let gpio = WEDGE_LED_GPIOS.get(index.checked_sub(1)? as usize)?;
                file(format!("/sys/class/gpio/gpio{}/value", gpio))
            }
            Channel::Power(PowerRail::ServerDirection) => {
                file("/sys/class/gpio/gpio25/direction".to_string())
            }
            Channel::Power(PowerRail::Server) => file("/sys/class/gpio/gpio25/value".to_string()),
            Channel::Power(PowerRail::SwitchDirection) => {
                file("/tmp/gpionames/T2_POWER_UP/direction".to_string())
            }
            Channel::Power(PowerRail::Switch) => file("/tmp/gpionames/T2_POWER_UP/value".to_string()),
            Channel::Power(PowerRail::HotSwap) => Some(ChannelTarget::I2cSet {
                bus: 12,
                addr: 0x10,
                reg: 0x01,
            }),
            _ => self.aspeed_fan_target(channel),
        }
    }

    fn cpld_target(&self, channel: &Channel) -> Option<ChannelTarget> {
        let (intake, switch, exhaust) = if self.kind == BoardKind::Wedge100 {
            ("3-0048", "3-004b", "3-0048")
        } else {
            ("3-004b", "3-0048", "3-004a")
        };
        // Wedge100BF reports the COM-e DIMM sensor as the server temperature
        let server_input = match self.kind {
            BoardKind::Montara | BoardKind::Mavericks => "temp2_input",
            _ => "temp1_input",
        };
        let lower_dir = if self.is_newport_family() {
            FANCPLD_NEWPORT
        } else {
            FANCPLD_LOWER
        };
        let tray_dir = |tray: Tray| match tray {
            Tray::Lower => lower_dir,
            Tray::Upper => FANCPLD_UPPER,
        };

        match *channel {
            Channel::Temperature(TempSensor::Intake) => file(format!("{}/{}/temp1_input", LM75, intake)),
            Channel::Temperature(TempSensor::Switch) => file(format!("{}/{}/temp1_input", LM75, switch)),
            Channel::Temperature(TempSensor::Exhaust) => {
                file(format!("{}/{}/temp1_input", LM75, exhaust))
            }
            Channel::Temperature(TempSensor::Server) => file(format!("{}/{}", COM_E, server_input)),
            Channel::Temperature(TempSensor::Junction(n)) if self.is_bf() => {
                let reg = match (self.kind, n) {
                    (_, 1) => 0x01,
                    (BoardKind::Stinson | BoardKind::Pescadero, 2) => 0x23,
                    _ => return None,
                };
                let (bus, mux) = if self.kind == BoardKind::Mavericks {
                    (
                        9,
                        Some(MuxSelect {
                            bus: 9,
                            addr: 0x70,
                            value: 0x10,
                        }),
                    )
                } else {
                    (3, None)
                };
                Some(ChannelTarget::I2cGet {
                    bus,
                    addr: JUNCTION_ADDR,
                    reg,
                    mux,
                })
            }
            Channel::Tachometer { tray, index } => {
                file(format!("{}/fan{}_input", tray_dir(tray), index))
            }
            Channel::Pwm {
                tray,
                index,
                register: PwmRegister::Duty,
            } => {
                if self.is_newport_family() {
                    file(format!("{}/fantray_pwm", lower_dir))
                } else {
                    file(format!("{}/fantray{}_pwm", tray_dir(tray), index))
                }
            }
            Channel::Led {
                tray,
                index,
                register,
            } => {
                let suffix = match register {
                    LedRegister::Control => "led_ctrl",
                    LedRegister::Red => "led_r",
                    LedRegister::Green => "led_g",
                };
                file(format!("{}/fantray{}_{}", tray_dir(tray), index, suffix))
            }
            Channel::LedDebugMode if self.is_newport_family() => {
                file(format!("{}/led_debug_mode", FANCPLD_NEWPORT))
            }
            Channel::Power(PowerRail::Server) => file(format!("{}/pwr_usrv_en", SYSCPLD)),
            Channel::Power(PowerRail::Main) => file(format!("{}/pwr_main_n", SYSCPLD)),
            Channel::Power(PowerRail::SwitchReset) if self.is_bf() => {
                Some(ChannelTarget::Script(PathBuf::from(SWITCH_RESET_SCRIPT)))
            }
            Channel::Power(PowerRail::SwitchHold) if self.is_bf() => Some(ChannelTarget::I2cSet {
                bus: 12,
                addr: 0x31,
                reg: 0x32,
            }),
            _ => None,
        }
    }
}

/// Device access through sysfs attributes and i2c tools
pub struct SysfsDevice {
    layout: SysfsLayout,
}

impl SysfsDevice {
    pub fn new(layout: SysfsLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &SysfsLayout {
        &self.layout
    }
}

/// Run a command, returning its stdout
async fn run(program: &str, args: &[String]) -> Result<String> {
    run_within(program, args, COMMAND_TIMEOUT).await
}

/// Run a command, killing it once `limit` has passed
async fn run_within(program: &str, args: &[String], limit: Duration) -> Result<String> {
    trace!("Running {} {}", program, args.join(" "));
    let child = Command::new(program).args(args).kill_on_drop(true).output();
    let output = tokio::time::timeout(limit, child)
        .await
        .map_err(|_| {
            FanError::Timeout(format!("{} {} after {:?}", program, args.join(" "), limit))
        })?
        .map_err(|e| FanError::Hardware(format!("Failed to run {}: {}", program, e)))?;
    if !output.status.success() {
        return Err(FanError::Hardware(format!(
            "{} {} failed ({}): {}",
            program,
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn i2c_args(bus: u8, addr: u8, rest: &[String]) -> Vec<String> {
    let mut args = vec![
        "-f".to_string(),
        "-y".to_string(),
        bus.to_string(),
        format!("{:#04x}", addr),
    ];
    args.extend_from_slice(rest);
    args
}

#[async_trait]
impl DeviceAccess for SysfsDevice {
    async fn read_channel(&mut self, channel: &Channel) -> Result<i64> {
        let target = self.layout.resolve(channel)?;
        let text = match &target {
            ChannelTarget::File(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
                FanError::Hardware(format!("Failed to read {}: {}", path.display(), e))
            })?,
            ChannelTarget::I2cGet {
                bus,
                addr,
                reg,
                mux,
            } => {
                if let Some(mux) = mux {
                    run(
                        "i2cset",
                        &i2c_args(mux.bus, mux.addr, &[format!("{:#04x}", mux.value)]),
                    )
                    .await?;
                }
                run("i2cget", &i2c_args(*bus, *addr, &[format!("{:#04x}", reg)])).await?
            }
            ChannelTarget::I2cSet { .. } | ChannelTarget::Script(_) => {
                return Err(FanError::InvalidInput(format!(
                    "Channel {} is write-only",
                    channel.key()
                )))
            }
        };
        let value = parse_value(&text)?;
        trace!("Read {} = {} from {}", channel.key(), value, target);
        Ok(value)
    }

    async fn write_channel(&mut self, channel: &Channel, value: &str) -> Result<()> {
        let target = self.layout.resolve(channel)?;
        debug!("Writing {} to {} ({})", value, channel.key(), target);
        match &target {
            ChannelTarget::File(path) => tokio::fs::write(path, value).await.map_err(|e| {
                FanError::Hardware(format!("Failed to write {}: {}", path.display(), e))
            }),
            ChannelTarget::I2cSet { bus, addr, reg } => run(
                "i2cset",
                &i2c_args(*bus, *addr, &[format!("{:#04x}", reg), value.to_string()]),
            )
            .await
            .map(|_| ()),
            ChannelTarget::Script(path) => run(&path.to_string_lossy(), &[]).await.map(|_| ()),
            ChannelTarget::I2cGet { .. } => Err(FanError::InvalidInput(format!(
                "Channel {} is read-only",
                channel.key()
            ))),
        }
    }

    fn describe(&self) -> String {
        format!("sysfs ({})", self.layout.kind())
    }
}
