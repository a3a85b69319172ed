//! Percent → PWM unit encoding
//!
//! Fan controllers take a quantized duty value rather than a percentage.
//! Each board family has its own ceiling, its own correction rules and its
//! own register layout. They are all described here as data so a new
//! encoding is a new constant, not a new code path.

use crate::channel::{Channel, PwmRegister, Tray};

/// A bit field inside a device register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterField {
    /// Bit offset of the least significant bit
    pub shift: u32,
    /// Field width in bits
    pub width: u32,
}

impl RegisterField {
    /// Create a field at `shift` that is `width` bits wide
    pub const fn new(shift: u32, width: u32) -> Self {
        Self { shift, width }
    }

    fn mask(&self) -> u32 {
        if self.width >= 32 {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        }
    }

    /// Replace the field's bits in `register` with `value`.
    ///
    /// Bits of `value` beyond the field width are dropped.
    pub fn insert(&self, register: u32, value: u32) -> u32 {
        let mask = self.mask();
        (register & !(mask << self.shift)) | ((value & mask) << self.shift)
    }

    /// Extract the field's value from `register`
    pub fn extract(&self, register: u32) -> u32 {
        (register >> self.shift) & self.mask()
    }
}

/// Correction applied after the linear `percent * unit_max / 100` step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantizationRule {
    /// Subtract one unit when the percent is exactly one of these values
    CheckpointDecrement(&'static [u32]),
    /// A unit equal to `unit_max` is written as 0 (hardware treats 0 as full on)
    WrapAtMax,
}

/// How a fan's duty value reaches the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmLayout {
    /// One duty register per fan
    PerFan,
    /// One duty register for the whole tray (channel index 0)
    Shared,
    /// Aspeed PWM block: type, rising edge, falling edge and enable registers
    Aspeed,
}

/// Board-specific PWM encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmEncoding {
    /// Encoding name for logs
    pub name: &'static str,
    /// Unit value for 100 % before corrections
    pub unit_max: u32,
    /// Corrections applied in order
    pub rules: &'static [QuantizationRule],
    /// Register field holding the duty value
    pub field: RegisterField,
    /// Register layout
    pub layout: PwmLayout,
}

/// 1/32 duty steps on the Wedge100-family fan CPLD
pub const CPLD_32_STEP: PwmEncoding = PwmEncoding {
    name: "cpld-32",
    unit_max: 31,
    rules: &[],
    field: RegisterField::new(0, 5),
    layout: PwmLayout::PerFan,
};

/// 1/16 duty steps on the Newport-family fan CPLD
pub const CPLD_16_STEP: PwmEncoding = PwmEncoding {
    name: "cpld-16",
    unit_max: 16,
    rules: &[QuantizationRule::CheckpointDecrement(&[25, 50, 75, 100])],
    field: RegisterField::new(0, 4),
    layout: PwmLayout::Shared,
};

/// Aspeed PWM with 96 falling-edge positions per period
pub const ASPEED_96: PwmEncoding = PwmEncoding {
    name: "aspeed-96",
    unit_max: 96,
    rules: &[QuantizationRule::WrapAtMax],
    field: RegisterField::new(0, 8),
    layout: PwmLayout::Aspeed,
};

/// Convert a percentage (clamped to 100) to a raw PWM unit
pub fn percent_to_pwm_unit(encoding: &PwmEncoding, percent: u32) -> u32 {
    let percent = percent.min(100);
    let mut unit = percent * encoding.unit_max / 100;

    for rule in encoding.rules {
        match rule {
            QuantizationRule::CheckpointDecrement(points) => {
                if points.contains(&percent) {
                    unit = unit.saturating_sub(1);
                }
            }
            QuantizationRule::WrapAtMax => {
                if unit == encoding.unit_max {
                    unit = 0;
                }
            }
        }
    }

    encoding.field.extract(encoding.field.insert(0, unit))
}

/// Approximate percentage a raw unit stands for.
///
/// Returns the middle of the percent range that encodes to `unit`. On
/// wrapping encodings 0 means full speed; the output enable decides whether
/// the fan is actually off.
pub fn pwm_unit_to_percent(encoding: &PwmEncoding, unit: u32) -> u32 {
    let wraps = encoding
        .rules
        .iter()
        .any(|r| matches!(r, QuantizationRule::WrapAtMax));
    if unit == 0 {
        return if wraps { 100 } else { 0 };
    }

    let mut matching = (1..=100).filter(|&p| percent_to_pwm_unit(encoding, p) == unit);
    match matching.next() {
        Some(low) => {
            let high = matching.last().unwrap_or(low);
            (low + high + 1) / 2
        }
        None => (unit * 100 / encoding.unit_max.max(1)).min(100),
    }
}

/// Register writes that command `percent` on one fan output
pub fn pwm_writes(
    encoding: &PwmEncoding,
    tray: Tray,
    pwm_index: u32,
    percent: u32,
) -> Vec<(Channel, String)> {
    let unit = percent_to_pwm_unit(encoding, percent);
    let reg = |index, register| Channel::Pwm {
        tray,
        index,
        register,
    };

    match encoding.layout {
        PwmLayout::PerFan => vec![(reg(pwm_index, PwmRegister::Duty), unit.to_string())],
        PwmLayout::Shared => vec![(reg(0, PwmRegister::Duty), unit.to_string())],
        PwmLayout::Aspeed => {
            if percent == 0 {
                vec![(reg(pwm_index, PwmRegister::Enable), "0".to_string())]
            } else {
                vec![
                    (reg(pwm_index, PwmRegister::Type), "0".to_string()),
                    (reg(pwm_index, PwmRegister::Rising), "0".to_string()),
                    (reg(pwm_index, PwmRegister::Falling), unit.to_string()),
                    (reg(pwm_index, PwmRegister::Enable), "1".to_string()),
                ]
            }
        }
    }
}
