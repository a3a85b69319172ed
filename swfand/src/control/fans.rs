//! Fan array commands and tachometer sampling

use std::time::Duration;
use swfan_core::board::{FanArrayLayout, LedColor};
use swfan_core::health::FanSample;
use swfan_core::{Channel, FanError, Result};
use swfan_hardware::{write_all, DeviceAccess};
use tracing::debug;

/// Command every fan of an array to `percent`
pub async fn set_speed(
    device: &mut dyn DeviceAccess,
    layout: &FanArrayLayout,
    percent: u32,
) -> Result<()> {
    let mut writes: Vec<(Channel, String)> = layout
        .slots
        .iter()
        .flat_map(|slot| layout.speed_writes(slot, percent))
        .collect();
    // Shared PWM registers appear once per slot
    writes.dedup();
    write_all(device, &writes).await
}

/// [`set_speed`] bounded by `limit`
pub async fn set_speed_within(
    device: &mut dyn DeviceAccess,
    layout: &FanArrayLayout,
    percent: u32,
    limit: Duration,
) -> Result<()> {
    match tokio::time::timeout(limit, set_speed(device, layout, percent)).await {
        Ok(result) => result,
        Err(_) => Err(FanError::Timeout(format!(
            "fan speed write did not finish within {:?}",
            limit
        ))),
    }
}

/// Show `color` on one fan's LED (0-based slot)
pub async fn set_led(
    device: &mut dyn DeviceAccess,
    layout: &FanArrayLayout,
    index: usize,
    color: LedColor,
) -> Result<()> {
    let slot = layout.slot(index)?;
    write_all(device, &layout.led_writes(slot, color)).await
}

pub async fn set_all_leds(
    device: &mut dyn DeviceAccess,
    layout: &FanArrayLayout,
    color: LedColor,
) -> Result<()> {
    let writes: Vec<(Channel, String)> = layout
        .slots
        .iter()
        .flat_map(|slot| layout.led_writes(slot, color))
        .collect();
    write_all(device, &writes).await
}

/// Toggle the LED debug-mode register on boards that have one
pub async fn set_led_debug_mode(
    device: &mut dyn DeviceAccess,
    layout: &FanArrayLayout,
    on: bool,
) -> Result<()> {
    if !layout.leds.has_debug_mode() {
        return Ok(());
    }
    let value = if on { "1" } else { "0" };
    device.write_channel(&Channel::LedDebugMode, value).await
}

/// Read every tachometer of an array.
///
/// An unreadable tachometer counts as a stopped rotor.
pub async fn read_samples(
    device: &mut dyn DeviceAccess,
    layout: &FanArrayLayout,
) -> Vec<FanSample> {
    let mut samples = Vec::with_capacity(layout.fan_count());
    for slot in layout.slots {
        let (front, rear) = layout.tach_channels(slot);
        let front_rpm = read_rpm(device, &front).await;
        let rear_rpm = match rear {
            Some(channel) => Some(read_rpm(device, &channel).await),
            None => None,
        };
        samples.push(layout.sample(front_rpm, rear_rpm));
    }
    samples
}

async fn read_rpm(device: &mut dyn DeviceAccess, channel: &Channel) -> u32 {
    match device.read_channel(channel).await {
        Ok(rpm) => rpm.clamp(0, i64::from(u32::MAX)) as u32,
        Err(e) => {
            debug!("Failed to read {}: {}", channel, e);
            0
        }
    }
}
