//! Chassis power-down
//!
//! Runs the board's power sequence once the shutdown policy has fired. Every
//! write is bounded by the configured timeout so a wedged bus cannot stall
//! the daemon while the chassis overheats.

use std::path::Path;
use swfan_core::board::{PowerSequence, PowerStep};
use swfan_core::config::ShutdownConfig;
use swfan_core::shutdown::ShutdownReason;
use swfan_hardware::{DeviceAccess, Watchdog};
use tracing::{error, info, warn};

/// Exit status after a policy-triggered shutdown
pub const EXIT_SHUTDOWN: i32 = 2;
/// Exit status after a stop signal
pub const EXIT_SIGNAL: i32 = 3;

/// Does the shutdown inhibit marker exist?
pub async fn inhibited(marker: &Path) -> bool {
    tokio::fs::try_exists(marker).await.unwrap_or(false)
}

/// Run `steps` in order; returns false when any write failed or timed out
async fn run_steps(
    device: &mut dyn DeviceAccess,
    steps: &[PowerStep],
    config: &ShutdownConfig,
) -> bool {
    let mut ok = true;
    for step in steps {
        let write = device.write_channel(&step.channel, step.value);
        match tokio::time::timeout(config.write_timeout(), write).await {
            Ok(Ok(())) => info!("{} <- {}", step.channel, step.value),
            Ok(Err(e)) => {
                error!("Power step {} <- {} failed: {}", step.channel, step.value, e);
                ok = false;
            }
            Err(_) => {
                error!(
                    "Power step {} <- {} timed out after {:?}",
                    step.channel,
                    step.value,
                    config.write_timeout()
                );
                ok = false;
            }
        }
    }
    ok
}

/// Power the chassis down and return the exit status.
///
/// The caller must already have commanded every fan to maximum.
pub async fn power_down(
    device: &mut dyn DeviceAccess,
    watchdog: &mut dyn Watchdog,
    sequence: &PowerSequence,
    config: &ShutdownConfig,
    reason: ShutdownReason,
) -> i32 {
    error!("Shutting down: {}", reason);

    if sequence.is_empty() {
        warn!("No power-down sequence on this board, leaving power untouched");
    } else {
        let mut ok = run_steps(device, sequence.prepare, config).await;

        if !sequence.server_off.is_empty() {
            ok &= run_steps(device, sequence.server_off, config).await;
            info!("Waiting {:?} for the server to power off", config.grace());
            tokio::time::sleep(config.grace()).await;
        }

        ok &= run_steps(device, sequence.main_off, config).await;

        if !ok && !sequence.fallback.is_empty() {
            error!("Orderly power-down failed, cutting power through the hot-swap controller");
            run_steps(device, sequence.fallback, config).await;
        }
    }

    if let Err(e) = watchdog.stop().await {
        error!("Failed to stop watchdog: {}", e);
    }
    tokio::time::sleep(config.exit_delay()).await;
    EXIT_SHUTDOWN
}
