//! swfan-hardware
//!
//! Hardware access for the swfan daemon: the device access trait and its
//! sysfs and simulated implementations, the watchdog, and the retry and
//! bus-lock helpers used by contended read paths.
//!
//! Public API:
//! - `device::DeviceAccess`: read/write logical channels
//! - `sysfs::SysfsDevice`: sysfs attributes and i2c tools on a real chassis
//! - `sim::SimulatedChassis`: in-memory chassis for mock mode and tests
//! - `watchdog::Watchdog`: `/dev/watchdog` or a no-op stand-in
//! - `retry::Backoff`: bounded retries that keep kicking the watchdog

pub mod bus_lock;
pub mod device;
pub mod retry;
pub mod sim;
pub mod sysfs;
pub mod watchdog;

pub use bus_lock::{BusLock, BusLockGuard};
pub use device::{write_all, DeviceAccess};
pub use retry::{read_with_retry, Backoff, RetryPolicy};
pub use sim::{SimHandle, SimulatedChassis};
pub use sysfs::{ChannelTarget, SysfsDevice, SysfsLayout};
pub use watchdog::{LinuxWatchdog, NullWatchdog, Watchdog, WatchdogActivity};
