//! Stop signals
//!
//! SIGINT, SIGTERM and SIGUSR1 all stop the daemon with the fans at full
//! speed. SIGUSR1 additionally disarms the watchdog, for planned restarts.

use std::io;
use tokio::signal::unix::{signal, Signal, SignalKind};

/// A signal that stops the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Interrupt,
    Terminate,
    User1,
}

impl StopSignal {
    pub fn name(&self) -> &'static str {
        match self {
            StopSignal::Interrupt => "SIGINT",
            StopSignal::Terminate => "SIGTERM",
            StopSignal::User1 => "SIGUSR1",
        }
    }

    /// Whether the watchdog is disarmed on exit
    pub fn stops_watchdog(&self) -> bool {
        matches!(self, StopSignal::User1)
    }
}

/// Registered handlers for every stop signal
#[derive(Debug)]
pub struct SignalListener {
    interrupt: Signal,
    terminate: Signal,
    user1: Signal,
}

impl SignalListener {
    /// Register the handlers. Must run inside the tokio runtime.
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            user1: signal(SignalKind::user_defined1())?,
        })
    }

    /// Wait for the next stop signal
    pub async fn recv(&mut self) -> StopSignal {
        tokio::select! {
            _ = self.interrupt.recv() => StopSignal::Interrupt,
            _ = self.terminate.recv() => StopSignal::Terminate,
            _ = self.user1.recv() => StopSignal::User1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_user1_stops_watchdog() {
        assert!(!StopSignal::Interrupt.stops_watchdog());
        assert!(!StopSignal::Terminate.stops_watchdog());
        assert!(StopSignal::User1.stops_watchdog());
        assert_eq!(StopSignal::User1.name(), "SIGUSR1");
    }

    #[tokio::test]
    async fn test_install() {
        assert!(SignalListener::install().is_ok());
    }
}
